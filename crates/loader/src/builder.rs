//! Minimal ELF64 writer for tests: a header, a program header table and
//! the segment contents, no sections.

use alloc::vec::Vec;

use goblin::elf::header::{EM_RISCV, ET_EXEC};
use goblin::elf::program_header::{PF_R, PF_W, PF_X, PT_INTERP, PT_LOAD};

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

struct Segment {
    p_type: u32,
    flags: u32,
    vaddr: u64,
    data: Vec<u8>,
    memsz: u64,
}

pub struct ElfImageBuilder {
    e_type: u16,
    machine: u16,
    entry: u64,
    segments: Vec<Segment>,
}

impl ElfImageBuilder {
    /// A static RISC-V executable entered at `entry`.
    pub fn new(entry: u64) -> Self {
        Self {
            e_type: ET_EXEC,
            machine: EM_RISCV,
            entry,
            segments: Vec::new(),
        }
    }

    pub fn e_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }

    pub fn machine(mut self, machine: u16) -> Self {
        self.machine = machine;
        self
    }

    pub fn text(self, vaddr: u64, code: &[u8]) -> Self {
        self.segment(PT_LOAD, PF_R | PF_X, vaddr, code, code.len() as u64)
    }

    /// Writable segment of `memsz` bytes whose first bytes are `init`.
    pub fn data(self, vaddr: u64, init: &[u8], memsz: u64) -> Self {
        self.segment(PT_LOAD, PF_R | PF_W, vaddr, init, memsz)
    }

    pub fn interpreter(self, path: &str) -> Self {
        let mut bytes = Vec::from(path.as_bytes());
        bytes.push(0);
        let len = bytes.len() as u64;
        self.segment(PT_INTERP, PF_R, 0, &bytes, len)
    }

    pub fn segment(mut self, p_type: u32, flags: u32, vaddr: u64, data: &[u8], memsz: u64) -> Self {
        self.segments.push(Segment {
            p_type,
            flags,
            vaddr,
            data: Vec::from(data),
            memsz,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let mut out = Vec::new();

        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&self.e_type.to_le_bytes());
        out.extend_from_slice(&self.machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&self.entry.to_le_bytes());
        out.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(phnum as u16).to_le_bytes());
        out.extend_from_slice(&64u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        debug_assert_eq!(out.len(), EHDR_SIZE);

        let mut offset = EHDR_SIZE + phnum * PHDR_SIZE;
        for seg in &self.segments {
            out.extend_from_slice(&seg.p_type.to_le_bytes());
            out.extend_from_slice(&seg.flags.to_le_bytes());
            out.extend_from_slice(&(offset as u64).to_le_bytes());
            out.extend_from_slice(&seg.vaddr.to_le_bytes());
            out.extend_from_slice(&seg.vaddr.to_le_bytes());
            out.extend_from_slice(&(seg.data.len() as u64).to_le_bytes());
            out.extend_from_slice(&seg.memsz.to_le_bytes());
            out.extend_from_slice(&0x1000u64.to_le_bytes());
            offset += seg.data.len();
        }
        for seg in &self.segments {
            out.extend_from_slice(&seg.data);
        }
        out
    }
}
