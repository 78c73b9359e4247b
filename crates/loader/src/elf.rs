use alloc::vec::Vec;
use core::ffi::CStr;

use goblin::elf::Elf;
use goblin::elf::header::{EM_RISCV, ET_DYN, ET_EXEC};
use goblin::elf::program_header::{PT_INTERP, PT_LOAD};
use kernel::{ElfLoader, LoadError, Paging};
use log::debug;
use types::{PAGE_SIZE, ProcessImage, Protection, round_down, round_up};

/// Where program files come from.
pub trait ImageSource {
    /// Returns the whole file named `path`.
    fn read_image(&mut self, path: &CStr) -> Result<Vec<u8>, LoadError>;
}

pub struct ElfSegmentLoader<S> {
    source: S,
}

impl<S: ImageSource> ElfSegmentLoader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: ImageSource> ElfLoader for ElfSegmentLoader<S> {
    fn load_elf<V: Paging>(
        &mut self,
        path: &CStr,
        phdrs: &mut [u8],
        image: &mut ProcessImage,
        memory: &mut V,
    ) -> Result<(), LoadError> {
        let bytes = self.source.read_image(path)?;
        debug!("read {:?}: {} bytes", path, bytes.len());
        load_from_bytes(&bytes, phdrs, image, memory)
    }
}

const ZERO_CHUNK: [u8; 256] = [0; 256];

/// Loads the ELF image `bytes`.
///
/// - The raw program header table is copied into `phdrs`.
/// - `PT_LOAD` segments are mapped and copied; `memsz` beyond `filesz` is
///   zero-filled.
/// - The break starts at the page above the highest segment.
pub fn load_from_bytes<V: Paging>(
    bytes: &[u8],
    phdrs: &mut [u8],
    image: &mut ProcessImage,
    memory: &mut V,
) -> Result<(), LoadError> {
    let elf = Elf::parse(bytes).map_err(|_| LoadError::Malformed)?;
    if !elf.is_64 {
        return Err(LoadError::NotElf64);
    }
    if !elf.little_endian {
        return Err(LoadError::BigEndian);
    }
    if elf.header.e_machine != EM_RISCV {
        return Err(LoadError::NotRiscv);
    }
    let bias = match elf.header.e_type {
        ET_EXEC => 0,
        // Position-independent: keep page zero unmapped.
        ET_DYN => PAGE_SIZE,
        _ => return Err(LoadError::UnsupportedType),
    };
    if elf.program_headers.iter().any(|ph| ph.p_type == PT_INTERP) {
        return Err(LoadError::Interpreter);
    }

    let phent = elf.header.e_phentsize as usize;
    let phnum = elf.header.e_phnum as usize;
    let table_len = phent * phnum;
    if table_len > phdrs.len() {
        return Err(LoadError::PhdrsTooLarge {
            needed: table_len,
            capacity: phdrs.len(),
        });
    }
    let table = file_range(bytes, elf.header.e_phoff, table_len as u64)?;
    phdrs[..table_len].copy_from_slice(table);

    image.phent = phent as u64;
    image.phnum = phnum as u64;
    image.phdr = phdrs.as_ptr() as u64;
    image.phdr_size = table_len as u64;
    image.bias = bias;
    image.entry = elf.entry.wrapping_add(bias);
    image.is_supervisor = (image.entry as i64) < 0;

    let mut brk = 0;
    for ph in elf.program_headers.iter().filter(|ph| ph.p_type == PT_LOAD) {
        if ph.p_memsz == 0 {
            continue;
        }
        if ph.p_filesz > ph.p_memsz {
            return Err(LoadError::Malformed);
        }
        let vaddr = ph.p_vaddr.checked_add(bias).ok_or(LoadError::Malformed)?;
        let end = vaddr.checked_add(ph.p_memsz).ok_or(LoadError::Malformed)?;
        if end > image.mmap_max {
            return Err(LoadError::SegmentOutOfRange { vaddr, end });
        }

        let page = round_down(vaddr, PAGE_SIZE);
        let prot = Protection::from_elf_flags(ph.p_flags);
        if !memory.map_user(page, round_up(end, PAGE_SIZE) - page, prot) {
            return Err(LoadError::MapFailed { vaddr });
        }

        let file = file_range(bytes, ph.p_offset, ph.p_filesz)?;
        if !memory.copy_to_user(vaddr, file) {
            return Err(LoadError::MapFailed { vaddr });
        }
        let mut zero_at = vaddr + ph.p_filesz;
        while zero_at < end {
            let n = core::cmp::min(ZERO_CHUNK.len() as u64, end - zero_at);
            if !memory.copy_to_user(zero_at, &ZERO_CHUNK[..n as usize]) {
                return Err(LoadError::MapFailed { vaddr: zero_at });
            }
            zero_at += n;
        }
        debug!(
            "segment [{vaddr:#x}, {end:#x}) file {:#x} bytes, {prot:?}",
            ph.p_filesz
        );
        brk = brk.max(end);
    }

    image.brk_min = round_up(brk, PAGE_SIZE);
    image.brk = image.brk_min;
    Ok(())
}

/// The `len` bytes at file offset `off`, or `Malformed` if they run past the
/// end of the image.
fn file_range(bytes: &[u8], off: u64, len: u64) -> Result<&[u8], LoadError> {
    let start = usize::try_from(off).map_err(|_| LoadError::Malformed)?;
    let end = off
        .checked_add(len)
        .and_then(|end| usize::try_from(end).ok())
        .ok_or(LoadError::Malformed)?;
    bytes.get(start..end).ok_or(LoadError::Malformed)
}
