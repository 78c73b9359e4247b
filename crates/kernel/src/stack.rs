//! Initial user stack.
//!
//! The stack is built top-down inside a [`StackArena`]: a byte window over
//! the user stack region with a cursor that can never move below the
//! region's low-water mark.

use core::ffi::CStr;

use arrayvec::ArrayVec;
use types::auxv::{
    AT_ENTRY, AT_NULL, AT_PAGESZ, AT_PHDR, AT_PHENT, AT_PHNUM, AT_RANDOM, AT_SECURE, AUXV_LEN,
    AuxEntry,
};
use types::{PAGE_SIZE, ProcessImage, WORD_BYTES, round_down};

use crate::config::Config;
use crate::error::StackError;

const WORD: u64 = WORD_BYTES as u64;
/// Stack pointer alignment required by the calling convention.
pub const STACK_ALIGN: u64 = 16;

pub struct StackArena<'a> {
    mem: &'a mut [u8],
    base: u64,
    sp: u64,
}

impl<'a> StackArena<'a> {
    /// `mem` backs `[base, base + mem.len())`; the cursor starts at the top.
    pub fn new(mem: &'a mut [u8], base: u64) -> Self {
        let sp = base + mem.len() as u64;
        Self { mem, base, sp }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn top(&self) -> u64 {
        self.base + self.mem.len() as u64
    }

    pub fn sp(&self) -> u64 {
        self.sp
    }

    /// Moves the cursor down by `len` bytes and returns the new cursor.
    pub fn reserve(&mut self, len: u64) -> Result<u64, StackError> {
        let available = self.sp - self.base;
        if len > available {
            return Err(StackError::Overflow {
                needed: len,
                available,
            });
        }
        self.sp -= len;
        Ok(self.sp)
    }

    pub fn align_down(&mut self, align: u64) -> Result<u64, StackError> {
        let aligned = round_down(self.sp, align);
        if aligned < self.base {
            return Err(StackError::Overflow {
                needed: self.sp - aligned,
                available: self.sp - self.base,
            });
        }
        self.sp = aligned;
        Ok(aligned)
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> Result<u64, StackError> {
        let addr = self.reserve(data.len() as u64)?;
        self.write_bytes(addr, data)?;
        Ok(addr)
    }

    /// Pushes `s` with its terminating NUL.
    pub fn push_cstr(&mut self, s: &CStr) -> Result<u64, StackError> {
        self.push_bytes(s.to_bytes_with_nul())
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), StackError> {
        let off = self.offset(addr, data.len())?;
        self.mem[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn write_word(&mut self, addr: u64, value: u64) -> Result<(), StackError> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn read_word(&self, addr: u64) -> Result<u64, StackError> {
        let off = self.offset(addr, WORD_BYTES)?;
        let mut word = [0u8; WORD_BYTES];
        word.copy_from_slice(&self.mem[off..off + WORD_BYTES]);
        Ok(u64::from_le_bytes(word))
    }

    pub fn read_cstr(&self, addr: u64) -> Result<&CStr, StackError> {
        let off = self.offset(addr, 1)?;
        CStr::from_bytes_until_nul(&self.mem[off..]).map_err(|_| StackError::OutOfRange { addr })
    }

    fn offset(&self, addr: u64, len: usize) -> Result<usize, StackError> {
        let end = addr.checked_add(len as u64);
        match end {
            Some(end) if addr >= self.base && end <= self.top() => Ok((addr - self.base) as usize),
            _ => Err(StackError::OutOfRange { addr }),
        }
    }
}

/// Auxiliary vector for `image`, in the order the program's C runtime reads it.
pub fn auxv(image: &ProcessImage, random: u64) -> [AuxEntry; AUXV_LEN] {
    [
        AuxEntry::new(AT_ENTRY, image.entry),
        AuxEntry::new(AT_PHNUM, image.phnum),
        AuxEntry::new(AT_PHENT, image.phent),
        AuxEntry::new(AT_PHDR, image.phdr),
        AuxEntry::new(AT_PAGESZ, PAGE_SIZE),
        AuxEntry::new(AT_SECURE, 0),
        // Derived from the stack address, not from an entropy source.
        AuxEntry::new(AT_RANDOM, random),
        AuxEntry::new(AT_NULL, 0),
    ]
}

/// What the program finds at its initial stack pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitialStack {
    pub sp: u64,
    pub argc: u64,
    /// Address of `argv[0]`.
    pub argv: u64,
    pub auxv: [AuxEntry; AUXV_LEN],
}

/// Lays out the program header table, argument and environment strings,
/// then `argc`, the `argv` and `envp` arrays and the auxiliary vector.
/// Records the relocated header table address in `image.phdr`.
pub fn build_stack<'s, I>(
    arena: &mut StackArena<'_>,
    image: &mut ProcessImage,
    phdrs: &[u8],
    argv: I,
    envp: &[&CStr],
) -> Result<InitialStack, StackError>
where
    I: IntoIterator<Item = &'s CStr>,
{
    image.phdr = arena.push_bytes(phdrs)?;
    image.phdr_size = phdrs.len() as u64;

    let mut argv_addrs: ArrayVec<u64, { Config::MAX_ARGS }> = ArrayVec::new();
    for arg in argv {
        let addr = arena.push_cstr(arg)?;
        argv_addrs
            .try_push(addr)
            .map_err(|_| StackError::TooManyArgs)?;
    }
    let mut envp_addrs: ArrayVec<u64, { Config::MAX_ARGS }> = ArrayVec::new();
    for var in envp {
        let addr = arena.push_cstr(var)?;
        envp_addrs
            .try_push(addr)
            .map_err(|_| StackError::TooManyArgs)?;
    }

    arena.align_down(WORD)?;
    let aux = auxv(image, arena.sp());

    let words = 1 + argv_addrs.len() + 1 + envp_addrs.len() + 1 + 2 * AUXV_LEN;
    arena.reserve(words as u64 * WORD)?;
    let sp = arena.align_down(STACK_ALIGN)?;

    let mut cursor = sp;
    let mut push = |arena: &mut StackArena<'_>, value: u64| -> Result<(), StackError> {
        arena.write_word(cursor, value)?;
        cursor += WORD;
        Ok(())
    };
    push(arena, argv_addrs.len() as u64)?;
    for addr in &argv_addrs {
        push(arena, *addr)?;
    }
    push(arena, 0)?;
    for addr in &envp_addrs {
        push(arena, *addr)?;
    }
    push(arena, 0)?;
    for entry in &aux {
        push(arena, entry.key)?;
        push(arena, entry.value)?;
    }

    Ok(InitialStack {
        sp,
        argc: argv_addrs.len() as u64,
        argv: sp + WORD,
        auxv: aux,
    })
}
