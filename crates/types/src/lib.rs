#![no_std]

//! ABI shared by the proxy kernel, the ELF loader and the host side: the
//! process image, the initial trap frame, auxiliary-vector keys, host-call
//! numbers and the wire layouts the host reads and writes.

pub mod boot;
pub use boot::{LayoutError, PerfCounters, ProcessImage, UserLayout};

pub mod auxv;
pub use auxv::{AuxEntry, AUXV_LEN};

pub mod csr;
pub use csr::{Mstatus, Privilege, Protection};

pub mod mainvars;

pub mod primitives;

pub mod stat;
pub use stat::{FrontendStat, Stat};

pub mod syscall;

pub mod trapframe;
pub use trapframe::TrapFrame;

/// Page size of the supported translation modes.
pub const PAGE_SIZE: u64 = 4096;
/// Width of a machine word on the stack and in the host-call buffer.
pub const WORD_BYTES: usize = 8;

pub const fn round_up(value: u64, align: u64) -> u64 {
    (value + (align - 1)) & !(align - 1)
}

pub const fn round_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

// used for serialization
pub trait SerializeField {
    /// Appends `self` into `buf` at `*offset`, advancing the offset.
    fn serialize_field(&self, buf: &mut [u8], offset: &mut usize);
}
