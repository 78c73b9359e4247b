#![no_std]

//! ELF segment loader for the proxy kernel.
//!
//! Reads a statically linked RISC-V program through an [`ImageSource`] and
//! places its `PT_LOAD` segments into user memory through the kernel's
//! [`Paging`](kernel::Paging) seam.

extern crate alloc;

pub mod elf;
pub use elf::{ElfSegmentLoader, ImageSource, load_from_bytes};

pub mod host;
pub use host::HostImageSource;

#[cfg(any(test, feature = "test-util"))]
pub mod builder;
#[cfg(any(test, feature = "test-util"))]
pub use builder::ElfImageBuilder;
