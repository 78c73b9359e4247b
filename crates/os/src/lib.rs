#![cfg_attr(target_arch = "riscv64", no_std)]
//! Bare-metal glue for running the proxy kernel on a 64-bit RISC-V hart.
//!
//! This crate provides:
//! - control-register and counter access for the kernel's `Machine` seam,
//! - the HTIF `tohost`/`fromhost` mailbox as the host transport,
//! - identity-mapped user memory for the `Paging` seam,
//! - the privilege transitions and the supervisor trap entry,
//! - a bump allocator backing the ELF loader.
//!
//! Everything here is riscv64-only. On other targets the crate is empty so
//! the workspace still builds on the host.

#[cfg(target_arch = "riscv64")]
extern crate alloc;

#[cfg(target_arch = "riscv64")]
pub mod allocator;
#[cfg(target_arch = "riscv64")]
pub mod csr;
#[cfg(target_arch = "riscv64")]
pub mod htif;
#[cfg(target_arch = "riscv64")]
pub mod paging;
#[cfg(target_arch = "riscv64")]
pub mod platform;
#[cfg(target_arch = "riscv64")]
pub mod trap;

#[cfg(target_arch = "riscv64")]
pub use platform::{RiscvPlatform, boot_primary, boot_secondary};

/// Parses a decimal build-time setting, falling back to `default`.
pub const fn build_setting(value: Option<&str>, default: u64) -> u64 {
    let Some(text) = value else {
        return default;
    };
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return default;
    }
    let mut out: u64 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            return default;
        }
        out = match out.checked_mul(10) {
            Some(v) => match v.checked_add((digit - b'0') as u64) {
                Some(v) => v,
                None => return default,
            },
            None => return default,
        };
        i += 1;
    }
    out
}
