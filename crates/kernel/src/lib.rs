#![no_std]

//! Proxy kernel core.
//!
//! Boots one statically linked program: configures machine state, descends
//! to supervisor mode, fetches the command line from the host, builds the
//! process image and hands control to the program. Every I/O-like request the
//! program makes is forwarded to the host over the [`Frontend`] channel.
//!
//! Hardware and the collaborators that touch it (control registers, the host
//! transport, translation tables, the ELF reader) are reached through the
//! traits in [`machine`] and [`platform`].

#[cfg(test)]
extern crate std;

pub mod config;
pub use config::{Config, KernelOptions};

pub mod error;
pub use error::{ArgError, BootError, LoadError, StackError};

pub mod machine;
pub use machine::{Csr, ElfLoader, FloatAbi, Machine, Paging, PerfSource};

pub mod platform;
pub use platform::{Continuation, Platform};

pub mod frontend;
pub use frontend::{CallStats, Frontend, HostCallBuffer, HostTransport};

#[macro_use]
pub mod console;
pub use console::Logger;

pub mod args;
pub use args::{ArgBuffer, Command, ProgramArgs};

pub mod stack;
pub use stack::{InitialStack, StackArena};

pub mod context;
pub use context::KernelContext;

pub mod image;
pub mod minit;
pub use minit::{boot, boot_other_hart, fatal};

pub mod handoff;
pub mod syscall;

pub mod global;
pub use global::Global;

#[cfg(test)]
pub(crate) mod testing;
