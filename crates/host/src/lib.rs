//! Runs the proxy kernel in-process.
//!
//! This crate provides:
//! - a front-end server answering host calls the way a debug host does,
//! - a simulated hart, clock and user memory implementing the kernel's seams,
//! - a [`Simulator`] that boots a program up to its first instruction and
//!   then lets tests issue system calls on its behalf.
//!
//! Addresses exchanged over the host-call channel are plain pointers into
//! this process.

pub mod server;
pub use server::{HostExit, HostServer};

pub mod sim;
pub use sim::{
    DecodedStack, Handoff, Outcome, Parked, SIM_TRAP_VECTOR, SimClock, SimConfig, SimContext,
    SimMachine, SimPaging, SimPlatform, Simulator, Started, SyscallOutcome,
};
