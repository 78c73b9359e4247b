use types::TrapFrame;

use crate::context::KernelContext;
use crate::frontend::HostTransport;
use crate::machine::{ElfLoader, FloatAbi, Machine, Paging, PerfSource};

/// A board: the collaborators the kernel runs on and the two control
/// transfers that leave the current privilege level for good.
pub trait Platform: Sized + 'static {
    type Machine: Machine;
    type Clock: PerfSource;
    type Transport: HostTransport;
    type Paging: Paging;
    type Loader: ElfLoader;

    const FLOAT_ABI: FloatAbi;

    /// Drops from machine to supervisor mode on `stack_top` and runs `next`.
    fn enter_supervisor_mode(next: Continuation<Self>, stack_top: u64) -> !;

    /// Restores `frame` and returns into the program.
    fn start_user(ctx: &'static mut KernelContext<Self>, frame: TrapFrame) -> !;
}

/// Where execution resumes after a privilege change, and with what.
pub struct Continuation<P: Platform> {
    entry: fn(&'static mut KernelContext<P>) -> !,
    ctx: &'static mut KernelContext<P>,
}

impl<P: Platform> Continuation<P> {
    pub fn new(entry: fn(&'static mut KernelContext<P>) -> !, ctx: &'static mut KernelContext<P>) -> Self {
        Self { entry, ctx }
    }

    pub fn context(&mut self) -> &mut KernelContext<P> {
        self.ctx
    }

    pub fn resume(self) -> ! {
        (self.entry)(self.ctx)
    }
}
