use log::debug;
use types::TrapFrame;

use crate::context::KernelContext;
use crate::machine::{Csr, Machine};
use crate::platform::Platform;

/// Commits the boot state and starts the program.
///
/// The kernel stack top goes into `sscratch` so the trap entry can find a
/// stack, and instruction fetch is synchronized with the freshly written
/// program memory.
pub fn enter<P: Platform>(ctx: &'static mut KernelContext<P>, frame: TrapFrame) -> ! {
    ctx.machine.write_csr(Csr::Sscratch, ctx.kstack_top);
    ctx.machine.fence_i();
    debug!("starting program at {:#x}, sp {:#x}", frame.epc, frame.sp());
    P::start_user(ctx, frame)
}
