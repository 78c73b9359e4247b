use core::arch::global_asm;

use kernel::{Global, KernelContext};
use types::TrapFrame;
use types::syscall::PANIC_EXIT_CODE;
use types::trapframe::REG_A0;

use crate::platform::RiscvPlatform;

const CAUSE_INTERRUPT: u64 = 1 << 63;
const CAUSE_USER_ECALL: u64 = 8;
const CAUSE_SUPERVISOR_ECALL: u64 = 9;

/// The context traps are served against, published by the handoff.
pub(crate) static TRAP_CONTEXT: Global<Option<&'static mut KernelContext<RiscvPlatform>>> =
    Global::new(None);

// Trap entry:
// - swap to the kernel stack kept in `sscratch`,
// - save every register and the trap CSRs as a `TrapFrame`,
// - call `handle_trap` with a pointer to it,
// - put the kernel stack back into `sscratch` and restore the frame.
//
// `pk_restore_user` restores a frame passed in a0 and executes `sret`; the
// first entry into the program uses it too.
global_asm!(
    ".section .text",
    ".align 2",
    ".globl pk_trap_entry",
    "pk_trap_entry:",
    "csrrw sp, sscratch, sp",
    "addi sp, sp, -{frame}",
    "sd x1, 1*8(sp)",
    "sd x3, 3*8(sp)",
    "sd x4, 4*8(sp)",
    "sd x5, 5*8(sp)",
    "sd x6, 6*8(sp)",
    "sd x7, 7*8(sp)",
    "sd x8, 8*8(sp)",
    "sd x9, 9*8(sp)",
    "sd x10, 10*8(sp)",
    "sd x11, 11*8(sp)",
    "sd x12, 12*8(sp)",
    "sd x13, 13*8(sp)",
    "sd x14, 14*8(sp)",
    "sd x15, 15*8(sp)",
    "sd x16, 16*8(sp)",
    "sd x17, 17*8(sp)",
    "sd x18, 18*8(sp)",
    "sd x19, 19*8(sp)",
    "sd x20, 20*8(sp)",
    "sd x21, 21*8(sp)",
    "sd x22, 22*8(sp)",
    "sd x23, 23*8(sp)",
    "sd x24, 24*8(sp)",
    "sd x25, 25*8(sp)",
    "sd x26, 26*8(sp)",
    "sd x27, 27*8(sp)",
    "sd x28, 28*8(sp)",
    "sd x29, 29*8(sp)",
    "sd x30, 30*8(sp)",
    "sd x31, 31*8(sp)",
    "csrr t0, sscratch",
    "sd t0, 2*8(sp)",
    "sd zero, 0(sp)",
    "csrr t0, sstatus",
    "sd t0, 32*8(sp)",
    "csrr t0, sepc",
    "sd t0, 33*8(sp)",
    "csrr t0, stval",
    "sd t0, 34*8(sp)",
    "csrr t0, scause",
    "sd t0, 35*8(sp)",
    "sd zero, 36*8(sp)",
    "mv a0, sp",
    "call {handler}",
    "addi t0, sp, {frame}",
    "csrw sscratch, t0",
    "mv a0, sp",
    "j pk_restore_user",
    "",
    ".globl pk_restore_user",
    "pk_restore_user:",
    "ld t0, 32*8(a0)",
    "csrw sstatus, t0",
    "ld t0, 33*8(a0)",
    "csrw sepc, t0",
    "mv t6, a0",
    "ld x1, 1*8(t6)",
    "ld x2, 2*8(t6)",
    "ld x3, 3*8(t6)",
    "ld x4, 4*8(t6)",
    "ld x5, 5*8(t6)",
    "ld x6, 6*8(t6)",
    "ld x7, 7*8(t6)",
    "ld x8, 8*8(t6)",
    "ld x9, 9*8(t6)",
    "ld x10, 10*8(t6)",
    "ld x11, 11*8(t6)",
    "ld x12, 12*8(t6)",
    "ld x13, 13*8(t6)",
    "ld x14, 14*8(t6)",
    "ld x15, 15*8(t6)",
    "ld x16, 16*8(t6)",
    "ld x17, 17*8(t6)",
    "ld x18, 18*8(t6)",
    "ld x19, 19*8(t6)",
    "ld x20, 20*8(t6)",
    "ld x21, 21*8(t6)",
    "ld x22, 22*8(t6)",
    "ld x23, 23*8(t6)",
    "ld x24, 24*8(t6)",
    "ld x25, 25*8(t6)",
    "ld x26, 26*8(t6)",
    "ld x27, 27*8(t6)",
    "ld x28, 28*8(t6)",
    "ld x29, 29*8(t6)",
    "ld x30, 30*8(t6)",
    "ld x31, 31*8(t6)",
    "sret",
    frame = const FRAME_BYTES,
    handler = sym handle_trap,
);

/// Stack space for one saved frame, kept 16-byte aligned.
const FRAME_BYTES: usize = TrapFrame::SIZE.next_multiple_of(16);

unsafe extern "C" {
    fn pk_trap_entry();
    fn pk_restore_user(frame: *const TrapFrame) -> !;
}

pub fn trap_vector() -> u64 {
    pk_trap_entry as usize as u64
}

/// Loads `frame` into the hart and returns to the mode its status selects.
pub fn restore(frame: &TrapFrame) -> ! {
    // SAFETY: the frame is fully initialized and the trap vector and
    // `sscratch` are in place.
    unsafe { pk_restore_user(frame) }
}

extern "C" fn handle_trap(tf: &mut TrapFrame) {
    // SAFETY: traps are taken one at a time on the single hart.
    let Some(ctx) = (unsafe { TRAP_CONTEXT.get_mut() }).as_deref_mut() else {
        loop {
            core::hint::spin_loop();
        }
    };

    match tf.cause {
        CAUSE_USER_ECALL | CAUSE_SUPERVISOR_ECALL => {
            let (n, args) = tf.syscall_args();
            tf.gpr[REG_A0] = ctx.syscall(n, args) as u64;
            tf.epc += 4;
        }
        cause => {
            let kind = if cause & CAUSE_INTERRUPT != 0 {
                "interrupt"
            } else {
                "exception"
            };
            kernel::printk!(
                ctx.frontend,
                "unhandled {} {:#x} at pc {:#x}, tval {:#x}\n{:?}\n",
                kind,
                cause & !CAUSE_INTERRUPT,
                tf.epc,
                tf.badvaddr,
                tf
            );
            ctx.frontend.shutdown(PANIC_EXIT_CODE)
        }
    }
}
