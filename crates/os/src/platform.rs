use core::arch::asm;

use kernel::console::{self, Logger};
use kernel::{Continuation, FloatAbi, Frontend, Global, KernelContext, Platform};
use loader::{ElfSegmentLoader, HostImageSource};
use log::LevelFilter;
use types::TrapFrame;

use crate::csr::{HartCounters, RiscvMachine, write_csr};
use crate::htif::Htif;
use crate::paging::BarePaging;
use crate::trap::{self, TRAP_CONTEXT};

/// Exceptions handed to supervisor mode: misaligned fetch, breakpoint, user
/// `ecall`, and the three page faults.
const MEDELEG: u64 = (1 << 0) | (1 << 3) | (1 << 8) | (1 << 12) | (1 << 13) | (1 << 15);
/// Supervisor software, timer and external interrupts.
const MIDELEG: u64 = (1 << 1) | (1 << 5) | (1 << 9);
/// PMP entry 0: NAPOT over the whole address space, read/write/execute.
const PMPCFG_ALL: u64 = 0x1f;
const PMPADDR_ALL: u64 = u64::MAX >> 10;

pub static FRONTEND: Frontend<Htif, HartCounters> = Frontend::new(Htif, HartCounters);
static LOGGER: Logger<Htif, HartCounters> = Logger::new(&FRONTEND);

static KERNEL: Global<Option<KernelContext<RiscvPlatform>>> = Global::new(None);
static RESUME: Global<Option<Continuation<RiscvPlatform>>> = Global::new(None);

pub struct RiscvPlatform;

impl Platform for RiscvPlatform {
    type Machine = RiscvMachine;
    type Clock = HartCounters;
    type Transport = Htif;
    type Paging = BarePaging;
    type Loader = ElfSegmentLoader<HostImageSource<Htif, HartCounters>>;

    const FLOAT_ABI: FloatAbi = if cfg!(target_feature = "d") {
        FloatAbi::Hard
    } else {
        FloatAbi::Soft
    };

    fn enter_supervisor_mode(next: Continuation<Self>, stack_top: u64) -> ! {
        // SAFETY: single hart, and the continuation is taken exactly once on
        // the other side of `mret`.
        unsafe { *RESUME.get_mut() = Some(next) };
        write_csr!("medeleg", MEDELEG);
        write_csr!("mideleg", MIDELEG);
        write_csr!("pmpaddr0", PMPADDR_ALL);
        write_csr!("pmpcfg0", PMPCFG_ALL);
        write_csr!("mepc", supervisor_entry as usize as u64);
        // SAFETY: mstatus.MPP selects supervisor mode; the new stack is the
        // kernel stack returned by translation setup.
        unsafe { asm!("mv sp, {0}", "mret", in(reg) stack_top, options(noreturn)) }
    }

    fn start_user(ctx: &'static mut KernelContext<Self>, frame: TrapFrame) -> ! {
        // SAFETY: the boot path is done with the context; from here on only
        // the trap handler uses it.
        unsafe { *TRAP_CONTEXT.get_mut() = Some(ctx) };
        trap::restore(&frame)
    }
}

extern "C" fn supervisor_entry() -> ! {
    // SAFETY: written once before `mret`, read once here.
    match unsafe { RESUME.take() } {
        Some(next) => next.resume(),
        None => loop {
            core::hint::spin_loop();
        },
    }
}

/// Boot path of hart 0, entered from `_start` on its boot stack.
pub extern "C" fn boot_primary() -> ! {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let _ = console::init(&LOGGER, level);

    let ctx = KernelContext::new(
        RiscvMachine,
        &FRONTEND,
        BarePaging::new(),
        ElfSegmentLoader::new(HostImageSource::new(&FRONTEND)),
    );
    // SAFETY: runs once, before anything else reads `KERNEL`.
    let ctx = unsafe { KERNEL.get_mut() }.insert(ctx);
    kernel::boot(ctx)
}

/// Boot path of every other hart.
pub extern "C" fn boot_secondary() -> ! {
    kernel::boot_other_hart(&RiscvMachine)
}
