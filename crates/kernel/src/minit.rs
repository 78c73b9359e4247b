//! Boot sequence.
//!
//! Machine mode: capability check, status register, memory and hart
//! validation, FPU, translation, counters. Then one descent into supervisor
//! mode, where the command line is fetched, the program is loaded and
//! control passes to it. Each step runs once, in this order.

use log::{debug, info, warn};
use types::boot::UserLayout;
use types::csr::{
    COUNTERS_ALL, HPM_EVENT5, HPM_EVENT6, Mstatus, Privilege, VM_CHOICE, satp_mode,
    satp_with_mode,
};
use types::TrapFrame;

use crate::args::{self, ArgBuffer, Command};
use crate::context::KernelContext;
use crate::error::BootError;
use crate::frontend::{Frontend, HostTransport};
use crate::handoff;
use crate::image;
use crate::machine::{Csr, FloatAbi, Machine, Paging, PerfSource};
use crate::platform::{Continuation, Platform};

/// Boots the primary hart. Never returns: control ends up in the program or
/// the session is shut down.
pub fn boot<P: Platform>(ctx: &'static mut KernelContext<P>) -> ! {
    if let Err(err) = machine_init(ctx) {
        fatal(ctx.frontend, err);
    }
    enable_counters(&ctx.machine);

    let stack_top = ctx.kstack_top;
    debug!("entering supervisor mode, kernel stack {stack_top:#x}");
    P::enter_supervisor_mode(Continuation::new(rest_of_boot::<P>, ctx), stack_top)
}

/// Parks a hart that is not the boot hart. It holds no boot state.
pub fn boot_other_hart<M: Machine>(machine: &M) -> ! {
    loop {
        machine.wait_for_interrupt();
    }
}

/// Reports `err` and ends the session.
pub fn fatal<T: HostTransport, C: PerfSource>(frontend: &Frontend<T, C>, err: BootError) -> ! {
    printk!(frontend, "{}\n", err);
    if err.suggests_help() {
        args::suggest_help(frontend);
    }
    frontend.shutdown(err.exit_code())
}

fn machine_init<P: Platform>(ctx: &mut KernelContext<P>) -> Result<(), BootError> {
    check_capabilities(&ctx.machine)?;
    ctx.have_vm = mstatus_init(&ctx.machine);
    ctx.mem_size = memory_init(&ctx.machine)?;
    hart_init(&ctx.machine)?;
    fp_init(&ctx.machine, P::FLOAT_ABI)?;
    ctx.kstack_top = vm_init(ctx)?;
    Ok(())
}

fn check_capabilities<M: Machine>(machine: &M) -> Result<(), BootError> {
    if !machine.supports_extension('S') {
        return Err(BootError::NoSupervisor);
    }
    Ok(())
}

/// Sets up `mret` to land in supervisor mode with user mode below it and
/// FP/extension state enabled, then probes the translation mode. Returns
/// whether the mode was accepted.
fn mstatus_init<M: Machine>(machine: &M) -> bool {
    // SPP stays clear: the eventual `sret` goes to user mode.
    let mut ms = Mstatus::empty().with_mpp(Privilege::Supervisor) | Mstatus::FS | Mstatus::XS;
    if machine.supports_extension('V') {
        ms |= Mstatus::VS;
    }
    machine.write_csr(Csr::Mstatus, ms.bits());

    machine.write_csr(Csr::Satp, satp_with_mode(VM_CHOICE));
    let granted = satp_mode(machine.read_csr(Csr::Satp)) == VM_CHOICE;
    machine.write_csr(Csr::Satp, 0);
    if !granted {
        warn!("translation mode {VM_CHOICE} not supported, running with physical addresses");
    }
    granted
}

fn memory_init<M: Machine>(machine: &M) -> Result<u64, BootError> {
    match machine.memory_size() {
        0 => Err(BootError::NoMemory),
        size => Ok(size),
    }
}

fn hart_init<M: Machine>(machine: &M) -> Result<(), BootError> {
    match machine.hart_count() {
        0 => Err(BootError::UnknownHartCount),
        1 => Ok(()),
        n => Err(BootError::MultipleHarts(n)),
    }
}

fn fp_init<M: Machine>(machine: &M, abi: FloatAbi) -> Result<(), BootError> {
    let has_fpu = machine.supports_extension('D');
    match abi {
        FloatAbi::Hard => {
            let fs_on = Mstatus::from_bits_retain(machine.read_csr(Csr::Mstatus))
                .intersects(Mstatus::FS);
            if !has_fpu || !fs_on {
                return Err(BootError::FpuMissing);
            }
            machine.zero_fp_registers();
        }
        FloatAbi::Soft if has_fpu => return Err(BootError::FpuUnexpected),
        FloatAbi::Soft => {}
    }
    Ok(())
}

fn vm_init<P: Platform>(ctx: &mut KernelContext<P>) -> Result<u64, BootError> {
    let (base, len) = ctx.paging.user_region(ctx.mem_size);
    let layout = UserLayout::for_region(base, len).ok_or(BootError::UserRegionTooSmall {
        mem_size: ctx.mem_size,
    })?;
    ctx.image.apply_layout(&layout);
    info!(
        "memory {:#x} bytes, user stack top {:#x}, mmap limit {:#x}",
        ctx.mem_size, layout.stack_top, layout.mmap_max
    );
    ctx.paging
        .vm_init(&layout, ctx.have_vm)
        .ok_or(BootError::VmInit)
}

/// Grants the lower modes every counter and selects the events counted by
/// counters 5 and 6. Machine-mode only.
fn enable_counters<M: Machine>(machine: &M) {
    machine.write_csr(Csr::Mcounteren, COUNTERS_ALL);
    if machine.has_hpm_events() {
        machine.write_csr(Csr::Mhpmevent5, HPM_EVENT5);
        machine.write_csr(Csr::Mhpmevent6, HPM_EVENT6);
    }
}

/// Supervisor-side setup: trap entry, cleared trap state, user memory and
/// FP/vector access, interrupts off.
fn supervisor_init<M: Machine>(machine: &M) {
    machine.write_csr(Csr::Scounteren, COUNTERS_ALL);
    machine.write_csr(Csr::Stvec, machine.trap_vector());
    machine.write_csr(Csr::Sscratch, 0);
    machine.write_csr(Csr::Scause, 0);
    machine.write_csr(Csr::Sie, 0);
    machine.clear_csr(Csr::Sstatus, Mstatus::SIE.bits());
    let mut on = Mstatus::SUM | Mstatus::FS;
    if machine.supports_extension('V') {
        on |= Mstatus::VS;
    }
    machine.set_csr(Csr::Sstatus, on.bits());
}

fn rest_of_boot<P: Platform>(ctx: &'static mut KernelContext<P>) -> ! {
    supervisor_init(&ctx.machine);

    let mut args = ArgBuffer::new();
    let frame = match load_program(ctx, &mut args) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            args::print_usage(ctx.frontend);
            ctx.frontend.shutdown(0)
        }
        Err(err) => fatal(ctx.frontend, err),
    };
    handoff::enter(ctx, frame)
}

/// `Ok(None)` when only help was asked for.
fn load_program<P: Platform>(
    ctx: &mut KernelContext<P>,
    args: &mut ArgBuffer,
) -> Result<Option<TrapFrame>, BootError> {
    args.fetch(ctx.frontend)?;
    let (options, argv) = match args::parse(args)? {
        Command::Help => return Ok(None),
        Command::Run { options, argv } => (options, argv),
    };
    ctx.options = options;
    ctx.paging.set_demand_paging(options.demand_paging);
    image::build(ctx, argv).map(Some)
}
