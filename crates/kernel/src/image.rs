//! Process image construction: load the program, build its stack, and
//! produce the trap frame it starts from.

use log::debug;
use types::csr::Mstatus;
use types::{PAGE_SIZE, ProcessImage, TrapFrame};
use types::trapframe::REG_SP;

use crate::args::ProgramArgs;
use crate::config::Config;
use crate::context::KernelContext;
use crate::error::{ArgError, BootError, LoadError, StackError};
use crate::machine::{Csr, ElfLoader, Machine, Paging, PerfSource};
use crate::platform::Platform;
use crate::stack::{StackArena, build_stack};

pub fn build<P: Platform>(
    ctx: &mut KernelContext<P>,
    argv: ProgramArgs<'_>,
) -> Result<TrapFrame, BootError> {
    let program = argv.program().ok_or(ArgError::NoProgram)?;

    let mut phdrs = [0u8; Config::PHDR_SCRATCH_BYTES];
    ctx.loader
        .load_elf(program, &mut phdrs, &mut ctx.image, &mut ctx.paging)?;
    ctx.image.check_layout()?;
    debug!(
        "loaded {:?}: entry {:#x} bias {:#x} brk {:#x}",
        program, ctx.image.entry, ctx.image.bias, ctx.image.brk
    );

    let phdr_len = ctx.image.phdr_size as usize;
    if phdr_len > phdrs.len() {
        return Err(LoadError::PhdrsTooLarge {
            needed: phdr_len,
            capacity: phdrs.len(),
        }
        .into());
    }

    let bottom = ctx.image.mmap_max + PAGE_SIZE;
    let top = ctx.image.stack_top;
    let mem = ctx
        .paging
        .user_stack(bottom, top)
        .ok_or(StackError::Unmapped { bottom, top })?;
    let mut arena = StackArena::new(mem, bottom);
    let stack = build_stack(
        &mut arena,
        &mut ctx.image,
        &phdrs[..phdr_len],
        argv.iter(),
        Config::ENVP,
    )?;
    ctx.image.check_layout()?;
    debug!("user stack at {:#x}, argc {}", stack.sp, stack.argc);

    if ctx.options.report_cycles {
        snapshot_counters(&ctx.machine, &mut ctx.image);
    }
    Ok(init_tf(&ctx.machine, &ctx.image, stack.sp))
}

fn snapshot_counters<M: PerfSource>(clock: &M, image: &mut ProcessImage) {
    let counters = &mut image.counters;
    counters.hpm0 = [clock.hpm_counter(5), clock.hpm_counter(6)];
    counters.syscall_cnt = 0;
    counters.time0 = clock.time();
    counters.cycle0 = clock.cycles();
    counters.instret0 = clock.instret();
}

/// Zeroed registers apart from `sp`, with `sret` set up to drop into the
/// program's mode with interrupts enabled afterwards.
pub fn init_tf<M: Machine>(machine: &M, image: &ProcessImage, sp: u64) -> TrapFrame {
    let sstatus = Mstatus::from_bits_retain(machine.read_csr(Csr::Sstatus));
    let mut status = sstatus.difference(Mstatus::SPP | Mstatus::SIE) | Mstatus::SPIE;
    if image.is_supervisor {
        status |= Mstatus::SPP;
    }

    let mut tf = TrapFrame::new();
    tf.status = status.bits();
    tf.gpr[REG_SP] = sp;
    tf.epc = image.entry;
    tf
}
