use core::arch::asm;

use kernel::{Csr, Machine, PerfSource};

use crate::build_setting;

/// Physical address of the first byte of main memory.
pub const DRAM_BASE: u64 = 0x8000_0000;

/// Bytes of main memory, from `PK_MEM_SIZE` (MiB) at build time.
pub const MEM_SIZE: u64 = build_setting(option_env!("PK_MEM_SIZE"), 128) << 20;

/// Harts that run the boot path, from `PK_NUM_HARTS` at build time.
pub const NUM_HARTS: u64 = build_setting(option_env!("PK_NUM_HARTS"), 1);

macro_rules! read_csr {
    ($name:literal) => {{
        let value: u64;
        // SAFETY: reading a control register has no side effects.
        unsafe { ::core::arch::asm!(concat!("csrr {0}, ", $name), out(reg) value, options(nomem, nostack)) };
        value
    }};
}

macro_rules! write_csr {
    ($name:literal, $value:expr) => {{
        let value: u64 = $value;
        // SAFETY: callers only write registers the boot sequence owns.
        unsafe { ::core::arch::asm!(concat!("csrw ", $name, ", {0}"), in(reg) value, options(nostack)) };
    }};
}

pub(crate) use {read_csr, write_csr};

/// The unprivileged counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct HartCounters;

impl PerfSource for HartCounters {
    fn cycles(&self) -> u64 {
        read_csr!("cycle")
    }

    fn instret(&self) -> u64 {
        read_csr!("instret")
    }

    fn time(&self) -> u64 {
        read_csr!("time")
    }

    fn hpm_counter(&self, index: usize) -> u64 {
        match index {
            5 => read_csr!("hpmcounter5"),
            6 => read_csr!("hpmcounter6"),
            _ => 0,
        }
    }
}

/// The hart the kernel is running on.
#[derive(Clone, Copy, Debug, Default)]
pub struct RiscvMachine;

impl PerfSource for RiscvMachine {
    fn cycles(&self) -> u64 {
        HartCounters.cycles()
    }

    fn instret(&self) -> u64 {
        HartCounters.instret()
    }

    fn time(&self) -> u64 {
        HartCounters.time()
    }

    fn hpm_counter(&self, index: usize) -> u64 {
        HartCounters.hpm_counter(index)
    }
}

impl Machine for RiscvMachine {
    fn supports_extension(&self, ext: char) -> bool {
        let upper = ext.to_ascii_uppercase();
        if !upper.is_ascii_uppercase() {
            return false;
        }
        read_csr!("misa") & (1 << (upper as u8 - b'A')) != 0
    }

    fn read_csr(&self, csr: Csr) -> u64 {
        match csr {
            Csr::Mstatus => read_csr!("mstatus"),
            Csr::Mcounteren => read_csr!("mcounteren"),
            Csr::Mhpmevent5 => read_csr!("mhpmevent5"),
            Csr::Mhpmevent6 => read_csr!("mhpmevent6"),
            Csr::Satp => read_csr!("satp"),
            Csr::Sstatus => read_csr!("sstatus"),
            Csr::Stvec => read_csr!("stvec"),
            Csr::Sscratch => read_csr!("sscratch"),
            Csr::Sie => read_csr!("sie"),
            Csr::Scause => read_csr!("scause"),
            Csr::Scounteren => read_csr!("scounteren"),
        }
    }

    fn write_csr(&self, csr: Csr, value: u64) {
        match csr {
            Csr::Mstatus => write_csr!("mstatus", value),
            Csr::Mcounteren => write_csr!("mcounteren", value),
            Csr::Mhpmevent5 => write_csr!("mhpmevent5", value),
            Csr::Mhpmevent6 => write_csr!("mhpmevent6", value),
            Csr::Satp => write_csr!("satp", value),
            Csr::Sstatus => write_csr!("sstatus", value),
            Csr::Stvec => write_csr!("stvec", value),
            Csr::Sscratch => write_csr!("sscratch", value),
            Csr::Sie => write_csr!("sie", value),
            Csr::Scause => write_csr!("scause", value),
            Csr::Scounteren => write_csr!("scounteren", value),
        }
    }

    fn memory_size(&self) -> u64 {
        MEM_SIZE
    }

    fn hart_count(&self) -> u32 {
        NUM_HARTS as u32
    }

    fn has_hpm_events(&self) -> bool {
        true
    }

    fn zero_fp_registers(&self) {
        zero_fp();
    }

    fn fence_i(&self) {
        // SAFETY: an instruction fence only orders fetches.
        unsafe { asm!("fence.i", options(nostack)) };
    }

    fn wait_for_interrupt(&self) {
        // SAFETY: `wfi` may return spuriously; callers loop.
        unsafe { asm!("wfi", options(nomem, nostack)) };
    }

    fn trap_vector(&self) -> u64 {
        crate::trap::trap_vector()
    }
}

#[cfg(target_feature = "d")]
fn zero_fp() {
    // SAFETY: FS was enabled by the boot sequence before this runs.
    unsafe {
        asm!(
            "fmv.d.x f0, zero", "fmv.d.x f1, zero", "fmv.d.x f2, zero", "fmv.d.x f3, zero",
            "fmv.d.x f4, zero", "fmv.d.x f5, zero", "fmv.d.x f6, zero", "fmv.d.x f7, zero",
            "fmv.d.x f8, zero", "fmv.d.x f9, zero", "fmv.d.x f10, zero", "fmv.d.x f11, zero",
            "fmv.d.x f12, zero", "fmv.d.x f13, zero", "fmv.d.x f14, zero", "fmv.d.x f15, zero",
            "fmv.d.x f16, zero", "fmv.d.x f17, zero", "fmv.d.x f18, zero", "fmv.d.x f19, zero",
            "fmv.d.x f20, zero", "fmv.d.x f21, zero", "fmv.d.x f22, zero", "fmv.d.x f23, zero",
            "fmv.d.x f24, zero", "fmv.d.x f25, zero", "fmv.d.x f26, zero", "fmv.d.x f27, zero",
            "fmv.d.x f28, zero", "fmv.d.x f29, zero", "fmv.d.x f30, zero", "fmv.d.x f31, zero",
            "fscsr zero",
            options(nomem, nostack)
        );
    }
}

#[cfg(not(target_feature = "d"))]
fn zero_fp() {}
