use core::fmt;

use static_assertions::const_assert_eq;

pub const REG_ZERO: usize = 0;
pub const REG_RA: usize = 1;
pub const REG_SP: usize = 2;
pub const REG_A0: usize = 10;
pub const REG_A7: usize = 17;

const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// Register state saved on a trap and restored on return to the lower mode.
/// The trap entry code indexes fields by offset, so the layout is fixed.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub gpr: [u64; 32],
    pub status: u64,
    pub epc: u64,
    pub badvaddr: u64,
    pub cause: u64,
    pub insn: u64,
}

const_assert_eq!(core::mem::size_of::<TrapFrame>(), 37 * 8);

impl TrapFrame {
    pub const SIZE: usize = core::mem::size_of::<TrapFrame>();
    pub const STATUS_OFFSET: usize = 32 * 8;
    pub const EPC_OFFSET: usize = 33 * 8;

    pub const fn new() -> Self {
        Self {
            gpr: [0; 32],
            status: 0,
            epc: 0,
            badvaddr: 0,
            cause: 0,
            insn: 0,
        }
    }

    pub fn sp(&self) -> u64 {
        self.gpr[REG_SP]
    }

    /// Syscall number and arguments `a0..a5`.
    pub fn syscall_args(&self) -> (u64, [u64; 6]) {
        let mut args = [0u64; 6];
        args.copy_from_slice(&self.gpr[REG_A0..REG_A0 + 6]);
        (self.gpr[REG_A7], args)
    }
}

impl fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TrapFrame {{")?;
        writeln!(f, "  epc:    {:#018x}", self.epc)?;
        writeln!(f, "  status: {:#018x}", self.status)?;
        if self.cause != 0 || self.badvaddr != 0 {
            writeln!(f, "  cause:  {:#x} badvaddr: {:#x}", self.cause, self.badvaddr)?;
        }
        for (i, value) in self.gpr.iter().enumerate().filter(|(_, v)| **v != 0) {
            writeln!(f, "  {:<6}  {:#018x}", ABI_NAMES[i], value)?;
        }
        write!(f, "}}")
    }
}
