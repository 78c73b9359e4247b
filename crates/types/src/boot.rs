use core::fmt;

use crate::{round_down, PAGE_SIZE};

/// Baseline counter values captured just before the first user instruction.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerfCounters {
    pub time0: u64,
    pub cycle0: u64,
    pub instret0: u64,
    /// Hardware event counters 5 and 6; zero where the core lacks them.
    pub hpm0: [u64; 2],
    /// User system calls forwarded so far.
    pub syscall_cnt: u64,
}

impl PerfCounters {
    pub const fn new() -> Self {
        Self {
            time0: 0,
            cycle0: 0,
            instret0: 0,
            hpm0: [0; 2],
            syscall_cnt: 0,
        }
    }
}

/// Everything needed to place and start the one user program.
///
/// Created empty at boot, filled in by the loader and the stack builder,
/// read-only once control reaches the program (apart from `counters`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessImage {
    /// Size of one program header entry.
    pub phent: u64,
    /// Number of program header entries.
    pub phnum: u64,
    /// Entry point lies in the upper half, so the program runs in S-mode.
    pub is_supervisor: bool,
    /// User address of the program header table copy.
    pub phdr: u64,
    pub phdr_size: u64,
    /// Run-time minus link-time address, nonzero for `ET_DYN`.
    pub bias: u64,
    pub entry: u64,
    pub brk_min: u64,
    pub brk: u64,
    pub brk_max: u64,
    pub mmap_max: u64,
    pub stack_top: u64,
    pub counters: PerfCounters,
}

impl ProcessImage {
    pub const fn new() -> Self {
        Self {
            phent: 0,
            phnum: 0,
            is_supervisor: false,
            phdr: 0,
            phdr_size: 0,
            bias: 0,
            entry: 0,
            brk_min: 0,
            brk: 0,
            brk_max: 0,
            mmap_max: 0,
            stack_top: 0,
            counters: PerfCounters::new(),
        }
    }

    /// Installs the region bounds computed by translation setup.
    pub fn apply_layout(&mut self, layout: &UserLayout) {
        self.stack_top = layout.stack_top;
        self.mmap_max = layout.mmap_max;
        self.brk_max = layout.mmap_max;
    }

    /// Checks `brk_min <= brk <= brk_max <= mmap_max < stack_top`.
    pub fn check_layout(&self) -> Result<(), LayoutError> {
        if self.brk < self.brk_min {
            return Err(LayoutError::BreakBelowMin {
                brk: self.brk,
                brk_min: self.brk_min,
            });
        }
        if self.brk > self.brk_max {
            return Err(LayoutError::BreakAboveMax {
                brk: self.brk,
                brk_max: self.brk_max,
            });
        }
        if self.brk_max > self.mmap_max {
            return Err(LayoutError::BreakMaxAboveMmap {
                brk_max: self.brk_max,
                mmap_max: self.mmap_max,
            });
        }
        if self.mmap_max >= self.stack_top {
            return Err(LayoutError::MmapReachesStack {
                mmap_max: self.mmap_max,
                stack_top: self.stack_top,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutError {
    BreakBelowMin { brk: u64, brk_min: u64 },
    BreakAboveMax { brk: u64, brk_max: u64 },
    BreakMaxAboveMmap { brk_max: u64, mmap_max: u64 },
    MmapReachesStack { mmap_max: u64, stack_top: u64 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::BreakBelowMin { brk, brk_min } => {
                write!(f, "break {brk:#x} below its minimum {brk_min:#x}")
            }
            LayoutError::BreakAboveMax { brk, brk_max } => {
                write!(f, "break {brk:#x} above its maximum {brk_max:#x}")
            }
            LayoutError::BreakMaxAboveMmap { brk_max, mmap_max } => {
                write!(f, "break limit {brk_max:#x} above mmap limit {mmap_max:#x}")
            }
            LayoutError::MmapReachesStack {
                mmap_max,
                stack_top,
            } => write!(f, "mmap limit {mmap_max:#x} reaches stack top {stack_top:#x}"),
        }
    }
}

/// Largest user stack, in pages.
pub const MAX_STACK_PAGES: u64 = 2048;

/// Bounds of the user address space carved out of `[base, base + mem_size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserLayout {
    pub stack_top: u64,
    pub stack_size: u64,
    /// Highest address available to the heap and anonymous mappings; one
    /// guard page below the stack.
    pub mmap_max: u64,
}

impl UserLayout {
    /// Returns `None` when the region is too small to hold a stack, its guard
    /// page and at least one page of heap.
    pub fn for_region(base: u64, mem_size: u64) -> Option<Self> {
        let pages = mem_size / PAGE_SIZE;
        let stack_size = core::cmp::min(pages >> 5, MAX_STACK_PAGES) * PAGE_SIZE;
        if stack_size == 0 {
            return None;
        }
        let stack_top = round_down(base.checked_add(mem_size)?, PAGE_SIZE);
        let mmap_max = stack_top.checked_sub(stack_size + PAGE_SIZE)?;
        if mmap_max <= base {
            return None;
        }
        Some(Self {
            stack_top,
            stack_size,
            mmap_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ProcessImage {
        ProcessImage {
            brk_min: 0x2_0000,
            brk: 0x2_0000,
            brk_max: 0x10_0000,
            mmap_max: 0x10_0000,
            stack_top: 0x20_0000,
            ..ProcessImage::new()
        }
    }

    #[test]
    fn well_formed_layout_passes() {
        assert_eq!(image().check_layout(), Ok(()));
    }

    #[test]
    fn each_ordering_violation_is_reported() {
        let mut img = image();
        img.brk = 0x1_0000;
        assert!(matches!(img.check_layout(), Err(LayoutError::BreakBelowMin { .. })));

        let mut img = image();
        img.brk = 0x10_1000;
        assert!(matches!(img.check_layout(), Err(LayoutError::BreakAboveMax { .. })));

        let mut img = image();
        img.brk_max = 0x10_1000;
        img.brk = img.brk_max;
        assert!(matches!(img.check_layout(), Err(LayoutError::BreakMaxAboveMmap { .. })));

        let mut img = image();
        img.stack_top = img.mmap_max;
        assert!(matches!(img.check_layout(), Err(LayoutError::MmapReachesStack { .. })));
    }

    #[test]
    fn stack_is_a_thirtysecond_of_memory_capped_at_2048_pages() {
        let small = UserLayout::for_region(0, 16 << 20).unwrap();
        assert_eq!(small.stack_size, (16 << 20) / 32);
        assert_eq!(small.stack_top, 16 << 20);
        assert_eq!(small.mmap_max, small.stack_top - small.stack_size - PAGE_SIZE);

        let big = UserLayout::for_region(0x8000_0000, 2 << 30).unwrap();
        assert_eq!(big.stack_size, MAX_STACK_PAGES * PAGE_SIZE);
    }

    #[test]
    fn tiny_regions_have_no_layout() {
        assert_eq!(UserLayout::for_region(0, 16 * PAGE_SIZE), None);
        assert_eq!(UserLayout::for_region(0, 0), None);
    }
}
