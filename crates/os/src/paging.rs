//! Identity-mapped user memory.
//!
//! Translation stays off (`satp` is left bare), so user addresses are
//! physical addresses and programs must be linked into the free part of
//! main memory above the kernel image.

use core::ptr;

use kernel::Paging;
use log::{debug, warn};
use types::boot::UserLayout;
use types::{PAGE_SIZE, Protection, round_up};

use crate::csr::DRAM_BASE;

const KERNEL_STACK_BYTES: usize = 16 << 10;

#[repr(C, align(16))]
struct KernelStack([u8; KERNEL_STACK_BYTES]);

static mut KERNEL_STACK: KernelStack = KernelStack([0; KERNEL_STACK_BYTES]);

unsafe extern "C" {
    /// End of the kernel image, from the linker script.
    static _end: u8;
}

pub struct BarePaging {
    base: u64,
    end: u64,
    demand_paging: bool,
}

impl BarePaging {
    pub fn new() -> Self {
        // SAFETY: only the symbol's address is taken.
        let end = unsafe { ptr::addr_of!(_end) } as u64;
        let base = round_up(end, PAGE_SIZE);
        Self {
            base,
            end: base,
            demand_paging: true,
        }
    }

    fn contains(&self, va: u64, len: u64) -> bool {
        va >= self.base && va.checked_add(len).is_some_and(|end| end <= self.end)
    }
}

impl Default for BarePaging {
    fn default() -> Self {
        Self::new()
    }
}

impl Paging for BarePaging {
    fn user_region(&self, mem_size: u64) -> (u64, u64) {
        let top = DRAM_BASE.saturating_add(mem_size);
        (self.base, top.saturating_sub(self.base))
    }

    fn vm_init(&mut self, layout: &UserLayout, translate: bool) -> Option<u64> {
        if translate {
            debug!("translation available, user memory stays identity mapped");
        }
        self.end = layout.stack_top;
        // SAFETY: only the address is taken.
        let stack = unsafe { ptr::addr_of!(KERNEL_STACK) } as u64;
        Some(stack + KERNEL_STACK_BYTES as u64)
    }

    fn set_demand_paging(&mut self, enabled: bool) {
        if !enabled && self.demand_paging {
            debug!("demand paging off; memory is populated eagerly anyway");
        }
        self.demand_paging = enabled;
    }

    fn map_user(&mut self, va: u64, len: u64, _prot: Protection) -> bool {
        let ok = self.contains(va, len);
        if !ok {
            warn!("user mapping [{va:#x}, {:#x}) outside memory", va.wrapping_add(len));
        }
        ok
    }

    fn copy_to_user(&mut self, va: u64, data: &[u8]) -> bool {
        if !self.contains(va, data.len() as u64) {
            return false;
        }
        // SAFETY: the range lies in free memory owned by the user program.
        unsafe { ptr::copy_nonoverlapping(data.as_ptr(), va as *mut u8, data.len()) };
        true
    }

    fn copy_from_user(&self, va: u64, out: &mut [u8]) -> bool {
        if !self.contains(va, out.len() as u64) {
            return false;
        }
        // SAFETY: as above.
        unsafe { ptr::copy_nonoverlapping(va as *const u8, out.as_mut_ptr(), out.len()) };
        true
    }

    fn va2pa(&self, va: u64, len: u64) -> Option<u64> {
        self.contains(va, len).then_some(va)
    }

    fn user_stack(&mut self, bottom: u64, top: u64) -> Option<&mut [u8]> {
        let len = top.checked_sub(bottom)?;
        if !self.contains(bottom, len) {
            return None;
        }
        // SAFETY: the stack region is user memory nothing else refers to
        // while the image is built.
        Some(unsafe { core::slice::from_raw_parts_mut(bottom as *mut u8, len as usize) })
    }
}
