//! Collaborator seams: control registers, counters, translation and the ELF
//! reader. Implementations live with the platform glue.

use core::ffi::CStr;

use types::boot::UserLayout;
use types::{ProcessImage, Protection};

/// Control registers the kernel touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Csr {
    Mstatus,
    Mcounteren,
    Mhpmevent5,
    Mhpmevent6,
    Satp,
    Sstatus,
    Stvec,
    Sscratch,
    Sie,
    Scause,
    Scounteren,
}

/// Free-running counters.
pub trait PerfSource {
    fn cycles(&self) -> u64;
    fn instret(&self) -> u64;
    fn time(&self) -> u64;

    /// Hardware event counter `index`; zero where the core has none.
    fn hpm_counter(&self, _index: usize) -> u64 {
        0
    }
}

/// One hart's control state, as seen from machine and supervisor mode.
pub trait Machine: PerfSource {
    /// Whether the ISA string includes the single-letter extension `ext`.
    fn supports_extension(&self, ext: char) -> bool;

    fn read_csr(&self, csr: Csr) -> u64;
    fn write_csr(&self, csr: Csr, value: u64);

    fn set_csr(&self, csr: Csr, bits: u64) {
        self.write_csr(csr, self.read_csr(csr) | bits);
    }

    fn clear_csr(&self, csr: Csr, bits: u64) {
        self.write_csr(csr, self.read_csr(csr) & !bits);
    }

    /// Bytes of main memory, zero when unknown.
    fn memory_size(&self) -> u64;

    /// Harts that reached the boot path, zero when unknown.
    fn hart_count(&self) -> u32;

    /// Whether `mhpmevent5`/`mhpmevent6` exist.
    fn has_hpm_events(&self) -> bool {
        false
    }

    fn zero_fp_registers(&self);

    /// Makes freshly written program memory visible to instruction fetch.
    fn fence_i(&self);

    fn wait_for_interrupt(&self);

    /// Address of the supervisor trap entry.
    fn trap_vector(&self) -> u64;
}

/// Floating-point ABI the kernel was compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatAbi {
    Hard,
    Soft,
}

/// Address translation and access to user memory.
///
/// Addresses returned by [`Paging::va2pa`] are what the host receives in a
/// host call.
pub trait Paging {
    /// Range `(base, len)` of memory available to the user program.
    fn user_region(&self, mem_size: u64) -> (u64, u64);

    /// Establishes the initial mapping for `layout`. `translate` is false when
    /// the core refused the translation mode. Returns the kernel stack top.
    fn vm_init(&mut self, layout: &UserLayout, translate: bool) -> Option<u64>;

    fn set_demand_paging(&mut self, enabled: bool);

    /// Backs `[va, va + len)` with memory.
    fn map_user(&mut self, va: u64, len: u64, prot: Protection) -> bool;

    fn copy_to_user(&mut self, va: u64, data: &[u8]) -> bool;

    fn copy_from_user(&self, va: u64, out: &mut [u8]) -> bool;

    /// Translates `[va, va + len)`, which must be mapped and contiguous.
    fn va2pa(&self, va: u64, len: u64) -> Option<u64>;

    /// Writable view of the user stack region `[bottom, top)`.
    fn user_stack(&mut self, bottom: u64, top: u64) -> Option<&mut [u8]>;
}

/// Materializes a program image into user memory.
pub trait ElfLoader {
    /// Loads `path`, writing its program header table into `phdrs` and the
    /// entry point, header geometry, bias and break bounds into `image`.
    fn load_elf<V: Paging>(
        &mut self,
        path: &CStr,
        phdrs: &mut [u8],
        image: &mut ProcessImage,
        memory: &mut V,
    ) -> Result<(), crate::LoadError>;
}
