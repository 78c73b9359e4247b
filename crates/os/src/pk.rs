#![cfg_attr(target_arch = "riscv64", no_std, no_main)]
//! Proxy kernel image: boots one user program handed over by the host.

#[cfg(target_arch = "riscv64")]
mod guest {
    use core::arch::global_asm;
    use core::panic::PanicInfo;

    use os::allocator::BumpAllocator;
    use os::platform::FRONTEND;
    use types::syscall::PANIC_EXIT_CODE;

    #[global_allocator]
    static ALLOC: BumpAllocator = BumpAllocator::new();

    const MAX_HARTS: usize = 8;
    const BOOT_STACK_BYTES: usize = 16 << 10;

    #[repr(C, align(16))]
    struct BootStacks([[u8; BOOT_STACK_BYTES]; MAX_HARTS]);

    static mut BOOT_STACKS: BootStacks = BootStacks([[0; BOOT_STACK_BYTES]; MAX_HARTS]);

    // Every hart starts here in machine mode. Harts beyond the stack table
    // sleep forever; hart 0 boots, the rest park.
    global_asm!(
        ".section .text.init, \"ax\"",
        ".globl _start",
        "_start:",
        "csrr a0, mhartid",
        "li t0, {max_harts}",
        "bgeu a0, t0, 2f",
        "la sp, {stacks}",
        "li t1, {stack_bytes}",
        "addi t2, a0, 1",
        "mul t1, t1, t2",
        "add sp, sp, t1",
        "bnez a0, 1f",
        "tail {primary}",
        "1:",
        "tail {secondary}",
        "2:",
        "wfi",
        "j 2b",
        max_harts = const MAX_HARTS,
        stack_bytes = const BOOT_STACK_BYTES,
        stacks = sym BOOT_STACKS,
        primary = sym os::boot_primary,
        secondary = sym os::boot_secondary,
    );

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        kernel::printk!(&FRONTEND, "kernel panic: {}\n", info.message());
        FRONTEND.shutdown(PANIC_EXIT_CODE)
    }
}

#[cfg(not(target_arch = "riscv64"))]
fn main() {
    eprintln!("pk only runs on riscv64; use pk-run to boot programs on this host");
    std::process::exit(1);
}
