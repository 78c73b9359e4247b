fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    // Bare-metal kernel images only; host builds link normally.
    if arch == "riscv64" && os == "none" {
        println!("cargo:rustc-link-arg-bins=-T{manifest_dir}/link.ld");
    }

    println!("cargo:rerun-if-changed=link.ld");
    println!("cargo:rerun-if-env-changed=PK_MEM_SIZE");
    println!("cargo:rerun-if-env-changed=PK_NUM_HARTS");
}
