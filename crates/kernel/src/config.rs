use core::ffi::CStr;

/// Build-time limits.
pub struct Config;

impl Config {
    /// Capacity of the buffer the host packs the command line into.
    pub const ARG_BUF_BYTES: usize = 2048;
    /// Most arguments the kernel will forward to the program.
    pub const MAX_ARGS: usize = Self::ARG_BUF_BYTES / 8 - 3;
    /// Scratch area the loader copies the program header table into.
    pub const PHDR_SCRATCH_BYTES: usize = 1024;
    /// Environment strings handed to the program. Deliberately empty.
    pub const ENVP: &'static [&'static CStr] = &[];
    /// Longest path accepted from the program, NUL included.
    pub const MAX_PATH: usize = 256;
}

/// Switches set by kernel command-line flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelOptions {
    /// `-s`: print cycle counts when the program exits.
    pub report_cycles: bool,
    /// Cleared by `-p`.
    pub demand_paging: bool,
}

impl KernelOptions {
    pub const fn new() -> Self {
        Self {
            report_cycles: false,
            demand_paging: true,
        }
    }
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self::new()
    }
}
