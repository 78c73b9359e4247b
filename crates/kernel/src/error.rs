use core::fmt;

use arrayvec::ArrayString;
use types::boot::LayoutError;
use types::syscall::PANIC_EXIT_CODE;

/// Longest option text kept for the error message.
pub const OPTION_TEXT_CAP: usize = 32;

/// Anything that stops the kernel before the program runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootError {
    NoSupervisor,
    NoMemory,
    UnknownHartCount,
    MultipleHarts(u32),
    FpuMissing,
    FpuUnexpected,
    UserRegionTooSmall { mem_size: u64 },
    VmInit,
    Args(ArgError),
    Load(LoadError),
    Stack(StackError),
    Layout(LayoutError),
}

impl BootError {
    /// Status handed to the host when the boot is abandoned.
    pub fn exit_code(&self) -> i64 {
        match self {
            BootError::Args(ArgError::UnrecognizedOption(_)) => 1,
            _ => PANIC_EXIT_CODE,
        }
    }

    /// Option errors are followed by a pointer to `--help`.
    pub fn suggests_help(&self) -> bool {
        matches!(self, BootError::Args(ArgError::UnrecognizedOption(_)))
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::NoSupervisor => write!(f, "supervisor support is required"),
            BootError::NoMemory => write!(f, "could not determine memory capacity"),
            BootError::UnknownHartCount => write!(f, "could not determine number of harts"),
            BootError::MultipleHarts(n) => {
                write!(f, "only one hart is supported, {n} are active")
            }
            BootError::FpuMissing => write!(f, "FPU not found; recompile pk with -msoft-float"),
            BootError::FpuUnexpected => {
                write!(f, "FPU unexpectedly found; recompile pk without -msoft-float")
            }
            BootError::UserRegionTooSmall { mem_size } => {
                write!(f, "{mem_size:#x} bytes of memory is too little for a user program")
            }
            BootError::VmInit => write!(f, "could not set up address translation"),
            BootError::Args(e) => e.fmt(f),
            BootError::Load(e) => e.fmt(f),
            BootError::Stack(e) => e.fmt(f),
            BootError::Layout(e) => write!(f, "bad process layout: {e}"),
        }
    }
}

impl From<ArgError> for BootError {
    fn from(e: ArgError) -> Self {
        BootError::Args(e)
    }
}

impl From<LoadError> for BootError {
    fn from(e: LoadError) -> Self {
        BootError::Load(e)
    }
}

impl From<StackError> for BootError {
    fn from(e: StackError) -> Self {
        BootError::Stack(e)
    }
}

impl From<LayoutError> for BootError {
    fn from(e: LayoutError) -> Self {
        BootError::Layout(e)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgError {
    /// The host could not fit the command line into the argument buffer.
    TooLarge { limit: usize },
    /// The host reply does not describe a valid argument list.
    Malformed,
    UnrecognizedOption(ArrayString<OPTION_TEXT_CAP>),
    NoProgram,
}

impl ArgError {
    pub fn unrecognized(option: &str) -> Self {
        let mut text = ArrayString::new();
        for ch in option.chars() {
            if text.try_push(ch).is_err() {
                break;
            }
        }
        ArgError::UnrecognizedOption(text)
    }
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::TooLarge { limit } => write!(f, "args must not exceed {limit} bytes"),
            ArgError::Malformed => write!(f, "malformed argument buffer from host"),
            ArgError::UnrecognizedOption(opt) => write!(f, "unrecognized option: `{opt}'"),
            ArgError::NoProgram => write!(f, "tell me what ELF to load!"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackError {
    /// A push would cross below the low-water mark.
    Overflow { needed: u64, available: u64 },
    /// An address outside the arena was written or read.
    OutOfRange { addr: u64 },
    /// The stack region could not be mapped.
    Unmapped { bottom: u64, top: u64 },
    TooManyArgs,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::Overflow { needed, available } => write!(
                f,
                "user stack overflow: need {needed} bytes, {available} left"
            ),
            StackError::OutOfRange { addr } => {
                write!(f, "stack access at {addr:#x} outside the user stack")
            }
            StackError::Unmapped { bottom, top } => {
                write!(f, "user stack [{bottom:#x}, {top:#x}) is not mapped")
            }
            StackError::TooManyArgs => write!(f, "too many program arguments"),
        }
    }
}

/// Reasons the ELF loader refuses a program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The host could not open or read the file.
    Open,
    Read,
    Malformed,
    NotElf64,
    BigEndian,
    NotRiscv,
    /// Neither `ET_EXEC` nor `ET_DYN`.
    UnsupportedType,
    /// `PT_INTERP` present; dynamic linking is not supported.
    Interpreter,
    PhdrsTooLarge { needed: usize, capacity: usize },
    SegmentOutOfRange { vaddr: u64, end: u64 },
    MapFailed { vaddr: u64 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Open => write!(f, "could not open the program file"),
            LoadError::Read => write!(f, "could not read the program file"),
            LoadError::Malformed => write!(f, "malformed ELF image"),
            LoadError::NotElf64 => write!(f, "only 64-bit ELF images are supported"),
            LoadError::BigEndian => write!(f, "only little-endian ELF images are supported"),
            LoadError::NotRiscv => write!(f, "ELF image is not a RISC-V program"),
            LoadError::UnsupportedType => write!(f, "ELF image is neither executable nor PIE"),
            LoadError::Interpreter => write!(f, "dynamically linked programs are not supported"),
            LoadError::PhdrsTooLarge { needed, capacity } => write!(
                f,
                "program headers need {needed} bytes, only {capacity} available"
            ),
            LoadError::SegmentOutOfRange { vaddr, end } => {
                write!(f, "segment [{vaddr:#x}, {end:#x}) lies outside user memory")
            }
            LoadError::MapFailed { vaddr } => write!(f, "could not map segment at {vaddr:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn exit_codes_follow_the_error_class() {
        assert_eq!(BootError::from(ArgError::unrecognized("-z")).exit_code(), 1);
        assert_eq!(BootError::from(ArgError::NoProgram).exit_code(), -1);
        assert_eq!(BootError::MultipleHarts(2).exit_code(), -1);
    }

    #[test]
    fn long_options_are_truncated_not_dropped() {
        let long = "--an-option-far-longer-than-thirty-two-characters";
        let ArgError::UnrecognizedOption(text) = ArgError::unrecognized(long) else {
            panic!("wrong variant");
        };
        assert_eq!(text.len(), OPTION_TEXT_CAP);
        assert!(long.starts_with(text.as_str()));
    }

    #[test]
    fn messages_match_the_classic_wording() {
        assert_eq!(
            BootError::from(ArgError::unrecognized("-z")).to_string(),
            "unrecognized option: `-z'"
        );
        assert_eq!(
            BootError::from(ArgError::TooLarge { limit: 2048 }).to_string(),
            "args must not exceed 2048 bytes"
        );
    }
}
