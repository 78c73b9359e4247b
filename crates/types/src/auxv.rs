//! Auxiliary-vector keys placed on the initial user stack.

pub const AT_NULL: u64 = 0;
pub const AT_PHDR: u64 = 3;
pub const AT_PHENT: u64 = 4;
pub const AT_PHNUM: u64 = 5;
pub const AT_PAGESZ: u64 = 6;
pub const AT_ENTRY: u64 = 9;
pub const AT_SECURE: u64 = 23;
pub const AT_RANDOM: u64 = 25;

/// Entries in the vector, terminator included.
pub const AUXV_LEN: usize = 8;

/// Key order on the stack. The terminator comes last.
pub const AUXV_KEYS: [u64; AUXV_LEN] = [
    AT_ENTRY, AT_PHNUM, AT_PHENT, AT_PHDR, AT_PAGESZ, AT_SECURE, AT_RANDOM, AT_NULL,
];

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuxEntry {
    pub key: u64,
    pub value: u64,
}

impl AuxEntry {
    pub const NULL: AuxEntry = AuxEntry::new(AT_NULL, 0);

    pub const fn new(key: u64, value: u64) -> Self {
        Self { key, value }
    }
}

pub fn key_name(key: u64) -> &'static str {
    match key {
        AT_NULL => "AT_NULL",
        AT_PHDR => "AT_PHDR",
        AT_PHENT => "AT_PHENT",
        AT_PHNUM => "AT_PHNUM",
        AT_PAGESZ => "AT_PAGESZ",
        AT_ENTRY => "AT_ENTRY",
        AT_SECURE => "AT_SECURE",
        AT_RANDOM => "AT_RANDOM",
        _ => "AT_?",
    }
}
