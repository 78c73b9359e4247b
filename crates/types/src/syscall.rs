//! Host-call numbers and the errno values the kernel produces itself.
//!
//! User system calls share the Linux RISC-V numbering with the host calls,
//! so a forwarded call keeps its number on the wire.

pub const SYS_OPENAT: u64 = 56;
pub const SYS_CLOSE: u64 = 57;
pub const SYS_LSEEK: u64 = 62;
pub const SYS_READ: u64 = 63;
pub const SYS_WRITE: u64 = 64;
pub const SYS_PREAD: u64 = 67;
pub const SYS_PWRITE: u64 = 68;
pub const SYS_FSTAT: u64 = 80;
pub const SYS_EXIT: u64 = 93;
pub const SYS_EXIT_GROUP: u64 = 94;
/// Front-end private call: pack argc/argv into a kernel buffer.
pub const SYS_GETMAINVARS: u64 = 2011;

pub const ENOENT: i64 = 2;
pub const EBADF: i64 = 9;
pub const ENOMEM: i64 = 12;
pub const EFAULT: i64 = 14;
pub const EINVAL: i64 = 22;
pub const EFBIG: i64 = 27;
pub const ENAMETOOLONG: i64 = 36;
pub const ENOSYS: i64 = 38;

pub const AT_FDCWD: i64 = -100;

pub const O_RDONLY: u64 = 0;
pub const O_WRONLY: u64 = 0o1;
pub const O_RDWR: u64 = 0o2;
pub const O_ACCMODE: u64 = 0o3;
pub const O_CREAT: u64 = 0o100;
pub const O_TRUNC: u64 = 0o1000;
pub const O_APPEND: u64 = 0o2000;

pub const SEEK_SET: u64 = 0;
pub const SEEK_CUR: u64 = 1;
pub const SEEK_END: u64 = 2;

pub const STDIN_FD: u64 = 0;
pub const STDOUT_FD: u64 = 1;
pub const STDERR_FD: u64 = 2;

/// Status reported when the kernel itself gives up.
pub const PANIC_EXIT_CODE: i64 = -1;

pub fn syscall_name(n: u64) -> &'static str {
    match n {
        SYS_OPENAT => "openat",
        SYS_CLOSE => "close",
        SYS_LSEEK => "lseek",
        SYS_READ => "read",
        SYS_WRITE => "write",
        SYS_PREAD => "pread",
        SYS_PWRITE => "pwrite",
        SYS_FSTAT => "fstat",
        SYS_EXIT => "exit",
        SYS_EXIT_GROUP => "exit_group",
        SYS_GETMAINVARS => "getmainvars",
        _ => "unknown",
    }
}
