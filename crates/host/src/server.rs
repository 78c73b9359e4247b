use std::collections::HashMap;
use std::io::Write;
use std::panic::resume_unwind;
use std::sync::{Mutex, MutexGuard};

use kernel::{HostCallBuffer, HostTransport};
use types::mainvars;
use types::stat::FrontendStat;
use types::syscall::{
    AT_FDCWD, EBADF, EFBIG, EINVAL, ENOENT, ENOMEM, ENOSYS, O_ACCMODE, O_APPEND, O_CREAT,
    O_RDONLY, O_TRUNC, SEEK_CUR, SEEK_END, SEEK_SET, STDERR_FD, STDIN_FD, STDOUT_FD, SYS_CLOSE, SYS_EXIT,
    SYS_EXIT_GROUP, SYS_FSTAT, SYS_GETMAINVARS, SYS_LSEEK, SYS_OPENAT, SYS_PREAD, SYS_PWRITE,
    SYS_READ, SYS_WRITE,
};

/// Unwind payload raised when the kernel asks the host to end the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostExit(pub i64);

const FIRST_FD: u64 = 3;
/// Largest size a file may grow to through writes.
const MAX_FILE_BYTES: u64 = 64 << 20;
const S_IFREG: u64 = 0o100000;
const S_IFCHR: u64 = 0o020000;

struct OpenFile {
    path: Vec<u8>,
    data: Vec<u8>,
    pos: u64,
    writable: bool,
    append: bool,
}

#[derive(Default)]
struct ServerState {
    argv: Vec<Vec<u8>>,
    files: HashMap<Vec<u8>, Vec<u8>>,
    host_fs: bool,
    open: HashMap<u64, OpenFile>,
    next_fd: u64,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    echo: bool,
    requests: Vec<[u64; 8]>,
}

/// Front-end server: answers host calls from the kernel.
///
/// Files live in memory. With host file system access enabled, a file that
/// is not already known is read from disk on first open; writes never reach
/// the disk.
pub struct HostServer {
    state: Mutex<ServerState>,
}

impl std::fmt::Debug for HostServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("HostServer")
            .field("argv", &st.argv.len())
            .field("files", &st.files.len())
            .field("open", &st.open.len())
            .field("requests", &st.requests.len())
            .finish()
    }
}

impl HostServer {
    /// `argv[0]` is the kernel's own name.
    pub fn new<S: AsRef<str>>(argv: &[S]) -> Self {
        let state = ServerState {
            argv: argv.iter().map(|a| a.as_ref().as_bytes().to_vec()).collect(),
            next_fd: FIRST_FD,
            ..ServerState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_file(self, name: &str, bytes: Vec<u8>) -> Self {
        self.lock().files.insert(name.as_bytes().to_vec(), bytes);
        self
    }

    pub fn with_host_fs(self, enabled: bool) -> Self {
        self.lock().host_fs = enabled;
        self
    }

    /// Also copy the program's stdout/stderr to this process's.
    pub fn with_echo(self, enabled: bool) -> Self {
        self.lock().echo = enabled;
        self
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.lock().stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.lock().stderr).into_owned()
    }

    /// Every request seen so far, as the eight words of the buffer.
    pub fn requests(&self) -> Vec<[u64; 8]> {
        self.lock().requests.clone()
    }

    pub fn calls_of(&self, n: u64) -> usize {
        self.lock().requests.iter().filter(|r| r[0] == n).count()
    }

    /// Contents of `name` as last written by the program.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        let st = self.lock();
        st.open
            .values()
            .find(|f| f.path == name.as_bytes())
            .map(|f| f.data.clone())
            .or_else(|| st.files.get(name.as_bytes()).cloned())
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum Reply {
    Value(i64),
    Exit(i64),
}

// Runs with the channel locked, so nothing in here may log through the
// kernel's logger.
impl HostTransport for HostServer {
    fn notify(&self, buf: &mut HostCallBuffer) {
        let mut req = [0u64; 8];
        for (slot, word) in req.iter_mut().enumerate() {
            *word = buf.read(slot);
        }

        let reply = {
            let mut st = self.lock();
            st.requests.push(req);
            st.dispatch(req)
        };
        match reply {
            Reply::Value(v) => buf.write(0, v as u64),
            Reply::Exit(code) => resume_unwind(Box::new(HostExit(code))),
        }
    }
}

/// # Safety
/// `addr` must point at `len` readable bytes in this process.
unsafe fn host_bytes<'a>(addr: u64, len: u64) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(addr as *const u8, len as usize) }
}

/// # Safety
/// `addr` must point at `len` writable bytes in this process.
unsafe fn host_bytes_mut<'a>(addr: u64, len: u64) -> &'a mut [u8] {
    if len == 0 {
        return &mut [];
    }
    unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len as usize) }
}

impl ServerState {
    fn dispatch(&mut self, req: [u64; 8]) -> Reply {
        let [n, a0, a1, a2, a3, a4, _, _] = req;
        // SAFETY (all arms): the kernel passes addresses of live buffers of
        // the stated length, translated where they belong to the program.
        let ret = match n {
            SYS_EXIT | SYS_EXIT_GROUP => return Reply::Exit(a0 as i64),
            SYS_GETMAINVARS => {
                let dst = unsafe { host_bytes_mut(a0, a1) };
                match mainvars::pack(dst, a0, &self.argv) {
                    Ok(_) => 0,
                    Err(_) => -ENOMEM,
                }
            }
            SYS_WRITE => self.write(a0, unsafe { host_bytes(a1, a2) }, None),
            SYS_PWRITE => self.write(a0, unsafe { host_bytes(a1, a2) }, Some(a3)),
            SYS_READ => self.read(a0, unsafe { host_bytes_mut(a1, a2) }, None),
            SYS_PREAD => self.read(a0, unsafe { host_bytes_mut(a1, a2) }, Some(a3)),
            SYS_LSEEK => self.lseek(a0, a1 as i64, a2),
            SYS_OPENAT => {
                let name = unsafe { host_bytes(a1, a2) };
                let name = name.strip_suffix(&[0]).unwrap_or(name);
                self.openat(a0 as i64, name, a3, a4)
            }
            SYS_CLOSE => match self.open.remove(&a0) {
                Some(_) => 0,
                None if a0 < FIRST_FD => 0,
                None => -EBADF,
            },
            SYS_FSTAT => match self.fstat(a0) {
                Some(stat) => {
                    // SAFETY: see above; the kernel passes a `FrontendStat`.
                    unsafe { std::ptr::write_unaligned(a1 as *mut FrontendStat, stat) };
                    0
                }
                None => -EBADF,
            },
            _ => -ENOSYS,
        };
        Reply::Value(ret)
    }

    fn write(&mut self, fd: u64, bytes: &[u8], offset: Option<u64>) -> i64 {
        match fd {
            STDOUT_FD | STDERR_FD => {
                let (sink, echo) = if fd == STDOUT_FD {
                    (&mut self.stdout, self.echo)
                } else {
                    (&mut self.stderr, self.echo)
                };
                sink.extend_from_slice(bytes);
                if echo {
                    if fd == STDOUT_FD {
                        let _ = std::io::stdout().write_all(bytes);
                    } else {
                        let _ = std::io::stderr().write_all(bytes);
                    }
                }
                bytes.len() as i64
            }
            _ => {
                let Some(file) = self.open.get_mut(&fd) else {
                    return -EBADF;
                };
                if !file.writable {
                    return -EBADF;
                }
                let at = match offset {
                    Some(off) => off,
                    None if file.append => file.data.len() as u64,
                    None => file.pos,
                };
                let end = match at.checked_add(bytes.len() as u64) {
                    Some(end) if end <= MAX_FILE_BYTES => end as usize,
                    _ => return -EFBIG,
                };
                let at = at as usize;
                if file.data.len() < end {
                    file.data.resize(end, 0);
                }
                file.data[at..end].copy_from_slice(bytes);
                if offset.is_none() {
                    file.pos = end as u64;
                }
                bytes.len() as i64
            }
        }
    }

    fn read(&mut self, fd: u64, out: &mut [u8], offset: Option<u64>) -> i64 {
        if fd == STDIN_FD {
            return 0;
        }
        let Some(file) = self.open.get_mut(&fd) else {
            return -EBADF;
        };
        let len = file.data.len();
        let at = usize::try_from(offset.unwrap_or(file.pos)).map_or(len, |at| at.min(len));
        let n = (len - at).min(out.len());
        out[..n].copy_from_slice(&file.data[at..at + n]);
        if offset.is_none() {
            file.pos += n as u64;
        }
        n as i64
    }

    fn lseek(&mut self, fd: u64, off: i64, whence: u64) -> i64 {
        let Some(file) = self.open.get_mut(&fd) else {
            return -EBADF;
        };
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => file.pos as i64,
            SEEK_END => file.data.len() as i64,
            _ => return -EINVAL,
        };
        let pos = match base.checked_add(off) {
            Some(pos) if pos >= 0 => pos,
            _ => return -EINVAL,
        };
        file.pos = pos as u64;
        pos
    }

    fn openat(&mut self, dirfd: i64, name: &[u8], flags: u64, _mode: u64) -> i64 {
        if dirfd != AT_FDCWD && !name.starts_with(b"/") {
            return -EBADF;
        }
        let data = match self.files.get(name) {
            Some(bytes) => Some(bytes.clone()),
            None if self.host_fs => std::str::from_utf8(name)
                .ok()
                .and_then(|path| std::fs::read(path).ok()),
            None => None,
        };
        let data = match data {
            Some(_) if flags & O_TRUNC != 0 => Vec::new(),
            Some(bytes) => bytes,
            None if flags & O_CREAT != 0 => Vec::new(),
            None => return -ENOENT,
        };

        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(
            fd,
            OpenFile {
                path: name.to_vec(),
                data,
                pos: 0,
                writable: flags & O_ACCMODE != O_RDONLY,
                append: flags & O_APPEND != 0,
            },
        );
        fd as i64
    }

    fn fstat(&self, fd: u64) -> Option<FrontendStat> {
        if fd < FIRST_FD {
            return Some(FrontendStat {
                mode: S_IFCHR | 0o620,
                nlink: 1,
                blksize: 1024,
                ..FrontendStat::default()
            });
        }
        let file = self.open.get(&fd)?;
        let size = file.data.len() as u64;
        Some(FrontendStat {
            ino: fd,
            mode: S_IFREG | 0o644,
            nlink: 1,
            size,
            blksize: 4096,
            blocks: size.div_ceil(512),
            ..FrontendStat::default()
        })
    }
}
