//! Host and clock doubles for unit tests.

use std::string::String;
use std::vec::Vec;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use types::syscall::{ENOMEM, ENOSYS, SYS_GETMAINVARS, SYS_WRITE, STDOUT_FD};

use crate::frontend::{HOST_CALL_WORDS, HostCallBuffer, HostTransport};
use crate::machine::PerfSource;

/// Advances by one on every read.
#[derive(Default)]
pub struct TickClock(AtomicU64);

impl PerfSource for TickClock {
    fn cycles(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn instret(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn time(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Remembers the last request and answers with the sum of its words.
#[derive(Default)]
pub struct Echo {
    last: Mutex<[u64; HOST_CALL_WORDS]>,
}

impl Echo {
    pub fn last(&self) -> [u64; HOST_CALL_WORDS] {
        *self.last.lock()
    }
}

impl HostTransport for Echo {
    fn notify(&self, buf: &mut HostCallBuffer) {
        let mut words = [0u64; HOST_CALL_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = buf.read(i);
        }
        *self.last.lock() = words;
        buf.write(0, words.iter().fold(0u64, |acc, w| acc.wrapping_add(*w)));
    }
}

/// Serves `getmainvars` from a fixed command line and captures writes.
#[derive(Default)]
pub struct Recorder {
    argv: Vec<String>,
    writes: Mutex<Vec<(u64, Vec<u8>)>>,
}

impl Recorder {
    pub fn with_args(args: &[&str]) -> Self {
        Self {
            argv: args.iter().map(|a| String::from(*a)).collect(),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn stdout(&self) -> String {
        let mut out = String::new();
        for (fd, bytes) in self.writes.lock().iter() {
            if *fd == STDOUT_FD {
                out.push_str(core::str::from_utf8(bytes).unwrap());
            }
        }
        out
    }
}

impl HostTransport for Recorder {
    fn notify(&self, buf: &mut HostCallBuffer) {
        let ret = match buf.read(0) {
            SYS_WRITE => {
                let (fd, ptr, len) = (buf.read(1), buf.read(2), buf.read(3));
                // SAFETY: the kernel passes a live buffer of `len` bytes.
                let bytes = unsafe { core::slice::from_raw_parts(ptr as *const u8, len as usize) };
                self.writes.lock().push((fd, bytes.to_vec()));
                len as i64
            }
            SYS_GETMAINVARS => {
                let (addr, len) = (buf.read(1), buf.read(2));
                // SAFETY: the kernel passes its argument buffer and its size.
                let dst = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len as usize) };
                match types::mainvars::pack(dst, addr, &self.argv) {
                    Ok(_) => 0,
                    Err(_) => -ENOMEM,
                }
            }
            _ => -ENOSYS,
        };
        buf.write(0, ret as u64);
    }
}
