//! Host-call channel.
//!
//! One request at a time: the call number and seven argument words go into a
//! shared eight-word buffer, the transport hands its address to the host, and
//! the host's answer comes back in word 0.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use types::syscall::SYS_EXIT;

use crate::machine::PerfSource;

/// Words in the shared buffer.
pub const HOST_CALL_WORDS: usize = 8;
/// Argument words after the call number.
pub const HOST_CALL_ARGS: usize = HOST_CALL_WORDS - 1;

/// The buffer the host reads the request from and writes the result into.
/// The host may look at it at any time, so every access is volatile.
#[repr(C, align(64))]
pub struct HostCallBuffer {
    words: [u64; HOST_CALL_WORDS],
}

impl HostCallBuffer {
    pub const fn new() -> Self {
        Self {
            words: [0; HOST_CALL_WORDS],
        }
    }

    /// Address handed to the host.
    pub fn address(&self) -> u64 {
        self.words.as_ptr() as u64
    }

    pub fn read(&self, slot: usize) -> u64 {
        // SAFETY: `slot` is bounds-checked by the index expression.
        unsafe { core::ptr::read_volatile(&self.words[slot]) }
    }

    pub fn write(&mut self, slot: usize, value: u64) {
        // SAFETY: as above.
        unsafe { core::ptr::write_volatile(&mut self.words[slot], value) }
    }
}

impl Default for HostCallBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Host-notify primitive.
pub trait HostTransport {
    /// Hands `buf` to the host and returns once the host has written the
    /// result into word 0.
    fn notify(&self, buf: &mut HostCallBuffer);
}

/// Running totals over all host calls.
#[derive(Default)]
pub struct CallStats {
    calls: AtomicU64,
    cycles: AtomicU64,
    instret: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallTotals {
    pub calls: u64,
    pub cycles: u64,
    pub instret: u64,
}

impl CallStats {
    pub const fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            instret: AtomicU64::new(0),
        }
    }

    fn record(&self, cycles: u64, instret: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.cycles.fetch_add(cycles, Ordering::Relaxed);
        self.instret.fetch_add(instret, Ordering::Relaxed);
    }

    pub fn totals(&self) -> CallTotals {
        CallTotals {
            calls: self.calls.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            instret: self.instret.load(Ordering::Relaxed),
        }
    }
}

pub struct Frontend<T, C> {
    buffer: Mutex<HostCallBuffer>,
    transport: T,
    clock: C,
    stats: CallStats,
}

impl<T: HostTransport, C: PerfSource> Frontend<T, C> {
    pub const fn new(transport: T, clock: C) -> Self {
        Self {
            buffer: Mutex::new(HostCallBuffer::new()),
            transport,
            clock,
            stats: CallStats::new(),
        }
    }

    /// Issues host call `n`. Unused argument words are sent as zero.
    pub fn call<const N: usize>(&self, n: u64, args: [u64; N]) -> i64 {
        const { assert!(N <= HOST_CALL_ARGS) };
        let cycles0 = self.clock.cycles();
        let instret0 = self.clock.instret();

        let ret = {
            let mut buf = self.buffer.lock();
            buf.write(0, n);
            for slot in 1..HOST_CALL_WORDS {
                buf.write(slot, args.get(slot - 1).copied().unwrap_or(0));
            }
            self.transport.notify(&mut buf);
            buf.read(0) as i64
        };

        self.stats.record(
            self.clock.cycles().wrapping_sub(cycles0),
            self.clock.instret().wrapping_sub(instret0),
        );
        ret
    }

    /// Ends the session. The host never answers an exit request; if it does,
    /// the hart spins.
    pub fn shutdown(&self, code: i64) -> ! {
        self.call(SYS_EXIT, [code as u64]);
        loop {
            core::hint::spin_loop();
        }
    }

    pub fn stats(&self) -> CallTotals {
        self.stats.totals()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
