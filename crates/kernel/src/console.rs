//! Text output through the host: `printk!` for user-visible messages and a
//! `log` backend for diagnostics.

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
pub use types::syscall::{STDERR_FD, STDOUT_FD};
use types::syscall::SYS_WRITE;

use crate::frontend::{Frontend, HostTransport};
use crate::machine::PerfSource;

const LINE_BYTES: usize = 256;

/// Formats into a fixed buffer and writes it to a host file descriptor,
/// flushing whenever the buffer fills.
pub struct Console<'a, T: HostTransport, C: PerfSource> {
    frontend: &'a Frontend<T, C>,
    fd: u64,
    buf: [u8; LINE_BYTES],
    len: usize,
}

impl<'a, T: HostTransport, C: PerfSource> Console<'a, T, C> {
    pub fn new(frontend: &'a Frontend<T, C>, fd: u64) -> Self {
        Self {
            frontend,
            fd,
            buf: [0; LINE_BYTES],
            len: 0,
        }
    }

    pub fn flush(&mut self) {
        if self.len == 0 {
            return;
        }
        self.frontend.call(
            SYS_WRITE,
            [self.fd, self.buf.as_ptr() as u64, self.len as u64],
        );
        self.len = 0;
    }
}

impl<T: HostTransport, C: PerfSource> Write for Console<'_, T, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            if self.len == LINE_BYTES {
                self.flush();
            }
            let n = core::cmp::min(LINE_BYTES - self.len, bytes.len());
            self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
            self.len += n;
            bytes = &bytes[n..];
        }
        Ok(())
    }
}

impl<T: HostTransport, C: PerfSource> Drop for Console<'_, T, C> {
    fn drop(&mut self) {
        self.flush();
    }
}

pub fn print<T: HostTransport, C: PerfSource>(
    frontend: &Frontend<T, C>,
    fd: u64,
    args: fmt::Arguments<'_>,
) {
    let mut console = Console::new(frontend, fd);
    let _ = console.write_fmt(args);
}

/// `printk!(frontend, "fmt", args..)` writes to the host's standard output.
#[macro_export]
macro_rules! printk {
    ($frontend:expr, $($arg:tt)*) => {
        $crate::console::print($frontend, $crate::console::STDOUT_FD, format_args!($($arg)*))
    };
}

/// `log` backend writing `[LEVEL] message` lines to the host's standard error.
pub struct Logger<T: 'static, C: 'static> {
    frontend: &'static Frontend<T, C>,
}

impl<T: HostTransport, C: PerfSource> Logger<T, C> {
    pub const fn new(frontend: &'static Frontend<T, C>) -> Self {
        Self { frontend }
    }
}

impl<T, C> Log for Logger<T, C>
where
    T: HostTransport + Sync + Send,
    C: PerfSource + Sync + Send,
{
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        print(
            self.frontend,
            STDERR_FD,
            format_args!("[{}] {}\n", record.level(), record.args()),
        );
    }

    fn flush(&self) {}
}

/// Installs `logger` as the global `log` backend.
pub fn init<T, C>(logger: &'static Logger<T, C>, level: LevelFilter) -> Result<(), SetLoggerError>
where
    T: HostTransport + Sync + Send,
    C: PerfSource + Sync + Send,
{
    log::set_logger(logger).map(|()| log::set_max_level(level))
}
