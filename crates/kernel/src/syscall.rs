//! User system calls forwarded to the host.
//!
//! The trap entry decodes `a7`/`a0..a5` and calls [`KernelContext::syscall`].
//! Buffers in user memory are translated before their addresses go to the
//! host; kernel-side copies are made where the host reply needs reshaping.

use log::warn;
use types::stat::{FrontendStat, Stat};
use types::syscall::{
    EFAULT, ENAMETOOLONG, ENOSYS, SYS_CLOSE, SYS_EXIT, SYS_EXIT_GROUP, SYS_FSTAT, SYS_LSEEK,
    SYS_OPENAT, SYS_PREAD, SYS_PWRITE, SYS_READ, SYS_WRITE, syscall_name,
};

use crate::config::Config;
use crate::context::KernelContext;
use crate::machine::{Paging, PerfSource};
use crate::platform::Platform;

impl<P: Platform> KernelContext<P> {
    /// Handles system call `n`; returns the value for `a0`.
    pub fn syscall(&mut self, n: u64, args: [u64; 6]) -> i64 {
        self.image.counters.syscall_cnt += 1;
        let [a0, a1, a2, a3, _, _] = args;
        match n {
            SYS_EXIT | SYS_EXIT_GROUP => self.sys_exit(a0 as i64),
            SYS_READ | SYS_WRITE => self.forward_buffer(n, a0, a1, a2, None),
            SYS_PREAD | SYS_PWRITE => self.forward_buffer(n, a0, a1, a2, Some(a3)),
            SYS_LSEEK => self.frontend.call(SYS_LSEEK, [a0, a1, a2]),
            SYS_CLOSE => self.frontend.call(SYS_CLOSE, [a0]),
            SYS_OPENAT => self.sys_openat(a0, a1, a2, a3),
            SYS_FSTAT => self.sys_fstat(a0, a1),
            _ => {
                warn!(
                    "unsupported syscall {} ({}) args {:#x} {:#x} {:#x} {:#x}",
                    n,
                    syscall_name(n),
                    a0,
                    a1,
                    a2,
                    a3
                );
                -ENOSYS
            }
        }
    }

    /// Calls that pass one user buffer `[va, va + len)` and an optional offset.
    fn forward_buffer(&mut self, n: u64, fd: u64, va: u64, len: u64, offset: Option<u64>) -> i64 {
        let Some(pa) = self.paging.va2pa(va, len) else {
            return -EFAULT;
        };
        match offset {
            Some(off) => self.frontend.call(n, [fd, pa, len, off]),
            None => self.frontend.call(n, [fd, pa, len]),
        }
    }

    fn sys_openat(&mut self, dirfd: u64, path_va: u64, flags: u64, mode: u64) -> i64 {
        let mut path = [0u8; Config::MAX_PATH];
        let len = match self.copy_user_cstr(path_va, &mut path) {
            Ok(len) => len,
            Err(errno) => return -errno,
        };
        self.frontend.call(
            SYS_OPENAT,
            [dirfd, path.as_ptr() as u64, len as u64, flags, mode],
        )
    }

    fn sys_fstat(&mut self, fd: u64, stat_va: u64) -> i64 {
        let mut host_stat = FrontendStat::default();
        let ret = self
            .frontend
            .call(SYS_FSTAT, [fd, core::ptr::addr_of_mut!(host_stat) as u64]);
        if ret == 0 {
            let bytes = Stat::from(&host_stat).to_bytes();
            if !self.paging.copy_to_user(stat_va, &bytes) {
                return -EFAULT;
            }
        }
        ret
    }

    /// Copies a NUL-terminated user string into `out`; returns its length
    /// including the NUL.
    fn copy_user_cstr(&self, va: u64, out: &mut [u8]) -> Result<usize, i64> {
        for i in 0..out.len() {
            let mut byte = [0u8; 1];
            if !self.paging.copy_from_user(va + i as u64, &mut byte) {
                return Err(EFAULT);
            }
            out[i] = byte[0];
            if byte[0] == 0 {
                return Ok(i + 1);
            }
        }
        Err(ENAMETOOLONG)
    }

    fn sys_exit(&self, code: i64) -> ! {
        if self.options.report_cycles {
            self.report_counters();
        }
        self.frontend.shutdown(code)
    }

    /// The `-s` exit report.
    fn report_counters(&self) {
        let c = &self.image.counters;
        let fe = self.frontend;
        let dt = self.machine.time().wrapping_sub(c.time0);
        let dc = self.machine.cycles().wrapping_sub(c.cycle0);
        let di = self.machine.instret().wrapping_sub(c.instret0);
        let hpm5 = self.machine.hpm_counter(5).wrapping_sub(c.hpm0[0]);
        let hpm6 = self.machine.hpm_counter(6).wrapping_sub(c.hpm0[1]);

        printk!(fe, "{} ticks\n", dt);
        printk!(fe, "{} cycles\n", dc);
        printk!(fe, "{} instructions\n", di);
        if di != 0 {
            let hundredths = (100 * dc as u128 + di as u128 / 2) / di as u128;
            printk!(fe, "{}.{:02} CPI\n", hundredths / 100, hundredths % 100);
        }
        printk!(fe, "{} hpmcounter5 events\n", hpm5);
        printk!(fe, "{} hpmcounter6 events\n", hpm6);
        printk!(fe, "{} syscalls\n", c.syscall_cnt);
        let host = fe.stats();
        printk!(
            fe,
            "{} host calls, {} cycles, {} instructions\n",
            host.calls,
            host.cycles,
            host.instret
        );
    }
}
