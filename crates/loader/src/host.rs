use alloc::vec;
use alloc::vec::Vec;
use core::ffi::CStr;

use kernel::{Frontend, HostTransport, LoadError, PerfSource};
use types::stat::FrontendStat;
use types::syscall::{AT_FDCWD, O_RDONLY, SYS_CLOSE, SYS_FSTAT, SYS_OPENAT, SYS_PREAD};

/// Reads program files from the host's file system over the host-call
/// channel: `openat`, `fstat`, then `pread` until the whole file is in.
pub struct HostImageSource<T: 'static, C: 'static> {
    frontend: &'static Frontend<T, C>,
}

impl<T: HostTransport, C: PerfSource> HostImageSource<T, C> {
    pub fn new(frontend: &'static Frontend<T, C>) -> Self {
        Self { frontend }
    }

    fn read_all(&self, fd: u64) -> Result<Vec<u8>, LoadError> {
        let mut stat = FrontendStat::default();
        let r = self
            .frontend
            .call(SYS_FSTAT, [fd, core::ptr::addr_of_mut!(stat) as u64]);
        if r != 0 {
            return Err(LoadError::Read);
        }

        let mut bytes = vec![0u8; stat.size as usize];
        let mut done = 0;
        while done < bytes.len() {
            let rest = &mut bytes[done..];
            let n = self.frontend.call(
                SYS_PREAD,
                [fd, rest.as_mut_ptr() as u64, rest.len() as u64, done as u64],
            );
            if n <= 0 {
                return Err(LoadError::Read);
            }
            done += n as usize;
        }
        Ok(bytes)
    }
}

impl<T: HostTransport, C: PerfSource> crate::ImageSource for HostImageSource<T, C> {
    fn read_image(&mut self, path: &CStr) -> Result<Vec<u8>, LoadError> {
        let name = path.to_bytes_with_nul();
        let fd = self.frontend.call(
            SYS_OPENAT,
            [
                AT_FDCWD as u64,
                name.as_ptr() as u64,
                name.len() as u64,
                O_RDONLY,
                0,
            ],
        );
        if fd < 0 {
            return Err(LoadError::Open);
        }
        let bytes = self.read_all(fd as u64);
        self.frontend.call(SYS_CLOSE, [fd as u64]);
        bytes
    }
}
