//! Host-target interface: a pair of words the debug host polls.
//!
//! A request is the address of the host-call buffer written to `tohost`
//! (device 0, command 0). The host serves it and acknowledges by writing a
//! nonzero value to `fromhost`.

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile};
use core::sync::atomic::{Ordering, fence};

use kernel::{HostCallBuffer, HostTransport};

#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".htif")]
static mut tohost: u64 = 0;

#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".htif")]
static mut fromhost: u64 = 0;

const DEVICE_SHIFT: u32 = 56;
const COMMAND_SHIFT: u32 = 48;
const PAYLOAD_MASK: u64 = (1 << COMMAND_SHIFT) - 1;

/// `tohost` word for `payload` sent to `device` with `command`.
pub const fn request(device: u64, command: u64, payload: u64) -> u64 {
    (device << DEVICE_SHIFT) | (command << COMMAND_SHIFT) | (payload & PAYLOAD_MASK)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Htif;

impl HostTransport for Htif {
    fn notify(&self, buf: &mut HostCallBuffer) {
        fence(Ordering::SeqCst);
        // SAFETY: the mailbox words are only touched here, and the caller
        // holds the channel lock.
        unsafe {
            while read_volatile(addr_of!(tohost)) != 0 {
                core::hint::spin_loop();
            }
            write_volatile(addr_of_mut!(tohost), request(0, 0, buf.address()));
            while read_volatile(addr_of!(fromhost)) == 0 {
                core::hint::spin_loop();
            }
            write_volatile(addr_of_mut!(fromhost), 0);
        }
        fence(Ordering::SeqCst);
    }
}
