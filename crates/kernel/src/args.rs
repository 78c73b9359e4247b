//! Command line: fetched from the host, kernel flags consumed, the rest
//! handed to the program.

use core::ffi::CStr;

use arrayvec::ArrayString;
use types::WORD_BYTES;
use types::syscall::SYS_GETMAINVARS;

use crate::config::{Config, KernelOptions};
use crate::error::ArgError;
use crate::frontend::{Frontend, HostTransport};
use crate::machine::PerfSource;

/// Buffer the host packs `argc` and the argument strings into.
///
/// Word 0 is the argument count, words `1..=argc` are absolute addresses of
/// the strings. Addresses are resolved relative to the address the buffer had
/// when it was filled, and every access is bounds-checked.
#[repr(C, align(8))]
pub struct ArgBuffer {
    bytes: [u8; Config::ARG_BUF_BYTES],
    base: u64,
}

impl ArgBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; Config::ARG_BUF_BYTES],
            base: 0,
        }
    }

    /// Asks the host to fill the buffer.
    pub fn fetch<T: HostTransport, C: PerfSource>(
        &mut self,
        frontend: &Frontend<T, C>,
    ) -> Result<(), ArgError> {
        self.base = self.bytes.as_mut_ptr() as u64;
        let r = frontend.call(SYS_GETMAINVARS, [self.base, Config::ARG_BUF_BYTES as u64]);
        if r != 0 {
            return Err(ArgError::TooLarge {
                limit: Config::ARG_BUF_BYTES,
            });
        }
        Ok(())
    }

    /// Fills the buffer locally as the host would, with `base` as its address.
    pub fn fill<A: AsRef<[u8]>>(&mut self, base: u64, args: &[A]) -> Result<(), ArgError> {
        self.base = base;
        types::mainvars::pack(&mut self.bytes, base, args).map_err(|e| ArgError::TooLarge {
            limit: e.limit,
        })?;
        Ok(())
    }

    pub fn address(&self) -> u64 {
        self.base
    }

    pub fn word(&self, index: usize) -> Option<u64> {
        let off = index.checked_mul(WORD_BYTES)?;
        let bytes = self.bytes.get(off..off.checked_add(WORD_BYTES)?)?;
        let mut word = [0u8; WORD_BYTES];
        word.copy_from_slice(bytes);
        Some(u64::from_le_bytes(word))
    }

    pub fn count(&self) -> usize {
        self.word(0).unwrap_or(0) as usize
    }

    /// Argument `index`, counting the kernel's own name as 0.
    pub fn arg(&self, index: usize) -> Result<&CStr, ArgError> {
        if index >= self.count() {
            return Err(ArgError::Malformed);
        }
        let ptr = self.word(1 + index).ok_or(ArgError::Malformed)?;
        let off = ptr.checked_sub(self.base).ok_or(ArgError::Malformed)? as usize;
        let tail = self.bytes.get(off..).ok_or(ArgError::Malformed)?;
        CStr::from_bytes_until_nul(tail).map_err(|_| ArgError::Malformed)
    }
}

impl Default for ArgBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// The program's argument vector; `argv[0]` is the program name.
#[derive(Clone, Copy)]
pub struct ProgramArgs<'a> {
    buf: &'a ArgBuffer,
    first: usize,
    argc: usize,
}

impl<'a> ProgramArgs<'a> {
    pub fn argc(&self) -> usize {
        self.argc
    }

    pub fn get(&self, index: usize) -> Option<&'a CStr> {
        if index >= self.argc {
            return None;
        }
        self.buf.arg(self.first + index).ok()
    }

    pub fn program(&self) -> Option<&'a CStr> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a CStr> + '_ {
        (0..self.argc).filter_map(move |i| self.get(i))
    }
}

#[derive(Clone, Copy)]
pub enum Command<'a> {
    Help,
    Run {
        options: KernelOptions,
        argv: ProgramArgs<'a>,
    },
}

#[derive(Clone, Copy)]
enum OptionAction {
    Help,
    ReportCycles,
    NoDemandPaging,
}

struct KernelFlag {
    names: &'static [&'static str],
    help: &'static str,
    action: OptionAction,
}

const FLAGS: [KernelFlag; 3] = [
    KernelFlag {
        names: &["-h", "--help"],
        help: "Print this help message",
        action: OptionAction::Help,
    },
    KernelFlag {
        names: &["-p"],
        help: "Disable on-demand program paging",
        action: OptionAction::NoDemandPaging,
    },
    KernelFlag {
        names: &["-s"],
        help: "Print cycles upon termination",
        action: OptionAction::ReportCycles,
    },
];

/// Consumes leading kernel flags; the first other argument names the program.
pub fn parse(buf: &ArgBuffer) -> Result<Command<'_>, ArgError> {
    let argc = buf.count();
    if argc > Config::MAX_ARGS {
        return Err(ArgError::Malformed);
    }

    let mut options = KernelOptions::new();
    let mut next = 1;
    while next < argc {
        let arg = buf.arg(next)?.to_bytes();
        if arg.first() != Some(&b'-') {
            break;
        }
        let flag = FLAGS
            .iter()
            .find(|f| f.names.iter().any(|name| name.as_bytes() == arg));
        match flag.map(|f| f.action) {
            Some(OptionAction::Help) => return Ok(Command::Help),
            Some(OptionAction::ReportCycles) => options.report_cycles = true,
            Some(OptionAction::NoDemandPaging) => options.demand_paging = false,
            None => {
                let text = core::str::from_utf8(arg).unwrap_or("-?");
                return Err(ArgError::unrecognized(text));
            }
        }
        next += 1;
    }

    if next >= argc {
        return Err(ArgError::NoProgram);
    }
    for i in next..argc {
        buf.arg(i)?;
    }
    Ok(Command::Run {
        options,
        argv: ProgramArgs {
            buf,
            first: next,
            argc: argc - next,
        },
    })
}

pub fn print_usage<T: HostTransport, C: PerfSource>(frontend: &Frontend<T, C>) {
    printk!(frontend, "Proxy kernel\n\n");
    printk!(frontend, "usage: pk [pk options] <user program> [program options]\n");
    printk!(frontend, "Options:\n");
    for flag in FLAGS.iter() {
        let mut names = ArrayString::<24>::new();
        for (i, name) in flag.names.iter().enumerate() {
            if i > 0 {
                names.push_str(", ");
            }
            names.push_str(name);
        }
        printk!(frontend, "  {:<22}{}\n", names.as_str(), flag.help);
    }
}

pub fn suggest_help<T: HostTransport, C: PerfSource>(frontend: &Frontend<T, C>) {
    printk!(frontend, "Try 'pk --help' for more information.\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, TickClock};
    use std::boxed::Box;
    use std::vec::Vec;

    fn filled(args: &[&str]) -> Box<ArgBuffer> {
        let mut buf = Box::new(ArgBuffer::new());
        buf.fill(0x8000_1000, args).unwrap();
        buf
    }

    fn strings<'a>(argv: &ProgramArgs<'a>) -> Vec<&'a str> {
        argv.iter().map(|s| s.to_str().unwrap()).collect()
    }

    #[test]
    fn flags_before_the_program_are_consumed() {
        let buf = filled(&["pk", "-s", "-p", "myprog", "arg1"]);
        let Command::Run { options, argv } = parse(&buf).unwrap() else {
            panic!("expected a program to run");
        };
        assert!(options.report_cycles);
        assert!(!options.demand_paging);
        assert_eq!(argv.argc(), 2);
        assert_eq!(strings(&argv), ["myprog", "arg1"]);
    }

    #[test]
    fn flags_after_the_program_belong_to_it() {
        let buf = filled(&["pk", "prog", "-s", "--help"]);
        let Command::Run { options, argv } = parse(&buf).unwrap() else {
            panic!("expected a program to run");
        };
        assert_eq!(options, KernelOptions::default());
        assert_eq!(strings(&argv), ["prog", "-s", "--help"]);
    }

    #[test]
    fn help_wins_immediately() {
        for flag in ["-h", "--help"] {
            let buf = filled(&["pk", flag, "-z"]);
            assert!(matches!(parse(&buf), Ok(Command::Help)));
        }
    }

    #[test]
    fn unknown_flags_and_empty_command_lines_are_errors() {
        let buf = filled(&["pk", "-z", "prog"]);
        assert!(matches!(parse(&buf), Err(ArgError::UnrecognizedOption(ref o)) if o.as_str() == "-z"));

        let buf = filled(&["pk", "-s"]);
        assert_eq!(parse(&buf).err(), Some(ArgError::NoProgram));

        let buf = filled(&[] as &[&str]);
        assert_eq!(parse(&buf).err(), Some(ArgError::NoProgram));
    }

    #[test]
    fn pointers_outside_the_buffer_are_rejected() {
        let mut buf = filled(&["pk", "prog"]);
        buf.base += 0x10_0000;
        assert_eq!(buf.arg(1).err(), Some(ArgError::Malformed));
        assert_eq!(buf.arg(7).err(), Some(ArgError::Malformed));
    }

    #[test]
    fn words_past_the_buffer_are_absent() {
        let buf = filled(&["pk", "prog"]);
        assert_eq!(buf.word(0), Some(2));
        assert_eq!(buf.word(Config::ARG_BUF_BYTES / 8), None);
        assert_eq!(buf.word(usize::MAX / 8), None);
        assert_eq!(buf.word(usize::MAX), None);
    }

    #[test]
    fn fetch_goes_through_the_host() {
        let fe = Frontend::new(Recorder::with_args(&["pk", "-s", "hello"]), TickClock::default());
        let mut buf = Box::new(ArgBuffer::new());
        buf.fetch(&fe).unwrap();
        let Command::Run { argv, .. } = parse(&buf).unwrap() else {
            panic!("expected a program to run");
        };
        assert_eq!(argv.program().unwrap().to_bytes(), b"hello");
    }

    #[test]
    fn oversized_command_lines_are_fatal() {
        let long = "a".repeat(Config::ARG_BUF_BYTES);
        let fe = Frontend::new(Recorder::with_args(&["pk", long.as_str()]), TickClock::default());
        let mut buf = Box::new(ArgBuffer::new());
        assert_eq!(
            buf.fetch(&fe).err(),
            Some(ArgError::TooLarge {
                limit: Config::ARG_BUF_BYTES
            })
        );
    }

    #[test]
    fn usage_lists_every_flag_in_columns() {
        let fe = Frontend::new(Recorder::default(), TickClock::default());
        print_usage(&fe);
        let out = fe.transport().stdout();
        assert!(out.starts_with("Proxy kernel\n\nusage: pk [pk options] <user program> [program options]\n"));
        assert!(out.contains("  -h, --help            Print this help message\n"));
        assert!(out.contains("  -p                    Disable on-demand program paging\n"));
        assert!(out.contains("  -s                    Print cycles upon termination\n"));
    }
}
