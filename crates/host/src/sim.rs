//! In-process board for running the kernel on the host.
//!
//! Machine state is modelled with plain data, user memory is a byte vector
//! addressed from zero, and the two privilege transfers are unwinds caught by
//! [`Simulator::boot`]. A program that was handed control shows up as
//! [`Outcome::Started`], from which its initial stack can be decoded and
//! system calls can be issued against the live kernel context.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CStr;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kernel::{
    Continuation, Csr, FloatAbi, Frontend, KernelContext, Machine, Paging, PerfSource, Platform,
    StackError,
};
use loader::{ElfSegmentLoader, HostImageSource};
use log::debug;
use types::auxv::{AT_NULL, AuxEntry};
use types::boot::UserLayout;
use types::csr::{Mstatus, Privilege, SATP_MODE_BARE, VM_CHOICE, satp_mode};
use types::trapframe::REG_A0;
use types::{ProcessImage, Protection, TrapFrame, WORD_BYTES};

use crate::server::{HostExit, HostServer};

/// Address the simulated `stvec` points at.
pub const SIM_TRAP_VECTOR: u64 = 0x8000_0040;

const KERNEL_STACK_BYTES: usize = 16 << 10;
const MAX_DECODED_WORDS: usize = 512;

/// Bits of `mstatus` visible through `sstatus`.
const SSTATUS_MASK: Mstatus = Mstatus::SIE
    .union(Mstatus::SPIE)
    .union(Mstatus::SPP)
    .union(Mstatus::VS)
    .union(Mstatus::FS)
    .union(Mstatus::XS)
    .union(Mstatus::SUM)
    .union(Mstatus::MXR);

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub mem_size: u64,
    pub harts: u32,
    /// Single-letter extensions, case-insensitive.
    pub isa: String,
    /// Whether `satp` accepts the requested translation mode.
    pub translation: bool,
    /// Whether the event counters and their selectors exist.
    pub hpm: bool,
    /// Number of `wfi`s after which a parked hart gives up.
    pub wfi_limit: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mem_size: 16 << 20,
            harts: 1,
            isa: "imafdcsu".into(),
            translation: true,
            hpm: true,
            wfi_limit: None,
        }
    }
}

impl SimConfig {
    /// A core without F/D.
    pub fn soft_float(mut self) -> Self {
        self.isa.retain(|c| !matches!(c.to_ascii_lowercase(), 'f' | 'd'));
        self
    }

    fn has(&self, ext: char) -> bool {
        self.isa
            .chars()
            .any(|c| c.eq_ignore_ascii_case(&ext))
    }
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    instret: AtomicU64,
}

/// Counters that advance on every read, shared between the hart and the
/// host-call channel.
#[derive(Clone, Default)]
pub struct SimClock(Arc<Counters>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PerfSource for SimClock {
    fn cycles(&self) -> u64 {
        self.0.cycles.fetch_add(11, Ordering::Relaxed) + 11
    }

    fn instret(&self) -> u64 {
        self.0.instret.fetch_add(7, Ordering::Relaxed) + 7
    }

    fn time(&self) -> u64 {
        self.0.cycles.load(Ordering::Relaxed) / 10
    }

    fn hpm_counter(&self, index: usize) -> u64 {
        self.0.instret.load(Ordering::Relaxed) / (index as u64 + 1)
    }
}

/// Unwind payload: the program was handed this frame.
pub struct Handoff(pub TrapFrame);

/// Unwind payload: a parked hart hit its `wfi` limit.
pub struct Parked(pub u64);

pub struct SimMachine {
    config: SimConfig,
    clock: SimClock,
    csrs: RefCell<HashMap<Csr, u64>>,
    privilege: Cell<Privilege>,
    sp: Cell<u64>,
    fp_zeroed: Cell<bool>,
    fences: Cell<u64>,
    wfis: Cell<u64>,
}

impl SimMachine {
    pub fn new(config: SimConfig, clock: SimClock) -> Self {
        Self {
            config,
            clock,
            csrs: RefCell::new(HashMap::new()),
            privilege: Cell::new(Privilege::Machine),
            sp: Cell::new(0),
            fp_zeroed: Cell::new(false),
            fences: Cell::new(0),
            wfis: Cell::new(0),
        }
    }

    /// Records a switch to `mode` running on `sp`.
    pub fn descend(&self, mode: Privilege, sp: u64) {
        debug!("hart: {:?} -> {:?}, sp {:#x}", self.privilege.get(), mode, sp);
        self.privilege.set(mode);
        self.sp.set(sp);
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege.get()
    }

    pub fn stack_pointer(&self) -> u64 {
        self.sp.get()
    }

    pub fn fp_zeroed(&self) -> bool {
        self.fp_zeroed.get()
    }

    pub fn fences(&self) -> u64 {
        self.fences.get()
    }

    pub fn wfis(&self) -> u64 {
        self.wfis.get()
    }

    pub fn csr(&self, csr: Csr) -> u64 {
        self.read_csr(csr)
    }

    fn raw(&self, csr: Csr) -> u64 {
        self.csrs.borrow().get(&csr).copied().unwrap_or(0)
    }

    fn legalize_mstatus(&self, value: u64) -> u64 {
        let mut ms = Mstatus::from_bits_retain(value);
        if !self.config.has('f') && !self.config.has('d') {
            ms.remove(Mstatus::FS);
        }
        if !self.config.has('v') {
            ms.remove(Mstatus::VS);
        }
        ms.bits()
    }
}

impl PerfSource for SimMachine {
    fn cycles(&self) -> u64 {
        self.clock.cycles()
    }

    fn instret(&self) -> u64 {
        self.clock.instret()
    }

    fn time(&self) -> u64 {
        self.clock.time()
    }

    fn hpm_counter(&self, index: usize) -> u64 {
        if self.config.hpm && (index == 5 || index == 6) {
            self.clock.hpm_counter(index)
        } else {
            0
        }
    }
}

impl Machine for SimMachine {
    fn supports_extension(&self, ext: char) -> bool {
        self.config.has(ext)
    }

    fn read_csr(&self, csr: Csr) -> u64 {
        match csr {
            Csr::Sstatus => self.raw(Csr::Mstatus) & SSTATUS_MASK.bits(),
            csr => self.raw(csr),
        }
    }

    fn write_csr(&self, csr: Csr, value: u64) {
        let (csr, value) = match csr {
            Csr::Mstatus => (Csr::Mstatus, self.legalize_mstatus(value)),
            Csr::Sstatus => {
                let keep = self.raw(Csr::Mstatus) & !SSTATUS_MASK.bits();
                let merged = keep | (value & SSTATUS_MASK.bits());
                (Csr::Mstatus, self.legalize_mstatus(merged))
            }
            Csr::Satp => {
                let mode = satp_mode(value);
                let legal = mode == SATP_MODE_BARE || (self.config.translation && mode == VM_CHOICE);
                if !legal {
                    return;
                }
                (Csr::Satp, value)
            }
            Csr::Mhpmevent5 | Csr::Mhpmevent6 if !self.config.hpm => return,
            csr => (csr, value),
        };
        self.csrs.borrow_mut().insert(csr, value);
    }

    fn memory_size(&self) -> u64 {
        self.config.mem_size
    }

    fn hart_count(&self) -> u32 {
        self.config.harts
    }

    fn has_hpm_events(&self) -> bool {
        self.config.hpm
    }

    fn zero_fp_registers(&self) {
        self.fp_zeroed.set(true);
    }

    fn fence_i(&self) {
        self.fences.set(self.fences.get() + 1);
    }

    fn wait_for_interrupt(&self) {
        let n = self.wfis.get() + 1;
        self.wfis.set(n);
        if self.config.wfi_limit.is_some_and(|limit| n >= limit) {
            resume_unwind(Box::new(Parked(n)));
        }
    }

    fn trap_vector(&self) -> u64 {
        SIM_TRAP_VECTOR
    }
}

/// User memory at `[0, len)`. Host addresses are real pointers into it.
pub struct SimPaging {
    memory: Vec<u8>,
    kstack: Vec<u8>,
    mapped: Vec<(u64, u64, Protection)>,
    layout: Option<UserLayout>,
    translate: bool,
    demand_paging: bool,
}

impl SimPaging {
    pub fn new(mem_size: u64) -> Self {
        Self {
            memory: vec![0; mem_size as usize],
            kstack: vec![0; KERNEL_STACK_BYTES],
            mapped: Vec::new(),
            layout: None,
            translate: false,
            demand_paging: true,
        }
    }

    pub fn mapped(&self) -> &[(u64, u64, Protection)] {
        &self.mapped
    }

    pub fn layout(&self) -> Option<UserLayout> {
        self.layout
    }

    pub fn translating(&self) -> bool {
        self.translate
    }

    pub fn demand_paging(&self) -> bool {
        self.demand_paging
    }

    pub fn kernel_stack_top(&self) -> u64 {
        self.kstack.as_ptr() as u64 + self.kstack.len() as u64
    }

    pub fn bytes(&self, va: u64, len: u64) -> Option<&[u8]> {
        let start = usize::try_from(va).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.memory.get(start..end)
    }

    fn bytes_mut(&mut self, va: u64, len: u64) -> Option<&mut [u8]> {
        let start = usize::try_from(va).ok()?;
        let end = start.checked_add(usize::try_from(len).ok()?)?;
        self.memory.get_mut(start..end)
    }

    pub fn read_word(&self, va: u64) -> Option<u64> {
        let bytes = self.bytes(va, WORD_BYTES as u64)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn read_cstr(&self, va: u64) -> Option<&CStr> {
        let tail = self.memory.get(usize::try_from(va).ok()?..)?;
        CStr::from_bytes_until_nul(tail).ok()
    }
}

impl Paging for SimPaging {
    fn user_region(&self, mem_size: u64) -> (u64, u64) {
        (0, mem_size.min(self.memory.len() as u64))
    }

    fn vm_init(&mut self, layout: &UserLayout, translate: bool) -> Option<u64> {
        if layout.stack_top > self.memory.len() as u64 {
            return None;
        }
        self.layout = Some(*layout);
        self.translate = translate;
        Some(self.kernel_stack_top())
    }

    fn set_demand_paging(&mut self, enabled: bool) {
        self.demand_paging = enabled;
    }

    fn map_user(&mut self, va: u64, len: u64, prot: Protection) -> bool {
        if self.bytes(va, len).is_none() {
            return false;
        }
        self.mapped.push((va, len, prot));
        true
    }

    fn copy_to_user(&mut self, va: u64, data: &[u8]) -> bool {
        match self.bytes_mut(va, data.len() as u64) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    fn copy_from_user(&self, va: u64, out: &mut [u8]) -> bool {
        match self.bytes(va, out.len() as u64) {
            Some(src) => {
                out.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    fn va2pa(&self, va: u64, len: u64) -> Option<u64> {
        self.bytes(va, len).map(|b| b.as_ptr() as u64)
    }

    fn user_stack(&mut self, bottom: u64, top: u64) -> Option<&mut [u8]> {
        self.bytes_mut(bottom, top.checked_sub(bottom)?)
    }
}

/// The simulated board. `HARD_FLOAT` selects the floating-point ABI the
/// kernel believes it was built for.
pub struct SimPlatform<const HARD_FLOAT: bool = true>;

impl<const HARD_FLOAT: bool> Platform for SimPlatform<HARD_FLOAT> {
    type Machine = SimMachine;
    type Clock = SimClock;
    type Transport = HostServer;
    type Paging = SimPaging;
    type Loader = ElfSegmentLoader<HostImageSource<HostServer, SimClock>>;

    const FLOAT_ABI: FloatAbi = if HARD_FLOAT {
        FloatAbi::Hard
    } else {
        FloatAbi::Soft
    };

    fn enter_supervisor_mode(mut next: Continuation<Self>, stack_top: u64) -> ! {
        next.context()
            .machine
            .descend(Privilege::Supervisor, stack_top);
        next.resume()
    }

    fn start_user(ctx: &'static mut KernelContext<Self>, frame: TrapFrame) -> ! {
        let mode = if Mstatus::from_bits_retain(frame.status).contains(Mstatus::SPP) {
            Privilege::Supervisor
        } else {
            Privilege::User
        };
        ctx.machine.descend(mode, frame.sp());
        resume_unwind(Box::new(Handoff(frame)))
    }
}

pub type SimContext<const HARD_FLOAT: bool> = KernelContext<SimPlatform<HARD_FLOAT>>;

/// How a boot ended.
pub enum Outcome<const HARD_FLOAT: bool = true> {
    /// The kernel asked the host to exit with this code.
    Exited(i64),
    /// The program was handed control.
    Started(Started<HARD_FLOAT>),
}

impl<const HARD_FLOAT: bool> Outcome<HARD_FLOAT> {
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            Outcome::Exited(code) => Some(*code),
            Outcome::Started(_) => None,
        }
    }

    pub fn started(self) -> Option<Started<HARD_FLOAT>> {
        match self {
            Outcome::Started(started) => Some(started),
            Outcome::Exited(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallOutcome {
    Returned(i64),
    Exited(i64),
}

/// A program that has been handed control, with the kernel state behind it.
pub struct Started<const HARD_FLOAT: bool = true> {
    pub frame: TrapFrame,
    ctx: Box<SimContext<HARD_FLOAT>>,
}

impl<const HARD_FLOAT: bool> Started<HARD_FLOAT> {
    pub fn image(&self) -> &ProcessImage {
        &self.ctx.image
    }

    pub fn machine(&self) -> &SimMachine {
        &self.ctx.machine
    }

    pub fn memory(&self) -> &SimPaging {
        &self.ctx.paging
    }

    pub fn context(&self) -> &SimContext<HARD_FLOAT> {
        &self.ctx
    }

    /// Runs system call `n` as if the program had trapped with it.
    pub fn syscall(&mut self, n: u64, args: [u64; 6]) -> SyscallOutcome {
        let ctx = &mut *self.ctx;
        match catch_unwind(AssertUnwindSafe(|| ctx.syscall(n, args))) {
            Ok(ret) => SyscallOutcome::Returned(ret),
            Err(payload) => match payload.downcast::<HostExit>() {
                Ok(exit) => SyscallOutcome::Exited(exit.0),
                Err(payload) => resume_unwind(payload),
            },
        }
    }

    /// Takes an `ecall` trap with the call in the frame's registers: the
    /// result lands in `a0` and `epc` moves past the instruction.
    pub fn ecall(&mut self) -> SyscallOutcome {
        let (n, args) = self.frame.syscall_args();
        let outcome = self.syscall(n, args);
        if let SyscallOutcome::Returned(ret) = outcome {
            self.frame.gpr[REG_A0] = ret as u64;
            self.frame.epc += 4;
        }
        outcome
    }

    /// Reads back the initial stack the program starts on.
    pub fn stack(&self) -> Result<DecodedStack, StackError> {
        DecodedStack::decode(self.memory(), self.frame.sp())
    }
}

/// The initial user stack, as the program would read it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedStack {
    pub sp: u64,
    pub argc: u64,
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    /// Terminator included.
    pub auxv: Vec<AuxEntry>,
}

impl DecodedStack {
    pub fn decode(memory: &SimPaging, sp: u64) -> Result<Self, StackError> {
        let word = |addr: u64| memory.read_word(addr).ok_or(StackError::OutOfRange { addr });
        let string = |addr: u64| {
            memory
                .read_cstr(addr)
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or(StackError::OutOfRange { addr })
        };
        let step = WORD_BYTES as u64;

        let argc = word(sp)?;
        let mut cursor = sp + step;
        let mut argv = Vec::new();
        for _ in 0..argc {
            argv.push(string(word(cursor)?)?);
            cursor += step;
        }
        if word(cursor)? != 0 {
            return Err(StackError::OutOfRange { addr: cursor });
        }
        cursor += step;

        let mut envp = Vec::new();
        loop {
            let ptr = word(cursor)?;
            cursor += step;
            if ptr == 0 {
                break;
            }
            if envp.len() == MAX_DECODED_WORDS {
                return Err(StackError::TooManyArgs);
            }
            envp.push(string(ptr)?);
        }

        let mut auxv = Vec::new();
        loop {
            let entry = AuxEntry::new(word(cursor)?, word(cursor + step)?);
            cursor += 2 * step;
            auxv.push(entry);
            if entry.key == AT_NULL {
                break;
            }
            if auxv.len() == MAX_DECODED_WORDS {
                return Err(StackError::TooManyArgs);
            }
        }

        Ok(Self {
            sp,
            argc,
            argv,
            envp,
            auxv,
        })
    }

    pub fn aux(&self, key: u64) -> Option<u64> {
        self.auxv.iter().find(|e| e.key == key).map(|e| e.value)
    }
}

/// Boots the kernel against a [`HostServer`].
pub struct Simulator<const HARD_FLOAT: bool = true> {
    config: SimConfig,
    frontend: &'static Frontend<HostServer, SimClock>,
}

impl<const HARD_FLOAT: bool> Simulator<HARD_FLOAT> {
    /// The host-call channel lives for the rest of the process.
    pub fn new(config: SimConfig, host: HostServer) -> Self {
        let frontend = Box::leak(Box::new(Frontend::new(host, SimClock::new())));
        Self { config, frontend }
    }

    pub fn host(&self) -> &HostServer {
        self.frontend.transport()
    }

    pub fn frontend(&self) -> &'static Frontend<HostServer, SimClock> {
        self.frontend
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs the boot path on a fresh hart until the program is started or
    /// the session ends.
    pub fn boot(&self) -> Outcome<HARD_FLOAT> {
        let machine = SimMachine::new(self.config.clone(), self.frontend.clock().clone());
        let paging = SimPaging::new(self.config.mem_size);
        let loader = ElfSegmentLoader::new(HostImageSource::new(self.frontend));
        let ctx: *mut SimContext<HARD_FLOAT> = Box::into_raw(Box::new(KernelContext::new(
            machine,
            self.frontend,
            paging,
            loader,
        )));

        // SAFETY: the context is only reachable through this reference until
        // the boot path unwinds out of the closure.
        let result = catch_unwind(AssertUnwindSafe(|| -> () { kernel::boot(unsafe { &mut *ctx }) }));
        // SAFETY: every frame that borrowed the context is gone.
        let ctx = unsafe { Box::from_raw(ctx) };

        let payload = match result {
            Ok(()) => unreachable!("boot returned"),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Handoff>() {
            Ok(handoff) => {
                return Outcome::Started(Started {
                    frame: handoff.0,
                    ctx,
                });
            }
            Err(payload) => payload,
        };
        match payload.downcast::<HostExit>() {
            Ok(exit) => Outcome::Exited(exit.0),
            Err(payload) => resume_unwind(payload),
        }
    }

    /// Runs the path of a hart that is not the boot hart. Returns the number
    /// of `wfi`s it executed before hitting the configured limit.
    pub fn park_other_hart(&self) -> u64 {
        let machine = SimMachine::new(self.config.clone(), self.frontend.clock().clone());
        let result = catch_unwind(AssertUnwindSafe(|| -> () { kernel::boot_other_hart(&machine) }));
        match result {
            Ok(()) => unreachable!("parked hart returned"),
            Err(payload) => match payload.downcast::<Parked>() {
                Ok(parked) => parked.0,
                Err(payload) => resume_unwind(payload),
            },
        }
    }
}
