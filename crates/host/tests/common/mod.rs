#![allow(dead_code)]

use host::{HostServer, Outcome, SimConfig, Simulator, Started};
use loader::ElfImageBuilder;

pub const ENTRY: u64 = 0x1_0000;
pub const DATA: u64 = 0x1_1000;
pub const DATA_SIZE: u64 = 0x2000;
/// Zero-filled scratch space inside the data segment.
pub const SCRATCH: u64 = 0x1_2000;

pub const HELLO: u64 = DATA;
pub const INPUT_PATH: u64 = DATA + 6;
pub const OUTPUT_PATH: u64 = DATA + 16;
/// 300 bytes without a NUL.
pub const LONG_PATH: u64 = DATA + 24;

/// `nop`s.
pub const CODE: [u8; 16] = [
    0x13, 0, 0, 0, 0x13, 0, 0, 0, 0x13, 0, 0, 0, 0x13, 0, 0, 0,
];

pub fn data_init() -> Vec<u8> {
    let mut init = Vec::new();
    init.extend_from_slice(b"hello\0");
    init.extend_from_slice(b"input.txt\0");
    init.extend_from_slice(b"out.txt\0");
    init.extend(std::iter::repeat_n(b'a', 300));
    init
}

/// A static executable with a text page and a data page followed by bss.
pub fn program() -> Vec<u8> {
    ElfImageBuilder::new(ENTRY)
        .text(ENTRY, &CODE)
        .data(DATA, &data_init(), DATA_SIZE)
        .build()
}

pub fn server(args: &[&str]) -> HostServer {
    let mut argv = vec!["pk"];
    argv.extend_from_slice(args);
    HostServer::new(&argv).with_file("prog", program())
}

pub fn boot(args: &[&str]) -> (Simulator, Outcome) {
    boot_with(SimConfig::default(), server(args))
}

pub fn boot_with(config: SimConfig, server: HostServer) -> (Simulator, Outcome) {
    let sim = Simulator::new(config, server);
    let outcome = sim.boot();
    (sim, outcome)
}

pub fn start(args: &[&str]) -> (Simulator, Started) {
    let (sim, outcome) = boot(args);
    match outcome {
        Outcome::Started(started) => (sim, started),
        Outcome::Exited(code) => panic!(
            "boot exited with {code}, output:\n{}",
            sim.host().stdout()
        ),
    }
}
