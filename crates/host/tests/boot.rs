mod common;

use common::*;
use goblin::elf::header::ET_DYN;
use host::{HostServer, Outcome, SIM_TRAP_VECTOR, SimConfig, Simulator};
use kernel::Csr;
use loader::ElfImageBuilder;
use proptest::prelude::*;
use types::auxv::{
    AT_ENTRY, AT_NULL, AT_PAGESZ, AT_PHDR, AT_PHENT, AT_PHNUM, AT_RANDOM, AT_SECURE, AUXV_KEYS,
};
use types::csr::{COUNTERS_ALL, HPM_EVENT5, HPM_EVENT6, Mstatus, Privilege};
use types::syscall::SYS_GETMAINVARS;
use types::trapframe::REG_SP;
use types::{PAGE_SIZE, ProcessImage};

fn assert_layout(image: &ProcessImage) {
    assert!(image.brk_min <= image.brk, "{image:?}");
    assert!(image.brk <= image.brk_max, "{image:?}");
    assert!(image.brk_max <= image.mmap_max, "{image:?}");
    assert!(image.mmap_max < image.stack_top, "{image:?}");
}

#[test]
fn program_starts_on_its_own_argument_vector() {
    let (_sim, started) = start(&["prog", "one", "two"]);
    let stack = started.stack().unwrap();

    assert_eq!(stack.argc, 3);
    assert_eq!(stack.argv, ["prog", "one", "two"]);
    assert!(stack.envp.is_empty());
    assert_eq!(stack.sp % 16, 0);
    assert_eq!(started.frame.sp(), stack.sp);
    assert_eq!(started.frame.epc, ENTRY);
}

#[test]
fn auxiliary_vector_describes_the_image() {
    let (_sim, started) = start(&["prog"]);
    let stack = started.stack().unwrap();
    let image = started.image();

    let keys: Vec<u64> = stack.auxv.iter().map(|e| e.key).collect();
    assert_eq!(keys, AUXV_KEYS);
    assert_eq!(stack.auxv.last().unwrap().value, 0);

    assert_eq!(stack.aux(AT_ENTRY), Some(ENTRY));
    assert_eq!(stack.aux(AT_PHNUM), Some(2));
    assert_eq!(stack.aux(AT_PHENT), Some(56));
    assert_eq!(stack.aux(AT_PHDR), Some(image.phdr));
    assert_eq!(stack.aux(AT_PAGESZ), Some(PAGE_SIZE));
    assert_eq!(stack.aux(AT_SECURE), Some(0));
    let random = stack.aux(AT_RANDOM).unwrap();
    assert!(random > stack.sp && random < image.stack_top);
    assert_eq!(random % 8, 0);
}

#[test]
fn program_header_table_is_copied_onto_the_stack() {
    let (_sim, started) = start(&["prog"]);
    let image = started.image();
    let elf = program();

    assert_eq!(image.phdr_size, 2 * 56);
    assert!(image.phdr > image.mmap_max && image.phdr < image.stack_top);
    let on_stack = started.memory().bytes(image.phdr, image.phdr_size).unwrap();
    assert_eq!(on_stack, &elf[64..64 + 112]);
}

#[test]
fn segments_are_loaded_and_bss_is_zeroed() {
    let (_sim, started) = start(&["prog"]);
    let mem = started.memory();

    assert_eq!(mem.bytes(ENTRY, CODE.len() as u64).unwrap(), CODE);
    let init = data_init();
    assert_eq!(mem.bytes(DATA, init.len() as u64).unwrap(), init.as_slice());
    let bss_start = DATA + init.len() as u64;
    assert!(
        mem.bytes(bss_start, DATA + DATA_SIZE - bss_start)
            .unwrap()
            .iter()
            .all(|b| *b == 0)
    );

    let image = started.image();
    assert_eq!(image.brk_min, DATA + DATA_SIZE);
    assert_eq!(image.brk, image.brk_min);
    assert_layout(image);
}

#[test]
fn initial_frame_drops_to_user_mode_with_interrupts_pending_enable() {
    let (_sim, started) = start(&["prog"]);
    let frame = started.frame;

    let status = Mstatus::from_bits_retain(frame.status);
    assert!(status.contains(Mstatus::SPIE));
    assert!(!status.contains(Mstatus::SPP));
    assert!(!status.contains(Mstatus::SIE));
    for (i, reg) in frame.gpr.iter().enumerate() {
        if i != REG_SP {
            assert_eq!(*reg, 0, "x{i}");
        }
    }

    let machine = started.machine();
    assert_eq!(machine.privilege(), Privilege::User);
    assert_eq!(machine.stack_pointer(), frame.sp());
    assert_eq!(machine.fences(), 1);
    assert_eq!(
        machine.csr(Csr::Sscratch),
        started.memory().kernel_stack_top()
    );
}

#[test]
fn supervisor_state_is_prepared_before_the_program_runs() {
    let (_sim, started) = start(&["prog"]);
    let machine = started.machine();

    assert_eq!(machine.csr(Csr::Stvec), SIM_TRAP_VECTOR);
    assert_eq!(machine.csr(Csr::Scounteren), COUNTERS_ALL);
    assert_eq!(machine.csr(Csr::Mcounteren), COUNTERS_ALL);
    assert_eq!(machine.csr(Csr::Mhpmevent5), HPM_EVENT5);
    assert_eq!(machine.csr(Csr::Mhpmevent6), HPM_EVENT6);
    assert_eq!(machine.csr(Csr::Scause), 0);
    assert_eq!(machine.csr(Csr::Sie), 0);
    assert_eq!(machine.csr(Csr::Satp), 0);

    let sstatus = Mstatus::from_bits_retain(machine.csr(Csr::Sstatus));
    assert!(sstatus.contains(Mstatus::SUM));
    assert!(sstatus.contains(Mstatus::FS));
    assert!(!sstatus.contains(Mstatus::SIE));
    // No vector unit in the default core.
    assert!(!sstatus.intersects(Mstatus::VS));

    assert!(machine.fp_zeroed());
    assert!(started.context().have_vm);
    assert!(started.memory().translating());
}

#[test]
fn kernel_options_reach_the_image_and_the_pager() {
    let (_sim, started) = start(&["-s", "-p", "prog", "arg1"]);
    let ctx = started.context();

    assert!(ctx.options.report_cycles);
    assert!(!ctx.options.demand_paging);
    assert!(!started.memory().demand_paging());
    assert_ne!(ctx.image.counters.cycle0, 0);
    assert_ne!(ctx.image.counters.instret0, 0);
    assert_eq!(ctx.image.counters.syscall_cnt, 0);

    let stack = started.stack().unwrap();
    assert_eq!(stack.argv, ["prog", "arg1"]);
}

#[test]
fn counters_are_not_snapshotted_without_reporting() {
    let (_sim, started) = start(&["prog"]);
    let ctx = started.context();
    assert!(!ctx.options.report_cycles);
    assert!(ctx.options.demand_paging);
    assert_eq!(ctx.image.counters.cycle0, 0);
}

#[test]
fn help_exits_with_zero_after_printing_usage() {
    let (sim, outcome) = boot(&["--help"]);
    assert_eq!(outcome.exit_code(), Some(0));
    let out = sim.host().stdout();
    assert!(out.contains("usage: pk [pk options] <user program> [program options]"));
    assert!(out.contains("-s"));
    assert!(out.contains("-p"));

    let (_, outcome) = boot(&["-h", "prog"]);
    assert_eq!(outcome.exit_code(), Some(0));
}

#[test]
fn unknown_option_exits_with_one_and_suggests_help() {
    let (sim, outcome) = boot(&["-z", "prog"]);
    assert_eq!(outcome.exit_code(), Some(1));
    let out = sim.host().stdout();
    assert!(out.contains("unrecognized option: `-z'"), "{out}");
    assert!(out.contains("Try 'pk --help' for more information."), "{out}");
}

#[test]
fn booting_without_a_program_is_fatal() {
    for args in [&[][..], &["-s"][..], &["-s", "-p"][..]] {
        let (sim, outcome) = boot(args);
        assert_eq!(outcome.exit_code(), Some(-1), "{args:?}");
        assert!(sim.host().stdout().contains("tell me what ELF to load!"));
    }
}

#[test]
fn oversized_command_line_is_fatal() {
    let long = "x".repeat(600);
    let args = [long.as_str(); 4];
    let (sim, outcome) = boot(&args);
    assert_eq!(outcome.exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("args must not exceed 2048 bytes"));
}

#[test]
fn wrong_hart_count_aborts_before_the_command_line_is_read() {
    for harts in [0, 2, 4] {
        let config = SimConfig {
            harts,
            ..SimConfig::default()
        };
        let (sim, outcome) = boot_with(config, server(&["prog"]));
        assert_eq!(outcome.exit_code(), Some(-1), "{harts} harts");
        assert_eq!(sim.host().calls_of(SYS_GETMAINVARS), 0);
        let out = sim.host().stdout();
        if harts == 0 {
            assert!(out.contains("could not determine number of harts"));
        } else {
            assert!(out.contains("only one hart is supported"));
        }
    }
}

#[test]
fn machine_without_memory_or_supervisor_mode_is_rejected() {
    let config = SimConfig {
        mem_size: 0,
        ..SimConfig::default()
    };
    let (sim, outcome) = boot_with(config, server(&["prog"]));
    assert_eq!(outcome.exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("could not determine memory capacity"));

    let config = SimConfig {
        isa: "imafdcu".into(),
        ..SimConfig::default()
    };
    let (sim, outcome) = boot_with(config, server(&["prog"]));
    assert_eq!(outcome.exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("supervisor support is required"));
    assert!(sim.host().requests().iter().all(|r| r[0] != SYS_GETMAINVARS));
}

#[test]
fn float_abi_must_match_the_core() {
    let sim = Simulator::<true>::new(SimConfig::default().soft_float(), server(&["prog"]));
    assert_eq!(sim.boot().exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("FPU not found"));

    let sim = Simulator::<false>::new(SimConfig::default(), server(&["prog"]));
    assert_eq!(sim.boot().exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("FPU unexpectedly found"));

    let sim = Simulator::<false>::new(SimConfig::default().soft_float(), server(&["prog"]));
    let started = sim.boot().started().unwrap();
    assert!(!started.machine().fp_zeroed());
    let sstatus = Mstatus::from_bits_retain(started.machine().csr(Csr::Sstatus));
    assert!(!sstatus.intersects(Mstatus::FS));
}

#[test]
fn refused_translation_mode_degrades_to_physical_addressing() {
    let config = SimConfig {
        translation: false,
        ..SimConfig::default()
    };
    let (_sim, outcome) = boot_with(config, server(&["prog"]));
    let started = outcome.started().unwrap();
    assert!(!started.context().have_vm);
    assert!(!started.memory().translating());
    assert_eq!(started.stack().unwrap().argv, ["prog"]);
}

#[test]
fn missing_or_foreign_programs_are_fatal() {
    let (sim, outcome) = boot(&["nope"]);
    assert_eq!(outcome.exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("could not open the program file"));

    let dynamic = ElfImageBuilder::new(ENTRY)
        .interpreter("/lib/ld-linux-riscv64-lp64d.so.1")
        .text(ENTRY, &CODE)
        .build();
    let server = HostServer::new(&["pk", "dyn"]).with_file("dyn", dynamic);
    let (sim, outcome) = boot_with(SimConfig::default(), server);
    assert_eq!(outcome.exit_code(), Some(-1));
    assert!(sim.host().stdout().contains("dynamically linked"));

    let server = HostServer::new(&["pk", "junk"]).with_file("junk", b"#!/bin/sh\n".to_vec());
    let (_, outcome) = boot_with(SimConfig::default(), server);
    assert_eq!(outcome.exit_code(), Some(-1));
}

#[test]
fn position_independent_programs_are_biased_by_a_page() {
    let pie = ElfImageBuilder::new(0x100)
        .e_type(ET_DYN)
        .text(0, &CODE)
        .data(0x1000, b"pie", 0x1000)
        .build();
    let server = HostServer::new(&["pk", "pie"]).with_file("pie", pie);
    let (_sim, outcome) = boot_with(SimConfig::default(), server);
    let started = outcome.started().unwrap();

    assert_eq!(started.image().bias, PAGE_SIZE);
    assert_eq!(started.frame.epc, PAGE_SIZE + 0x100);
    assert_eq!(started.stack().unwrap().aux(AT_ENTRY), Some(PAGE_SIZE + 0x100));
    assert_eq!(started.memory().bytes(PAGE_SIZE, 4).unwrap(), &CODE[..4]);
    assert_layout(started.image());
}

#[test]
fn secondary_harts_park_without_touching_the_host() {
    let config = SimConfig {
        wfi_limit: Some(3),
        ..SimConfig::default()
    };
    let sim = Simulator::<true>::new(config, server(&["prog"]));
    assert_eq!(sim.park_other_hart(), 3);
    assert!(sim.host().requests().is_empty());
}

#[test]
fn boot_outcome_is_reported_as_started_or_exited() {
    let (_, outcome) = boot(&["prog"]);
    assert!(matches!(outcome, Outcome::Started(_)));
    assert_eq!(outcome.exit_code(), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_command_line_round_trips_through_the_stack(
        args in prop::collection::vec("[a-zA-Z0-9_.=]{1,24}", 0..12),
        bss in 0u64..0x40_0000,
    ) {
        let elf = ElfImageBuilder::new(ENTRY)
            .text(ENTRY, &CODE)
            .data(DATA, b"x", bss.max(1))
            .build();
        let mut argv = vec!["pk".to_string(), "prog".to_string()];
        argv.extend(args.iter().cloned());
        let server = HostServer::new(&argv).with_file("prog", elf);
        let sim = Simulator::<true>::new(SimConfig::default(), server);
        let started = sim.boot().started().unwrap();
        let stack = started.stack().unwrap();

        prop_assert_eq!(&stack.argv[..], &argv[1..]);
        prop_assert_eq!(stack.argc as usize, argv.len() - 1);
        prop_assert_eq!(stack.sp % 16, 0);

        let keys: Vec<u64> = stack.auxv.iter().map(|e| e.key).collect();
        prop_assert_eq!(keys.len(), 8);
        prop_assert_eq!(*keys.last().unwrap(), AT_NULL);
        for key in &AUXV_KEYS[..7] {
            prop_assert_eq!(keys.iter().filter(|k| *k == key).count(), 1);
        }

        let image = started.image();
        prop_assert!(image.brk_min <= image.brk);
        prop_assert!(image.brk <= image.brk_max);
        prop_assert!(image.brk_max <= image.mmap_max);
        prop_assert!(image.mmap_max < image.stack_top);
        prop_assert!(stack.sp > image.mmap_max);
    }
}
