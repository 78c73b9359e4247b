use std::collections::HashSet;
use std::ffi::CString;

use kernel::stack::{StackArena, build_stack};
use proptest::prelude::*;
use types::ProcessImage;
use types::auxv::{AT_NULL, AUXV_KEYS, AUXV_LEN};

const BASE: u64 = 0x3f_f000_0000;
const STACK_BYTES: usize = 64 * 1024;

fn arg_strategy() -> impl Strategy<Value = Vec<CString>> {
    prop::collection::vec("[a-zA-Z0-9_./=-]{0,40}", 1..24).prop_map(|args| {
        args.into_iter()
            .map(|a| CString::new(a).expect("generated without NUL"))
            .collect()
    })
}

/// Reads the stack back the way a C runtime does.
fn decode(arena: &StackArena<'_>, sp: u64) -> (Vec<CString>, Vec<(u64, u64)>) {
    let argc = arena.read_word(sp).unwrap();
    let mut at = sp + 8;
    let mut argv = Vec::new();
    for _ in 0..argc {
        let ptr = arena.read_word(at).unwrap();
        argv.push(arena.read_cstr(ptr).unwrap().to_owned());
        at += 8;
    }
    assert_eq!(arena.read_word(at).unwrap(), 0, "argv terminator");
    at += 8;
    assert_eq!(arena.read_word(at).unwrap(), 0, "empty envp terminator");
    at += 8;

    let mut auxv = Vec::new();
    loop {
        let key = arena.read_word(at).unwrap();
        let value = arena.read_word(at + 8).unwrap();
        auxv.push((key, value));
        at += 16;
        if key == AT_NULL {
            break;
        }
    }
    (argv, auxv)
}

proptest! {
    #[test]
    fn argv_round_trips_through_the_stack(
        args in arg_strategy(),
        phnum in 1u64..16,
        entry in 0x1_0000u64..0x10_0000,
    ) {
        let mut mem = vec![0u8; STACK_BYTES];
        let mut arena = StackArena::new(&mut mem, BASE);
        let mut image = ProcessImage { entry, phnum, phent: 56, ..ProcessImage::new() };
        let phdrs = vec![0x5a; (phnum * 56) as usize];

        let st = build_stack(&mut arena, &mut image, &phdrs, args.iter().map(|a| a.as_c_str()), &[])
            .unwrap();

        prop_assert_eq!(st.sp % 16, 0);
        prop_assert!(st.sp >= arena.base());
        let (argv, auxv) = decode(&arena, st.sp);
        prop_assert_eq!(&argv, &args);

        prop_assert_eq!(auxv.len(), AUXV_LEN);
        let keys: Vec<u64> = auxv.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(&keys[..], &AUXV_KEYS[..]);
        let unique: HashSet<u64> = keys.iter().copied().collect();
        prop_assert_eq!(unique.len(), AUXV_LEN);
        prop_assert_eq!(auxv[AUXV_LEN - 1], (AT_NULL, 0));
        prop_assert_eq!(auxv[0].1, entry);
        prop_assert_eq!(auxv[1].1, phnum);
    }

    #[test]
    fn a_full_stack_fails_cleanly(len in 0usize..256) {
        let mut mem = vec![0u8; len];
        let mut arena = StackArena::new(&mut mem, BASE);
        let mut image = ProcessImage::new();
        let args = [c"some-program", c"with", c"arguments"];
        match build_stack(&mut arena, &mut image, &[0; 64], args, &[]) {
            Ok(st) => prop_assert!(st.sp >= BASE),
            Err(_) => prop_assert!(arena.sp() >= BASE),
        }
    }
}

#[test]
fn three_arguments_no_environment() {
    let mut mem = vec![0u8; 4096];
    let mut arena = StackArena::new(&mut mem, BASE);
    let mut image = ProcessImage {
        entry: 0x10078,
        phnum: 3,
        phent: 56,
        ..ProcessImage::new()
    };
    let args = [c"/bin/hello", c"-v", c"world"];
    let st = build_stack(&mut arena, &mut image, &[1; 168], args, &[]).unwrap();

    let (argv, auxv) = decode(&arena, st.sp);
    assert_eq!(argv, args.map(|a| a.to_owned()));
    assert_eq!(st.sp % 16, 0);
    assert_eq!(auxv.len(), 8);
    assert_eq!(st.argv, st.sp + 8);
}
