//! Wire layout of the `getmainvars` reply.
//!
//! The host fills a kernel buffer with `argc`, then `argc` absolute string
//! addresses, then two zero words (empty envp and its terminator), then the
//! NUL-terminated strings themselves.

use crate::WORD_BYTES;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TooLarge {
    pub needed: usize,
    pub limit: usize,
}

/// Bytes needed to pack `args`.
pub fn packed_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    let words = args.len() + 3;
    let strings: usize = args.iter().map(|a| a.as_ref().len() + 1).sum();
    words * WORD_BYTES + strings
}

/// Packs `args` into `dst`, whose first byte lives at address `base`.
pub fn pack<A: AsRef<[u8]>>(dst: &mut [u8], base: u64, args: &[A]) -> Result<usize, TooLarge> {
    let needed = packed_len(args);
    if needed > dst.len() {
        return Err(TooLarge {
            needed,
            limit: dst.len(),
        });
    }

    let mut put_word = |index: usize, value: u64| {
        let off = index * WORD_BYTES;
        dst[off..off + WORD_BYTES].copy_from_slice(&value.to_le_bytes());
    };
    let argc = args.len();
    put_word(0, argc as u64);

    let mut cursor = (argc + 3) * WORD_BYTES;
    let mut addrs = cursor;
    for (i, arg) in args.iter().enumerate() {
        put_word(1 + i, base + addrs as u64);
        addrs += arg.as_ref().len() + 1;
    }
    put_word(argc + 1, 0);
    put_word(argc + 2, 0);

    for arg in args {
        let bytes = arg.as_ref();
        dst[cursor..cursor + bytes.len()].copy_from_slice(bytes);
        dst[cursor + bytes.len()] = 0;
        cursor += bytes.len() + 1;
    }
    Ok(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointers_are_absolute_and_strings_follow_the_words() {
        let mut buf = [0xffu8; 128];
        let used = pack(&mut buf, 0x1000, &["pk", "hello"]).unwrap();
        let word = |i: usize| u64::from_le_bytes(buf[i * 8..i * 8 + 8].try_into().unwrap());

        assert_eq!(used, packed_len(&["pk", "hello"]));
        assert_eq!(word(0), 2);
        assert_eq!(word(1), 0x1000 + 40);
        assert_eq!(word(2), 0x1000 + 43);
        assert_eq!(word(3), 0);
        assert_eq!(word(4), 0);
        assert_eq!(&buf[40..49], b"pk\0hello\0");
    }

    #[test]
    fn oversized_argument_lists_are_refused() {
        let mut buf = [0u8; 32];
        let err = pack(&mut buf, 0, &["a-rather-long-program-name"]).unwrap_err();
        assert_eq!(err.limit, 32);
        assert!(err.needed > 32);
    }
}
