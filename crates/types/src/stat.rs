use static_assertions::const_assert_eq;

use crate::SerializeField;

/// File status as the front end reports it: thirteen little-endian words.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrontendStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u64,
    pub nlink: u64,
    pub uid: u64,
    pub gid: u64,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl FrontendStat {
    pub const SIZE: usize = core::mem::size_of::<FrontendStat>();
}

const_assert_eq!(FrontendStat::SIZE, 13 * 8);

/// `struct stat` as RISC-V Linux user programs expect it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub __pad1: u64,
    pub st_size: i64,
    pub st_blksize: i32,
    pub __pad2: i32,
    pub st_blocks: i64,
    pub st_atime: i64,
    pub st_atime_nsec: i64,
    pub st_mtime: i64,
    pub st_mtime_nsec: i64,
    pub st_ctime: i64,
    pub st_ctime_nsec: i64,
    pub __unused4: u32,
    pub __unused5: u32,
}

impl Stat {
    pub const SIZE: usize = core::mem::size_of::<Stat>();

    pub fn to_bytes(&self) -> [u8; Stat::SIZE] {
        let mut buf = [0u8; Stat::SIZE];
        let mut offset = 0;
        self.st_dev.serialize_field(&mut buf, &mut offset);
        self.st_ino.serialize_field(&mut buf, &mut offset);
        self.st_mode.serialize_field(&mut buf, &mut offset);
        self.st_nlink.serialize_field(&mut buf, &mut offset);
        self.st_uid.serialize_field(&mut buf, &mut offset);
        self.st_gid.serialize_field(&mut buf, &mut offset);
        self.st_rdev.serialize_field(&mut buf, &mut offset);
        self.__pad1.serialize_field(&mut buf, &mut offset);
        self.st_size.serialize_field(&mut buf, &mut offset);
        self.st_blksize.serialize_field(&mut buf, &mut offset);
        self.__pad2.serialize_field(&mut buf, &mut offset);
        self.st_blocks.serialize_field(&mut buf, &mut offset);
        self.st_atime.serialize_field(&mut buf, &mut offset);
        self.st_atime_nsec.serialize_field(&mut buf, &mut offset);
        self.st_mtime.serialize_field(&mut buf, &mut offset);
        self.st_mtime_nsec.serialize_field(&mut buf, &mut offset);
        self.st_ctime.serialize_field(&mut buf, &mut offset);
        self.st_ctime_nsec.serialize_field(&mut buf, &mut offset);
        self.__unused4.serialize_field(&mut buf, &mut offset);
        self.__unused5.serialize_field(&mut buf, &mut offset);
        buf
    }
}

const_assert_eq!(Stat::SIZE, 128);

impl From<&FrontendStat> for Stat {
    fn from(src: &FrontendStat) -> Self {
        Stat {
            st_dev: src.dev,
            st_ino: src.ino,
            st_mode: src.mode as u32,
            st_nlink: src.nlink as u32,
            st_uid: src.uid as u32,
            st_gid: src.gid as u32,
            st_rdev: src.rdev,
            st_size: src.size as i64,
            st_blksize: src.blksize as i32,
            st_blocks: src.blocks as i64,
            st_atime: src.atime as i64,
            st_mtime: src.mtime as i64,
            st_ctime: src.ctime as i64,
            ..Stat::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_lands_fields_at_linux_offsets() {
        let fs = FrontendStat {
            dev: 1,
            ino: 2,
            mode: 0o100644,
            nlink: 1,
            size: 4096,
            blksize: 512,
            blocks: 8,
            mtime: 1_700_000_000,
            ..FrontendStat::default()
        };
        let bytes = Stat::from(&fs).to_bytes();
        let word = |off: usize| u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
        let half = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());

        assert_eq!(word(0), 1);
        assert_eq!(word(8), 2);
        assert_eq!(half(16), 0o100644);
        assert_eq!(half(20), 1);
        assert_eq!(word(48), 4096);
        assert_eq!(half(56), 512);
        assert_eq!(word(64), 8);
        assert_eq!(word(88), 1_700_000_000);
    }
}
