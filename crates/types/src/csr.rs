use bitflags::bitflags;

bitflags! {
    /// `mstatus` fields. `sstatus` is the supervisor view of the same register
    /// and uses the same bit positions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Mstatus: u64 {
        const SIE  = 1 << 1;
        const MIE  = 1 << 3;
        const SPIE = 1 << 5;
        const MPIE = 1 << 7;
        const SPP  = 1 << 8;
        const VS   = 3 << 9;
        const MPP  = 3 << 11;
        const FS   = 3 << 13;
        const XS   = 3 << 15;
        const SUM  = 1 << 18;
        const MXR  = 1 << 19;
    }
}

const MPP_SHIFT: u32 = 11;

#[repr(u64)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    User = 0,
    Supervisor = 1,
    Machine = 3,
}

impl Mstatus {
    /// Replaces the MPP field, the mode `mret` returns to.
    pub fn with_mpp(self, mode: Privilege) -> Self {
        let cleared = self.difference(Mstatus::MPP).bits();
        Mstatus::from_bits_retain(cleared | ((mode as u64) << MPP_SHIFT))
    }

    pub fn mpp(self) -> Option<Privilege> {
        match (self.bits() & Mstatus::MPP.bits()) >> MPP_SHIFT {
            0 => Some(Privilege::User),
            1 => Some(Privilege::Supervisor),
            3 => Some(Privilege::Machine),
            _ => None,
        }
    }
}

pub const SATP_MODE_SHIFT: u32 = 60;
pub const SATP_MODE_BARE: u64 = 0;
pub const SATP_MODE_SV39: u64 = 8;

/// The translation mode the kernel asks for.
pub const VM_CHOICE: u64 = SATP_MODE_SV39;

pub const fn satp_mode(satp: u64) -> u64 {
    satp >> SATP_MODE_SHIFT
}

pub const fn satp_with_mode(mode: u64) -> u64 {
    mode << SATP_MODE_SHIFT
}

/// Counter-enable value granting the lower mode every counter.
pub const COUNTERS_ALL: u64 = !0;

/// Event selectors programmed into `mhpmevent5`/`mhpmevent6`.
pub const HPM_EVENT5: u64 = 0x103;
pub const HPM_EVENT6: u64 = 0x203;

bitflags! {
    /// Access rights requested when mapping a user region.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Protection: u8 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
    }
}

impl Protection {
    /// ELF `p_flags` (`PF_X = 1`, `PF_W = 2`, `PF_R = 4`) to protection bits.
    pub fn from_elf_flags(flags: u32) -> Self {
        let mut prot = Protection::empty();
        if flags & 4 != 0 {
            prot |= Protection::READ;
        }
        if flags & 2 != 0 {
            prot |= Protection::WRITE;
        }
        if flags & 1 != 0 {
            prot |= Protection::EXEC;
        }
        prot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mpp_round_trips_every_mode() {
        for mode in [Privilege::User, Privilege::Supervisor, Privilege::Machine] {
            let ms = (Mstatus::FS | Mstatus::MPP).with_mpp(mode);
            assert_eq!(ms.mpp(), Some(mode));
            assert!(ms.contains(Mstatus::FS));
        }
    }

    #[test]
    fn satp_mode_lives_in_the_top_nibble() {
        assert_eq!(satp_with_mode(SATP_MODE_SV39), 8 << 60);
        assert_eq!(satp_mode(satp_with_mode(SATP_MODE_SV39) | 0x1234), SATP_MODE_SV39);
    }

    #[test]
    fn elf_flags_map_to_protection() {
        assert_eq!(Protection::from_elf_flags(5), Protection::READ | Protection::EXEC);
        assert_eq!(Protection::from_elf_flags(6), Protection::READ | Protection::WRITE);
    }
}
