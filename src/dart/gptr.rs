use super::translation::LogicalSegId;

/// A global pointer: one byte of globally addressable memory.
///
/// `segid == 0` designates the private segment of `unit`, otherwise `segid` is the logical id
/// of a collective allocation of the team whose team-list index is carried in `flags`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub struct GlobalPtr {
    /// Absolute unit id.
    pub unit: u32,
    pub segid: LogicalSegId,
    /// Team-list index of the owning team.
    pub flags: u16,
    pub offset: u64,
}

impl GlobalPtr {
    pub const NULL: GlobalPtr = GlobalPtr {
        unit: 0,
        segid: 0,
        flags: 0,
        offset: 0,
    };

    pub fn new(unit: usize, segid: LogicalSegId, team_index: u16, offset: u64) -> GlobalPtr {
        GlobalPtr {
            unit: unit as u32,
            segid,
            flags: team_index,
            offset,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == GlobalPtr::NULL
    }

    pub fn unit(&self) -> usize {
        self.unit as usize
    }

    pub fn team_index(&self) -> usize {
        self.flags as usize
    }

    pub fn is_private(&self) -> bool {
        self.segid == 0
    }

    pub fn set_unit(&mut self, unit: usize) {
        self.unit = unit as u32;
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Moves the pointer by `delta` bytes within its segment.
    pub fn inc_addr(&mut self, delta: i64) {
        self.offset = self.offset.wrapping_add_signed(delta);
    }

    /// A copy moved by `delta` bytes.
    pub fn add(mut self, delta: i64) -> GlobalPtr {
        self.inc_addr(delta);
        self
    }

    /// 128-bit wire form: `unit | segid << 32 | flags << 48 | offset << 64`.
    pub fn to_bits(&self) -> u128 {
        (self.unit as u128)
            | ((self.segid as u16 as u128) << 32)
            | ((self.flags as u128) << 48)
            | ((self.offset as u128) << 64)
    }

    pub fn from_bits(bits: u128) -> GlobalPtr {
        GlobalPtr {
            unit: bits as u32,
            segid: (bits >> 32) as u16 as i16,
            flags: (bits >> 48) as u16,
            offset: (bits >> 64) as u64,
        }
    }
}

impl std::fmt::Display for GlobalPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "gptr(unit {}, seg {}, team {}, offset {:#x})",
            self.unit, self.segid, self.flags, self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_form() {
        let gptr = GlobalPtr::new(7, -3, 2, 0xdead_beef_0000_0010);
        let bits = gptr.to_bits();
        assert_eq!(bits as u32, 7);
        assert_eq!((bits >> 48) as u16, 2);
        assert_eq!(GlobalPtr::from_bits(bits), gptr);
        assert_eq!(GlobalPtr::NULL.to_bits(), 0);
        assert_eq!(std::mem::size_of::<u128>(), 16);
    }

    #[test]
    fn arithmetic() {
        let mut gptr = GlobalPtr::new(1, 4, 0, 100);
        gptr.inc_addr(28);
        assert_eq!(gptr.offset, 128);
        gptr.inc_addr(-100);
        assert_eq!(gptr.offset, 28);
        assert_eq!(gptr.add(4).offset, 32);
        gptr.set_unit(3);
        assert_eq!(gptr.unit(), 3);
        gptr.set_offset(0);
        assert!(!gptr.is_null());
        assert!(!gptr.is_private());
        assert!(GlobalPtr::default().is_null());
    }
}
