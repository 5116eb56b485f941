// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SMC Calling Convention function IDs and return registers.

use core::fmt::{self, Debug, Formatter};
use uuid::Uuid;

const FAST_CALL: u32 = 0x8000_0000;
const SMC64: u32 = 0x4000_0000;
const OEN_MASK: u32 = 0x3f00_0000;
const OEN_SHIFT: u8 = 24;
const SVE_HINT: u32 = 1 << 16;
const RESERVED_BITS: u32 = 0x7f << 17;

/// Returned in w0 for an unknown function ID.
pub const NOT_SUPPORTED: i32 = -1;

/// Function number of the `CALL_UID` query, common to every owning entity range.
pub const CALL_UID_NUMBER: u16 = 0xff01;
/// Function number of the `REVISION` query, common to every owning entity range.
pub const REVISION_NUMBER: u16 = 0xff03;

/// Bits 31 and 30 of a function ID.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmcccCallType {
    /// An SMC32/HVC32 fast call.
    Fast32,
    /// An SMC64/HVC64 fast call.
    Fast64,
    /// A yielding call.
    Yielding,
}

/// The Owning Entity Number, bits 29:24 of a function ID.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwningEntityNumber(pub u8);

impl OwningEntityNumber {
    /// Arm Architecture calls.
    pub const ARM_ARCHITECTURE: Self = Self(0);
    /// Silicon Partner service calls.
    pub const SIP: Self = Self(2);
}

/// An SMCCC function ID.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Builds a function ID from its fields.
    pub const fn new(call_type: SmcccCallType, oen: OwningEntityNumber, number: u16) -> Self {
        let type_bits = match call_type {
            SmcccCallType::Fast32 => FAST_CALL,
            SmcccCallType::Fast64 => FAST_CALL | SMC64,
            SmcccCallType::Yielding => 0,
        };
        Self(type_bits | (((oen.0 as u32) << OEN_SHIFT) & OEN_MASK) | (number as u32))
    }

    /// Returns the owning entity.
    pub fn oen(self) -> OwningEntityNumber {
        OwningEntityNumber(((self.0 & OEN_MASK) >> OEN_SHIFT) as u8)
    }

    /// Returns the function number within the owning entity's range.
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns the call type.
    pub fn call_type(self) -> SmcccCallType {
        if self.0 & FAST_CALL != 0 {
            if self.0 & SMC64 != 0 {
                SmcccCallType::Fast64
            } else {
                SmcccCallType::Fast32
            }
        } else {
            SmcccCallType::Yielding
        }
    }

    /// Sets the SVE hint bit.
    pub fn set_sve_hint(&mut self) {
        self.0 |= SVE_HINT
    }

    /// Clears the SVE hint bit.
    ///
    /// The hint must be ignored for the purpose of function identification.
    pub fn clear_sve_hint(&mut self) {
        self.0 &= !SVE_HINT
    }

    /// Returns whether the reserved bits 23:17 are clear, which is only required of fast calls.
    pub fn valid(self) -> bool {
        self.call_type() == SmcccCallType::Yielding || self.0 & RESERVED_BITS == 0
    }
}

impl Debug for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:#010x} ({:?} OEN {})",
            self.0,
            self.call_type(),
            self.oen().0
        )
    }
}

/// Returns the 32-bit argument in register `index`.
///
/// SMC32 callers may leave garbage in the upper half of the argument registers, so only the low 32
/// bits are meaningful.
pub fn arg32(regs: &[u64; SmcReturn::MAX_VALUES], index: usize) -> u32 {
    regs[index] as u32
}

/// The registers an SMC handler writes back to its caller, from x0 upwards.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct SmcReturn {
    /// How many of `values`, from the start, are written back.
    used: usize,
    values: [u64; Self::MAX_VALUES],
}

impl SmcReturn {
    /// The maximum number of registers an SMC call can return.
    pub const MAX_VALUES: usize = 18;

    /// A return which leaves every register of the caller unchanged.
    pub const EMPTY: Self = Self {
        used: 0,
        values: [0; 18],
    };

    /// Returns the values written back.
    pub fn values(&self) -> &[u64] {
        &self.values[0..self.used]
    }

    /// Returns whether the caller's registers are left untouched.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

impl Debug for SmcReturn {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "SmcReturn([")?;
        for (i, value) in self.values().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value:#x}")?;
        }
        write!(f, "])")
    }
}

impl From<()> for SmcReturn {
    fn from(_: ()) -> Self {
        Self::EMPTY
    }
}

impl From<u64> for SmcReturn {
    fn from(value: u64) -> Self {
        Self::from([value])
    }
}

impl From<u32> for SmcReturn {
    fn from(value: u32) -> Self {
        Self::from(u64::from(value))
    }
}

/// Negative status codes are sign extended to the full register width.
impl From<i32> for SmcReturn {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value) as u64)
    }
}

/// A UUID goes in w0-w3, four bytes per register, little-endian, starting from byte 0.
impl From<Uuid> for SmcReturn {
    fn from(value: Uuid) -> Self {
        let mut words = [0; 4];
        for (word, chunk) in words.iter_mut().zip(value.as_bytes().chunks_exact(4)) {
            *word = u64::from(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Self::from(words)
    }
}

impl<const N: usize> From<[u64; N]> for SmcReturn {
    fn from(value: [u64; N]) -> Self {
        const {
            assert!(N <= SmcReturn::MAX_VALUES);
        }
        let mut values = [0; Self::MAX_VALUES];
        values[..N].copy_from_slice(&value);
        Self { used: N, values }
    }
}
