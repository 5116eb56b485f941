// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The read-only timing table: supported frequency points and the register programs for each.

use arrayvec::ArrayVec;
use core::{
    fmt::{self, Display, Formatter},
    slice::Iter,
};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The maximum number of frequency points a timing table may describe.
pub const MAX_FREQUENCY_POINTS: usize = 4;

/// Magic number at the start of a timing table blob.
pub const TIMING_BLOB_MAGIC: u32 = 0x5444_4653;

/// Value of a fast switch index field in a timing table blob meaning "not supported".
pub const TIMING_BLOB_NO_FAST_SWITCH: u32 = u32::MAX;

/// Identifies a frequency point by its position in the timing table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrequencyIndex(pub u8);

impl Display for FrequencyIndex {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// One supported DRAM operating point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrequencyPoint {
    /// Position of the point in the timing table.
    pub index: FrequencyIndex,
    /// Data rate in mega-transfers per second.
    pub data_rate: u32,
    /// Whether the point is reached through the bypass divider rather than by relocking the PLL.
    pub bypass: bool,
}

/// A single `(offset, value)` pair of a register program.
#[derive(Clone, Copy, Debug, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct RegisterValue {
    /// Register offset within the program's target window.
    pub offset: u32,
    /// Value to write.
    pub value: u32,
}

impl RegisterValue {
    /// Creates a new register program entry.
    pub const fn new(offset: u32, value: u32) -> Self {
        Self { offset, value }
    }
}

/// An ordered list of register writes.
///
/// Programs only contain configuration registers, so applying the same program twice in a row
/// leaves the hardware in the same state as applying it once.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegisterProgram(&'static [RegisterValue]);

impl RegisterProgram {
    /// Wraps the given entries.
    pub const fn new(entries: &'static [RegisterValue]) -> Self {
        Self(entries)
    }

    /// Returns the entries, in the order they must be written.
    pub fn entries(&self) -> &'static [RegisterValue] {
        self.0
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> Iter<'static, RegisterValue> {
        self.0.iter()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the program has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the timing table holds for one frequency point.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FrequencyPointTimings {
    /// Data rate in mega-transfers per second.
    pub data_rate: u32,
    /// Whether the point uses the bypass divider.
    pub bypass: bool,
    /// Controller timing registers.
    pub controller: RegisterProgram,
    /// PHY initialisation registers.
    pub phy_init: RegisterProgram,
    /// Trained PHY CSRs captured at boot.
    pub phy_trained_csr: RegisterProgram,
    /// PHY initialisation engine image.
    pub phy_pie: RegisterProgram,
    /// Mode register values; the offset is the mode register number.
    pub mode_registers: RegisterProgram,
}

/// The pair of frequency points the hardware sequencer can switch between on its own.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FastSwitchPoints {
    /// The point used in full speed mode.
    pub full: FrequencyIndex,
    /// The point used in half speed mode.
    pub half: FrequencyIndex,
}

/// Reasons a timing table can't be built.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum TimingTableError {
    /// The table has no frequency points.
    #[error("timing table has no frequency points")]
    Empty,
    /// The table has more frequency points than are supported.
    #[error("timing table has {0} frequency points")]
    TooManyPoints(usize),
    /// The blob doesn't start with the expected magic number.
    #[error("bad timing blob magic {0:#010x}")]
    BadMagic(u32),
    /// The blob is truncated or misaligned.
    #[error("timing blob is truncated or misaligned")]
    Malformed,
    /// A fast switch point refers to a frequency point which doesn't exist.
    #[error("fast switch point {0} is out of range")]
    FastSwitchIndex(FrequencyIndex),
}

/// The catalogue of supported frequency points, built once at boot and read-only afterwards.
#[derive(Clone, Debug)]
pub struct TimingTable {
    points: ArrayVec<FrequencyPointTimings, MAX_FREQUENCY_POINTS>,
    fast_switch: Option<FastSwitchPoints>,
}

impl TimingTable {
    /// Builds a timing table from the given points. The index of each point is its position.
    pub fn new(
        points: impl IntoIterator<Item = FrequencyPointTimings>,
        fast_switch: Option<FastSwitchPoints>,
    ) -> Result<Self, TimingTableError> {
        let mut table = ArrayVec::new();
        let mut count = 0;
        for point in points {
            count += 1;
            if table.try_push(point).is_err() {
                continue;
            }
        }
        if count > MAX_FREQUENCY_POINTS {
            return Err(TimingTableError::TooManyPoints(count));
        }
        if table.is_empty() {
            return Err(TimingTableError::Empty);
        }
        if let Some(fast) = fast_switch {
            for index in [fast.full, fast.half] {
                if usize::from(index.0) >= table.len() {
                    return Err(TimingTableError::FastSwitchIndex(index));
                }
            }
        }
        Ok(Self {
            points: table,
            fast_switch,
        })
    }

    /// Parses a timing table blob handed over by the boot loader.
    ///
    /// The blob is a sequence of 32-bit words in the boot CPU's byte order and must be 4-byte
    /// aligned. It starts with a [`BlobHeader`], followed by one [`BlobPoint`] per frequency point,
    /// followed by the `(offset, value)` pairs of every list of every point, in the same order as
    /// the lengths in the point records.
    pub fn from_blob(blob: &'static [u8]) -> Result<Self, TimingTableError> {
        let (header, mut rest) =
            BlobHeader::ref_from_prefix(blob).map_err(|_| TimingTableError::Malformed)?;
        if header.magic != TIMING_BLOB_MAGIC {
            return Err(TimingTableError::BadMagic(header.magic));
        }
        let point_count = header.point_count as usize;
        if point_count > MAX_FREQUENCY_POINTS {
            return Err(TimingTableError::TooManyPoints(point_count));
        }

        let records;
        (records, rest) = <[BlobPoint]>::ref_from_prefix_with_elems(rest, point_count)
            .map_err(|_| TimingTableError::Malformed)?;

        let mut points = ArrayVec::<_, MAX_FREQUENCY_POINTS>::new();
        for record in records {
            let mut programs = [RegisterProgram::default(); 5];
            for (program, &length) in programs.iter_mut().zip(&record.lengths) {
                let entries;
                (entries, rest) =
                    <[RegisterValue]>::ref_from_prefix_with_elems(rest, length as usize)
                        .map_err(|_| TimingTableError::Malformed)?;
                *program = RegisterProgram::new(entries);
            }
            let [controller, phy_init, phy_trained_csr, phy_pie, mode_registers] = programs;
            points.push(FrequencyPointTimings {
                data_rate: record.data_rate,
                bypass: record.flags & BlobPoint::FLAG_BYPASS != 0,
                controller,
                phy_init,
                phy_trained_csr,
                phy_pie,
                mode_registers,
            });
        }

        let fast_switch = match (header.fast_full, header.fast_half) {
            (TIMING_BLOB_NO_FAST_SWITCH, _) | (_, TIMING_BLOB_NO_FAST_SWITCH) => None,
            (full, half) => {
                let index = |value: u32| {
                    u8::try_from(value)
                        .map(FrequencyIndex)
                        .map_err(|_| TimingTableError::Malformed)
                };
                Some(FastSwitchPoints {
                    full: index(full)?,
                    half: index(half)?,
                })
            }
        };

        Self::new(points, fast_switch)
    }

    /// Returns the number of frequency points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns whether the table has no frequency points. This is never true for a constructed
    /// table.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the frequency point with the given index, if it exists.
    pub fn point(&self, index: FrequencyIndex) -> Option<FrequencyPoint> {
        self.timings(index).map(|timings| FrequencyPoint {
            index,
            data_rate: timings.data_rate,
            bypass: timings.bypass,
        })
    }

    /// Returns the register programs of the frequency point with the given index, if it exists.
    pub fn timings(&self, index: FrequencyIndex) -> Option<&FrequencyPointTimings> {
        self.points.get(usize::from(index.0))
    }

    /// Returns the points the hardware sequencer can switch between, if any.
    pub fn fast_switch(&self) -> Option<FastSwitchPoints> {
        self.fast_switch
    }
}

/// Header of a timing table blob.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct BlobHeader {
    /// Must be [`TIMING_BLOB_MAGIC`].
    pub magic: u32,
    /// Number of [`BlobPoint`] records which follow.
    pub point_count: u32,
    /// Full speed point for the hardware sequencer, or [`TIMING_BLOB_NO_FAST_SWITCH`].
    pub fast_full: u32,
    /// Half speed point for the hardware sequencer, or [`TIMING_BLOB_NO_FAST_SWITCH`].
    pub fast_half: u32,
}

/// Per frequency point record of a timing table blob.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct BlobPoint {
    /// Data rate in mega-transfers per second.
    pub data_rate: u32,
    /// `FLAG_*` bits.
    pub flags: u32,
    /// Entry counts of the controller, PHY init, PHY trained CSR, PHY PIE and mode register lists.
    pub lengths: [u32; 5],
}

impl BlobPoint {
    /// The point uses the bypass divider.
    pub const FLAG_BYPASS: u32 = 1 << 0;
}
