// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! DRAM frequency switching and retention.
//!
//! [`DramController`] ties together the register access layer, the read-only timing table and
//! the cross-core quiescence barrier, and exposes the three state machines: the software frequency
//! switch, the hardware-assisted fast switch and the retention sequence.

pub mod barrier;
pub mod dfs;
#[cfg(test)]
pub(crate) mod fake;
pub mod fast_switch;
pub mod registers;
pub mod regs;
pub mod retention;
pub mod timing;

use self::{
    barrier::{BarrierState, CoreMask, CoreSignals},
    registers::{DramRegisters, PollTimeout},
    retention::{RetentionSnapshot, RetentionState},
    timing::{FrequencyIndex, FrequencyPoint, TimingTable},
};
use num_enum::IntoPrimitive;
use spin::mutex::SpinMutex;
use thiserror::Error;
use zerocopy::FromZeros;

/// Creates a zeroed instance of the given type.
///
/// This is equivalent to `FromZeros::new_zeroed()` but const.
pub const fn const_zeroed<T: FromZeros>() -> T {
    // SAFETY: T implements `FromZeros` so it must be safe to initialise with zeros.
    unsafe { core::mem::zeroed() }
}

/// Declares a static zero-initialised `$t`, and a `SpinMutex` holding the only mutable reference
/// to it:
///
/// ```ignore
/// zeroed_mut!(FOO, u64);
/// // static FOO: SpinMutex<&'static mut u64> = ...;
/// ```
///
/// Trailing attributes apply to the underlying static, e.g. to place it in a section which survives
/// DRAM retention:
///
/// ```ignore
/// zeroed_mut!(SNAPSHOT, RetentionSnapshot, unsafe(link_section = ".retained_bss"));
/// ```
#[macro_export]
macro_rules! zeroed_mut {
    ($(#[$attributes:meta])* $visibility:vis $name:ident, $t:ty $(, $raw_attributes:meta)*) => {
        $(#[$attributes])*
        $visibility static $name: spin::mutex::SpinMutex<&'static mut $t> = spin::mutex::SpinMutex::new({
            $(#[$raw_attributes])*
            static mut RAW: $t = $crate::dram::const_zeroed();
            // SAFETY: This is the only place where a reference to `RAW` is created.
            unsafe { &mut *&raw mut RAW }
        });
    };
}

/// Errors returned by the DRAM state machines.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DfsError {
    /// The frequency point doesn't exist, or lacks a register program it needs.
    #[error("invalid frequency point index {0}")]
    InvalidIndex(u8),
    /// Another transition is in flight, or the subsystem is in retention.
    #[error("DRAM transition already in progress")]
    Busy,
    /// The hardware sequencer can't perform the requested transition.
    #[error("no hardware-assisted switch from {from} to {to}")]
    InvalidTransition {
        /// The current frequency point.
        from: FrequencyIndex,
        /// The requested frequency point.
        to: FrequencyIndex,
    },
    /// A register poll timed out mid-transition. The subsystem must be assumed wedged.
    #[error(transparent)]
    PollTimeout(#[from] PollTimeout),
    /// Retention exit was requested without a successful retention entry.
    #[error("DRAM subsystem is not in retention")]
    NotRetained,
    /// The online core mask names a core which doesn't exist.
    #[error("invalid online core mask {0:#x}")]
    InvalidCoreMask(u32),
}

/// Status codes returned to callers of the DRAM service.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq)]
#[repr(i32)]
pub enum DramStatus {
    /// The operation completed.
    Success = 0,
    /// The function isn't implemented.
    NotSupported = -1,
    /// See [`DfsError::InvalidIndex`].
    InvalidIndex = -2,
    /// See [`DfsError::Busy`].
    Busy = -3,
    /// See [`DfsError::InvalidTransition`].
    InvalidTransition = -4,
    /// See [`DfsError::PollTimeout`].
    PollTimeout = -5,
    /// See [`DfsError::NotRetained`].
    NotRetained = -6,
    /// See [`DfsError::InvalidCoreMask`].
    InvalidCoreMask = -7,
}

impl From<DfsError> for DramStatus {
    fn from(error: DfsError) -> Self {
        match error {
            DfsError::InvalidIndex(_) => Self::InvalidIndex,
            DfsError::Busy => Self::Busy,
            DfsError::InvalidTransition { .. } => Self::InvalidTransition,
            DfsError::PollTimeout(_) => Self::PollTimeout,
            DfsError::NotRetained => Self::NotRetained,
            DfsError::InvalidCoreMask(_) => Self::InvalidCoreMask,
        }
    }
}

impl From<Result<(), DfsError>> for DramStatus {
    fn from(result: Result<(), DfsError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(error) => error.into(),
        }
    }
}

/// Platform specific parameters of the DRAM subsystem.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DramConfig {
    /// The maximum number of iterations of every register poll.
    pub poll_limit: u32,
    /// Frequency in MHz of the clock feeding the bypass divider.
    pub bypass_source_mhz: u32,
    /// Frequency in MHz of the DRAM PLL reference clock.
    pub reference_mhz: u32,
    /// Ranks to address with mode register writes, one bit per rank.
    pub mr_ranks: u32,
    /// Number of AXI ports on the controller.
    pub axi_ports: u8,
}

impl DramConfig {
    /// The default register poll bound.
    pub const DEFAULT_POLL_LIMIT: u32 = 0x10_0000;

    /// A single-rank controller with one AXI port, fed from a 24 MHz reference.
    pub const DEFAULT: Self = Self {
        poll_limit: Self::DEFAULT_POLL_LIMIT,
        bypass_source_mhz: 800,
        reference_mhz: 24,
        mr_ranks: 0x1,
        axi_ports: 1,
    };
}

impl Default for DramConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Coordinates frequency switches and retention transitions of the DRAM subsystem.
///
/// There is one instance per system, shared by every core.
pub struct DramController<R: DramRegisters, S: CoreSignals> {
    regs: R,
    signals: S,
    table: TimingTable,
    config: DramConfig,
    barrier: BarrierState,
    retention: SpinMutex<Retention>,
}

struct Retention {
    state: RetentionState,
    snapshot: &'static SpinMutex<&'static mut RetentionSnapshot>,
}

impl<R: DramRegisters, S: CoreSignals> DramController<R, S> {
    /// Creates a controller for a subsystem which the boot loader left running at `current`.
    ///
    /// `snapshot` must be in memory which keeps its contents while the DRAM subsystem is powered
    /// down.
    pub fn new(
        regs: R,
        signals: S,
        table: TimingTable,
        config: DramConfig,
        current: FrequencyIndex,
        snapshot: &'static SpinMutex<&'static mut RetentionSnapshot>,
    ) -> Self {
        Self {
            regs,
            signals,
            table,
            config,
            barrier: BarrierState::new(current),
            retention: SpinMutex::new(Retention {
                state: RetentionState::Active,
                snapshot,
            }),
        }
    }

    /// Returns the timing table.
    pub fn table(&self) -> &TimingTable {
        &self.table
    }

    /// Returns the inter-core signalling implementation.
    pub fn signals(&self) -> &S {
        &self.signals
    }

    /// Returns the barrier and session state.
    pub fn barrier(&self) -> &BarrierState {
        &self.barrier
    }

    /// Returns the frequency point the subsystem is currently running at.
    pub fn current_frequency(&self) -> FrequencyIndex {
        self.barrier.current()
    }

    /// Returns the number of supported frequency points.
    pub fn frequency_count(&self) -> usize {
        self.table.len()
    }

    /// Returns the frequency point with the given index.
    pub fn frequency_info(&self, index: FrequencyIndex) -> Result<FrequencyPoint, DfsError> {
        self.table
            .point(index)
            .ok_or(DfsError::InvalidIndex(index.0))
    }

    /// Returns the state of the retention state machine.
    pub fn retention_state(&self) -> RetentionState {
        self.retention.lock().state
    }

    /// Handles the quiesce interrupt on the calling core, parking it until the core which sent the
    /// interrupt releases the barrier.
    pub fn handle_quiesce_interrupt(&self) {
        self.barrier.handle_quiesce_interrupt(&self.signals);
    }
}
