// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Hardware-assisted switching between the full and half speed frequency points.
//!
//! The controller's own sequencer performs self-refresh entry, the clock switch and self-refresh
//! exit once software raises a stop request, reusing the mode register state already in the
//! controller.

use super::{
    DfsError, DramController,
    barrier::{CoreMask, CoreSignals},
    dfs::Sequencer,
    registers::{DramRegisters, PollTimeout},
    regs::fast_switch,
    retention::RetentionState,
    timing::FrequencyIndex,
};
use log::{error, info};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Speed selected through the hardware sequencer.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum FastSwitchMode {
    /// Run at the table's full speed point.
    FullSpeed = 0,
    /// Run at the table's half speed point.
    HalfSpeed = 1,
}

impl<R: DramRegisters, S: CoreSignals> DramController<R, S> {
    /// Switches between the full and half speed points with the help of the hardware sequencer,
    /// parking every core in `online` other than the calling one for the duration.
    ///
    /// Fails with [`DfsError::InvalidTransition`] unless the timing table has a fast switch pair
    /// and the current point is one of them. Switching to the mode already in use does nothing.
    pub fn fast_switch(&self, mode: FastSwitchMode, online: CoreMask) -> Result<(), DfsError> {
        let current = self.current_frequency();
        let Some(points) = self.table.fast_switch() else {
            return Err(DfsError::InvalidTransition {
                from: current,
                to: current,
            });
        };
        let target = match mode {
            FastSwitchMode::FullSpeed => points.full,
            FastSwitchMode::HalfSpeed => points.half,
        };
        if !CoreMask::all(self.signals.core_count()).contains_all(online) {
            return Err(DfsError::InvalidCoreMask(online.bits()));
        }

        let session = self.barrier.try_begin_session()?;
        if self.retention_state() != RetentionState::Active {
            session.cancel();
            return Err(DfsError::Busy);
        }
        let current = session.current();
        if current != points.full && current != points.half {
            session.cancel();
            return Err(DfsError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        if current == target {
            session.cancel();
            return Ok(());
        }
        info!("Fast switching DRAM to {mode:?}");

        let online = online.with(self.signals.current_core());
        let token = session.request_quiescence(online, &self.signals);
        if let Err(timeout) = self.run_fast_switch(mode) {
            error!("DRAM fast switch to {target} failed: {timeout}");
            return Err(timeout.into());
        }
        token.release(&self.signals);
        session.end(target);
        Ok(())
    }

    fn run_fast_switch(&self, mode: FastSwitchMode) -> Result<(), PollTimeout> {
        let hw = Sequencer::new(&self.regs, &self.config);
        let acked = |value: u32| value & fast_switch::STAT_STOP_ACK != 0;

        hw.wait(fast_switch::STAT, |value| !acked(value))?;
        match mode {
            FastSwitchMode::FullSpeed => self
                .regs
                .clear_bits(fast_switch::CTRL, fast_switch::CTRL_HALF_SPEED),
            FastSwitchMode::HalfSpeed => self
                .regs
                .set_bits(fast_switch::CTRL, fast_switch::CTRL_HALF_SPEED),
        }
        self.regs
            .set_bits(fast_switch::CTRL, fast_switch::CTRL_STOP_REQ);
        hw.wait(fast_switch::STAT, acked)?;
        self.regs
            .clear_bits(fast_switch::CTRL, fast_switch::CTRL_STOP_REQ);
        hw.wait(fast_switch::STAT, |value| !acked(value))?;
        Ok(())
    }
}
