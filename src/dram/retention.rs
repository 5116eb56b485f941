// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Powering the DRAM subsystem down and back up around system suspend, with the DRAM contents
//! kept in self-refresh.
//!
//! The PHY's trained CSRs don't survive the power removal and can't be cheaply retrained, so they
//! are read back into a [`RetentionSnapshot`] in retained memory the first time the subsystem
//! enters retention, and restored from there on every exit.

use super::{
    DfsError, DramController,
    barrier::CoreSignals,
    dfs::Sequencer,
    registers::{DramRegisters, PollTimeout, Register, Window},
    regs::{clock, phy, power, reset},
    timing::{FrequencyIndex, FrequencyPoint, FrequencyPointTimings},
};
use arrayvec::ArrayVec;
use log::{error, info};
use zerocopy::{FromZeros, Immutable, IntoBytes, KnownLayout};

/// The maximum number of trained PHY CSRs a snapshot can hold.
pub const MAX_TRAINED_CSRS: usize = 64;

/// State of the retention state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetentionState {
    /// The subsystem is powered and running.
    Active,
    /// Retention entry is in progress, or failed part way.
    Entering,
    /// The subsystem is powered down with the DRAM in self-refresh.
    Retained,
    /// Retention exit is in progress, or failed part way.
    Exiting,
}

/// State which must survive the DRAM subsystem being powered down.
///
/// This must live in memory outside the DRAM power domain. A zeroed snapshot is empty.
#[derive(Clone, Debug, Eq, FromZeros, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct RetentionSnapshot {
    /// Non-zero once the trained CSRs have been saved.
    saved: u32,
    /// The frequency point active at the most recent retention entry.
    frequency: u32,
    /// The frequency point the trained CSRs were saved at.
    csr_frequency: u32,
    /// Number of valid entries in `csr_values`.
    csr_count: u32,
    /// Trained CSR values, in the order of the timing table's trained CSR list.
    csr_values: [u32; MAX_TRAINED_CSRS],
}

impl RetentionSnapshot {
    /// Returns whether trained CSR values have been saved.
    pub fn is_saved(&self) -> bool {
        self.saved != 0
    }

    /// Returns the frequency point which was active at the most recent retention entry.
    pub fn frequency(&self) -> FrequencyIndex {
        FrequencyIndex(self.frequency as u8)
    }

    /// Returns the frequency point the trained CSRs were saved at, if they have been saved.
    pub fn trained_csr_frequency(&self) -> Option<FrequencyIndex> {
        self.is_saved()
            .then_some(FrequencyIndex(self.csr_frequency as u8))
    }

    /// Returns the saved trained CSR values.
    pub fn trained_csr_values(&self) -> &[u32] {
        &self.csr_values[..(self.csr_count as usize).min(MAX_TRAINED_CSRS)]
    }
}

impl<R: DramRegisters, S: CoreSignals> DramController<R, S> {
    /// Returns a copy of the retention snapshot.
    pub fn retention_snapshot(&self) -> RetentionSnapshot {
        self.retention.lock().snapshot.lock().clone()
    }

    /// Drains and halts the controller, saves the PHY's trained CSRs if they haven't been saved
    /// yet, and powers the DRAM subsystem down with the DRAM in self-refresh.
    ///
    /// The caller must already have parked every other core. No log output may go to DRAM until
    /// [`DramController::exit_retention`] has returned.
    pub fn enter_retention(&self) -> Result<(), DfsError> {
        let session = self.barrier.try_begin_session()?;
        let current = session.current();
        let Some(timings) = self.table.timings(current) else {
            session.cancel();
            return Err(DfsError::InvalidIndex(current.0));
        };
        if !retention_programs_valid(timings) {
            session.cancel();
            return Err(DfsError::InvalidIndex(current.0));
        }
        {
            let mut retention = self.retention.lock();
            if retention.state != RetentionState::Active {
                drop(retention);
                session.cancel();
                return Err(DfsError::Busy);
            }
            retention.state = RetentionState::Entering;
        }
        info!("DRAM entering retention at {} MT/s", timings.data_rate);

        if let Err(timeout) = self.run_enter(current, timings) {
            error!("DRAM retention entry failed: {timeout}");
            return Err(timeout.into());
        }
        self.retention.lock().state = RetentionState::Retained;
        session.end(current);
        Ok(())
    }

    /// Powers the DRAM subsystem back up and restores it to the frequency point it was running at
    /// when it entered retention.
    ///
    /// Fails with [`DfsError::NotRetained`] unless [`DramController::enter_retention`] succeeded
    /// before.
    pub fn exit_retention(&self) -> Result<(), DfsError> {
        if self.retention_state() != RetentionState::Retained {
            return Err(DfsError::NotRetained);
        }
        let session = self.barrier.try_begin_session()?;
        let (suspended_at, trained) = {
            let mut retention = self.retention.lock();
            if retention.state != RetentionState::Retained {
                drop(retention);
                session.cancel();
                return Err(DfsError::NotRetained);
            }
            retention.state = RetentionState::Exiting;
            let snapshot = retention.snapshot.lock();
            let suspended_at = snapshot.frequency();
            // Saved values only apply to the point they were trained at.
            let mut trained = ArrayVec::<u32, MAX_TRAINED_CSRS>::new();
            if snapshot.trained_csr_frequency() == Some(suspended_at) {
                trained.extend(snapshot.trained_csr_values().iter().copied());
            }
            (suspended_at, trained)
        };
        let (Some(point), Some(timings)) = (
            self.table.point(suspended_at),
            self.table.timings(suspended_at),
        ) else {
            // Only reachable if the snapshot was corrupted.
            session.cancel();
            return Err(DfsError::InvalidIndex(suspended_at.0));
        };

        let trained = (!trained.is_empty()).then_some(trained.as_slice());
        if let Err(timeout) = self.run_exit(&point, timings, trained) {
            error!("DRAM retention exit failed: {timeout}");
            return Err(timeout.into());
        }
        self.retention.lock().state = RetentionState::Active;
        session.end(suspended_at);

        info!("DRAM left retention at {} MT/s", timings.data_rate);
        Ok(())
    }

    fn run_enter(
        &self,
        current: FrequencyIndex,
        timings: &FrequencyPointTimings,
    ) -> Result<(), PollTimeout> {
        let hw = Sequencer::new(&self.regs, &self.config);

        hw.disable_axi_ports()?;
        hw.enter_self_refresh()?;
        hw.halt()?;

        self.regs.set_bits(phy::LP_CTRL, phy::LP_CTRL_CAL_HOLD);
        hw.wait(phy::LP_STAT, |value| value & phy::LP_STAT_CAL_HOLD != 0)?;

        {
            let retention = self.retention.lock();
            let mut snapshot = retention.snapshot.lock();
            snapshot.frequency = current.0.into();
            if !snapshot.is_saved() {
                hw.with_phy_csr_access(|| {
                    for (value, entry) in snapshot
                        .csr_values
                        .iter_mut()
                        .zip(timings.phy_trained_csr.iter())
                    {
                        *value = self.regs.read(Register::new(Window::Phy, entry.offset));
                    }
                });
                snapshot.csr_count = timings.phy_trained_csr.len() as u32;
                snapshot.csr_frequency = current.0.into();
                snapshot.saved = 1;
            }
        }
        // Write the snapshot back to retained memory.
        self.signals.flush_data_cache();

        // Gate the clocks before removing power, and drop power-ok last.
        self.regs.write(clock::DRAM_GATE, 0);
        self.regs.set_bits(power::PDN_REQ, power::DRAM_DOMAIN);
        hw.wait(power::PDN_REQ, |value| value & power::DRAM_DOMAIN == 0)?;
        self.regs
            .clear_bits(reset::DDRC_RCR, reset::DDRC_RCR_PHY_PWROKIN);
        Ok(())
    }

    fn run_exit(
        &self,
        point: &FrequencyPoint,
        timings: &FrequencyPointTimings,
        trained_csr_values: Option<&[u32]>,
    ) -> Result<(), PollTimeout> {
        let hw = Sequencer::new(&self.regs, &self.config);
        let resets =
            reset::DDRC_RCR_CORE_RESET | reset::DDRC_RCR_PRESET | reset::DDRC_RCR_PHY_RESET;

        self.regs.set_bits(power::PUP_REQ, power::DRAM_DOMAIN);
        hw.wait(power::PUP_REQ, |value| value & power::DRAM_DOMAIN == 0)?;

        self.regs.set_bits(reset::DDRC_RCR, resets);
        self.regs
            .set_bits(reset::DDRC_RCR, reset::DDRC_RCR_PHY_PWROKIN);
        self.regs.write(clock::DRAM_GATE, clock::DRAM_GATE_ON);
        hw.switch_clock(point)?;
        self.regs.clear_bits(reset::DDRC_RCR, resets);
        hw.wait(phy::RESET_STAT, |value| {
            value & phy::RESET_STAT_COLD_RESET_DONE != 0
        })?;

        hw.with_quasi_dynamic(|| {
            self.regs.apply_program(Window::Ddrc, timings.controller);
            Ok(())
        })?;
        hw.select_frequency(point.index)?;
        hw.enter_self_refresh()?;

        hw.with_phy_csr_access(|| {
            self.regs.apply_program(Window::Phy, timings.phy_init);
            match trained_csr_values {
                Some(values) => {
                    for (entry, &value) in timings.phy_trained_csr.iter().zip(values) {
                        self.regs
                            .write(Register::new(Window::Phy, entry.offset), value);
                    }
                }
                None => self
                    .regs
                    .apply_program(Window::Phy, timings.phy_trained_csr),
            }
            self.regs.apply_program(Window::Phy, timings.phy_pie);
        });
        self.regs.clear_bits(phy::LP_CTRL, phy::LP_CTRL_CAL_HOLD);
        hw.wait(phy::LP_STAT, |value| value & phy::LP_STAT_CAL_HOLD == 0)?;

        hw.dfi_init()?;
        hw.exit_self_refresh()?;
        hw.resume();
        hw.enable_axi_ports();
        Ok(())
    }
}

/// Returns whether a frequency point has every program retention exit needs, and no more trained
/// CSRs than a snapshot can hold.
fn retention_programs_valid(timings: &FrequencyPointTimings) -> bool {
    !timings.controller.is_empty()
        && !timings.phy_init.is_empty()
        && !timings.phy_trained_csr.is_empty()
        && !timings.phy_pie.is_empty()
        && timings.phy_trained_csr.len() <= MAX_TRAINED_CSRS
}
