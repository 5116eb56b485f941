// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Software driven frequency switch.
//!
//! Once every other core is parked, the initiator drains the controller, puts the DRAM into
//! self-refresh, writes the target's mode register values, halts the controller, loads the
//! target's register programs, switches the clock and re-synchronises the PHY before leaving
//! self-refresh again.

use super::{
    DfsError, DramConfig, DramController,
    barrier::{CoreMask, CoreSignals},
    registers::{DramRegisters, PollTimeout, Register, Window},
    regs::{Dbg1, Dbgcam, Dfimisc, Pwrctl, clock, ddrc, phy},
    retention::RetentionState,
    timing::{FrequencyIndex, FrequencyPoint, FrequencyPointTimings, RegisterProgram},
};
use log::{error, info};

/// Pre-divider used for every PLL setting.
const PLL_PRE_DIV: u32 = 3;
/// The PLL's VCO must run at least this fast.
const PLL_MIN_VCO_MHZ: u32 = 1600;
/// Largest supported post-divider, as a shift.
const PLL_MAX_POST_DIV: u32 = 6;

/// DRAM PLL divider settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PllDividers {
    /// Feedback divider.
    pub main: u32,
    /// Reference pre-divider.
    pub pre: u32,
    /// Output post-divider, as a power of two.
    pub post: u32,
}

impl PllDividers {
    /// Returns the dividers which make the PLL output a quarter of `data_rate`, in MHz, from a
    /// reference clock of `reference_mhz`.
    pub fn for_data_rate(data_rate: u32, reference_mhz: u32) -> Self {
        let output_mhz = data_rate / 4;
        let mut post = 0;
        while post < PLL_MAX_POST_DIV && output_mhz << post < PLL_MIN_VCO_MHZ {
            post += 1;
        }
        Self {
            main: (output_mhz * PLL_PRE_DIV << post) / reference_mhz.max(1),
            pre: PLL_PRE_DIV,
            post,
        }
    }

    /// Returns the value of the `PLL_DIV_CTL` register for these dividers.
    pub fn div_ctl(self) -> u32 {
        self.main << clock::PLL_DIV_CTL_MAIN_DIV_SHIFT
            | self.pre << clock::PLL_DIV_CTL_PRE_DIV_SHIFT
            | self.post << clock::PLL_DIV_CTL_POST_DIV_SHIFT
    }
}

/// Returns the bypass divider which produces a quarter of `data_rate` from the bypass source.
pub fn bypass_divider(config: &DramConfig, data_rate: u32) -> u32 {
    (config.bypass_source_mhz / (data_rate / 4).max(1)).max(1)
}

/// Hardware sequences shared by the state machines.
///
/// Every poll is bounded by the configured poll limit. A timeout leaves the hardware as it is.
pub(super) struct Sequencer<'a, R> {
    regs: &'a R,
    config: &'a DramConfig,
}

impl<'a, R: DramRegisters> Sequencer<'a, R> {
    pub(super) fn new(regs: &'a R, config: &'a DramConfig) -> Self {
        Self { regs, config }
    }

    pub(super) fn wait(
        &self,
        register: Register,
        condition: impl Fn(u32) -> bool,
    ) -> Result<u32, PollTimeout> {
        self.regs
            .wait_until(register, self.config.poll_limit, condition)
    }

    /// Runs `f` with the controller's quasi-dynamic registers open for programming.
    pub(super) fn with_quasi_dynamic<T>(
        &self,
        f: impl FnOnce() -> Result<T, PollTimeout>,
    ) -> Result<T, PollTimeout> {
        self.regs.clear_bits(ddrc::SWCTL, ddrc::SWCTL_SW_DONE);
        let result = f()?;
        self.regs.set_bits(ddrc::SWCTL, ddrc::SWCTL_SW_DONE);
        self.wait(ddrc::SWSTAT, |value| value & ddrc::SWSTAT_SW_DONE_ACK != 0)?;
        Ok(result)
    }

    /// Runs `f` with firmware owning the PHY CSR bus.
    pub(super) fn with_phy_csr_access<T>(&self, f: impl FnOnce() -> T) -> T {
        self.regs
            .write(phy::MICRO_CONT_MUX_SEL, phy::MICRO_CONT_MUX_SEL_APB);
        let result = f();
        self.regs
            .write(phy::MICRO_CONT_MUX_SEL, phy::MICRO_CONT_MUX_SEL_PHY);
        result
    }

    /// Stops the AXI ports accepting transactions and waits for outstanding ones to finish.
    pub(super) fn disable_axi_ports(&self) -> Result<(), PollTimeout> {
        for port in 0..self.config.axi_ports {
            self.regs
                .clear_bits(ddrc::pctrl(port), ddrc::PCTRL_PORT_EN);
        }
        self.wait(ddrc::PSTAT, |value| value == 0)?;
        Ok(())
    }

    pub(super) fn enable_axi_ports(&self) {
        for port in 0..self.config.axi_ports {
            self.regs.set_bits(ddrc::pctrl(port), ddrc::PCTRL_PORT_EN);
        }
    }

    /// Stops automatic refresh and ZQ calibration, then forces the DRAM into self-refresh.
    pub(super) fn enter_self_refresh(&self) -> Result<(), PollTimeout> {
        self.with_quasi_dynamic(|| {
            self.regs
                .set_bits(ddrc::RFSHCTL3, ddrc::RFSHCTL3_DIS_AUTO_REFRESH);
            self.regs.set_bits(ddrc::ZQCTL0, ddrc::ZQCTL0_DIS_AUTO_ZQ);
            Ok(())
        })?;
        self.regs.set_bits(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        self.wait(ddrc::STAT, |value| {
            value & ddrc::STAT_OPERATING_MODE_MASK == ddrc::STAT_OPERATING_MODE_SELF_REFRESH
                && value & ddrc::STAT_SELFREF_TYPE_MASK == ddrc::STAT_SELFREF_TYPE_SOFTWARE
        })?;
        Ok(())
    }

    /// Leaves self-refresh and restarts automatic refresh and ZQ calibration.
    pub(super) fn exit_self_refresh(&self) -> Result<(), PollTimeout> {
        self.with_quasi_dynamic(|| {
            self.regs
                .clear_bits(ddrc::RFSHCTL3, ddrc::RFSHCTL3_DIS_AUTO_REFRESH);
            self.regs.clear_bits(ddrc::ZQCTL0, ddrc::ZQCTL0_DIS_AUTO_ZQ);
            Ok(())
        })?;
        self.regs
            .clear_bits(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        self.wait(ddrc::STAT, |value| {
            value & ddrc::STAT_OPERATING_MODE_MASK == ddrc::STAT_OPERATING_MODE_NORMAL
        })?;
        Ok(())
    }

    /// Writes each mode register of `program` to the DRAM devices, one at a time.
    pub(super) fn write_mode_registers(&self, program: RegisterProgram) -> Result<(), PollTimeout> {
        let mr_idle = |value: u32| value & ddrc::MRSTAT_MR_WR_BUSY == 0;
        for entry in program.iter() {
            self.wait(ddrc::MRSTAT, mr_idle)?;
            let control = self.config.mr_ranks << ddrc::MRCTRL0_MR_RANK_SHIFT
                | (entry.offset & ddrc::MRCTRL0_MR_ADDR_MASK) << ddrc::MRCTRL0_MR_ADDR_SHIFT;
            self.regs.write(ddrc::MRCTRL1, entry.value);
            self.regs.write(ddrc::MRCTRL0, control);
            self.regs.write(ddrc::MRCTRL0, control | ddrc::MRCTRL0_MR_WR);
        }
        self.wait(ddrc::MRSTAT, mr_idle)?;
        Ok(())
    }

    /// Stops the controller dequeueing commands and waits for its queues and pipelines to empty.
    pub(super) fn halt(&self) -> Result<(), PollTimeout> {
        self.regs
            .set_bits(ddrc::DBG1, (Dbg1::DIS_DQ | Dbg1::DIS_HIF).bits());
        self.wait(ddrc::DBGCAM, |value| {
            Dbgcam::from_bits_retain(value).contains(Dbgcam::DRAINED)
        })?;
        Ok(())
    }

    /// Undoes [`Sequencer::halt`].
    pub(super) fn resume(&self) {
        self.regs
            .clear_bits(ddrc::DBG1, (Dbg1::DIS_DQ | Dbg1::DIS_HIF).bits());
    }

    /// Points the controller's and the DFI's frequency selectors at `index`.
    pub(super) fn select_frequency(&self, index: FrequencyIndex) -> Result<(), PollTimeout> {
        let index = u32::from(index.0);
        self.with_quasi_dynamic(|| {
            self.regs.modify(ddrc::MSTR2, |value| {
                value & !ddrc::MSTR2_TARGET_FREQUENCY_MASK
                    | index & ddrc::MSTR2_TARGET_FREQUENCY_MASK
            });
            self.regs.modify(ddrc::DFIMISC, |value| {
                value & !ddrc::DFIMISC_DFI_FREQUENCY_MASK
                    | index << ddrc::DFIMISC_DFI_FREQUENCY_SHIFT & ddrc::DFIMISC_DFI_FREQUENCY_MASK
            });
            Ok(())
        })
    }

    /// Loads the controller timings, PHY initialisation values and trained PHY CSRs of a
    /// frequency point.
    pub(super) fn load_point_programs(
        &self,
        timings: &FrequencyPointTimings,
    ) -> Result<(), PollTimeout> {
        self.with_quasi_dynamic(|| {
            self.regs.apply_program(Window::Ddrc, timings.controller);
            Ok(())
        })?;
        self.with_phy_csr_access(|| {
            self.regs.apply_program(Window::Phy, timings.phy_init);
            self.regs.apply_program(Window::Phy, timings.phy_trained_csr);
        });
        Ok(())
    }

    /// Switches the DRAM core clock to the given point, either by relocking the PLL or by
    /// reprogramming the bypass divider.
    pub(super) fn switch_clock(&self, point: &FrequencyPoint) -> Result<(), PollTimeout> {
        if point.bypass {
            let divider = bypass_divider(self.config, point.data_rate);
            // The divider field holds the division ratio minus one.
            self.regs.modify(clock::BYPASS_DIV, |value| {
                value & !clock::BYPASS_DIV_MASK | (divider - 1) & clock::BYPASS_DIV_MASK
            });
            self.wait(clock::BYPASS_STAT, |value| {
                value & clock::BYPASS_STAT_UPDATE_DONE != 0
            })?;
            self.regs.set_bits(clock::CORE_SEL, clock::CORE_SEL_BYPASS);
        } else {
            let dividers = PllDividers::for_data_rate(point.data_rate, self.config.reference_mhz);
            self.regs
                .clear_bits(clock::PLL_GNRL_CTL, clock::PLL_GNRL_CTL_RST);
            self.regs.write(clock::PLL_DIV_CTL, dividers.div_ctl());
            self.regs
                .set_bits(clock::PLL_GNRL_CTL, clock::PLL_GNRL_CTL_RST);
            self.wait(clock::PLL_GNRL_CTL, |value| {
                value & clock::PLL_GNRL_CTL_LOCK != 0
            })?;
            self.regs
                .clear_bits(clock::CORE_SEL, clock::CORE_SEL_BYPASS);
        }
        Ok(())
    }

    /// Strobes DFI initialisation and waits for the PHY to drop and then re-assert init-complete.
    ///
    /// Init-complete is still set from before the clock change, so seeing it set before it has
    /// dropped proves nothing.
    pub(super) fn dfi_init(&self) -> Result<(), PollTimeout> {
        let complete = |value: u32| value & ddrc::DFISTAT_DFI_INIT_COMPLETE != 0;
        self.with_quasi_dynamic(|| {
            self.regs.clear_bits(
                ddrc::DFIMISC,
                (Dfimisc::DFI_INIT_COMPLETE_EN | Dfimisc::DFI_INIT_START).bits(),
            );
            self.regs
                .set_bits(ddrc::DFIMISC, Dfimisc::DFI_INIT_START.bits());
            self.wait(ddrc::DFISTAT, |value| !complete(value))?;
            self.regs
                .clear_bits(ddrc::DFIMISC, Dfimisc::DFI_INIT_START.bits());
            self.wait(ddrc::DFISTAT, complete)?;
            self.regs
                .set_bits(ddrc::DFIMISC, Dfimisc::DFI_INIT_COMPLETE_EN.bits());
            Ok(())
        })
    }

    /// Issues a short ZQ calibration.
    pub(super) fn zq_calibrate(&self) -> Result<(), PollTimeout> {
        let idle = |value: u32| value & ddrc::DBGSTAT_ZQ_CALIB_SHORT_BUSY == 0;
        self.wait(ddrc::DBGSTAT, idle)?;
        self.regs.set_bits(ddrc::DBGCMD, ddrc::DBGCMD_ZQ_CALIB_SHORT);
        self.wait(ddrc::DBGSTAT, idle)?;
        Ok(())
    }
}

impl<R: DramRegisters, S: CoreSignals> DramController<R, S> {
    /// Switches the DRAM to the frequency point `target`, parking every core in `online` other
    /// than the calling one for the duration.
    ///
    /// The calling core is always treated as online. Every core in `online` must be powered on and
    /// able to take the quiesce interrupt, otherwise this never returns.
    ///
    /// A [`DfsError::PollTimeout`] is fatal: the DRAM subsystem is left part way through the
    /// switch, the other cores stay parked and every later request fails with
    /// [`DfsError::Busy`].
    pub fn switch_frequency(&self, target: FrequencyIndex, online: CoreMask) -> Result<(), DfsError> {
        let (Some(to), Some(timings)) = (self.table.point(target), self.table.timings(target))
        else {
            return Err(DfsError::InvalidIndex(target.0));
        };
        if [
            timings.controller,
            timings.phy_init,
            timings.phy_trained_csr,
            timings.mode_registers,
        ]
        .iter()
        .any(RegisterProgram::is_empty)
        {
            return Err(DfsError::InvalidIndex(target.0));
        }
        if !CoreMask::all(self.signals.core_count()).contains_all(online) {
            return Err(DfsError::InvalidCoreMask(online.bits()));
        }

        let session = self.barrier.try_begin_session()?;
        if self.retention_state() != RetentionState::Active {
            session.cancel();
            return Err(DfsError::Busy);
        }
        let current = session.current();
        if current == target {
            session.cancel();
            return Ok(());
        }
        let from = self.table.point(current);
        info!(
            "Switching DRAM from {} to {} MT/s",
            from.map_or(0, |point| point.data_rate),
            to.data_rate
        );

        let online = online.with(self.signals.current_core());
        let token = session.request_quiescence(online, &self.signals);
        self.signals.flush_data_cache();
        let from_bypass = from.is_some_and(|point| point.bypass);
        if let Err(timeout) = self.run_switch(from_bypass, &to, timings) {
            // The session and the barrier stay claimed: the subsystem is wedged.
            error!("DRAM frequency switch to {target} failed: {timeout}");
            return Err(timeout.into());
        }
        token.release(&self.signals);
        session.end(target);

        info!("DRAM running at {} MT/s", to.data_rate);
        Ok(())
    }

    /// Performs the hardware part of the switch. Must only be called with every other core
    /// parked.
    fn run_switch(
        &self,
        from_bypass: bool,
        to: &FrequencyPoint,
        timings: &FrequencyPointTimings,
    ) -> Result<(), PollTimeout> {
        let hw = Sequencer::new(&self.regs, &self.config);

        hw.disable_axi_ports()?;
        hw.enter_self_refresh()?;
        hw.write_mode_registers(timings.mode_registers)?;
        hw.halt()?;

        hw.select_frequency(to.index)?;
        hw.load_point_programs(timings)?;
        hw.switch_clock(to)?;
        hw.dfi_init()?;
        if !from_bypass && !to.bypass {
            hw.zq_calibrate()?;
        }

        hw.exit_self_refresh()?;
        hw.resume();
        hw.enable_axi_ports();
        Ok(())
    }
}
