// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register offsets and bit definitions for the DRAM subsystem.

use super::registers::{Register, Window};
use bitflags::bitflags;

/// Memory controller registers.
pub mod ddrc {
    use super::*;

    /// Master register 2, holds the target frequency point selector.
    pub const MSTR2: Register = Register::new(Window::Ddrc, 0x028);
    /// Operating mode status.
    pub const STAT: Register = Register::new(Window::Ddrc, 0x004);
    /// Mode register read/write control 0.
    pub const MRCTRL0: Register = Register::new(Window::Ddrc, 0x010);
    /// Mode register read/write control 1, holds the data to write.
    pub const MRCTRL1: Register = Register::new(Window::Ddrc, 0x014);
    /// Mode register read/write status.
    pub const MRSTAT: Register = Register::new(Window::Ddrc, 0x018);
    /// Low power control.
    pub const PWRCTL: Register = Register::new(Window::Ddrc, 0x030);
    /// Refresh control 3.
    pub const RFSHCTL3: Register = Register::new(Window::Ddrc, 0x060);
    /// ZQ calibration control 0.
    pub const ZQCTL0: Register = Register::new(Window::Ddrc, 0x180);
    /// DFI miscellaneous control.
    pub const DFIMISC: Register = Register::new(Window::Ddrc, 0x1b0);
    /// DFI status.
    pub const DFISTAT: Register = Register::new(Window::Ddrc, 0x1bc);
    /// Debug register 1, used to halt the host interface.
    pub const DBG1: Register = Register::new(Window::Ddrc, 0x304);
    /// Command queue and data pipeline status.
    pub const DBGCAM: Register = Register::new(Window::Ddrc, 0x308);
    /// Software triggered commands.
    pub const DBGCMD: Register = Register::new(Window::Ddrc, 0x30c);
    /// Status of software triggered commands.
    pub const DBGSTAT: Register = Register::new(Window::Ddrc, 0x310);
    /// Quasi-dynamic programming control.
    pub const SWCTL: Register = Register::new(Window::Ddrc, 0x320);
    /// Quasi-dynamic programming status.
    pub const SWSTAT: Register = Register::new(Window::Ddrc, 0x324);
    /// AXI port outstanding transaction status, zero when every port is idle.
    pub const PSTAT: Register = Register::new(Window::Ddrc, 0x3fc);

    const PCTRL_BASE: u32 = 0x490;
    const PCTRL_STRIDE: u32 = 0xb0;

    /// Returns the control register for the given AXI port.
    pub const fn pctrl(port: u8) -> Register {
        Register::new(Window::Ddrc, PCTRL_BASE + port as u32 * PCTRL_STRIDE)
    }

    /// `PCTRL_n.port_en`.
    pub const PCTRL_PORT_EN: u32 = 1 << 0;

    /// `MSTR2.target_frequency`.
    pub const MSTR2_TARGET_FREQUENCY_MASK: u32 = 0x3;

    /// `STAT.operating_mode`.
    pub const STAT_OPERATING_MODE_MASK: u32 = 0x7;
    /// `STAT.operating_mode` value for normal operation.
    pub const STAT_OPERATING_MODE_NORMAL: u32 = 0x1;
    /// `STAT.operating_mode` value for self-refresh.
    pub const STAT_OPERATING_MODE_SELF_REFRESH: u32 = 0x3;
    /// `STAT.selfref_type`.
    pub const STAT_SELFREF_TYPE_MASK: u32 = 0x3 << 4;
    /// `STAT.selfref_type` value for self-refresh entered under software control.
    pub const STAT_SELFREF_TYPE_SOFTWARE: u32 = 0x2 << 4;

    /// `MRCTRL0.mr_wr`, starts a mode register write.
    pub const MRCTRL0_MR_WR: u32 = 1 << 31;
    /// `MRCTRL0.mr_addr`.
    pub const MRCTRL0_MR_ADDR_SHIFT: u32 = 12;
    /// Width of `MRCTRL0.mr_addr`.
    pub const MRCTRL0_MR_ADDR_MASK: u32 = 0xff;
    /// `MRCTRL0.mr_rank`.
    pub const MRCTRL0_MR_RANK_SHIFT: u32 = 4;
    /// `MRSTAT.mr_wr_busy`.
    pub const MRSTAT_MR_WR_BUSY: u32 = 1 << 0;

    /// `RFSHCTL3.dis_auto_refresh`.
    pub const RFSHCTL3_DIS_AUTO_REFRESH: u32 = 1 << 0;
    /// `ZQCTL0.dis_auto_zq`.
    pub const ZQCTL0_DIS_AUTO_ZQ: u32 = 1 << 31;

    /// `DFIMISC.dfi_frequency`.
    pub const DFIMISC_DFI_FREQUENCY_SHIFT: u32 = 8;
    /// `DFIMISC.dfi_frequency` mask.
    pub const DFIMISC_DFI_FREQUENCY_MASK: u32 = 0x1f << DFIMISC_DFI_FREQUENCY_SHIFT;
    /// `DFISTAT.dfi_init_complete`.
    pub const DFISTAT_DFI_INIT_COMPLETE: u32 = 1 << 0;

    /// `DBGCMD.zq_calib_short`.
    pub const DBGCMD_ZQ_CALIB_SHORT: u32 = 1 << 4;
    /// `DBGSTAT.zq_calib_short_busy`.
    pub const DBGSTAT_ZQ_CALIB_SHORT_BUSY: u32 = 1 << 4;

    /// `SWCTL.sw_done`.
    pub const SWCTL_SW_DONE: u32 = 1 << 0;
    /// `SWSTAT.sw_done_ack`.
    pub const SWSTAT_SW_DONE_ACK: u32 = 1 << 0;
}

bitflags! {
    /// `PWRCTL` bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Pwrctl: u32 {
        /// Automatic self-refresh entry on idle.
        const SELFREF_EN = 1 << 0;
        /// Automatic power-down entry on idle.
        const POWERDOWN_EN = 1 << 1;
        /// Software forced self-refresh.
        const SELFREF_SW = 1 << 5;
    }

    /// `DFIMISC` control bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Dfimisc: u32 {
        /// Allow the controller to act on `dfi_init_complete`.
        const DFI_INIT_COMPLETE_EN = 1 << 0;
        /// Requests PHY (re)initialisation.
        const DFI_INIT_START = 1 << 5;
    }

    /// `DBG1` bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Dbg1: u32 {
        /// Stops dequeueing commands from the command queues.
        const DIS_DQ = 1 << 0;
        /// Stops accepting new commands from the host interface.
        const DIS_HIF = 1 << 1;
    }

    /// `DBGCAM` queue and pipeline status bits.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Dbgcam: u32 {
        /// The read command queue is empty.
        const RD_Q_EMPTY = 1 << 25;
        /// The write command queue is empty.
        const WR_Q_EMPTY = 1 << 26;
        /// The read data pipeline is empty.
        const RD_DATA_PIPELINE_EMPTY = 1 << 28;
        /// The write data pipeline is empty.
        const WR_DATA_PIPELINE_EMPTY = 1 << 29;
    }
}

impl Dbgcam {
    /// Every bit which must be set before the controller's data buffers count as drained.
    pub const DRAINED: Self = Self::RD_Q_EMPTY
        .union(Self::WR_Q_EMPTY)
        .union(Self::RD_DATA_PIPELINE_EMPTY)
        .union(Self::WR_DATA_PIPELINE_EMPTY);
}

/// PHY registers. Offsets are PHY register numbers.
pub mod phy {
    use super::*;

    /// Selects who owns the PHY CSR bus: 0 for APB (firmware) access, 1 for the PHY itself.
    pub const MICRO_CONT_MUX_SEL: Register = Register::new(Window::Phy, 0xd_0000);
    /// Value of `MICRO_CONT_MUX_SEL` granting firmware CSR access.
    pub const MICRO_CONT_MUX_SEL_APB: u32 = 0;
    /// Value of `MICRO_CONT_MUX_SEL` returning the CSR bus to the PHY.
    pub const MICRO_CONT_MUX_SEL_PHY: u32 = 1;

    /// Low power control, including the calibration hold request.
    pub const LP_CTRL: Register = Register::new(Window::Phy, 0x2_0100);
    /// `LP_CTRL` calibration hold request.
    pub const LP_CTRL_CAL_HOLD: u32 = 1 << 0;
    /// Low power status.
    pub const LP_STAT: Register = Register::new(Window::Phy, 0x2_0101);
    /// `LP_STAT` calibration hold active.
    pub const LP_STAT_CAL_HOLD: u32 = 1 << 0;
    /// Reset status.
    pub const RESET_STAT: Register = Register::new(Window::Phy, 0x2_0102);
    /// `RESET_STAT` cold reset handshake complete.
    pub const RESET_STAT_COLD_RESET_DONE: u32 = 1 << 0;
}

/// Clock generation registers.
pub mod clock {
    use super::*;

    /// DRAM PLL general control.
    pub const PLL_GNRL_CTL: Register = Register::new(Window::Clock, 0x50);
    /// DRAM PLL divider control.
    pub const PLL_DIV_CTL: Register = Register::new(Window::Clock, 0x54);
    /// `PLL_GNRL_CTL.rst`: the PLL runs while set.
    pub const PLL_GNRL_CTL_RST: u32 = 1 << 9;
    /// `PLL_GNRL_CTL.lock`.
    pub const PLL_GNRL_CTL_LOCK: u32 = 1 << 31;
    /// `PLL_DIV_CTL.main_div`.
    pub const PLL_DIV_CTL_MAIN_DIV_SHIFT: u32 = 12;
    /// `PLL_DIV_CTL.pre_div`.
    pub const PLL_DIV_CTL_PRE_DIV_SHIFT: u32 = 4;
    /// `PLL_DIV_CTL.post_div`.
    pub const PLL_DIV_CTL_POST_DIV_SHIFT: u32 = 0;

    /// DRAM core clock source select.
    pub const CORE_SEL: Register = Register::new(Window::Clock, 0x9800);
    /// `CORE_SEL`: take the DRAM core clock from the bypass divider instead of the PLL.
    pub const CORE_SEL_BYPASS: u32 = 1 << 24;
    /// Bypass divider.
    pub const BYPASS_DIV: Register = Register::new(Window::Clock, 0xa080);
    /// `BYPASS_DIV` divider field mask.
    pub const BYPASS_DIV_MASK: u32 = 0x3f;
    /// Bypass divider status.
    pub const BYPASS_STAT: Register = Register::new(Window::Clock, 0xa08c);
    /// `BYPASS_STAT`: the last divider update has taken effect.
    pub const BYPASS_STAT_UPDATE_DONE: u32 = 1 << 0;

    /// DRAM subsystem clock gate.
    pub const DRAM_GATE: Register = Register::new(Window::Clock, 0x4050);
    /// `DRAM_GATE` value with every DRAM clock running.
    pub const DRAM_GATE_ON: u32 = 0x3;
}

/// Power controller registers.
pub mod power {
    use super::*;

    /// Software power-up request, self-clearing once the domain is on.
    pub const PUP_REQ: Register = Register::new(Window::Power, 0xf8);
    /// Software power-down request, self-clearing once the domain is off.
    pub const PDN_REQ: Register = Register::new(Window::Power, 0x104);
    /// Request bit for the DRAM power domain.
    pub const DRAM_DOMAIN: u32 = 1 << 5;
}

/// Reset controller registers.
pub mod reset {
    use super::*;

    /// DRAM controller and PHY reset control.
    pub const DDRC_RCR: Register = Register::new(Window::Reset, 0x1000);
    /// Holds the controller core in reset.
    pub const DDRC_RCR_CORE_RESET: u32 = 1 << 0;
    /// Holds the controller register interface in reset.
    pub const DDRC_RCR_PRESET: u32 = 1 << 1;
    /// Holds the PHY in reset.
    pub const DDRC_RCR_PHY_RESET: u32 = 1 << 2;
    /// Drives the PHY power-ok input.
    pub const DDRC_RCR_PHY_PWROKIN: u32 = 1 << 3;
}

/// Hardware frequency switch sequencer registers.
pub mod fast_switch {
    use super::*;

    /// Speed select and stop request.
    pub const CTRL: Register = Register::new(Window::FastSwitch, 0x00);
    /// `CTRL`: run the DRAM at half speed.
    pub const CTRL_HALF_SPEED: u32 = 1 << 0;
    /// `CTRL`: ask the sequencer to stop the controller and apply the selected speed.
    pub const CTRL_STOP_REQ: u32 = 1 << 1;
    /// Sequencer status.
    pub const STAT: Register = Register::new(Window::FastSwitch, 0x04);
    /// `STAT`: the controller has stopped.
    pub const STAT_STOP_ACK: u32 = 1 << 0;
}
