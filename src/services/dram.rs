// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SiP service for querying the DRAM frequency points and requesting frequency switches.
//!
//! Every call returns a [`DramStatus`] code in w0 unless noted otherwise.

use crate::{
    dram::{
        DramController, DramStatus,
        barrier::{CoreMask, CoreSignals},
        fast_switch::FastSwitchMode,
        registers::DramRegisters,
        timing::FrequencyIndex,
    },
    services::{Service, owns},
    smccc::{
        CALL_UID_NUMBER, FunctionId, OwningEntityNumber, REVISION_NUMBER, SmcReturn,
        SmcccCallType, arg32,
    },
};
use log::debug;
use uuid::Uuid;

/// Returns the number of frequency points in w0.
pub const DRAM_GET_FREQ_COUNT: u32 = 0x8200_0100;
/// Takes a frequency point index in w1. Returns the status in w0, and on success the data rate in
/// MT/s in w1 and the clock parent (0 for the PLL, 1 for the bypass divider) in w2.
pub const DRAM_GET_FREQ_INFO: u32 = 0x8200_0101;
/// Returns the index of the current frequency point in w0.
pub const DRAM_GET_CURRENT_FREQ: u32 = 0x8200_0102;
/// Takes a target frequency point index in w1 and a mask of the online cores in w2.
pub const DRAM_REQUEST_SWITCH: u32 = 0x8200_0103;
/// Takes a [`FastSwitchMode`] in w1 and a mask of the online cores in w2.
pub const DRAM_FAST_SWITCH: u32 = 0x8200_0104;
/// Returns the service UUID in w0-w3.
pub const SIP_CALL_UID: u32 =
    FunctionId::new(SmcccCallType::Fast32, OwningEntityNumber::SIP, CALL_UID_NUMBER).0;
/// Returns the major revision in w0 and the minor revision in w1.
pub const SIP_REVISION: u32 =
    FunctionId::new(SmcccCallType::Fast32, OwningEntityNumber::SIP, REVISION_NUMBER).0;

const DRAM_SERVICE_UUID: Uuid = Uuid::from_u128(0x5e0d_7c2a_91b4_4f6e_a3c8_0d27_6b15_e940);
const REVISION_MAJOR: u32 = 1;
const REVISION_MINOR: u32 = 0;

const CLOCK_PARENT_PLL: u64 = 0;
const CLOCK_PARENT_BYPASS: u64 = 1;

/// The DRAM SiP service, forwarding calls to a [`DramController`].
pub struct DramService<'a, R: DramRegisters, S: CoreSignals> {
    controller: &'a DramController<R, S>,
}

impl<'a, R: DramRegisters, S: CoreSignals> DramService<'a, R, S> {
    /// Creates a service for the given controller.
    pub fn new(controller: &'a DramController<R, S>) -> Self {
        Self { controller }
    }

    fn frequency_info(&self, index: u32) -> SmcReturn {
        let Ok(index) = u8::try_from(index) else {
            return status(DramStatus::InvalidIndex);
        };
        match self.controller.frequency_info(FrequencyIndex(index)) {
            Ok(point) => [
                status_code(DramStatus::Success),
                u64::from(point.data_rate),
                if point.bypass {
                    CLOCK_PARENT_BYPASS
                } else {
                    CLOCK_PARENT_PLL
                },
            ]
            .into(),
            Err(e) => status(e.into()),
        }
    }

    fn request_switch(&self, target: u32, online: u32) -> SmcReturn {
        let Ok(target) = u8::try_from(target) else {
            return status(DramStatus::InvalidIndex);
        };
        status(
            self.controller
                .switch_frequency(FrequencyIndex(target), CoreMask::from_bits(online))
                .into(),
        )
    }

    fn fast_switch(&self, mode: u32, online: u32) -> SmcReturn {
        let Ok(mode) = FastSwitchMode::try_from(mode) else {
            return status(DramStatus::InvalidTransition);
        };
        status(
            self.controller
                .fast_switch(mode, CoreMask::from_bits(online))
                .into(),
        )
    }
}

impl<R: DramRegisters, S: CoreSignals> Service for DramService<'_, R, S> {
    owns!(OwningEntityNumber::SIP);

    fn handle_non_secure_smc(&self, regs: &[u64; SmcReturn::MAX_VALUES]) -> SmcReturn {
        let mut function = FunctionId(regs[0] as u32);
        function.clear_sve_hint();

        match function.0 {
            DRAM_GET_FREQ_COUNT => (self.controller.frequency_count() as u32).into(),
            DRAM_GET_FREQ_INFO => self.frequency_info(arg32(regs, 1)),
            DRAM_GET_CURRENT_FREQ => u32::from(self.controller.current_frequency().0).into(),
            DRAM_REQUEST_SWITCH => self.request_switch(arg32(regs, 1), arg32(regs, 2)),
            DRAM_FAST_SWITCH => self.fast_switch(arg32(regs, 1), arg32(regs, 2)),
            SIP_CALL_UID => DRAM_SERVICE_UUID.into(),
            SIP_REVISION => [u64::from(REVISION_MAJOR), u64::from(REVISION_MINOR)].into(),
            _ => {
                debug!("Unsupported SiP call {function:?}");
                status(DramStatus::NotSupported)
            }
        }
    }
}

/// Returns a status code sign extended to the full register width.
fn status_code(status: DramStatus) -> u64 {
    i64::from(i32::from(status)) as u64
}

fn status(status: DramStatus) -> SmcReturn {
    status_code(status).into()
}
