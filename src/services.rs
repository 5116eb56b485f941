// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SMC services exposed to Normal World.

pub mod dram;

#[cfg(any(test, platform = "imx8m"))]
use crate::platform::{self, CoresImpl, RegistersImpl};
use crate::smccc::{FunctionId, NOT_SUPPORTED, SmcReturn};
#[cfg(any(test, platform = "imx8m"))]
use spin::Lazy;

/// Helper macro to define the range of SMC function ID values covered by a service
macro_rules! owns {
    // service handles the entire Owning Entity Number (OEN)
    ($owning_entity:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
}
pub(crate) use owns;

/// A service which handles some range of SMC calls.
///
/// According to SMCCC v1.3+ the implementation must disregard the SVE hint bit in the function ID
/// and consider it to be 0 for the purpose of function identification.
pub trait Service {
    /// Returns whether this service is intended to handle the given function ID.
    fn owns(&self, function: FunctionId) -> bool;

    /// Handles the given SMC call from Normal World.
    fn handle_non_secure_smc(&self, _regs: &[u64; SmcReturn::MAX_VALUES]) -> SmcReturn {
        NOT_SUPPORTED.into()
    }
}

/// Passes an SMC call to the first of `services` which owns its function ID.
///
/// Calls with an invalid function ID, or which no service owns, return `NOT_SUPPORTED`.
pub fn dispatch(services: &[&dyn Service], regs: &[u64; SmcReturn::MAX_VALUES]) -> SmcReturn {
    let mut function = FunctionId(regs[0] as u32);
    if !function.valid() {
        return NOT_SUPPORTED.into();
    }
    function.clear_sve_hint();

    match services.iter().find(|service| service.owns(function)) {
        Some(service) => service.handle_non_secure_smc(regs),
        None => NOT_SUPPORTED.into(),
    }
}

#[cfg(any(test, platform = "imx8m"))]
static SERVICES: Lazy<Services> = Lazy::new(Services::new);

/// Contains an instance of all of the currently implemented services.
#[cfg(any(test, platform = "imx8m"))]
pub struct Services {
    /// The DRAM frequency and retention SiP service.
    pub dram: dram::DramService<'static, RegistersImpl, CoresImpl>,
}

#[cfg(any(test, platform = "imx8m"))]
impl Services {
    /// Returns a reference to the global Services instance.
    ///
    /// Also, initializes it if it hasn't been initialized yet.
    pub fn get() -> &'static Self {
        &SERVICES
    }

    fn new() -> Self {
        Self {
            dram: dram::DramService::new(platform::dram()),
        }
    }

    /// Handles an SMC call from Normal World, returning the values to write back to the caller's
    /// registers.
    pub fn handle_smc(&self, regs: &[u64; SmcReturn::MAX_VALUES]) -> SmcReturn {
        dispatch(&[&self.dram], regs)
    }
}
