// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Platform selection, and the global DRAM controller built from the selected platform.

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident::$plat_impl:ident) => {
        #[cfg(platform = $condition)]
        mod $mod;

        #[cfg(platform = $condition)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
    (test, $mod:ident::$plat_impl:ident) => {
        #[cfg(test)]
        mod $mod;

        #[cfg(test)]
        pub use $mod::$plat_impl as PlatformImpl;
    };
}

select_platform!(platform = "imx8m", imx8m::Imx8m);
select_platform!(test, test::TestPlatform);

use crate::dram::{
    DramConfig, DramController,
    barrier::CoreSignals,
    registers::DramRegisters,
    regs::ddrc,
    retention::RetentionSnapshot,
    timing::{FrequencyIndex, TimingTable},
};
use arm_gic::IntId;
use log::info;
#[cfg(not(test))]
pub use percore::exception_free;
use spin::{Lazy, mutex::SpinMutex};
#[cfg(test)]
pub use test::exception_free;

/// Type alias for convenience, to avoid having to use the complicated type name everywhere.
pub type RegistersImpl = <PlatformImpl as Platform>::Registers;
/// The platform's inter-core signalling.
pub type CoresImpl = <PlatformImpl as Platform>::Cores;
/// The DRAM controller type of the selected platform.
pub type DramControllerImpl = DramController<RegistersImpl, CoresImpl>;

/// The hooks implemented by all platforms.
pub trait Platform {
    /// The number of CPU cores.
    const CORE_COUNT: usize;

    /// The software generated interrupt used to park cores for a DRAM frequency switch. It must
    /// be configured as a Group 0 interrupt on every core.
    const QUIESCE_SGI: IntId;

    /// Parameters of the DRAM subsystem.
    const DRAM_CONFIG: DramConfig;

    /// Access to the DRAM controller, PHY, clock, power and reset registers.
    type Registers: DramRegisters + Send + Sync + 'static;

    /// Inter-core interrupts, events and cache maintenance.
    type Cores: CoreSignals + Send + Sync + 'static;

    /// Initialises the logger. Any logs sent before this is called will be ignored.
    fn init_logger();

    /// Creates the DRAM register accessor.
    ///
    /// # Safety
    ///
    /// This must only be called once, to avoid creating aliases of the register windows.
    unsafe fn create_dram_registers() -> Self::Registers;

    /// Creates the inter-core signalling implementation.
    fn create_cores() -> Self::Cores;

    /// Returns the timing table the boot loader prepared.
    fn timing_table() -> TimingTable;

    /// Returns the retention snapshot, in memory which stays powered while the DRAM is in
    /// retention.
    fn retention_snapshot() -> &'static SpinMutex<&'static mut RetentionSnapshot>;
}

static DRAM: Lazy<DramControllerImpl> = Lazy::new(|| {
    // SAFETY: This is the only place the DRAM registers are created, and the `Lazy` runs it at
    // most once.
    let regs = unsafe { PlatformImpl::create_dram_registers() };
    let table = PlatformImpl::timing_table();
    let current = boot_frequency(&regs);
    info!(
        "DRAM timing table has {} frequency points, booted at {current}",
        table.len()
    );
    DramController::new(
        regs,
        PlatformImpl::create_cores(),
        table,
        PlatformImpl::DRAM_CONFIG,
        current,
        PlatformImpl::retention_snapshot(),
    )
});

/// Returns the global DRAM controller, creating it on first use.
///
/// The first call must happen on the boot core before any other core can take the quiesce
/// interrupt.
pub fn dram() -> &'static DramControllerImpl {
    &DRAM
}

/// Handles the quiesce interrupt on the calling core, parking it until the frequency switch which
/// raised the interrupt has finished.
///
/// This should be called from the platform's Group 0 interrupt handler for
/// [`Platform::QUIESCE_SGI`], after the interrupt has been acknowledged. It writes the end of
/// interrupt itself before parking, so the caller must not write another one for this SGI.
pub fn handle_quiesce_interrupt() {
    exception_free(|_token| dram().handle_quiesce_interrupt());
}

/// Returns the frequency point the boot loader left the controller running at.
fn boot_frequency(regs: &impl DramRegisters) -> FrequencyIndex {
    FrequencyIndex((regs.read(ddrc::MSTR2) & ddrc::MSTR2_TARGET_FREQUENCY_MASK) as u8)
}
