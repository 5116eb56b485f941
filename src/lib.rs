// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! EL3 coordinator for live DRAM frequency switching and DRAM subsystem retention.
//!
//! The coordinator parks every other core with a cooperative quiescence barrier, then drives the
//! memory controller and PHY through self-refresh, clock switching and re-synchronisation. It also
//! powers the DRAM subsystem down and back up around system suspend.

#![cfg_attr(not(test), no_std)]

mod aarch64;
pub mod dram;
pub mod logger;
#[cfg(any(test, platform = "imx8m"))]
pub mod platform;
pub mod services;
pub mod smccc;
