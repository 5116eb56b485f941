// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Barrier, event and cache maintenance instructions.
//!
//! On any architecture other than AArch64 (i.e. host unit tests) the instructions are no-ops.

#[cfg(any(test, target_arch = "aarch64"))]
use arm_sysregs::{CsselrEl1, read_ccsidr_el1, read_clidr_el1, write_csselr_el1};
#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Issues a full system data synchronization barrier (`dsb sy`).
pub fn dsb_sy() {
    // SAFETY: `dsb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dsb sy", options(nostack));
    }
}

/// Issues an instruction synchronization barrier (`isb`) instruction.
#[cfg_attr(not(platform = "imx8m"), allow(unused))]
pub fn isb() {
    // SAFETY: `isb` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("isb", options(nostack));
    }
}

/// Sends an event to all cores in the system (`sev`).
#[cfg_attr(not(platform = "imx8m"), allow(unused))]
pub fn sev() {
    // SAFETY: `sev` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("sev", options(nomem, nostack));
    }
}

/// Waits for an event (`wfe`). Returns immediately if the event register is already set.
#[cfg_attr(not(platform = "imx8m"), allow(unused))]
pub fn wfe() {
    // SAFETY: `wfe` does not violate safe Rust guarantees.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("wfe", options(nomem, nostack));
    }
}

/// Cleans and invalidates the data cache line selected by `operand`, given by set, way and level
/// (`dc cisw`).
#[cfg(any(test, target_arch = "aarch64"))]
fn dc_cisw(operand: u64) {
    // SAFETY: Cleaning and invalidating a cache line doesn't change the contents of memory as seen
    // by the program.
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dc cisw, {operand}", operand = in(reg) operand, options(nostack));
    }
    #[cfg(not(target_arch = "aarch64"))]
    let _ = operand;
}

/// Calls `f` with the `dc cisw` operand of every line of every data or unified cache level up to
/// the point of coherency.
#[cfg(any(test, target_arch = "aarch64"))]
fn for_each_set_way(mut f: impl FnMut(u64)) {
    let clidr = read_clidr_el1().bits();
    let level_of_coherency = (clidr >> 24) & 0x7;
    for level in 0..level_of_coherency {
        // Cache types 2 and above include a data cache.
        if (clidr >> (level * 3)) & 0x7 < 2 {
            continue;
        }
        write_csselr_el1(CsselrEl1::from_bits_retain(level << 1));
        isb();
        let ccsidr = read_ccsidr_el1().bits();
        let line_shift = (ccsidr & 0x7) + 4;
        let ways = ((ccsidr >> 3) & 0x3ff) + 1;
        let sets = ((ccsidr >> 13) & 0x7fff) + 1;
        let way_shift = if ways > 1 {
            ((ways - 1) as u32).leading_zeros()
        } else {
            0
        };
        for way in 0..ways {
            for set in 0..sets {
                f(way << way_shift | set << line_shift | level << 1);
            }
        }
    }
}

/// Cleans and invalidates every data and unified cache level up to the point of coherency, by set
/// and way.
///
/// Only affects the caches of the calling core and must not race with other cores cleaning the
/// same shared cache levels.
#[cfg_attr(not(platform = "imx8m"), allow(unused))]
pub fn clean_invalidate_dcache_all() {
    #[cfg(any(test, target_arch = "aarch64"))]
    for_each_set_way(dc_cisw);
    dsb_sy();
    isb();
}
