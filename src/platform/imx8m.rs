// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! NXP i.MX 8M family, with an LPDDR4 controller and PHY.

use super::Platform;
use crate::{
    aarch64::{clean_invalidate_dcache_all, sev, wfe},
    dram::{
        DramConfig,
        barrier::{CoreMask, CoreSignals},
        registers::{MmioDramRegisters, MmioWindow},
        retention::RetentionSnapshot,
        timing::TimingTable,
    },
    logger::{self, LockedWriter},
    zeroed_mut,
};
use arm_gic::{
    IntId,
    gicv3::{GicCpuInterface, InterruptGroup, SgiTarget, SgiTargetGroup},
};
use arm_sysregs::read_mpidr_el1;
use core::{fmt, ptr::NonNull};
use safe_mmio::{
    UniqueMmioPointer, field,
    fields::{ReadPure, ReadWrite, WriteOnly},
};
use spin::{Once, mutex::SpinMutex};

const DDRC_BASE: usize = 0x3d40_0000;
const DDRC_SIZE: usize = 0x40_0000;
const DDR_PHY_BASE: usize = 0x3c00_0000;
const DDR_PHY_SIZE: usize = 0x40_0000;
const CCM_BASE: usize = 0x3038_0000;
const CCM_SIZE: usize = 0x1_0000;
const GPC_BASE: usize = 0x303a_0000;
const GPC_SIZE: usize = 0x1_0000;
const SRC_BASE: usize = 0x3039_0000;
const SRC_SIZE: usize = 0x1_0000;
const DDRC_FAST_SWITCH_BASE: usize = 0x3d00_0000;
const DDRC_FAST_SWITCH_SIZE: usize = 0x1000;
const UART2_BASE: usize = 0x3089_0000;

/// Where the boot loader leaves the trained timing table, in OCRAM.
const TIMING_BLOB_BASE: usize = 0x0091_8000;
const TIMING_BLOB_SIZE: usize = 0x8000;

/// The PHY registers are 16 bits wide, on a 4 byte stride.
const PHY_STRIDE_SHIFT: u32 = 2;

zeroed_mut!(
    /// Kept in OCRAM, which stays powered while the DRAM is in retention.
    RETENTION_SNAPSHOT,
    RetentionSnapshot,
    unsafe(link_section = ".retained_bss")
);

static UART: Once<LockedWriter<Imx8mUart>> = Once::new();

/// NXP i.MX 8M Mini/Nano/Plus.
pub struct Imx8m;

impl Platform for Imx8m {
    const CORE_COUNT: usize = 4;
    const QUIESCE_SGI: IntId = IntId::sgi(8);
    const DRAM_CONFIG: DramConfig = DramConfig {
        poll_limit: DramConfig::DEFAULT_POLL_LIMIT,
        bypass_source_mhz: 800,
        reference_mhz: 24,
        mr_ranks: 0x1,
        axi_ports: 1,
    };

    type Registers = MmioDramRegisters;
    type Cores = Imx8mCores;

    fn init_logger() {
        let uart = UART.call_once(|| {
            // SAFETY: `UART2_BASE` is the base address of the UART2 register block, which is
            // identity mapped as device memory, and nothing else accesses it.
            let regs = unsafe { UniqueMmioPointer::new(NonNull::new(UART2_BASE as _).unwrap()) };
            LockedWriter::new(Imx8mUart { regs })
        });
        logger::init(uart).expect("Failed to initialise logger");
    }

    unsafe fn create_dram_registers() -> Self::Registers {
        let window = |base: usize, size: usize, stride_shift: u32| {
            let regs = NonNull::slice_from_raw_parts(
                NonNull::new(base as *mut ReadWrite<u32>).unwrap(),
                size / size_of::<u32>(),
            );
            // SAFETY: Each window is one of the DRAM controller, PHY, CCM, GPC, SRC and fast
            // switch register blocks, which are identity mapped as device memory. Our caller
            // promises that this is only called once, and nothing else in EL3 touches these
            // blocks.
            MmioWindow::new(unsafe { UniqueMmioPointer::new(regs) }, stride_shift)
        };
        // In `Window` order.
        MmioDramRegisters::new([
            window(DDRC_BASE, DDRC_SIZE, 0),
            window(DDR_PHY_BASE, DDR_PHY_SIZE, PHY_STRIDE_SHIFT),
            window(CCM_BASE, CCM_SIZE, 0),
            window(GPC_BASE, GPC_SIZE, 0),
            window(SRC_BASE, SRC_SIZE, 0),
            window(DDRC_FAST_SWITCH_BASE, DDRC_FAST_SWITCH_SIZE, 0),
        ])
    }

    fn create_cores() -> Self::Cores {
        Imx8mCores
    }

    fn timing_table() -> TimingTable {
        // SAFETY: The boot loader writes the timing table to this OCRAM region before entering
        // EL3 firmware, and nothing writes to it afterwards.
        let blob = unsafe {
            core::slice::from_raw_parts(TIMING_BLOB_BASE as *const u8, TIMING_BLOB_SIZE)
        };
        TimingTable::from_blob(blob).expect("Invalid DRAM timing table")
    }

    fn retention_snapshot() -> &'static SpinMutex<&'static mut RetentionSnapshot> {
        &RETENTION_SNAPSHOT
    }
}

/// Inter-core signalling through the GICv3 CPU interface.
///
/// The four Cortex-A53 cores are all in cluster 0, so the linear core index is affinity level 0.
pub struct Imx8mCores;

impl CoreSignals for Imx8mCores {
    fn core_count(&self) -> usize {
        Imx8m::CORE_COUNT
    }

    fn current_core(&self) -> usize {
        usize::from(read_mpidr_el1().aff0())
    }

    fn raise_quiesce_interrupt(&self, targets: CoreMask) {
        const { assert!(Imx8m::QUIESCE_SGI.is_sgi()) };
        let mpidr = read_mpidr_el1();
        let target = SgiTarget::List {
            affinity3: mpidr.aff3(),
            affinity2: mpidr.aff2(),
            affinity1: mpidr.aff1(),
            target_list: targets.bits() as u16,
        };
        // Only fails for an interrupt ID which isn't an SGI.
        let _ = GicCpuInterface::send_sgi(Imx8m::QUIESCE_SGI, target, SgiTargetGroup::Group0);
    }

    fn end_quiesce_interrupt(&self, _core: usize) {
        GicCpuInterface::end_interrupt(Imx8m::QUIESCE_SGI, InterruptGroup::Group0);
    }

    fn wait_for_event(&self, _core: usize) {
        wfe();
    }

    fn send_event(&self) {
        sev();
    }

    fn flush_data_cache(&self) {
        clean_invalidate_dcache_all();
    }
}

/// The i.MX UART registers this driver uses.
#[repr(C)]
struct Imx8mUartRegisters {
    _reserved0: [u32; 16],
    /// Transmitter register.
    utxd: WriteOnly<u32>,
    _reserved1: [u32; 28],
    /// Test register.
    uts: ReadPure<u32>,
}

/// Transmit-only driver for the i.MX UART, which the boot loader has already configured.
struct Imx8mUart {
    regs: UniqueMmioPointer<'static, Imx8mUartRegisters>,
}

impl Imx8mUart {
    const UTS_TXFULL: u32 = 1 << 4;

    fn write_byte(&mut self, byte: u8) {
        while field!(self.regs, uts).read() & Self::UTS_TXFULL != 0 {}
        field!(self.regs, utxd).write(u32::from(byte));
    }
}

impl fmt::Write for Imx8mUart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}
