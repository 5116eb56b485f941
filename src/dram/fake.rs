// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake DRAM hardware and a simulated multi-core system for unit tests.

use super::{
    DramConfig,
    barrier::{CoreMask, CoreSignals},
    const_zeroed,
    registers::{DramRegisters, Register, Window},
    regs::{Dbgcam, Dfimisc, Pwrctl, clock, ddrc, fast_switch, phy, power, reset},
    retention::RetentionSnapshot,
    timing::{
        FastSwitchPoints, FrequencyIndex, FrequencyPointTimings, RegisterProgram, RegisterValue,
        TimingTable,
    },
};
use spin::mutex::SpinMutex;
use std::{
    cell::Cell,
    collections::BTreeMap,
    sync::{
        Condvar, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

/// Number of AXI ports the fake controller has.
pub const FAKE_AXI_PORTS: u8 = 3;

/// Configuration used by tests, with a small poll bound so that timeouts are quick.
pub const TEST_CONFIG: DramConfig = DramConfig {
    poll_limit: 100,
    bypass_source_mhz: 800,
    reference_mhz: 24,
    mr_ranks: 0x1,
    axi_ports: FAKE_AXI_PORTS,
};

/// Number of reads of `MRSTAT` for which a mode register write stays busy.
const MR_BUSY_READS: u32 = 2;

/// Leaks the given pairs as a register program.
pub fn leak_program(entries: &[(u32, u32)]) -> RegisterProgram {
    let entries: Vec<RegisterValue> = entries
        .iter()
        .map(|&(offset, value)| RegisterValue::new(offset, value))
        .collect();
    RegisterProgram::new(Box::leak(entries.into_boxed_slice()))
}

fn point_programs(data_rate: u32, bypass: bool) -> FrequencyPointTimings {
    let tag = |i: u32| data_rate << 8 | i;
    FrequencyPointTimings {
        data_rate,
        bypass,
        controller: leak_program(&[
            (0x064, tag(1)),
            (0x0d0, tag(2)),
            (0x0dc, tag(3)),
            (0x100, tag(4)),
            (0x104, tag(5)),
            (0x190, tag(6)),
        ]),
        phy_init: leak_program(&[
            (0x1_005f, tag(7)),
            (0x1_015f, tag(8)),
            (0x2_0055, tag(9)),
        ]),
        phy_trained_csr: leak_program(&[
            (0x2_00b2, tag(10)),
            (0x1_0043, tag(11)),
            (0x1_1043, tag(12)),
            (0x1_2043, tag(13)),
        ]),
        phy_pie: leak_program(&[(0x9_0000, tag(14)), (0x9_0001, tag(15))]),
        mode_registers: leak_program(&[
            (1, tag(16) & 0xff),
            (2, tag(17) & 0xff),
            (3, tag(18) & 0xff),
            (13, tag(19) & 0xff),
        ]),
    }
}

/// Leaks a zeroed retention snapshot.
pub fn leak_snapshot() -> &'static SpinMutex<&'static mut RetentionSnapshot> {
    Box::leak(Box::new(SpinMutex::new(Box::leak(Box::new(const_zeroed())))))
}

/// Returns three frequency points: 3200 MT/s and 1600 MT/s from the PLL, and 400 MT/s through the
/// bypass divider.
pub fn test_table_points() -> Vec<FrequencyPointTimings> {
    vec![
        point_programs(3200, false),
        point_programs(1600, false),
        point_programs(400, true),
    ]
}

/// Returns a table of [`test_table_points`], with fast switching between points 0 and 1.
pub fn test_table() -> TimingTable {
    TimingTable::new(
        test_table_points(),
        Some(FastSwitchPoints {
            full: FrequencyIndex(0),
            half: FrequencyIndex(1),
        }),
    )
    .unwrap()
}

#[derive(Debug, Default)]
struct FakeState {
    values: BTreeMap<Register, u32>,
    pins: BTreeMap<Register, u32>,
    writes: Vec<(Register, u32)>,
    mode_register_writes: Vec<(u32, u32)>,
    mr_busy_reads: u32,
    powered: bool,
}

impl FakeState {
    fn get(&self, register: Register) -> u32 {
        self.values.get(&register).copied().unwrap_or_default()
    }

    fn set(&mut self, register: Register, value: u32) {
        self.values.insert(register, value);
    }

    /// Resets the controller and PHY registers to the state they have when the domain powers on.
    ///
    /// If `retained` is true the DRAM comes back in self-refresh and the PHY needs initialising.
    fn power_on_defaults(&mut self, retained: bool) {
        self.values
            .retain(|register, _| !matches!(register.window, Window::Ddrc | Window::Phy));
        self.powered = true;
        self.mr_busy_reads = 0;

        if retained {
            self.set(
                ddrc::STAT,
                ddrc::STAT_OPERATING_MODE_SELF_REFRESH | ddrc::STAT_SELFREF_TYPE_SOFTWARE,
            );
            self.set(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        } else {
            self.set(ddrc::STAT, ddrc::STAT_OPERATING_MODE_NORMAL);
            self.set(ddrc::DFISTAT, ddrc::DFISTAT_DFI_INIT_COMPLETE);
            self.set(ddrc::DFIMISC, Dfimisc::DFI_INIT_COMPLETE_EN.bits());
            for port in 0..FAKE_AXI_PORTS {
                self.set(ddrc::pctrl(port), ddrc::PCTRL_PORT_EN);
            }
        }
        self.set(ddrc::DBGCAM, Dbgcam::DRAINED.bits());
        self.set(ddrc::SWCTL, ddrc::SWCTL_SW_DONE);
        self.set(ddrc::SWSTAT, ddrc::SWSTAT_SW_DONE_ACK);
        self.set(phy::MICRO_CONT_MUX_SEL, phy::MICRO_CONT_MUX_SEL_PHY);
        self.update_phy_reset_status();
    }

    fn update_phy_reset_status(&mut self) {
        let rcr = self.get(reset::DDRC_RCR);
        let done = self.powered
            && rcr & reset::DDRC_RCR_PHY_PWROKIN != 0
            && rcr & reset::DDRC_RCR_PHY_RESET == 0;
        self.set(
            phy::RESET_STAT,
            if done {
                phy::RESET_STAT_COLD_RESET_DONE
            } else {
                0
            },
        );
    }

    /// Panics if firmware accesses a PHY CSR without owning the CSR bus.
    fn check_phy_access(&self, register: Register) {
        if register.window == Window::Phy
            && ![
                phy::MICRO_CONT_MUX_SEL,
                phy::LP_CTRL,
                phy::LP_STAT,
                phy::RESET_STAT,
            ]
            .contains(&register)
            && self.get(phy::MICRO_CONT_MUX_SEL) != phy::MICRO_CONT_MUX_SEL_APB
        {
            panic!("PHY CSR {register} accessed without APB ownership");
        }
    }

    fn write(&mut self, register: Register, value: u32) {
        self.writes.push((register, value));

        if matches!(register.window, Window::Ddrc | Window::Phy) {
            assert!(self.powered, "{register} written while powered off");
        }
        self.check_phy_access(register);

        match register {
            ddrc::MRCTRL0 if value & ddrc::MRCTRL0_MR_WR != 0 => {
                assert_eq!(
                    self.mr_busy_reads, 0,
                    "mode register write issued while the previous one is busy"
                );
                self.mr_busy_reads = MR_BUSY_READS;
                let address = (value >> ddrc::MRCTRL0_MR_ADDR_SHIFT) & ddrc::MRCTRL0_MR_ADDR_MASK;
                let data = self.get(ddrc::MRCTRL1);
                self.mode_register_writes.push((address, data));
                self.set(register, value & !ddrc::MRCTRL0_MR_WR);
            }
            ddrc::PWRCTL => {
                self.set(register, value);
                let stat = if Pwrctl::from_bits_retain(value).contains(Pwrctl::SELFREF_SW) {
                    ddrc::STAT_OPERATING_MODE_SELF_REFRESH | ddrc::STAT_SELFREF_TYPE_SOFTWARE
                } else {
                    ddrc::STAT_OPERATING_MODE_NORMAL
                };
                self.set(ddrc::STAT, stat);
            }
            ddrc::DFIMISC => {
                let old = Dfimisc::from_bits_retain(self.get(register));
                let new = Dfimisc::from_bits_retain(value);
                self.set(register, value);
                // The PHY drops init-complete while the strobe is high, and raises it again once
                // the strobe falls.
                let strobe = Dfimisc::DFI_INIT_START;
                if !old.contains(strobe) && new.contains(strobe) {
                    self.set(ddrc::DFISTAT, 0);
                } else if old.contains(strobe) && !new.contains(strobe) {
                    self.set(ddrc::DFISTAT, ddrc::DFISTAT_DFI_INIT_COMPLETE);
                }
            }
            ddrc::SWCTL => {
                self.set(register, value);
                self.set(ddrc::SWSTAT, value & ddrc::SWSTAT_SW_DONE_ACK);
            }
            ddrc::DBGCMD => {
                // Commands self-clear; completion is immediate.
                self.set(register, 0);
            }
            phy::LP_CTRL => {
                self.set(register, value);
                self.set(phy::LP_STAT, value & phy::LP_STAT_CAL_HOLD);
            }
            clock::PLL_GNRL_CTL => {
                let lock = if value & clock::PLL_GNRL_CTL_RST != 0 {
                    clock::PLL_GNRL_CTL_LOCK
                } else {
                    0
                };
                self.set(register, value & !clock::PLL_GNRL_CTL_LOCK | lock);
            }
            clock::BYPASS_DIV => {
                self.set(register, value);
                self.set(clock::BYPASS_STAT, clock::BYPASS_STAT_UPDATE_DONE);
            }
            power::PDN_REQ => {
                if value & power::DRAM_DOMAIN != 0 {
                    assert_eq!(
                        self.get(clock::DRAM_GATE),
                        0,
                        "power removed with DRAM clocks running"
                    );
                    self.powered = false;
                    self.values.retain(|register, _| {
                        !matches!(register.window, Window::Ddrc | Window::Phy)
                    });
                    self.update_phy_reset_status();
                }
                self.set(register, 0);
            }
            power::PUP_REQ => {
                if value & power::DRAM_DOMAIN != 0 {
                    self.power_on_defaults(true);
                }
                self.set(register, 0);
            }
            reset::DDRC_RCR => {
                let old = self.get(register);
                if old & !value & reset::DDRC_RCR_PHY_PWROKIN != 0 {
                    assert!(!self.powered, "PHY power-ok dropped while powered");
                }
                if !old & value & reset::DDRC_RCR_PHY_PWROKIN != 0 {
                    assert!(self.powered, "PHY power-ok raised while powered off");
                }
                self.set(register, value);
                self.update_phy_reset_status();
            }
            fast_switch::CTRL => {
                self.set(register, value);
                self.set(
                    fast_switch::STAT,
                    if value & fast_switch::CTRL_STOP_REQ != 0 {
                        fast_switch::STAT_STOP_ACK
                    } else {
                        0
                    },
                );
            }
            _ => self.set(register, value),
        }
    }

    fn read(&mut self, register: Register) -> u32 {
        if let Some(&value) = self.pins.get(&register) {
            return value;
        }
        self.check_phy_access(register);
        if matches!(register.window, Window::Ddrc | Window::Phy) && !self.powered {
            return 0;
        }
        if register == ddrc::MRSTAT && self.mr_busy_reads > 0 {
            self.mr_busy_reads -= 1;
            return self.get(register) | ddrc::MRSTAT_MR_WR_BUSY;
        }
        self.get(register)
    }
}

/// A model of the DRAM controller, PHY and the clock, power and reset blocks around them.
///
/// Registers read back what was last written to them, except for the status registers the state
/// machines poll, which follow the control bits they report on.
#[derive(Debug)]
pub struct FakeDramRegisters {
    state: Mutex<FakeState>,
}

impl FakeDramRegisters {
    /// Creates a powered on subsystem running normally from the PLL.
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.set(
            reset::DDRC_RCR,
            reset::DDRC_RCR_PHY_PWROKIN,
        );
        state.set(
            clock::PLL_GNRL_CTL,
            clock::PLL_GNRL_CTL_RST | clock::PLL_GNRL_CTL_LOCK,
        );
        state.set(clock::BYPASS_STAT, clock::BYPASS_STAT_UPDATE_DONE);
        state.set(clock::DRAM_GATE, clock::DRAM_GATE_ON);
        state.power_on_defaults(false);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Creates a subsystem whose registers hold the programs of the given frequency point, as the
    /// boot loader leaves them.
    pub fn with_point(timings: &FrequencyPointTimings) -> Self {
        let fake = Self::new();
        fake.preload(Window::Ddrc, timings.controller);
        fake.preload(Window::Phy, timings.phy_init);
        fake.preload(Window::Phy, timings.phy_trained_csr);
        fake.preload(Window::Phy, timings.phy_pie);
        fake
    }

    /// Stores the program's values directly, without recording writes or side effects.
    pub fn preload(&self, window: Window, program: RegisterProgram) {
        let mut state = self.state.lock().unwrap();
        for entry in program.iter() {
            state.set(Register::new(window, entry.offset), entry.value);
        }
    }

    /// Returns the stored value of the register, bypassing pins, side effects and access checks.
    pub fn value(&self, register: Register) -> u32 {
        self.state.lock().unwrap().get(register)
    }

    /// Makes every read of the register return `value` until it is unpinned.
    pub fn pin(&self, register: Register, value: u32) {
        self.state.lock().unwrap().pins.insert(register, value);
    }

    /// Undoes [`FakeDramRegisters::pin`].
    pub fn unpin(&self, register: Register) {
        self.state.lock().unwrap().pins.remove(&register);
    }

    /// Returns every write so far, in order.
    pub fn writes(&self) -> Vec<(Register, u32)> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Forgets the writes recorded so far.
    pub fn clear_writes(&self) {
        let mut state = self.state.lock().unwrap();
        state.writes.clear();
        state.mode_register_writes.clear();
    }

    /// Returns the indices into [`FakeDramRegisters::writes`] of writes matching `predicate`.
    pub fn write_positions(&self, predicate: impl Fn(Register, u32) -> bool) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .enumerate()
            .filter(|(_, (register, value))| predicate(*register, *value))
            .map(|(position, _)| position)
            .collect()
    }

    /// Returns the `(mode register, value)` pairs written to the DRAM devices so far.
    pub fn mode_register_writes(&self) -> Vec<(u32, u32)> {
        self.state.lock().unwrap().mode_register_writes.clone()
    }

    /// Returns whether the DRAM power domain is on.
    pub fn powered(&self) -> bool {
        self.state.lock().unwrap().powered
    }
}

impl Default for FakeDramRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl DramRegisters for FakeDramRegisters {
    fn read(&self, register: Register) -> u32 {
        self.state.lock().unwrap().read(register)
    }

    fn write(&self, register: Register, value: u32) {
        self.state.lock().unwrap().write(register, value)
    }
}

thread_local! {
    static CURRENT_CORE: Cell<Option<usize>> = const { Cell::new(None) };
}

#[derive(Debug)]
struct CoreState {
    pending: Vec<bool>,
    events: Vec<bool>,
    interrupts_ended: Vec<usize>,
    shutdown: bool,
}

/// A simulated multi-core system where each core is a host thread.
///
/// Each core has a latched event register and a quiesce interrupt pending flag. Sending an event
/// sets every core's latch, and waiting for an event consumes it, so a wake-up can't be lost
/// between checking a condition and waiting.
#[derive(Debug)]
pub struct SimulatedCores {
    core_count: usize,
    state: Mutex<CoreState>,
    changed: Condvar,
    interrupts_raised: AtomicUsize,
    cache_flushes: AtomicUsize,
}

impl SimulatedCores {
    /// Creates a system with the given number of cores.
    pub fn new(core_count: usize) -> Self {
        Self {
            core_count,
            state: Mutex::new(CoreState {
                pending: vec![false; core_count],
                events: vec![false; core_count],
                interrupts_ended: vec![0; core_count],
                shutdown: false,
            }),
            changed: Condvar::new(),
            interrupts_raised: AtomicUsize::new(0),
            cache_flushes: AtomicUsize::new(0),
        }
    }

    /// Runs `f` on the calling thread as the given core.
    pub fn run<R>(&self, core: usize, f: impl FnOnce() -> R) -> R {
        CURRENT_CORE.set(Some(core));
        let result = f();
        CURRENT_CORE.set(None);
        result
    }

    /// Runs `f` as core `initiator`, while every other core runs `handler` each time it takes the
    /// quiesce interrupt.
    pub fn run_system<T>(
        &self,
        initiator: usize,
        handler: impl Fn() + Sync,
        f: impl FnOnce() -> T,
    ) -> T {
        struct ShutdownOnDrop<'a>(&'a SimulatedCores);

        impl Drop for ShutdownOnDrop<'_> {
            fn drop(&mut self) {
                self.0.shutdown();
            }
        }

        let handler = &handler;
        thread::scope(|scope| {
            for core in (0..self.core_count).filter(|&core| core != initiator) {
                scope.spawn(move || {
                    self.run(core, || {
                        while self.wait_for_interrupt(core) {
                            handler();
                        }
                    })
                });
            }
            let _shutdown = ShutdownOnDrop(self);
            self.run(initiator, f)
        })
    }

    /// Blocks until the quiesce interrupt is pending on `core`, returning true, or until
    /// [`SimulatedCores::shutdown`] is called, returning false.
    pub fn wait_for_interrupt(&self, core: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.pending[core] {
                return true;
            }
            if state.shutdown {
                return false;
            }
            state = self.changed.wait(state).unwrap();
        }
    }

    /// Makes every core blocked in [`SimulatedCores::wait_for_interrupt`] return.
    pub fn shutdown(&self) {
        self.state.lock().unwrap().shutdown = true;
        self.changed.notify_all();
    }

    /// Returns whether the quiesce interrupt is pending on `core`.
    pub fn quiesce_pending(&self, core: usize) -> bool {
        self.state.lock().unwrap().pending[core]
    }

    /// Returns the number of times `core` has signalled end of interrupt.
    pub fn interrupts_ended(&self, core: usize) -> usize {
        self.state.lock().unwrap().interrupts_ended[core]
    }

    /// Returns the total number of quiesce interrupts sent.
    pub fn interrupts_raised(&self) -> usize {
        self.interrupts_raised.load(Ordering::SeqCst)
    }

    /// Returns the number of data cache flushes requested.
    pub fn cache_flushes(&self) -> usize {
        self.cache_flushes.load(Ordering::SeqCst)
    }
}

impl CoreSignals for SimulatedCores {
    fn core_count(&self) -> usize {
        self.core_count
    }

    fn current_core(&self) -> usize {
        CURRENT_CORE
            .get()
            .expect("SimulatedCores used outside SimulatedCores::run")
    }

    fn raise_quiesce_interrupt(&self, targets: CoreMask) {
        let mut state = self.state.lock().unwrap();
        for core in targets.iter() {
            state.pending[core] = true;
            self.interrupts_raised.fetch_add(1, Ordering::SeqCst);
        }
        self.changed.notify_all();
    }

    fn end_quiesce_interrupt(&self, core: usize) {
        let mut state = self.state.lock().unwrap();
        state.pending[core] = false;
        state.interrupts_ended[core] += 1;
    }

    fn wait_for_event(&self, core: usize) {
        let mut state = self.state.lock().unwrap();
        while !state.events[core] {
            state = self.changed.wait(state).unwrap();
        }
        state.events[core] = false;
    }

    fn send_event(&self) {
        let mut state = self.state.lock().unwrap();
        state.events.fill(true);
        self.changed.notify_all();
    }

    fn flush_data_cache(&self) {
        self.cache_flushes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_refresh_follows_force_bit() {
        let regs = FakeDramRegisters::new();
        regs.set_bits(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        assert_eq!(
            regs.read(ddrc::STAT) & ddrc::STAT_OPERATING_MODE_MASK,
            ddrc::STAT_OPERATING_MODE_SELF_REFRESH
        );
        regs.clear_bits(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        assert_eq!(
            regs.read(ddrc::STAT) & ddrc::STAT_OPERATING_MODE_MASK,
            ddrc::STAT_OPERATING_MODE_NORMAL
        );
    }

    #[test]
    #[should_panic(expected = "while the previous one is busy")]
    fn back_to_back_mode_register_writes_panic() {
        let regs = FakeDramRegisters::new();
        regs.write(ddrc::MRCTRL0, ddrc::MRCTRL0_MR_WR);
        regs.write(ddrc::MRCTRL0, ddrc::MRCTRL0_MR_WR);
    }

    #[test]
    fn mode_register_busy_clears_after_reads() {
        let regs = FakeDramRegisters::new();
        regs.write(ddrc::MRCTRL1, 0x24);
        regs.write(ddrc::MRCTRL0, ddrc::MRCTRL0_MR_WR | 2 << ddrc::MRCTRL0_MR_ADDR_SHIFT);
        for _ in 0..MR_BUSY_READS {
            assert_ne!(regs.read(ddrc::MRSTAT) & ddrc::MRSTAT_MR_WR_BUSY, 0);
        }
        assert_eq!(regs.read(ddrc::MRSTAT) & ddrc::MRSTAT_MR_WR_BUSY, 0);
        assert_eq!(regs.mode_register_writes(), [(2, 0x24)]);
    }

    #[test]
    #[should_panic(expected = "without APB ownership")]
    fn phy_csr_needs_mux() {
        let regs = FakeDramRegisters::new();
        regs.write(Register::new(Window::Phy, 0x1_005f), 1);
    }

    #[test]
    fn pins_override_reads() {
        let regs = FakeDramRegisters::new();
        regs.pin(ddrc::STAT, 0);
        regs.write(ddrc::PWRCTL, Pwrctl::SELFREF_SW.bits());
        assert_eq!(regs.read(ddrc::STAT), 0);
        regs.unpin(ddrc::STAT);
        assert_ne!(regs.read(ddrc::STAT), 0);
    }

    #[test]
    fn event_latch() {
        let cores = SimulatedCores::new(2);
        cores.send_event();
        // Returns immediately because of the latched event.
        cores.wait_for_event(1);
        cores.raise_quiesce_interrupt(CoreMask::single(1));
        assert!(cores.wait_for_interrupt(1));
        cores.end_quiesce_interrupt(1);
        assert_eq!(cores.interrupts_ended(1), 1);
        cores.shutdown();
        assert!(!cores.wait_for_interrupt(1));
        assert_eq!(cores.interrupts_raised(), 1);
    }
}
