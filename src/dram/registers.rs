// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register access layer for the DRAM controller, PHY and the surrounding clock, power and reset
//! blocks.
//!
//! All hardware access from the state machines goes through the [`DramRegisters`] capability, so
//! that unit tests can substitute a model of the hardware.

use super::timing::RegisterProgram;
use core::{
    fmt::{self, Display, Formatter},
    hint::spin_loop,
};
use safe_mmio::{UniqueMmioPointer, fields::ReadWrite};
use spin::mutex::SpinMutex;
use thiserror::Error;

/// A register window, i.e. a block of hardware registers with its own base address.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Window {
    /// The memory controller.
    Ddrc,
    /// The DDR PHY. Offsets are PHY register numbers, not byte offsets.
    Phy,
    /// Clock generation: the DRAM PLL, bypass divider and clock gates.
    Clock,
    /// The platform power controller.
    Power,
    /// The reset controller, including the PHY power-ok input.
    Reset,
    /// The hardware frequency switch sequencer.
    FastSwitch,
}

impl Window {
    /// The number of distinct register windows.
    pub const COUNT: usize = 6;

    const fn index(self) -> usize {
        self as usize
    }
}

/// A single 32-bit register: a window and an offset within it.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Register {
    /// The window containing the register.
    pub window: Window,
    /// The offset of the register within its window.
    pub offset: u32,
}

impl Register {
    /// Creates a register descriptor.
    pub const fn new(window: Window, offset: u32) -> Self {
        Self { window, offset }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}+{:#x}", self.window, self.offset)
    }
}

/// A bounded register poll ran out of iterations before its condition became true.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("timed out polling {register} after {iterations} iterations")]
pub struct PollTimeout {
    /// The register being polled.
    pub register: Register,
    /// The iteration bound which was exceeded.
    pub iterations: u32,
}

/// Evaluates `predicate` until it returns true, at most `max_iterations` times.
///
/// `register` only identifies the poll in the returned error.
pub fn poll_until(
    register: Register,
    max_iterations: u32,
    mut predicate: impl FnMut() -> bool,
) -> Result<(), PollTimeout> {
    for _ in 0..max_iterations {
        if predicate() {
            return Ok(());
        }
        spin_loop();
    }
    Err(PollTimeout {
        register,
        iterations: max_iterations,
    })
}

/// Read and write access to the DRAM subsystem's registers.
///
/// Writes take effect in program order: every write issued before a read of the same device is
/// visible to that read.
pub trait DramRegisters {
    /// Reads the current value of the given register.
    fn read(&self, register: Register) -> u32;

    /// Writes the given value to the register.
    fn write(&self, register: Register, value: u32);

    /// Reads the register, applies `f` to its value and writes the result back.
    fn modify(&self, register: Register, f: impl FnOnce(u32) -> u32) {
        let value = self.read(register);
        self.write(register, f(value));
    }

    /// Sets the given bits in the register.
    fn set_bits(&self, register: Register, bits: u32) {
        self.modify(register, |value| value | bits);
    }

    /// Clears the given bits in the register.
    fn clear_bits(&self, register: Register, bits: u32) {
        self.modify(register, |value| value & !bits);
    }

    /// Writes every entry of `program`, in order, to registers in `window`.
    fn apply_program(&self, window: Window, program: RegisterProgram) {
        for entry in program.iter() {
            self.write(Register::new(window, entry.offset), entry.value);
        }
    }

    /// Reads the register until `condition` holds for its value, at most `max_iterations` times.
    ///
    /// Returns the first value for which the condition held.
    fn wait_until(
        &self,
        register: Register,
        max_iterations: u32,
        condition: impl Fn(u32) -> bool,
    ) -> Result<u32, PollTimeout> {
        let mut value = 0;
        poll_until(register, max_iterations, || {
            value = self.read(register);
            condition(value)
        })?;
        Ok(value)
    }
}

impl<T: DramRegisters> DramRegisters for &T {
    fn read(&self, register: Register) -> u32 {
        (**self).read(register)
    }

    fn write(&self, register: Register, value: u32) {
        (**self).write(register, value)
    }
}

/// One memory mapped register window, as 32-bit slots.
#[derive(Debug)]
pub struct MmioWindow {
    regs: SpinMutex<UniqueMmioPointer<'static, [ReadWrite<u32>]>>,
    stride_shift: u32,
}

impl MmioWindow {
    /// Wraps the registers of a window. Register offset `n` is at byte `n << stride_shift`.
    pub const fn new(
        regs: UniqueMmioPointer<'static, [ReadWrite<u32>]>,
        stride_shift: u32,
    ) -> Self {
        Self {
            regs: SpinMutex::new(regs),
            stride_shift,
        }
    }

    fn slot(&self, offset: u32) -> usize {
        ((offset as usize) << self.stride_shift) / size_of::<u32>()
    }
}

/// Memory mapped implementation of [`DramRegisters`].
///
/// Panics on access to an offset beyond the end of its window.
#[derive(Debug)]
pub struct MmioDramRegisters {
    windows: [MmioWindow; Window::COUNT],
}

impl MmioDramRegisters {
    /// Creates a register accessor for the given windows, indexed in [`Window`] order.
    pub const fn new(windows: [MmioWindow; Window::COUNT]) -> Self {
        Self { windows }
    }
}

impl DramRegisters for MmioDramRegisters {
    fn read(&self, register: Register) -> u32 {
        let window = &self.windows[register.window.index()];
        let mut regs = window.regs.lock();
        match regs.get(window.slot(register.offset)) {
            Some(mut slot) => slot.read(),
            None => panic!("{register} is outside its register window"),
        }
    }

    fn write(&self, register: Register, value: u32) {
        let window = &self.windows[register.window.index()];
        let mut regs = window.regs.lock();
        match regs.get(window.slot(register.offset)) {
            Some(mut slot) => slot.write(value),
            None => panic!("{register} is outside its register window"),
        }
    }
}
