// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Cross-core quiescence barrier.
//!
//! The initiating core claims the single [`DfsSession`], then calls
//! [`DfsSession::request_quiescence`] which sends the quiesce interrupt to every other online core
//! and spins until all of them have reported arrival. Each of those cores runs
//! [`BarrierState::handle_quiesce_interrupt`] from its interrupt handler: it marks its arrival bit
//! and waits for events until the initiator releases the [`QuiescenceToken`].
//!
//! A responder waiting in the barrier touches nothing but the barrier state itself, so the barrier
//! state and the code of the wait loop must live in memory which stays accessible while DRAM is in
//! self-refresh.

use super::{DfsError, timing::FrequencyIndex};
use crate::aarch64::dsb_sy;
use core::{
    fmt::{self, Debug, Formatter},
    hint::spin_loop,
    sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
};
use spin::mutex::SpinMutex;

/// A set of cores, identified by linear core index.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct CoreMask(u32);

impl CoreMask {
    /// The mask with no cores.
    pub const EMPTY: Self = Self(0);

    /// The largest number of cores a mask can describe.
    pub const MAX_CORES: usize = u32::BITS as usize;

    /// Creates a mask from its raw bits, bit `n` representing core `n`.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the mask containing only the given core.
    pub const fn single(core: usize) -> Self {
        Self(1 << core)
    }

    /// Returns the mask of cores `0..count`.
    pub const fn all(count: usize) -> Self {
        if count >= Self::MAX_CORES {
            Self(u32::MAX)
        } else {
            Self((1 << count) - 1)
        }
    }

    /// Returns the raw bits of the mask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether the mask contains the given core.
    pub const fn contains(self, core: usize) -> bool {
        core < Self::MAX_CORES && self.0 & (1 << core) != 0
    }

    /// Returns whether every core in `other` is also in this mask.
    pub const fn contains_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns a copy of the mask with the given core added.
    pub const fn with(self, core: usize) -> Self {
        Self(self.0 | 1 << core)
    }

    /// Returns a copy of the mask with the given core removed.
    pub const fn without(self, core: usize) -> Self {
        Self(self.0 & !(1 << core))
    }

    /// Returns whether the mask is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the number of cores in the mask.
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns an iterator over the cores in the mask, in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..Self::MAX_CORES).filter(move |&core| self.contains(core))
    }
}

impl Debug for CoreMask {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "CoreMask({:#x})", self.0)
    }
}

/// Inter-core signalling used by the barrier.
pub trait CoreSignals: Sync {
    /// Returns the number of cores in the system.
    fn core_count(&self) -> usize;

    /// Returns the linear index of the calling core.
    fn current_core(&self) -> usize;

    /// Sends the quiesce interrupt to every core in `targets`.
    fn raise_quiesce_interrupt(&self, targets: CoreMask);

    /// Signals end of interrupt for the quiesce interrupt on the calling core, which is `core`.
    ///
    /// This drops the core's running priority before it parks. It is the only end of interrupt
    /// the quiesce interrupt gets, so the Group 0 dispatcher must not write one as well.
    fn end_quiesce_interrupt(&self, core: usize);

    /// Waits for an event on the calling core, which is `core`.
    ///
    /// Must return immediately if an event has been sent since the last call on this core returned.
    fn wait_for_event(&self, core: usize);

    /// Sends an event to every core.
    fn send_event(&self);

    /// Cleans and invalidates the calling core's data caches to the point of coherency.
    fn flush_data_cache(&self);
}

impl<T: CoreSignals> CoreSignals for &T {
    fn core_count(&self) -> usize {
        (**self).core_count()
    }

    fn current_core(&self) -> usize {
        (**self).current_core()
    }

    fn raise_quiesce_interrupt(&self, targets: CoreMask) {
        (**self).raise_quiesce_interrupt(targets)
    }

    fn end_quiesce_interrupt(&self, core: usize) {
        (**self).end_quiesce_interrupt(core)
    }

    fn wait_for_event(&self, core: usize) {
        (**self).wait_for_event(core)
    }

    fn send_event(&self) {
        (**self).send_event()
    }

    fn flush_data_cache(&self) {
        (**self).flush_data_cache()
    }
}

/// Barrier and session state shared by every core.
pub struct BarrierState {
    /// Serialises updates to `arrived`.
    lock: SpinMutex<()>,
    arrived: AtomicU32,
    /// Responders wait while this is set.
    hold: AtomicBool,
    /// Incremented on every release.
    epoch: AtomicU32,
    in_progress: AtomicBool,
    current: AtomicU8,
}

impl BarrierState {
    /// Creates the barrier state with the given frequency point as the current one.
    pub const fn new(current: FrequencyIndex) -> Self {
        Self {
            lock: SpinMutex::new(()),
            arrived: AtomicU32::new(0),
            hold: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
            in_progress: AtomicBool::new(false),
            current: AtomicU8::new(current.0),
        }
    }

    /// Returns the current frequency point.
    pub fn current(&self) -> FrequencyIndex {
        FrequencyIndex(self.current.load(Ordering::Acquire))
    }

    /// Returns whether a session is in flight.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Returns the cores which have arrived at the barrier in the current or most recent session.
    pub fn arrived(&self) -> CoreMask {
        CoreMask(self.arrived.load(Ordering::Acquire))
    }

    /// Returns the number of times the barrier has been released.
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Claims the single session slot.
    ///
    /// Fails with [`DfsError::Busy`] without touching anything else if a session is already in
    /// flight.
    pub fn try_begin_session(&self) -> Result<DfsSession<'_>, DfsError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| DfsError::Busy)?;
        Ok(DfsSession {
            barrier: self,
            current: self.current(),
        })
    }

    /// Handles the quiesce interrupt on a responder core.
    ///
    /// Reports arrival and then waits until the initiator releases the barrier. Returns
    /// immediately if no barrier is being held, e.g. for an interrupt which arrives after the
    /// session that sent it has finished.
    pub fn handle_quiesce_interrupt(&self, signals: &impl CoreSignals) {
        let core = signals.current_core();
        signals.end_quiesce_interrupt(core);

        let epoch = self.epoch.load(Ordering::Acquire);
        if !self.hold.load(Ordering::Acquire) {
            return;
        }

        {
            let _guard = self.lock.lock();
            self.arrived.fetch_or(1 << core, Ordering::Release);
        }

        while self.hold.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch {
            signals.wait_for_event(core);
        }
    }
}

impl Debug for BarrierState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("BarrierState")
            .field("arrived", &self.arrived())
            .field("hold", &self.hold.load(Ordering::Relaxed))
            .field("epoch", &self.epoch())
            .field("in_progress", &self.in_progress())
            .field("current", &self.current())
            .finish()
    }
}

/// Exclusive claim on the DRAM subsystem, held for the duration of one transition.
///
/// Dropping a session without calling [`DfsSession::end`] leaves the slot claimed forever, which
/// is what happens after a fatal poll timeout.
#[must_use]
#[derive(Debug)]
pub struct DfsSession<'a> {
    barrier: &'a BarrierState,
    current: FrequencyIndex,
}

impl<'a> DfsSession<'a> {
    /// Returns the frequency point which was current when the session started.
    pub fn current(&self) -> FrequencyIndex {
        self.current
    }

    /// Parks every core in `online` except the calling one, and returns once they have all
    /// arrived.
    ///
    /// There is no timeout: a core in `online` which never takes the quiesce interrupt makes this
    /// spin forever. The caller must make sure every core in `online` is powered on and will stay
    /// so until the token is released.
    pub fn request_quiescence(
        &self,
        online: CoreMask,
        signals: &impl CoreSignals,
    ) -> QuiescenceToken<'a> {
        let barrier = self.barrier;
        let others = online.without(signals.current_core());

        {
            let _guard = barrier.lock.lock();
            barrier.arrived.store(0, Ordering::Relaxed);
        }
        barrier.hold.store(true, Ordering::Release);
        dsb_sy();

        if !others.is_empty() {
            signals.raise_quiesce_interrupt(others);
        }
        while !CoreMask(barrier.arrived.load(Ordering::Acquire)).contains_all(others) {
            spin_loop();
        }

        QuiescenceToken { barrier }
    }

    /// Ends the session without changing the current frequency point.
    pub fn cancel(self) {
        let current = self.current;
        self.end(current);
    }

    /// Ends the session, recording `current` as the current frequency point.
    pub fn end(self, current: FrequencyIndex) {
        self.barrier.current.store(current.0, Ordering::Release);
        self.barrier.in_progress.store(false, Ordering::Release);
    }
}

/// Proof that every other online core is parked in the barrier.
///
/// Dropping the token without calling [`QuiescenceToken::release`] leaves the other cores parked.
#[must_use]
#[derive(Debug)]
pub struct QuiescenceToken<'a> {
    barrier: &'a BarrierState,
}

impl QuiescenceToken<'_> {
    /// Lets every parked core return from its quiesce interrupt handler.
    pub fn release(self, signals: &impl CoreSignals) {
        self.barrier.epoch.fetch_add(1, Ordering::Release);
        self.barrier.hold.store(false, Ordering::Release);
        dsb_sy();
        signals.send_event();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::fake::SimulatedCores;
    use std::{sync::atomic::AtomicU32, thread};

    #[test]
    fn core_mask() {
        let mask = CoreMask::all(4);
        assert_eq!(mask.bits(), 0b1111);
        assert_eq!(mask.without(2), CoreMask::from_bits(0b1011));
        assert_eq!(mask.without(2).with(2), mask);
        assert!(mask.contains(3));
        assert!(!mask.contains(4));
        assert!(!mask.contains(40));
        assert_eq!(mask.len(), 4);
        assert_eq!(mask.without(1).iter().collect::<Vec<_>>(), [0, 2, 3]);
        assert!(mask.contains_all(CoreMask::single(1)));
        assert!(!CoreMask::single(1).contains_all(mask));
        assert_eq!(CoreMask::all(32).bits(), u32::MAX);
        assert!(CoreMask::EMPTY.is_empty());
    }

    #[test]
    fn session_is_single_flight() {
        let barrier = BarrierState::new(FrequencyIndex(2));

        let session = barrier.try_begin_session().unwrap();
        assert_eq!(session.current(), FrequencyIndex(2));
        assert!(barrier.in_progress());
        assert_eq!(barrier.try_begin_session().unwrap_err(), DfsError::Busy);

        session.end(FrequencyIndex(1));
        assert!(!barrier.in_progress());
        assert_eq!(barrier.current(), FrequencyIndex(1));
        barrier.try_begin_session().unwrap().end(FrequencyIndex(1));
    }

    #[test]
    fn busy_leaves_arrival_bitmap_alone() {
        let barrier = BarrierState::new(FrequencyIndex(0));
        let signals = SimulatedCores::new(1);
        signals.run(0, || {
            let session = barrier.try_begin_session().unwrap();
            let token = session.request_quiescence(CoreMask::all(1), &signals);
            token.release(&signals);
            // Simulate a stale arrival from an earlier session.
            barrier.arrived.store(0b100, Ordering::Relaxed);

            assert_eq!(barrier.try_begin_session().unwrap_err(), DfsError::Busy);
            assert_eq!(barrier.arrived(), CoreMask::from_bits(0b100));
            session.end(FrequencyIndex(0));
        });
    }

    #[test]
    fn single_core_needs_no_interrupts() {
        let barrier = BarrierState::new(FrequencyIndex(0));
        let signals = SimulatedCores::new(1);
        signals.run(0, || {
            let session = barrier.try_begin_session().unwrap();
            let token = session.request_quiescence(CoreMask::all(1), &signals);
            assert_eq!(barrier.arrived(), CoreMask::EMPTY);
            token.release(&signals);
            session.end(FrequencyIndex(0));
        });
        assert_eq!(signals.interrupts_raised(), 0);
    }

    #[test]
    fn spurious_interrupt_returns_immediately() {
        let barrier = BarrierState::new(FrequencyIndex(0));
        let signals = SimulatedCores::new(2);
        signals.run(1, || barrier.handle_quiesce_interrupt(&signals));
        assert_eq!(barrier.arrived(), CoreMask::EMPTY);
    }

    #[test]
    fn responder_ends_interrupt_once_before_parking() {
        let barrier = BarrierState::new(FrequencyIndex(0));
        let signals = SimulatedCores::new(2);
        thread::scope(|scope| {
            scope.spawn(|| {
                signals.run(1, || {
                    while signals.wait_for_interrupt(1) {
                        barrier.handle_quiesce_interrupt(&signals);
                    }
                })
            });
            signals.run(0, || {
                let session = barrier.try_begin_session().unwrap();
                let token = session.request_quiescence(CoreMask::all(2), &signals);
                // Core 1 is parked, with its priority already dropped.
                assert_eq!(signals.interrupts_ended(1), 1);
                token.release(&signals);
                session.end(FrequencyIndex(0));
            });
            signals.shutdown();
        });
        assert_eq!(signals.interrupts_ended(1), 1);
        assert_eq!(signals.interrupts_ended(0), 0);
    }

    /// Every responder stays parked until release, for every core count and initiator.
    #[test]
    fn barrier_safety_and_liveness() {
        for core_count in 1..=4 {
            for initiator in 0..core_count {
                let barrier = BarrierState::new(FrequencyIndex(0));
                let signals = SimulatedCores::new(core_count);
                let online = CoreMask::all(core_count);
                let returned = AtomicU32::new(0);

                thread::scope(|scope| {
                    for core in online.without(initiator).iter() {
                        let (barrier, signals, returned) = (&barrier, &signals, &returned);
                        scope.spawn(move || {
                            signals.run(core, || {
                                while signals.wait_for_interrupt(core) {
                                    barrier.handle_quiesce_interrupt(signals);
                                    returned.fetch_or(1 << core, Ordering::SeqCst);
                                }
                            })
                        });
                    }

                    signals.run(initiator, || {
                        for _ in 0..3 {
                            returned.store(0, Ordering::SeqCst);
                            let session = barrier.try_begin_session().unwrap();
                            let token = session.request_quiescence(online, &signals);

                            assert_eq!(barrier.arrived(), online.without(initiator));
                            // Give responders a chance to misbehave.
                            thread::yield_now();
                            assert_eq!(returned.load(Ordering::SeqCst), 0);

                            token.release(&signals);
                            session.end(FrequencyIndex(0));
                            while returned.load(Ordering::SeqCst)
                                != online.without(initiator).bits()
                            {
                                thread::yield_now();
                            }
                        }
                    });
                    signals.shutdown();
                });

                assert_eq!(barrier.epoch(), 3);
                assert!(!barrier.in_progress());
            }
        }
    }
}
