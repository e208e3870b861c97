//! Virtual time for the emulated machine.
//!
//! The core advances a virtual clock that is either derived from the host's
//! monotonic clock (wallclock mode) or from the number of executed guest
//! instructions (deterministic mode, `icycles << icnt_factor`). Everything
//! time-related in the machine (the time base, the decrementer, device
//! one-shot timers) is expressed in nanoseconds of this virtual clock.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Source of host nanoseconds. Production code uses [`SystemClock`]; tests
/// drive a [`FakeHostClock`] by hand.
pub trait HostClock: Send + Sync {
    fn now_ns(&self) -> u64;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Manually advanced clock for tests.
#[derive(Default)]
pub struct FakeHostClock {
    ns: AtomicU64,
}

impl FakeHostClock {
    pub fn new(ns: u64) -> Self {
        Self { ns: AtomicU64::new(ns) }
    }

    pub fn set_ns(&self, ns: u64) {
        self.ns.store(ns, Ordering::Relaxed);
    }

    pub fn advance_ns(&self, delta: u64) {
        self.ns.fetch_add(delta, Ordering::Relaxed);
    }
}

impl HostClock for FakeHostClock {
    fn now_ns(&self) -> u64 {
        self.ns.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMode {
    /// Virtual time follows the host clock.
    Wallclock,
    /// Virtual time is `icycles << icnt_factor` nanoseconds.
    Deterministic { icnt_factor: u8 },
}

/// The machine's virtual clock.
pub struct VirtualClock {
    mode: ClockMode,
    host: Arc<dyn HostClock>,
    wall_zero_ns: u64,
}

impl VirtualClock {
    pub fn new(mode: ClockMode, host: Arc<dyn HostClock>) -> Self {
        let wall_zero_ns = host.now_ns();
        Self { mode, host, wall_zero_ns }
    }

    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Current virtual time. `icycles` is the caller's retired-instruction
    /// counter; it is ignored in wallclock mode.
    pub fn now_ns(&self, icycles: u64) -> u64 {
        match self.mode {
            ClockMode::Wallclock => self.host.now_ns() - self.wall_zero_ns,
            ClockMode::Deterministic { icnt_factor } => icycles << icnt_factor,
        }
    }

    /// Convert a nanosecond delta into instruction cycles (deterministic
    /// mode); in wallclock mode the caller polls instead, so a conservative
    /// 1:1 mapping is returned.
    pub fn ns_to_cycles(&self, ns: u64) -> u64 {
        match self.mode {
            ClockMode::Wallclock => ns,
            ClockMode::Deterministic { icnt_factor } => (ns >> icnt_factor) + 1,
        }
    }

    /// Reset the wallclock origin (soft reset).
    pub fn rezero(&mut self) {
        self.wall_zero_ns = self.host.now_ns();
    }
}

/// Time-base frequency as fixed-point fractions: ticks per nanosecond as a
/// Q32 fraction below 1.0 (≤ 999.999999 MHz) and the period in nanoseconds
/// as a 32.32 value. This is exact enough that one emulated second of a
/// 16.705 MHz time base lands within one tick of 16 705 000.
#[derive(Clone, Copy, Debug)]
pub struct TbrFreq {
    ticks_per_ns_q32: u32,
    period_ns_q32: u64,
}

impl TbrFreq {
    pub fn from_hz(hz: u64) -> Self {
        debug_assert!(hz > 0 && hz < NS_PER_SEC);
        Self {
            ticks_per_ns_q32: ((hz << 32) / NS_PER_SEC) as u32,
            period_ns_q32: ((NS_PER_SEC as u128) << 32).checked_div(hz as u128).unwrap() as u64,
        }
    }

    /// Number of time-base ticks elapsed over `ns` nanoseconds.
    pub fn ticks_in(&self, ns: u64) -> u64 {
        ((self.ticks_per_ns_q32 as u128 * ns as u128) >> 32) as u64
    }

    /// Nanoseconds covered by `ticks` time-base ticks.
    pub fn ns_for_ticks(&self, ticks: u64) -> u64 {
        ((self.period_ns_q32 as u128 * ticks as u128) >> 32) as u64
    }
}

/// Interrupt line sink. Device timer callbacks raise and release lines
/// through this; the machine maps lines onto the CPU's external interrupt
/// pin.
pub trait InterruptSink {
    fn assert_line(&mut self, line: u32);
    fn release_line(&mut self, line: u32);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerEvent<P> {
    pub id: TimerId,
    pub deadline_ns: u64,
    pub payload: P,
}

struct Slot<P> {
    deadline_ns: u64,
    seq: u64,
    payload: P,
}

impl<P> PartialEq for Slot<P> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_ns == other.deadline_ns && self.seq == other.seq
    }
}
impl<P> Eq for Slot<P> {}
impl<P> PartialOrd for Slot<P> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<P> Ord for Slot<P> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline_ns, self.seq).cmp(&(other.deadline_ns, other.seq))
    }
}

/// One-shot timer queue ordered by virtual-time deadline.
///
/// Cancellation is lazy: cancelled ids are skipped when they surface. The
/// payload tells the owner what to do when a timer fires (rearm the
/// decrementer, advance a DMA channel, …); the queue itself never runs
/// callbacks, keeping borrow scopes at the call site.
pub struct TimerQueue<P> {
    heap: BinaryHeap<Reverse<Slot<P>>>,
    dead: HashSet<u64>,
    next_seq: u64,
}

impl<P> Default for TimerQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> TimerQueue<P> {
    pub fn new() -> Self {
        Self { heap: BinaryHeap::new(), dead: HashSet::new(), next_seq: 0 }
    }

    pub fn add_oneshot(&mut self, now_ns: u64, delta_ns: u64, payload: P) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Slot {
            deadline_ns: now_ns.saturating_add(delta_ns),
            seq,
            payload,
        }));
        TimerId(seq)
    }

    pub fn cancel(&mut self, id: TimerId) {
        self.dead.insert(id.0);
    }

    /// Pop the next timer whose deadline is at or before `now_ns`.
    pub fn pop_due(&mut self, now_ns: u64) -> Option<TimerEvent<P>> {
        while let Some(Reverse(slot)) = self.heap.peek() {
            if self.dead.remove(&slot.seq) {
                self.heap.pop();
                continue;
            }
            if slot.deadline_ns > now_ns {
                return None;
            }
            let Reverse(slot) = self.heap.pop().unwrap();
            return Some(TimerEvent {
                id: TimerId(slot.seq),
                deadline_ns: slot.deadline_ns,
                payload: slot.payload,
            });
        }
        None
    }

    /// Deadline of the nearest live timer, if any.
    pub fn next_deadline_ns(&mut self) -> Option<u64> {
        while let Some(Reverse(slot)) = self.heap.peek() {
            if self.dead.contains(&slot.seq) {
                let Reverse(slot) = self.heap.pop().unwrap();
                self.dead.remove(&slot.seq);
                continue;
            }
            return Some(slot.deadline_ns);
        }
        None
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_deadline_ns().is_none()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.dead.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q32_tbr_math_is_tick_exact_over_one_second() {
        let freq = TbrFreq::from_hz(16_705_000);
        let ticks = freq.ticks_in(NS_PER_SEC);
        assert!((ticks as i64 - 16_705_000).abs() <= 1, "got {ticks}");
    }

    #[test]
    fn period_roundtrip() {
        let freq = TbrFreq::from_hz(25_000_000);
        let ns = freq.ns_for_ticks(25_000_000);
        assert!((ns as i64 - NS_PER_SEC as i64).abs() <= 2, "got {ns}");
    }

    #[test]
    fn deterministic_clock_scales_by_icnt_factor() {
        let clock =
            VirtualClock::new(ClockMode::Deterministic { icnt_factor: 4 }, Arc::new(FakeHostClock::new(0)));
        assert_eq!(clock.now_ns(0), 0);
        assert_eq!(clock.now_ns(1000), 16_000);
    }
}
