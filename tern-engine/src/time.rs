// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Time advances in whole clock ticks of a single simulation clock.

use core::cmp::Ordering;

/// A point in simulation time, in clock ticks.
///
/// Ties between events scheduled for the same tick are broken by the order in
/// which they were scheduled (`seq`), which keeps the simulation
/// deterministic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockTick {
    /// Clock ticks.
    tick: u64,

    /// Order of scheduling within the tick.
    seq: u64,
}

impl ClockTick {
    #[must_use]
    pub fn new(tick: u64, seq: u64) -> Self {
        Self { tick, seq }
    }

    /// Get the clock tick.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Get the scheduling order within the tick.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Ord for ClockTick {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.tick.cmp(&other.tick) {
            Ordering::Equal => self.seq.cmp(&other.seq),
            ordering => ordering,
        }
    }
}

impl PartialOrd for ClockTick {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ClockTick {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}", self.tick, self.seq)
    }
}

/// The simulation clock.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    /// Frequency of the clock in MHz.
    freq_mhz: f64,
}

impl Clock {
    #[must_use]
    pub fn new(freq_mhz: f64) -> Self {
        Self { freq_mhz }
    }

    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    /// Convert a number of ticks of this clock to ns.
    #[must_use]
    pub fn to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * 1000.0 / self.freq_mhz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_ordering() {
        assert!(ClockTick::new(1, 5) < ClockTick::new(2, 0));
        assert!(ClockTick::new(2, 0) < ClockTick::new(2, 1));
        assert_eq!(ClockTick::new(3, 3), ClockTick::new(3, 3));
    }

    #[test]
    fn ticks_to_ns() {
        assert_eq!(Clock::new(1000.0).to_ns(5), 5.0);
        assert_eq!(Clock::new(500.0).to_ns(5), 10.0);
    }
}
