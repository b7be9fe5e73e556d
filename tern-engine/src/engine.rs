// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The engine owns simulation time and a queue of pending events.
//!
//! Events are addressed to a target (an index chosen by the user, e.g. the
//! rank of a participant) and are delivered strictly in time order. Events
//! scheduled for the same tick are delivered in the order they were
//! scheduled.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

use tern_track::entity::{Entity, toplevel};
use tern_track::tracker::stdout_tracker;
use tern_track::{Tracker, set_time, trace};

use crate::time::{Clock, ClockTick};
use crate::types::SimResult;

/// Use a default clock frequency of 1GHz.
const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

/// An event that has been taken from the queue to be handled.
#[derive(Debug)]
pub struct Delivery<E> {
    /// Tick at which the event is delivered.
    pub tick: u64,

    /// Index of the participant the event is addressed to.
    pub target: usize,

    pub event: E,
}

struct Scheduled<E> {
    at: ClockTick,
    target: usize,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at)
    }
}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct Engine<E> {
    toplevel: Rc<Entity>,
    entity: Rc<Entity>,
    tracker: Tracker,
    clock: Clock,
    now: u64,
    next_seq: u64,
    num_delivered: u64,
    queue: BinaryHeap<Reverse<Scheduled<E>>>,
}

impl<E> Engine<E> {
    /// Create a standalone engine.
    pub fn new(tracker: &Tracker) -> Self {
        Self::new_with_clock_mhz(tracker, DEFAULT_CLOCK_MHZ)
    }

    pub fn new_with_clock_mhz(tracker: &Tracker, freq_mhz: f64) -> Self {
        let toplevel = toplevel(tracker, "top");
        let entity = Rc::new(Entity::new(&toplevel, "engine"));
        Self {
            toplevel,
            entity,
            tracker: tracker.clone(),
            clock: Clock::new(freq_mhz),
            now: 0,
            next_seq: 0,
            num_delivered: 0,
            queue: BinaryHeap::new(),
        }
    }

    /// Schedule `event` for `target` after `delay_ticks` from now.
    pub fn schedule(&mut self, delay_ticks: u64, target: usize, event: E) {
        let at = ClockTick::new(self.now + delay_ticks, self.next_seq);
        self.next_seq += 1;
        self.queue.push(Reverse(Scheduled { at, target, event }));
    }

    /// Take the next event from the queue, advancing time to it.
    pub fn next_delivery(&mut self) -> Option<Delivery<E>> {
        let Reverse(scheduled) = self.queue.pop()?;
        let tick = scheduled.at.tick();
        if tick != self.now {
            self.now = tick;
            set_time!(self.entity ; self.clock.to_ns(tick));
        }
        self.num_delivered += 1;
        trace!(self.entity ; "deliver {} to {}", scheduled.at, scheduled.target);
        Some(Delivery {
            tick,
            target: scheduled.target,
            event: scheduled.event,
        })
    }

    /// Run until there are no more events to deliver.
    ///
    /// The handler is given the engine so that it can schedule further
    /// events. The first error returned by the handler stops the simulation.
    pub fn run<H>(&mut self, handler: H) -> SimResult
    where
        H: FnMut(&mut Self, Delivery<E>) -> SimResult,
    {
        self.run_until(u64::MAX, handler)
    }

    /// Run until there are no more events or the next event is later than
    /// `finish_tick`.
    pub fn run_until<H>(&mut self, finish_tick: u64, mut handler: H) -> SimResult
    where
        H: FnMut(&mut Self, Delivery<E>) -> SimResult,
    {
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.at.tick() > finish_tick {
                break;
            }
            if let Some(delivery) = self.next_delivery() {
                handler(self, delivery)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn num_delivered(&self) -> u64 {
        self.num_delivered
    }

    #[must_use]
    pub fn tick_now(&self) -> u64 {
        self.now
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.clock.to_ns(self.now)
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends track events to stdout.
///
/// This is provided to keep documentation examples simple with fewer
/// concepts to have to consider at once.
impl<E> Default for Engine<E> {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
