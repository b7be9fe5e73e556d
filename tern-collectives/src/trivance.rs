// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Ternary AllReduce ("Trivance") for a ring of participants.
//!
//! The collective runs in `ceil(log3(n))` steps of reduce-scatter followed by
//! the same number of all-gather steps. In each step a participant exchanges
//! data with the two partners at ring distance `3^step`, one in each
//! direction. The working size shrinks by a factor of three on every
//! reduce-scatter step and grows back by the same factor during all-gather.
//!
//! Once the final all-gather step has completed, two zero-sized drain
//! exchanges are staged. Their bundles return the last two credits, which is
//! what lets the flow tracker recognise that the collective has finished.

use std::rc::Rc;

use tern_engine::sim_error;
use tern_engine::types::{SimError, SimResult};
use tern_track::entity::Entity;
use tern_track::{debug, info, trace};

use crate::completion::CompletionKey;
use crate::exchange::{Exchange, ExchangeKind};
use crate::flow::FlowTracker;
use crate::session::{BundleFlags, Session};
use crate::topology::{RingDirection, RingTopology};
use crate::types::{BundleRoute, CollectiveType, PARALLEL_REDUCE, Phase, Transmission};

/// Number of dispatches a collective of `steps` steps may make.
///
/// Both phases issue two exchanges per step, hence the factor of four.
#[must_use]
pub fn stream_budget(steps: u32) -> u64 {
    4 * u64::from(steps)
}

/// Smallest `k` such that `3^k >= n`. Zero for rings of zero or one node.
#[must_use]
pub fn ceil_log3(n: usize) -> u32 {
    let mut steps = 0;
    let mut reach: usize = 1;
    while reach < n {
        reach = reach.saturating_mul(3);
        steps += 1;
    }
    steps
}

fn ceil_div3(value: u64) -> u64 {
    value.div_ceil(3)
}

/// One exchange issued by the generator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IssuedExchange {
    pub phase: Phase,
    pub step: u32,
    pub partner: usize,
    pub size: u64,
}

pub struct Trivance {
    entity: Rc<Entity>,
    topology: Rc<RingTopology>,
    flow: FlowTracker,

    id: usize,
    nodes_in_ring: usize,
    transmission: Transmission,
    route: BundleRoute,

    phase: Phase,
    steps_total: u32,
    step: u32,
    distance: u64,
    recv_in_step: usize,
    dir_toggle: u8,

    done: bool,
    drain_injected: bool,

    total_size: u64,
    cur_size: u64,
    bundle_size: u64,
    processed: bool,
    send_back: bool,

    issued: Vec<IssuedExchange>,
}

impl Trivance {
    /// Create the collective for the participant at the origin of
    /// `topology`, reducing `data_size` bytes.
    pub fn new(
        parent: &Rc<Entity>,
        collective: CollectiveType,
        topology: Rc<RingTopology>,
        data_size: u64,
    ) -> Result<Self, SimError> {
        if collective != CollectiveType::AllReduce {
            return sim_error!(format!(
                "Trivance only implements AllReduce, {collective} requested"
            ));
        }

        let id = topology.id();
        let nodes_in_ring = topology.nodes_in_ring();
        if nodes_in_ring == 0 {
            return sim_error!("Trivance requires a non-empty ring");
        }
        if id >= nodes_in_ring {
            return sim_error!(format!(
                "participant {id} is outside a ring of {nodes_in_ring} nodes"
            ));
        }

        let entity = Rc::new(Entity::new(parent, &format!("trivance{id}")));
        let steps_total = ceil_log3(nodes_in_ring);
        let flow = FlowTracker::new(&entity, id, stream_budget(steps_total));
        let transmission = topology.transmission();

        debug!(entity ; "{nodes_in_ring} nodes, {steps_total} steps, {data_size} bytes");

        Ok(Self {
            entity,
            topology,
            flow,
            id,
            nodes_in_ring,
            transmission,
            route: BundleRoute::NpuToMa,
            phase: Phase::ReduceScatter,
            steps_total,
            step: 0,
            distance: 1,
            recv_in_step: 0,
            dir_toggle: 0,
            done: steps_total == 0,
            drain_injected: false,
            total_size: data_size,
            cur_size: data_size,
            bundle_size: data_size,
            processed: true,
            send_back: false,
            issued: Vec::new(),
        })
    }

    /// Start the collective.
    ///
    /// Returns whether the scheduler should keep delivering events.
    pub fn on_init(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        if self.done {
            // A single participant has nothing to exchange.
            info!(self.entity ; "nothing to exchange in a ring of {}", self.nodes_in_ring);
            self.flow.set_stream_count(0);
            self.flow.release(session)?;
            return Ok(false);
        }

        self.phase = Phase::ReduceScatter;
        self.step = 0;
        self.distance = 1;
        self.recv_in_step = 0;
        self.dir_toggle = 0;
        self.request_step(session)?;
        Ok(true)
    }

    /// A released bundle has been processed.
    pub fn on_credit_return(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        self.flow.credit_return();
        self.flow.try_dispatch_one(session)?;
        self.flow.check_terminal(session)
    }

    /// A receive registered by this collective has completed.
    pub fn on_exchange_completed(
        &mut self,
        key: CompletionKey,
        session: &mut dyn Session,
    ) -> Result<bool, SimError> {
        if key.owner != self.id || key.stream_id != session.stream_id() {
            return sim_error!(format!(
                "{}: completion for participant {} stream {} delivered to participant {} stream {}",
                self.entity,
                key.owner,
                key.stream_id,
                self.id,
                session.stream_id()
            ));
        }
        if self.done {
            return sim_error!(format!(
                "{}: completion of exchange {} after the collective finished",
                self.entity, key.exchange
            ));
        }

        self.flow.exchange_completed();
        self.recv_in_step += 1;
        trace!(self.entity ; "exchange {} completed ({}/{} in step {})",
            key.exchange, self.recv_in_step, PARALLEL_REDUCE, self.step);

        if self.recv_in_step == PARALLEL_REDUCE {
            self.recv_in_step = 0;
            match self.phase {
                Phase::ReduceScatter => self.advance_reduce_scatter(session)?,
                Phase::AllGather => self.advance_all_gather(session)?,
            }
        }
        self.flow.check_terminal(session)
    }

    fn advance_reduce_scatter(&mut self, session: &mut dyn Session) -> SimResult {
        self.cur_size = ceil_div3(self.cur_size).max(1);
        self.step += 1;

        if self.step >= self.steps_total {
            debug!(self.entity ; "reduce-scatter complete, {} bytes held", self.cur_size);
            self.phase = Phase::AllGather;
            self.processed = false;
            self.step = 0;
            self.distance = 1;
        } else {
            self.distance *= 3;
        }
        self.dir_toggle = 0;
        self.request_step(session)
    }

    fn advance_all_gather(&mut self, session: &mut dyn Session) -> SimResult {
        self.cur_size = self.cur_size.saturating_mul(3).min(self.total_size);
        self.step += 1;

        if self.step >= self.steps_total {
            self.done = true;
            if !self.drain_injected {
                debug!(self.entity ; "all-gather complete, staging drain exchanges");
                let saved = self.cur_size;
                self.drain_injected = true;
                self.cur_size = 0;
                self.dir_toggle = 0;
                self.request_step(session)?;
                self.cur_size = saved;
            }
            return Ok(());
        }

        self.distance *= 3;
        self.dir_toggle = 0;
        self.request_step(session)
    }

    /// Request one exchange in each ring direction.
    fn request_step(&mut self, session: &mut dyn Session) -> SimResult {
        for _ in 0..PARALLEL_REDUCE {
            self.request_exchange(session)?;
        }
        Ok(())
    }

    fn request_exchange(&mut self, session: &mut dyn Session) -> SimResult {
        let direction = if self.dir_toggle == 0 {
            RingDirection::Clockwise
        } else {
            RingDirection::Anticlockwise
        };
        let partner = self
            .topology
            .node_at_distance(self.id, self.distance, direction);
        self.dir_toggle ^= 1;

        debug!(self.entity ; "rank={} step={} dist={} peer={}",
            self.id, self.step, self.distance, partner);

        let (kind, size) = if self.done && self.drain_injected {
            (ExchangeKind::Drain, 0)
        } else {
            match self.phase {
                Phase::ReduceScatter => (ExchangeKind::Reduce, ceil_div3(self.cur_size)),
                Phase::AllGather => (ExchangeKind::Gather, self.cur_size),
            }
        };
        self.bundle_size = size;

        let exchange = Exchange::new(&self.entity, kind, size, session.queue_id(), partner);
        self.issued.push(IssuedExchange {
            phase: self.phase,
            step: self.step,
            partner,
            size,
        });
        self.flow.stage(exchange)?;

        let flags = BundleFlags {
            processed: self.processed,
            send_back: self.send_back,
            size: self.bundle_size,
            transmission: self.transmission,
            route: self.route,
        };
        self.flow.release_staged(session, flags)
    }

    /// Direction traffic is injected into the ring.
    #[must_use]
    pub fn specify_direction(&self) -> RingDirection {
        RingDirection::Clockwise
    }

    pub fn entity(&self) -> &Rc<Entity> {
        &self.entity
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn steps_total(&self) -> u32 {
        self.steps_total
    }

    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }

    #[must_use]
    pub fn distance(&self) -> u64 {
        self.distance
    }

    #[must_use]
    pub fn recv_in_step(&self) -> usize {
        self.recv_in_step
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[must_use]
    pub fn cur_size(&self) -> u64 {
        self.cur_size
    }

    #[must_use]
    pub fn bundle_size(&self) -> u64 {
        self.bundle_size
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub fn drain_injected(&self) -> bool {
        self.drain_injected
    }

    #[must_use]
    pub fn transmission(&self) -> Transmission {
        self.transmission
    }

    /// Every exchange generated so far, in order.
    #[must_use]
    pub fn issued(&self) -> &[IssuedExchange] {
        &self.issued
    }

    #[must_use]
    pub fn flow(&self) -> &FlowTracker {
        &self.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_for_ring_sizes() {
        assert_eq!(ceil_log3(0), 0);
        assert_eq!(ceil_log3(1), 0);
        assert_eq!(ceil_log3(2), 1);
        assert_eq!(ceil_log3(3), 1);
        assert_eq!(ceil_log3(4), 2);
        assert_eq!(ceil_log3(9), 2);
        assert_eq!(ceil_log3(10), 3);
        assert_eq!(ceil_log3(27), 3);
        assert_eq!(ceil_log3(28), 4);
    }

    #[test]
    fn budget() {
        assert_eq!(stream_budget(0), 0);
        assert_eq!(stream_budget(2), 8);
    }

    #[test]
    fn rounding_up() {
        assert_eq!(ceil_div3(0), 0);
        assert_eq!(ceil_div3(1), 1);
        assert_eq!(ceil_div3(100), 34);
        assert_eq!(ceil_div3(2187), 729);
    }
}
