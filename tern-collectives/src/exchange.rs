// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Exchanges and the bounded queue that holds them until dispatch.

use std::fmt;
use std::rc::Rc;

use heapless::Deque;
use tern_engine::sim_error;
use tern_engine::types::SimResult;
use tern_track::entity::Entity;
use tern_track::{Id, create, create_id};

use crate::types::PARALLEL_REDUCE;

/// What an exchange carries. Used as the request type when tracking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Partial results during the reduce-scatter phase.
    Reduce = 0,

    /// Reduced results during the all-gather phase.
    Gather = 1,

    /// Zero-sized completion marker at the end of the collective.
    Drain = 2,
}

/// A single logical send/receive pair with one partner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub id: Id,
    pub kind: ExchangeKind,

    /// Size in bytes.
    pub size: u64,

    /// Virtual network channel the exchange travels on.
    pub queue_id: usize,

    /// Participant the data is expected from.
    pub src: usize,

    /// Participant the data is sent to.
    pub dest: usize,

    /// Entity that issued the exchange.
    pub issuer: Id,
}

impl Exchange {
    /// Create an exchange with `partner`, recording its creation against
    /// `created_by`.
    pub fn new(
        created_by: &Rc<Entity>,
        kind: ExchangeKind,
        size: u64,
        queue_id: usize,
        partner: usize,
    ) -> Self {
        let exchange = Self {
            id: create_id!(created_by),
            kind,
            size,
            queue_id,
            src: partner,
            dest: partner,
            issuer: created_by.id,
        };
        create!(created_by ; exchange, size as usize, kind as i8);
        exchange
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?} exchange {} of {} bytes with {} on queue {}",
            self.kind, self.id, self.size, self.dest, self.queue_id
        )
    }
}

/// FIFO of exchanges waiting to be dispatched.
///
/// At most one step's worth of exchanges is ever outstanding, so the
/// capacity is fixed.
#[derive(Debug)]
pub struct ExchangeQueue {
    inner: Deque<Exchange, PARALLEL_REDUCE>,
}

impl Default for ExchangeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Deque::new(),
        }
    }

    pub fn push_back(&mut self, exchange: Exchange) -> SimResult {
        if let Err(rejected) = self.inner.push_back(exchange) {
            return sim_error!(format!(
                "exchange queue full ({} entries), cannot queue {}",
                PARALLEL_REDUCE, rejected
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn front(&self) -> Option<&Exchange> {
        self.inner.front()
    }

    pub fn pop_front(&mut self) -> Option<Exchange> {
        self.inner.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use tern_track::entity::toplevel;
    use tern_track::tracker::dev_null_tracker;

    use super::*;

    fn exchange(top: &Rc<Entity>, partner: usize) -> Exchange {
        Exchange::new(top, ExchangeKind::Reduce, 10, 0, partner)
    }

    #[test]
    fn fifo_order() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut queue = ExchangeQueue::new();
        queue.push_back(exchange(&top, 1)).unwrap();
        queue.push_back(exchange(&top, 2)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_front().unwrap().dest, 1);
        assert_eq!(queue.pop_front().unwrap().dest, 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_is_an_error() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut queue = ExchangeQueue::new();
        queue.push_back(exchange(&top, 1)).unwrap();
        queue.push_back(exchange(&top, 2)).unwrap();
        let err = queue.push_back(exchange(&top, 3)).unwrap_err();
        assert!(err.0.contains("queue full"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn partner_is_source_and_destination() {
        let top = toplevel(&dev_null_tracker(), "top");
        let exchange = Exchange::new(&top, ExchangeKind::Gather, 7, 3, 5);
        assert_eq!(exchange.src, 5);
        assert_eq!(exchange.dest, 5);
        assert_eq!(exchange.queue_id, 3);
        assert_eq!(exchange.issuer, top.id);
    }
}
