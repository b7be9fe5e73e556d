// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Credit based flow control for the exchanges of one collective.
//!
//! Exchanges handed over by a generator are both queued for dispatch and
//! staged for release as a bundle. Each released bundle returns a credit once
//! it has been processed, and each dispatch consumes one. The collective is
//! finished once its dispatch budget is exhausted and every credit is back.

use std::rc::Rc;

use heapless::Vec as StagedVec;
use tern_engine::sim_error;
use tern_engine::types::{SimError, SimResult};
use tern_track::entity::Entity;
use tern_track::{debug, destroy_id, enter, exit, trace};

use crate::completion::{Completion, CompletionKey};
use crate::exchange::{Exchange, ExchangeQueue};
use crate::session::{Bundle, BundleFlags, RecvRequest, SendRequest, Session};
use crate::types::{PARALLEL_REDUCE, StreamState};

pub struct FlowTracker {
    entity: Rc<Entity>,
    owner: usize,
    queue: ExchangeQueue,
    staged: StagedVec<Exchange, PARALLEL_REDUCE>,
    free_credits: usize,
    total_sent: u64,
    total_received: u64,
    stream_count: u64,
    released: bool,
}

impl FlowTracker {
    /// Create a flow tracker for participant `owner` that may dispatch at
    /// most `stream_count` exchanges.
    pub fn new(parent: &Rc<Entity>, owner: usize, stream_count: u64) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "flow")),
            owner,
            queue: ExchangeQueue::new(),
            staged: StagedVec::new(),
            free_credits: 0,
            total_sent: 0,
            total_received: 0,
            stream_count,
            released: false,
        }
    }

    /// Queue an exchange for dispatch and stage it for the next bundle.
    pub fn stage(&mut self, exchange: Exchange) -> SimResult {
        if self.staged.is_full() {
            return sim_error!(format!("too many staged exchanges, cannot stage {exchange}"));
        }
        enter!(self.entity ; exchange.id);
        self.queue.push_back(exchange.clone())?;
        if let Err(rejected) = self.staged.push(exchange) {
            return sim_error!(format!("failed to stage {rejected}"));
        }
        Ok(())
    }

    /// Release everything staged as a single bundle.
    pub fn release_staged(&mut self, session: &mut dyn Session, flags: BundleFlags) -> SimResult {
        if self.staged.is_empty() {
            return Ok(());
        }
        let exchanges: Vec<Exchange> = self.staged.iter().cloned().collect();
        self.staged.clear();
        trace!(self.entity ; "release bundle of {} exchanges, {} bytes", exchanges.len(), flags.size);
        session.submit_bundle(Bundle {
            exchanges,
            processed: flags.processed,
            send_back: flags.send_back,
            size: flags.size,
            transmission: flags.transmission,
            route: flags.route,
        })
    }

    /// A released bundle has been processed.
    pub fn credit_return(&mut self) {
        self.free_credits += 1;
        trace!(self.entity ; "credit returned, {} free", self.free_credits);
    }

    /// Dispatch the oldest queued exchange if the budget and a credit allow.
    ///
    /// Returns whether an exchange was dispatched.
    pub fn try_dispatch_one(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        if matches!(session.state(), StreamState::Created | StreamState::Ready) {
            session.change_state(StreamState::Executing);
        }
        if self.stream_count == 0 || self.free_credits == 0 {
            return Ok(false);
        }
        let Some(exchange) = self.queue.pop_front() else {
            return Ok(false);
        };

        let tag = session.stream_id();
        let queue_id = exchange.queue_id;
        session.send(SendRequest {
            src: self.owner,
            dest: exchange.dest,
            size: exchange.size,
            tag,
            queue_id,
        })?;

        let key = CompletionKey {
            owner: self.owner,
            stream_id: tag,
            queue_id,
            exchange: exchange.id,
        };
        session.recv(RecvRequest {
            src: exchange.src,
            dest: self.owner,
            size: exchange.size,
            tag,
            queue_id,
            completion: Completion::new(key, session.completion_sender()),
        })?;

        self.process_stream_count(session);
        self.free_credits -= 1;
        self.total_sent += 1;
        exit!(self.entity ; exchange.id);
        destroy_id!(self.entity ; exchange.id);
        Ok(true)
    }

    fn process_stream_count(&mut self, session: &mut dyn Session) {
        self.stream_count = self.stream_count.saturating_sub(1);
        if self.stream_count == 0 && session.state() != StreamState::Dead {
            session.change_state(StreamState::Zombie);
        }
    }

    /// A receive registered by this collective has completed.
    pub fn exchange_completed(&mut self) {
        self.total_received += 1;
    }

    /// Finish the collective if nothing is left to dispatch and every credit
    /// has been returned.
    ///
    /// Returns whether the scheduler should keep delivering events.
    pub fn check_terminal(&mut self, session: &mut dyn Session) -> Result<bool, SimError> {
        if self.released {
            return Ok(false);
        }
        if self.stream_count == 0 && self.free_credits == PARALLEL_REDUCE {
            self.release(session)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Drop any residual exchanges and hand the channel back to the session.
    ///
    /// Only the first call has any effect.
    pub fn release(&mut self, session: &mut dyn Session) -> SimResult {
        if self.released {
            return Ok(());
        }
        if !self.queue.is_empty() {
            debug!(self.entity ; "discarding {} undispatched exchanges", self.queue.len());
        }
        for exchange in self.queue.iter() {
            destroy_id!(self.entity ; exchange.id);
        }
        self.queue.clear();
        self.staged.clear();
        self.released = true;
        session.proceed_to_next()
    }

    pub fn set_stream_count(&mut self, stream_count: u64) {
        self.stream_count = stream_count;
    }

    #[must_use]
    pub fn free_credits(&self) -> usize {
        self.free_credits
    }

    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    #[must_use]
    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    #[must_use]
    pub fn stream_count(&self) -> u64 {
        self.stream_count
    }

    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }
}
