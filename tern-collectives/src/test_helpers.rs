// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Helpers for testing collectives without a transport.
//!
//! [`MockSession`] records everything a collective asks of its session and
//! [`drive_to_completion`] plays the part of a scheduler whose ring partners
//! always answer.

use std::rc::Rc;

use tern_engine::types::{SimError, SimResult};
use tern_track::entity::{Entity, toplevel};
use tern_track::test_helpers::create_tracker;

use crate::algorithm::{AlgorithmKind, CollectiveAlgorithm};
use crate::completion::{
    CompletionKey, CompletionReceiver, CompletionSender, completion_channel,
};
use crate::session::{Bundle, RecvRequest, SendRequest, Session};
use crate::topology::{RingDimension, RingTopology};
use crate::types::{AlgorithmEvent, CollectiveType, StreamState};

pub struct MockSession {
    pub state: StreamState,
    pub stream_id: u64,
    pub queue_id: usize,
    pub sends: Vec<SendRequest>,

    /// Receives that have not been completed yet.
    pub recvs: Vec<RecvRequest>,
    pub num_recvs: usize,
    pub bundles: Vec<Bundle>,

    /// Number of times the collective handed the channel back.
    pub num_proceeds: usize,
    sender: CompletionSender,
    receiver: CompletionReceiver,
}

impl MockSession {
    #[must_use]
    pub fn new(stream_id: u64, queue_id: usize) -> Self {
        let (sender, receiver) = completion_channel();
        Self {
            state: StreamState::Created,
            stream_id,
            queue_id,
            sends: Vec::new(),
            recvs: Vec::new(),
            num_recvs: 0,
            bundles: Vec::new(),
            num_proceeds: 0,
            sender,
            receiver,
        }
    }

    /// Fire the completions of all outstanding receives, oldest first.
    pub fn complete_recvs(&mut self) -> SimResult {
        for recv in self.recvs.drain(..) {
            recv.completion.complete()?;
        }
        Ok(())
    }

    pub fn next_completion(&mut self) -> Option<CompletionKey> {
        self.receiver.try_recv()
    }

    /// Sizes of all bundles released so far.
    #[must_use]
    pub fn bundle_sizes(&self) -> Vec<u64> {
        self.bundles.iter().map(|b| b.size).collect()
    }
}

impl Session for MockSession {
    fn state(&self) -> StreamState {
        self.state
    }

    fn change_state(&mut self, state: StreamState) {
        self.state = state;
    }

    fn stream_id(&self) -> u64 {
        self.stream_id
    }

    fn queue_id(&self) -> usize {
        self.queue_id
    }

    fn completion_sender(&self) -> CompletionSender {
        self.sender.clone()
    }

    fn send(&mut self, request: SendRequest) -> SimResult {
        self.sends.push(request);
        Ok(())
    }

    fn recv(&mut self, request: RecvRequest) -> SimResult {
        self.num_recvs += 1;
        self.recvs.push(request);
        Ok(())
    }

    fn submit_bundle(&mut self, bundle: Bundle) -> SimResult {
        self.bundles.push(bundle);
        Ok(())
    }

    fn proceed_to_next(&mut self) -> SimResult {
        self.num_proceeds += 1;
        Ok(())
    }
}

/// Build a Trivance AllReduce for participant `id` of a ring of `n`.
pub fn build_trivance(
    top: &Rc<Entity>,
    id: usize,
    n: usize,
    dimension: RingDimension,
    data_size: u64,
) -> Result<CollectiveAlgorithm, SimError> {
    let topology = Rc::new(RingTopology::new(id, n, dimension)?);
    CollectiveAlgorithm::new(
        AlgorithmKind::Trivance,
        top,
        CollectiveType::AllReduce,
        topology,
        data_size,
    )
}

/// Create a top-level entity whose trace goes to `traces/<test name>.log`.
#[must_use]
pub fn start_test(full_filepath: &str) -> Rc<Entity> {
    toplevel(&create_tracker(full_filepath), "top")
}

/// Run a collective to the end, returning each bundle's credit as soon as
/// it is released and completing receives once nothing else is pending.
///
/// Returns the number of events delivered.
pub fn drive_to_completion(
    algorithm: &mut CollectiveAlgorithm,
    session: &mut MockSession,
) -> Result<usize, SimError> {
    let mut delivered = 1;
    let mut keep_going = algorithm.on_event(AlgorithmEvent::Init, session)?;
    let mut credited = 0;

    while keep_going {
        if credited < session.bundles.len() {
            credited += 1;
            keep_going = algorithm.on_event(AlgorithmEvent::CreditReturn, session)?;
        } else {
            session.complete_recvs()?;
            let Some(key) = session.next_completion() else {
                return Err(SimError(format!(
                    "collective stalled after {delivered} events"
                )));
            };
            keep_going = algorithm.on_event(AlgorithmEvent::ExchangeCompleted(key), session)?;
        }
        delivered += 1;
    }
    Ok(delivered)
}
