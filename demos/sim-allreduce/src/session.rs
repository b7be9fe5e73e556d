// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The session given to each participant's collective.
//!
//! Receives are matched here against arriving data. Everything that needs
//! simulated time (sends and bundles) is queued as an [`Outgoing`] action for
//! the simulation to schedule.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tern_collectives::completion::CompletionSender;
use tern_collectives::session::{Bundle, RecvRequest, SendRequest, Session};
use tern_collectives::types::StreamState;
use tern_engine::types::SimResult;
use tern_track::entity::Entity;
use tern_track::{trace, warn};

/// An action for the simulation to carry out.
#[derive(Debug)]
pub enum Outgoing {
    Send(SendRequest),
    Bundle(Bundle),
    Proceed,
}

/// Receives are matched first by source then by tag, oldest first.
type MatchKey = (usize, u64);

#[derive(Default)]
pub struct Mailbox {
    posted: HashMap<MatchKey, VecDeque<RecvRequest>>,

    /// Sizes of data that arrived before a receive was posted.
    unexpected: HashMap<MatchKey, VecDeque<u64>>,
}

impl Mailbox {
    /// Post a receive. Returns it again if data is already waiting for it.
    pub fn post(&mut self, request: RecvRequest) -> Option<(RecvRequest, u64)> {
        let key = (request.src, request.tag);
        if let Some(size) = self.unexpected.get_mut(&key).and_then(VecDeque::pop_front) {
            return Some((request, size));
        }
        self.posted.entry(key).or_default().push_back(request);
        None
    }

    /// Data has arrived. Returns the receive it completes, if one is posted.
    pub fn arrive(&mut self, src: usize, tag: u64, size: u64) -> Option<RecvRequest> {
        let key = (src, tag);
        if let Some(request) = self.posted.get_mut(&key).and_then(VecDeque::pop_front) {
            return Some(request);
        }
        self.unexpected.entry(key).or_default().push_back(size);
        None
    }

    #[must_use]
    pub fn num_posted(&self) -> usize {
        self.posted.values().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn num_unexpected(&self) -> usize {
        self.unexpected.values().map(VecDeque::len).sum()
    }
}

pub struct SimSession {
    entity: Rc<Entity>,
    state: StreamState,
    stream_id: u64,
    queue_id: usize,
    completions: CompletionSender,
    mailbox: Mailbox,
    outbox: Vec<Outgoing>,
    bytes_sent: u64,
    num_bundles: usize,
}

impl SimSession {
    pub fn new(
        entity: &Rc<Entity>,
        stream_id: u64,
        queue_id: usize,
        completions: CompletionSender,
    ) -> Self {
        Self {
            entity: entity.clone(),
            state: StreamState::Ready,
            stream_id,
            queue_id,
            completions,
            mailbox: Mailbox::default(),
            outbox: Vec::new(),
            bytes_sent: 0,
            num_bundles: 0,
        }
    }

    /// Data sent by `src` has arrived at this participant.
    pub fn deliver(&mut self, src: usize, tag: u64, size: u64) -> SimResult {
        match self.mailbox.arrive(src, tag, size) {
            Some(request) => self.complete(request, size),
            None => {
                trace!(self.entity ; "unexpected {size} bytes from {src}");
                Ok(())
            }
        }
    }

    fn complete(&self, request: RecvRequest, size: u64) -> SimResult {
        if request.size != size {
            warn!(self.entity ; "expected {} bytes from {}, received {}",
                request.size, request.src, size);
        }
        request.completion.complete()
    }

    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    #[must_use]
    pub fn num_bundles(&self) -> usize {
        self.num_bundles
    }

    #[must_use]
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

impl Session for SimSession {
    fn state(&self) -> StreamState {
        self.state
    }

    fn change_state(&mut self, state: StreamState) {
        trace!(self.entity ; "{} -> {}", self.state, state);
        self.state = state;
    }

    fn stream_id(&self) -> u64 {
        self.stream_id
    }

    fn queue_id(&self) -> usize {
        self.queue_id
    }

    fn completion_sender(&self) -> CompletionSender {
        self.completions.clone()
    }

    fn send(&mut self, request: SendRequest) -> SimResult {
        self.bytes_sent += request.size;
        self.outbox.push(Outgoing::Send(request));
        Ok(())
    }

    fn recv(&mut self, request: RecvRequest) -> SimResult {
        match self.mailbox.post(request) {
            Some((request, size)) => self.complete(request, size),
            None => Ok(()),
        }
    }

    fn submit_bundle(&mut self, bundle: Bundle) -> SimResult {
        self.num_bundles += 1;
        self.outbox.push(Outgoing::Bundle(bundle));
        Ok(())
    }

    fn proceed_to_next(&mut self) -> SimResult {
        self.outbox.push(Outgoing::Proceed);
        Ok(())
    }
}
