// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Completion notifications from the transport back to a collective.
//!
//! Every receive registration carries a [`Completion`]. The transport fires
//! it once the matching data has arrived; firing consumes the token so an
//! exchange can never be completed twice. The owner of the
//! [`CompletionReceiver`] (normally the scheduler) turns each key into an
//! [`AlgorithmEvent::ExchangeCompleted`](crate::types::AlgorithmEvent).

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use tern_engine::types::{SimError, SimResult};
use tern_track::Id;

/// Identifies which collective a completed exchange belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompletionKey {
    /// The participant that registered the receive.
    pub owner: usize,
    pub stream_id: u64,
    pub queue_id: usize,
    pub exchange: Id,
}

#[derive(Clone)]
pub struct CompletionSender(UnboundedSender<CompletionKey>);

pub struct CompletionReceiver(UnboundedReceiver<CompletionKey>);

#[must_use]
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    let (tx, rx) = unbounded();
    (CompletionSender(tx), CompletionReceiver(rx))
}

impl CompletionReceiver {
    /// Take the next fired completion, if any.
    pub fn try_recv(&mut self) -> Option<CompletionKey> {
        self.0.try_recv().ok()
    }
}

/// A one-shot completion token.
pub struct Completion {
    key: CompletionKey,
    sender: CompletionSender,
}

impl Completion {
    #[must_use]
    pub fn new(key: CompletionKey, sender: CompletionSender) -> Self {
        Self { key, sender }
    }

    #[must_use]
    pub fn key(&self) -> CompletionKey {
        self.key
    }

    pub fn complete(self) -> SimResult {
        self.sender.0.unbounded_send(self.key).map_err(|e| {
            SimError(format!(
                "completion for exchange {} of participant {} dropped: {e}",
                self.key.exchange, self.key.owner
            ))
        })
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("key", &self.key).finish()
    }
}
