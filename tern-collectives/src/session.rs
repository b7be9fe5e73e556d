// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The interface between a collective algorithm and the session (stream)
//! that owns it.
//!
//! The session is lent to the algorithm for the duration of each event. It
//! provides the lifecycle state, the identifiers that tag traffic and the
//! transport operations used to move data.

use tern_engine::types::SimResult;

use crate::completion::{Completion, CompletionSender};
use crate::exchange::Exchange;
use crate::types::{BundleRoute, StreamState, Transmission};

/// Request to send `size` bytes from `src` to `dest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendRequest {
    pub src: usize,
    pub dest: usize,
    pub size: u64,

    /// Matching tag, always the session's stream id.
    pub tag: u64,
    pub queue_id: usize,
}

/// Registration to receive `size` bytes at `dest` from `src`.
///
/// The transport fires `completion` exactly once when the data has arrived.
#[derive(Debug)]
pub struct RecvRequest {
    pub src: usize,
    pub dest: usize,
    pub size: u64,
    pub tag: u64,
    pub queue_id: usize,
    pub completion: Completion,
}

/// A group of staged exchanges forwarded to the memory/processing side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    pub exchanges: Vec<Exchange>,

    /// Whether the exchanges need a reduction applied.
    pub processed: bool,
    pub send_back: bool,

    /// Size of the bundle in bytes.
    pub size: u64,
    pub transmission: Transmission,
    pub route: BundleRoute,
}

/// Bundle attributes chosen by the algorithm, applied on release.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BundleFlags {
    pub processed: bool,
    pub send_back: bool,
    pub size: u64,
    pub transmission: Transmission,
    pub route: BundleRoute,
}

/// Operations a session offers to the collective it owns.
pub trait Session {
    fn state(&self) -> StreamState;

    fn change_state(&mut self, state: StreamState);

    /// Identifier used to tag all traffic of this collective.
    fn stream_id(&self) -> u64;

    /// Virtual network channel this collective runs on.
    fn queue_id(&self) -> usize;

    /// Where completions of this session's receives are sent.
    fn completion_sender(&self) -> CompletionSender;

    fn send(&mut self, request: SendRequest) -> SimResult;

    fn recv(&mut self, request: RecvRequest) -> SimResult;

    /// Hand a bundle over for processing. One credit is returned for each
    /// bundle once it has been processed.
    fn submit_bundle(&mut self, bundle: Bundle) -> SimResult;

    /// The collective has finished with this channel.
    fn proceed_to_next(&mut self) -> SimResult;
}
