// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Collective communication algorithms for rings of simulated participants.
//!
//! A collective is owned by a [session](crate::session::Session) and driven
//! entirely by events: it is started with
//! [`AlgorithmEvent::Init`](crate::types::AlgorithmEvent::Init), paced by
//! credit returns for the bundles it releases and advanced by completions of
//! the receives it registers. The algorithm never waits; the scheduler
//! delivers the next event when the session's transport reports progress.
//!
//! The only algorithm currently provided is the ternary AllReduce in
//! [`trivance`].
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use tern_collectives::algorithm::{AlgorithmKind, CollectiveAlgorithm};
//! use tern_collectives::topology::{RingDimension, RingDirection, RingTopology};
//! use tern_collectives::types::CollectiveType;
//! use tern_track::entity::toplevel;
//! use tern_track::tracker::dev_null_tracker;
//!
//! let top = toplevel(&dev_null_tracker(), "top");
//! let ring = Rc::new(RingTopology::new(0, 9, RingDimension::Local).unwrap());
//! let algorithm = CollectiveAlgorithm::new(
//!     AlgorithmKind::Trivance,
//!     &top,
//!     CollectiveType::AllReduce,
//!     ring,
//!     2187,
//! )
//! .unwrap();
//! assert_eq!(algorithm.specify_direction(), RingDirection::Clockwise);
//! ```

pub mod algorithm;
pub mod completion;
pub mod exchange;
pub mod flow;
pub mod session;
pub mod test_helpers;
pub mod topology;
pub mod trivance;
pub mod types;
