// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `Tern` - discrete event engine
//!
//! This library provides the [engine](crate::engine) which delivers
//! time-ordered events to the participants of a simulation, together with the
//! [error types](crate::types) shared by all Tern crates.
//!
//! # Simple Application
//!
//! A very simple application would look like:
//!
//! ```rust
//! use tern_engine::engine::Engine;
//!
//! let mut engine: Engine<&str> = Engine::default();
//! engine.schedule(10, 1, "pong");
//! engine.schedule(5, 0, "ping");
//!
//! let mut seen = Vec::new();
//! engine
//!     .run(|_, delivery| {
//!         seen.push((delivery.tick, delivery.target, delivery.event));
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(seen, vec![(5, 0, "ping"), (10, 1, "pong")]);
//! ```

pub mod engine;
pub mod test_helpers;
pub mod time;
pub mod types;
