// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a Trivance AllReduce across a ring of participants.
//!
//! Each participant runs its own instance of the collective against a
//! simulated session. Bundles released by a collective return their credit
//! after `bundle_delay_ticks` and every send reaches its destination after
//! `link_latency_ticks`. Arriving data is matched against the receives each
//! participant has posted and the resulting completions are fed back to the
//! collectives.
//!
//! The simulation passes once every participant has released its session.
//!
//! # Examples
//!
//! Run the default ring of 9 participants with logging:
//! ```txt
//! cargo run --bin sim-allreduce --release -- --stdout
//! ```
//!
//! Run a larger ring over a slower link:
//! ```txt
//! cargo run --bin sim-allreduce --release -- --ring-size 30 --link-latency-ticks 100
//! ```
//!
//! Options can also be given in a TOML file or as `TERN_` prefixed
//! environment variables:
//! ```txt
//! TERN_TOTAL_BYTES=1048576 cargo run --bin sim-allreduce -- --config ring.toml
//! ```

use tern_engine::types::SimError;
use tern_track::Tracker;
use tern_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};

use crate::config::Settings;

pub mod config;
pub mod session;
pub mod simulation;

/// Build the trackers requested by `settings`.
pub fn build_tracker(settings: &Settings) -> Result<Tracker, SimError> {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: settings.stdout,
            level: settings.stdout_level,
            filter_regex: &settings.stdout_filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: settings.log_file.is_some(),
            level: settings.log_file_level,
            filter_regex: "",
            file: settings.log_file.as_deref(),
        },
    };
    setup_trackers(&config).map_err(|e| SimError(format!("failed to set up tracking: {e}")))
}
