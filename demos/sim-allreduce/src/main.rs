// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a Trivance AllReduce across a ring of participants.
//!
//! See `lib.rs` for details.

use clap::Parser;
use sim_allreduce::build_tracker;
use sim_allreduce::config::Config;
use sim_allreduce::simulation::Simulation;
use tern_engine::types::SimError;
use tern_track::entity::toplevel;
use tern_track::info;

fn main() -> Result<(), SimError> {
    let settings = Config::load(Config::parse())?.resolve()?;
    let tracker = build_tracker(&settings)?;

    let result = Simulation::new(&settings, &tracker).and_then(|mut simulation| simulation.run());
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracker.shutdown();
            return Err(e);
        }
    };

    let top = toplevel(&tracker, "summary");
    for participant in &report.participants {
        info!(top ; "rank {}: {} exchanges, {} bytes sent, finished at tick {}",
            participant.id, participant.exchanges, participant.bytes_sent, participant.finish_tick);
    }
    info!(top ; "All {} participants finished at tick {} ({:.2}ns)",
        report.participants.len(), report.finish_tick, report.time_ns);

    tracker.shutdown();
    Ok(())
}
