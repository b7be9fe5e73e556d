// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use sim_allreduce::config::{Config, Settings};
use sim_allreduce::simulation::Simulation;
use tern_collectives::session::Session;
use tern_collectives::trivance::ceil_log3;
use tern_collectives::types::StreamState;
use tern_track::Tracker;
use tern_track::test_helpers::create_tracker;

fn settings(config: Config) -> Settings {
    config.resolve().unwrap()
}

fn tracker() -> Tracker {
    create_tracker(file!())
}

#[test]
fn default_ring() {
    let settings = settings(Config::default());
    let mut simulation = Simulation::new(&settings, &tracker()).unwrap();
    let report = simulation.run().unwrap();

    assert_eq!(report.participants.len(), 9);
    for participant in &report.participants {
        assert_eq!(participant.exchanges, 10);
        assert_eq!(participant.bytes_sent, 3888);
        assert_eq!(participant.finish_tick, 45);
    }
    assert_eq!(report.finish_tick, 45);
    assert_eq!(report.time_ns, 45.0);
    assert_eq!(simulation.num_finished(), 9);

    for participant in simulation.participants() {
        assert_eq!(participant.session().state(), StreamState::Zombie);
        assert_eq!(participant.session().mailbox().num_posted(), 0);
        assert_eq!(participant.session().mailbox().num_unexpected(), 0);
        assert_eq!(participant.session().num_bundles(), 10);
        assert!(participant.algorithm().is_released());
    }
}

#[test]
fn two_participants_timing() {
    let settings = settings(Config {
        ring_size: Some(2),
        total_bytes: Some(100),
        bundle_delay_ticks: Some(1),
        link_latency_ticks: Some(10),
        ..Config::default()
    });
    let mut simulation = Simulation::new(&settings, &tracker()).unwrap();
    let report = simulation.run().unwrap();

    // Two steps of (credit + link latency), then the drain credits.
    assert_eq!(report.finish_tick, 23);
    for participant in &report.participants {
        assert_eq!(participant.exchanges, 6);
        assert_eq!(participant.bytes_sent, 4 * 34);
    }
}

#[test]
fn single_participant() {
    let settings = settings(Config {
        ring_size: Some(1),
        ..Config::default()
    });
    let mut simulation = Simulation::new(&settings, &tracker()).unwrap();
    let report = simulation.run().unwrap();

    assert_eq!(report.finish_tick, 0);
    assert_eq!(report.participants[0].exchanges, 0);
    assert_eq!(report.participants[0].bytes_sent, 0);
}

#[test]
fn many_ring_sizes() {
    for ring_size in 2..=20 {
        let settings = settings(Config {
            ring_size: Some(ring_size),
            total_bytes: Some(65536),
            local_ring: Some(ring_size % 2 == 0),
            link_latency_ticks: Some(3),
            ..Config::default()
        });
        let mut simulation = Simulation::new(&settings, &tracker()).unwrap();
        let report = simulation.run().unwrap();

        let steps = ceil_log3(ring_size) as usize;
        assert_eq!(report.participants.len(), ring_size);
        for participant in &report.participants {
            assert_eq!(participant.exchanges, 4 * steps + 2, "ring of {ring_size}");
        }
    }
}

#[test]
fn early_finish_is_reported() {
    let settings = settings(Config {
        finish_tick: Some(5),
        ..Config::default()
    });
    let mut simulation = Simulation::new(&settings, &tracker()).unwrap();
    let err = simulation.run().unwrap_err();
    assert!(err.0.starts_with("Deadlock"));
    assert_eq!(simulation.num_finished(), 0);
}

#[test]
fn unsupported_collective() {
    let settings = settings(Config {
        collective: Some("all_gather".to_string()),
        ..Config::default()
    });
    assert!(Simulation::new(&settings, &tracker()).is_err());
}
