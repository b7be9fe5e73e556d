// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::fs;

use tern_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use tern_track::entity::{Entity, toplevel};
use tern_track::{debug, info};

#[test]
fn file_tracker_filters_by_entity() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sim.log");
    let log_file = log_path.to_str().unwrap();

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            level: log::Level::Debug,
            filter_regex: ".*rank1.*",
            file: Some(log_file),
        },
    };
    let tracker = setup_trackers(&config).unwrap();
    {
        let top = toplevel(&tracker, "top");
        let rank0 = Entity::new(&top, "rank0");
        let rank1 = Entity::new(&top, "rank1");
        debug!(rank0 ; "hidden");
        debug!(rank1 ; "visible");
        info!(top ; "also hidden");
    }
    tracker.shutdown();

    let contents = fs::read_to_string(&log_path).unwrap();
    assert!(contents.contains("DEBUG: visible"));
    assert!(!contents.contains("hidden"));
}

#[test]
fn bad_filter_is_reported() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: true,
            level: log::Level::Info,
            filter_regex: "[",
            file: None,
        },
        log_file: TrackerConfig {
            enable: false,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}

#[test]
fn missing_file_name_is_reported() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        log_file: TrackerConfig {
            enable: true,
            ..Default::default()
        },
    };
    assert!(setup_trackers(&config).is_err());
}
