// Copyright (c) 2020 Graphcore Ltd. All rights reserved.

use std::fmt;
use std::rc::Rc;

use tern_track::entity::{Entity, toplevel};
use tern_track::test_helpers::check_and_clear;
use tern_track::{Id, create, create_id, debug, destroy_id, enter, exit, info, set_time, test_init};

struct Packet {
    id: Id,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet{}", self.id)
    }
}

#[test]
fn entity_hierarchy() {
    let (test_tracker, tracker) = test_init!(10);
    let top = toplevel(&tracker, "top");
    let rank = Rc::new(Entity::new(&top, "rank0"));

    assert_eq!(rank.full_name(), "top::rank0");
    assert_eq!(format!("{rank}"), "top::rank0");
    check_and_clear(
        &test_tracker,
        &["0: created 10, top, 0, 0 bytes", "10: created 11, top::rank0, 0, 0 bytes"],
    );

    drop(rank);
    check_and_clear(&test_tracker, &["11: destroyed 10"]);
}

#[test]
fn log_levels() {
    let (test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["created"]);

    info!(top ; "hello {}", 42);
    debug!(top ; "step={}", 3);
    check_and_clear(&test_tracker, &["1:INFO: hello 42", "1:DEBUG: step=3"]);
}

#[test]
fn object_lifetime() {
    let (test_tracker, tracker) = test_init!(20);
    let top = toplevel(&tracker, "top");
    check_and_clear(&test_tracker, &["created 20"]);

    let packet = Packet {
        id: create_id!(top),
    };
    create!(top ; packet, 128, 0);
    enter!(top ; packet.id);
    exit!(top ; packet.id);
    destroy_id!(top ; packet.id);
    set_time!(top ; 2.5);

    check_and_clear(
        &test_tracker,
        &[
            "20: created 21, packet21, 0, 128 bytes",
            "20: 21 entered",
            "20: 21 exited",
            "20: destroyed 21",
            "20: set time 2.5ns",
        ],
    );
}
