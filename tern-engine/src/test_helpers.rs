// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use tern_track::test_helpers::create_tracker;

use crate::engine::Engine;

#[must_use]
pub fn start_test<E>(full_filepath: &str) -> Engine<E> {
    Engine::new(&create_tracker(full_filepath))
}
