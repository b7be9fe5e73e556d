// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use tern_engine::sim_error;
use tern_engine::test_helpers::start_test;
use tern_engine::types::SimError;

#[test]
fn same_tick_in_schedule_order() {
    let mut engine = start_test(file!());
    engine.schedule(3, 0, 'a');
    engine.schedule(3, 1, 'b');
    engine.schedule(1, 2, 'c');
    engine.schedule(3, 0, 'd');

    let mut seen = Vec::new();
    engine
        .run(|_, delivery| {
            seen.push(delivery.event);
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, vec!['c', 'a', 'b', 'd']);
    assert_eq!(engine.tick_now(), 3);
    assert_eq!(engine.num_delivered(), 4);
}

#[test]
fn handler_schedules_more() {
    let mut engine = start_test(file!());
    engine.schedule(0, 0, 0_u32);

    let mut hops = 0;
    engine
        .run(|engine, delivery| {
            hops += 1;
            if delivery.event < 5 {
                engine.schedule(2, delivery.target + 1, delivery.event + 1);
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(hops, 6);
    assert_eq!(engine.tick_now(), 10);
    assert_eq!(engine.time_now_ns(), 10.0);
}

#[test]
fn run_until_stops_early() {
    let mut engine = start_test(file!());
    engine.schedule(5, 0, ());
    engine.schedule(50, 0, ());

    engine.run_until(10, |_, _| Ok(())).unwrap();
    assert_eq!(engine.num_pending(), 1);
    assert_eq!(engine.tick_now(), 5);
}

#[test]
fn handler_error_stops_run() {
    let mut engine = start_test(file!());
    engine.schedule(1, 0, 1);
    engine.schedule(2, 0, 2);

    let result = engine.run(|_, delivery| {
        if delivery.event == 1 {
            return sim_error!("stop here");
        }
        Ok(())
    });
    assert_eq!(result, Err(SimError("stop here".to_string())));
    assert_eq!(format!("{}", result.unwrap_err()), "Error: stop here");
    assert_eq!(engine.num_pending(), 1);
}
