// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use tern_collectives::algorithm::CollectiveAlgorithm;
use tern_collectives::completion::CompletionKey;
use tern_collectives::test_helpers::{
    MockSession, build_trivance, drive_to_completion, start_test,
};
use tern_collectives::topology::{RingDimension, RingDirection, RingTopology};
use tern_collectives::trivance::{Trivance, ceil_log3};
use tern_collectives::types::{
    AlgorithmEvent, BundleRoute, CollectiveType, Phase, StreamState, Transmission,
};
use tern_track::entity::toplevel;
use tern_track::test_init;

fn trivance(algorithm: &CollectiveAlgorithm) -> &Trivance {
    let CollectiveAlgorithm::Trivance(trivance) = algorithm;
    trivance
}

fn partners(algorithm: &CollectiveAlgorithm) -> Vec<usize> {
    trivance(algorithm).issued().iter().map(|e| e.partner).collect()
}

#[test]
fn nine_nodes() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 9, RingDimension::Local, 2187).unwrap();
    let mut session = MockSession::new(7, 1);

    drive_to_completion(&mut algorithm, &mut session).unwrap();

    assert_eq!(
        session.bundle_sizes(),
        vec![729, 729, 243, 243, 243, 243, 729, 729, 0, 0]
    );
    assert_eq!(partners(&algorithm), vec![1, 8, 3, 6, 1, 8, 3, 6, 3, 6]);

    let sizes_sent: Vec<u64> = session.sends.iter().map(|s| s.size).collect();
    assert_eq!(sizes_sent, vec![729, 729, 243, 243, 243, 243, 729, 729]);
    assert!(session.sends.iter().all(|s| s.tag == 7 && s.queue_id == 1 && s.src == 0));

    let algorithm_state = trivance(&algorithm);
    assert!(algorithm_state.is_done());
    assert!(algorithm_state.drain_injected());
    assert_eq!(algorithm_state.phase(), Phase::AllGather);
    assert_eq!(algorithm_state.cur_size(), 2187);
    assert_eq!(algorithm_state.flow().total_sent(), 8);
    assert_eq!(algorithm_state.flow().total_received(), 8);
    assert_eq!(algorithm_state.flow().free_credits(), 2);
    assert_eq!(algorithm_state.flow().stream_count(), 0);
    assert_eq!(algorithm_state.flow().num_queued(), 0);

    assert_eq!(session.num_proceeds, 1);
    assert_eq!(session.state, StreamState::Zombie);
    assert!(algorithm.is_released());
}

#[test]
fn bundle_flags() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 4, 9, RingDimension::Local, 2187).unwrap();
    let mut session = MockSession::new(1, 0);

    drive_to_completion(&mut algorithm, &mut session).unwrap();

    let processed: Vec<bool> = session.bundles.iter().map(|b| b.processed).collect();
    assert_eq!(
        processed,
        vec![true, true, true, true, false, false, false, false, false, false]
    );
    for bundle in &session.bundles {
        assert_eq!(bundle.exchanges.len(), 1);
        assert_eq!(bundle.exchanges[0].size, bundle.size);
        assert!(!bundle.send_back);
        assert_eq!(bundle.transmission, Transmission::Fast);
        assert_eq!(bundle.route, BundleRoute::NpuToMa);
    }
}

#[test]
fn single_node() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 1, RingDimension::Local, 4096).unwrap();
    let mut session = MockSession::new(1, 0);

    assert_eq!(trivance(&algorithm).steps_total(), 0);
    assert!(trivance(&algorithm).is_done());

    let delivered = drive_to_completion(&mut algorithm, &mut session).unwrap();
    assert_eq!(delivered, 1);
    assert!(session.bundles.is_empty());
    assert!(session.sends.is_empty());
    assert_eq!(session.num_recvs, 0);
    assert_eq!(session.num_proceeds, 1);
    assert_eq!(trivance(&algorithm).flow().stream_count(), 0);
}

#[test]
fn two_nodes() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 1, 2, RingDimension::Horizontal, 100).unwrap();
    let mut session = MockSession::new(3, 2);

    drive_to_completion(&mut algorithm, &mut session).unwrap();

    assert_eq!(session.bundle_sizes(), vec![34, 34, 34, 34, 0, 0]);
    assert_eq!(partners(&algorithm), vec![0; 6]);
    assert_eq!(session.sends.len(), 4);
    assert_eq!(trivance(&algorithm).cur_size(), 100);
    assert!(
        session
            .bundles
            .iter()
            .all(|b| b.transmission == Transmission::Usual)
    );
    assert_eq!(session.num_proceeds, 1);
}

#[test]
fn four_nodes_not_a_power_of_three() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 1, 4, RingDimension::Vertical, 10).unwrap();
    let mut session = MockSession::new(1, 0);

    drive_to_completion(&mut algorithm, &mut session).unwrap();

    assert_eq!(session.bundle_sizes(), vec![4, 4, 2, 2, 2, 2, 6, 6, 0, 0]);
    assert_eq!(partners(&algorithm), vec![2, 0, 0, 2, 2, 0, 0, 2, 0, 2]);
    assert_eq!(trivance(&algorithm).cur_size(), 10);
}

#[test]
fn empty_payload() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 9, RingDimension::Local, 0).unwrap();
    let mut session = MockSession::new(1, 0);

    drive_to_completion(&mut algorithm, &mut session).unwrap();

    // The reduce-scatter working size never drops below one byte.
    assert_eq!(session.bundle_sizes(), vec![0, 0, 1, 1, 1, 1, 0, 0, 0, 0]);
    assert_eq!(session.num_proceeds, 1);
}

#[test]
fn all_ring_sizes_finish() {
    let top = start_test(file!());
    for n in 2..=30 {
        for id in [0, n / 2, n - 1] {
            let mut algorithm = build_trivance(&top, id, n, RingDimension::Local, 1000).unwrap();
            let mut session = MockSession::new(1, 0);
            drive_to_completion(&mut algorithm, &mut session).unwrap();

            let steps = ceil_log3(n) as usize;
            let sizes = session.bundle_sizes();
            assert_eq!(sizes.len(), 4 * steps + 2, "ring of {n}");
            assert_eq!(&sizes[sizes.len() - 2..], &[0, 0]);
            assert_eq!(sizes[0], 334);
            assert_eq!(session.sends.len(), 4 * steps);
            assert_eq!(session.num_recvs, 4 * steps);
            assert_eq!(session.num_proceeds, 1);

            for issued in trivance(&algorithm).issued() {
                assert_ne!(issued.partner, id, "ring of {n} exchanged with itself");
                assert!(issued.partner < n);
            }
        }
    }
}

#[test]
fn dispatch_waits_for_credit() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 9, RingDimension::Local, 900).unwrap();
    let mut session = MockSession::new(1, 0);

    assert!(algorithm.on_event(AlgorithmEvent::Init, &mut session).unwrap());
    assert_eq!(session.bundles.len(), 2);
    assert!(session.sends.is_empty());
    assert_eq!(trivance(&algorithm).flow().num_queued(), 2);
    assert_eq!(session.state, StreamState::Created);

    assert!(algorithm.on_event(AlgorithmEvent::CreditReturn, &mut session).unwrap());
    assert_eq!(session.sends.len(), 1);
    assert_eq!(session.num_recvs, 1);
    assert_eq!(session.sends[0].dest, 1);
    assert_eq!(session.recvs[0].src, 1);
    assert_eq!(session.recvs[0].dest, 0);
    assert_eq!(session.state, StreamState::Executing);
    assert_eq!(trivance(&algorithm).flow().free_credits(), 0);
    assert_eq!(trivance(&algorithm).flow().stream_count(), 7);

    assert!(algorithm.on_event(AlgorithmEvent::CreditReturn, &mut session).unwrap());
    assert_eq!(session.sends.len(), 2);
    assert_eq!(session.sends[1].dest, 8);
    assert_eq!(trivance(&algorithm).flow().num_queued(), 0);
}

#[test]
fn step_needs_both_completions() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 9, RingDimension::Local, 900).unwrap();
    let mut session = MockSession::new(1, 0);

    algorithm.on_event(AlgorithmEvent::Init, &mut session).unwrap();
    algorithm.on_event(AlgorithmEvent::CreditReturn, &mut session).unwrap();
    algorithm.on_event(AlgorithmEvent::CreditReturn, &mut session).unwrap();
    session.complete_recvs().unwrap();

    let first = session.next_completion().unwrap();
    algorithm
        .on_event(AlgorithmEvent::ExchangeCompleted(first), &mut session)
        .unwrap();
    assert_eq!(trivance(&algorithm).recv_in_step(), 1);
    assert_eq!(trivance(&algorithm).step(), 0);
    assert_eq!(session.bundles.len(), 2);

    let second = session.next_completion().unwrap();
    algorithm
        .on_event(AlgorithmEvent::ExchangeCompleted(second), &mut session)
        .unwrap();
    assert_eq!(trivance(&algorithm).recv_in_step(), 0);
    assert_eq!(trivance(&algorithm).step(), 1);
    assert_eq!(trivance(&algorithm).distance(), 3);
    assert_eq!(trivance(&algorithm).cur_size(), 300);
    assert_eq!(session.bundle_sizes(), vec![300, 300, 100, 100]);
}

#[test]
fn release_happens_once() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 3, RingDimension::Local, 90).unwrap();
    let mut session = MockSession::new(1, 0);

    drive_to_completion(&mut algorithm, &mut session).unwrap();
    assert_eq!(session.num_proceeds, 1);

    assert!(
        !algorithm
            .on_event(AlgorithmEvent::CreditReturn, &mut session)
            .unwrap()
    );
    assert_eq!(session.num_proceeds, 1);
}

#[test]
fn completion_after_finish_is_an_error() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 3, RingDimension::Local, 90).unwrap();
    let mut session = MockSession::new(1, 0);
    drive_to_completion(&mut algorithm, &mut session).unwrap();

    let key = CompletionKey {
        owner: 0,
        stream_id: 1,
        queue_id: 0,
        exchange: tern_track::NO_ID,
    };
    let err = algorithm
        .on_event(AlgorithmEvent::ExchangeCompleted(key), &mut session)
        .unwrap_err();
    assert!(err.0.contains("after the collective finished"));
}

#[test]
fn completion_for_other_stream_is_an_error() {
    let top = start_test(file!());
    let mut algorithm = build_trivance(&top, 0, 3, RingDimension::Local, 90).unwrap();
    let mut session = MockSession::new(1, 0);
    algorithm.on_event(AlgorithmEvent::Init, &mut session).unwrap();

    let key = CompletionKey {
        owner: 0,
        stream_id: 2,
        queue_id: 0,
        exchange: tern_track::NO_ID,
    };
    assert!(
        algorithm
            .on_event(AlgorithmEvent::ExchangeCompleted(key), &mut session)
            .is_err()
    );
}

#[test]
fn only_allreduce() {
    let top = start_test(file!());
    let ring = Rc::new(RingTopology::new(0, 9, RingDimension::Local).unwrap());
    for collective in [
        CollectiveType::AllGather,
        CollectiveType::ReduceScatter,
        CollectiveType::AllToAll,
    ] {
        let result = Trivance::new(&top, collective, ring.clone(), 100);
        assert!(result.is_err());
    }
}

#[test]
fn injects_clockwise() {
    let top = start_test(file!());
    let algorithm = build_trivance(&top, 2, 5, RingDimension::Local, 100).unwrap();
    assert_eq!(algorithm.specify_direction(), RingDirection::Clockwise);
}

#[test]
fn logs_partner_selection() {
    let (test_tracker, tracker) = test_init!(1);
    let top = toplevel(&tracker, "top");
    let mut algorithm = build_trivance(&top, 0, 9, RingDimension::Local, 2187).unwrap();
    let mut session = MockSession::new(1, 0);
    drive_to_completion(&mut algorithm, &mut session).unwrap();

    let selections: Vec<String> = test_tracker
        .events()
        .into_iter()
        .filter(|e| e.contains("rank="))
        .collect();
    assert_eq!(selections.len(), 10);
    assert!(selections[0].ends_with("rank=0 step=0 dist=1 peer=1"));
    assert!(selections[1].ends_with("rank=0 step=0 dist=1 peer=8"));
    assert!(selections[2].ends_with("rank=0 step=1 dist=3 peer=3"));
    assert!(selections[9].ends_with("rank=0 step=2 dist=3 peer=6"));
}
