//! Consensus scenarios: quorum aggregation and leader rotation.

use {
    crate::harness::{wait_until, TestCluster},
    std::time::Duration,
};

#[test]
fn test_request_commits_on_all_nodes() {
    let mut cluster = TestCluster::start(4, 3);
    assert!(cluster.wait_connected(Duration::from_secs(10)));

    let events = cluster.publisher.subscribe();
    let request_id = cluster.inject_request(&[("greeting", b"hello".to_vec())]);

    assert!(
        cluster.wait_state_index(1, Duration::from_secs(20)),
        "every node should commit the batch"
    );

    // identical state hash everywhere, request effects applied
    let reference = cluster.committed_state(0).unwrap();
    assert_eq!(reference.state_index, 1);
    assert_eq!(
        reference.get("greeting").map(|v| v.as_slice()),
        Some(&b"hello"[..])
    );
    assert!(reference.get(&format!("processed/{request_id}")).is_some());
    for index in 1..4 {
        let state = cluster.committed_state(index).unwrap();
        assert_eq!(state.hash(), reference.hash(), "node {index} diverged");
    }

    // telemetry: the request was announced at least once
    let mut saw_request_in = false;
    while let Ok(event) = events.try_recv() {
        if event.name == "request_in" {
            saw_request_in = true;
        }
    }
    assert!(saw_request_in);

    cluster.dismiss();
}

#[test]
fn test_sequential_requests_advance_state() {
    let mut cluster = TestCluster::start(4, 3);
    assert!(cluster.wait_connected(Duration::from_secs(10)));

    for round in 1..=3u32 {
        cluster.inject_request(&[]);
        assert!(
            cluster.wait_state_index(round, Duration::from_secs(20)),
            "round {round} should commit"
        );
    }

    let reference = cluster.committed_state(0).unwrap();
    assert_eq!(reference.state_index, 3);
    for index in 1..4 {
        assert_eq!(cluster.committed_state(index).unwrap().hash(), reference.hash());
    }
    cluster.dismiss();
}

#[test]
fn test_committee_survives_leader_failure() {
    let mut cluster = TestCluster::start(4, 3);
    assert!(cluster.wait_connected(Duration::from_secs(10)));

    // commit one batch so every node agrees on state 1
    cluster.inject_request(&[]);
    assert!(cluster.wait_state_index(1, Duration::from_secs(20)));

    // stop exactly the node scheduled to lead the next round
    let state = cluster.committed_state(0).unwrap();
    let leader = cluster.scheduled_leader(&state) as usize;
    cluster.stop_node(leader);

    // the rest of the committee must rotate past it and commit
    cluster.inject_request(&[]);
    assert!(
        cluster.wait_state_index(2, Duration::from_secs(30)),
        "remaining nodes should rotate and commit without the leader"
    );

    let rotated = cluster
        .running()
        .iter()
        .any(|&i| cluster.node_metrics(i).snapshot().leader_rotations >= 1);
    assert!(rotated, "at least one node should have rotated the leader");

    // the survivors agree
    let running = cluster.running();
    let reference = cluster.committed_state(running[0]).unwrap();
    for &index in &running[1..] {
        assert_eq!(cluster.committed_state(index).unwrap().hash(), reference.hash());
    }
    cluster.dismiss();
}

#[test]
fn test_empty_backlog_produces_no_batches() {
    let cluster = TestCluster::start(3, 2);
    assert!(cluster.wait_connected(Duration::from_secs(10)));

    // give the committee time to (not) act
    assert!(!wait_until(
        || cluster
            .running()
            .iter()
            .any(|&i| cluster.node_metrics(i).snapshot().batches_committed > 0),
        Duration::from_secs(2)
    ));
    cluster.dismiss();
}
