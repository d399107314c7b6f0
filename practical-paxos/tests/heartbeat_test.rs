mod common;

use std::time::Duration;

use common::{pid, RecordingMessenger, RecordingScheduler, Sent};
use practical_paxos::clock::ManualClock;
use practical_paxos::config::NodeConfig;
use practical_paxos::{HeartbeatNode, Message, Timer};

type TestNode = HeartbeatNode<String, RecordingMessenger, RecordingScheduler, ManualClock>;

const PERIOD: Duration = Duration::from_millis(100);
const WINDOW: Duration = Duration::from_millis(1000);

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn node_with(config: NodeConfig, clock: &ManualClock) -> TestNode {
    HeartbeatNode::new(
        &config.with_timing(PERIOD, WINDOW),
        RecordingMessenger::new(),
        RecordingScheduler::default(),
        clock.clone(),
    )
}

fn follower(uid: u64, quorum: usize, clock: &ManualClock) -> TestNode {
    node_with(NodeConfig::new(uid, quorum), clock)
}

/// Brings node 1 (quorum 2) to leadership of round (1, 1) at t = 1600ms.
fn elected_leader(clock: &ManualClock) -> TestNode {
    let mut node = follower(1, 2, clock);
    clock.set(ms(1600));
    node.poll_liveness();
    node.receive_promise(1, pid(1, 1), None, None);
    node.receive_promise(2, pid(1, 1), None, None);
    assert!(node.is_leader(), "Two promises should make node 1 leader");
    node.messenger_mut().take();
    node.scheduler_mut().scheduled.clear();
    node
}

/// Test that a fresh follower waits out the prepare grace period before bidding.
#[test]
fn initial_election_waits_for_grace_period_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    clock.set(ms(1200));
    assert!(!node.leader_is_alive());
    node.poll_liveness();
    assert!(node.messenger().sent.is_empty(), "Still inside 1.5 liveness windows");

    clock.set(ms(1600));
    node.poll_liveness();
    assert!(node.is_acquiring_leadership());
    assert_eq!(node.messenger_mut().take(), vec![Sent::Prepare(pid(1, 1))]);
}

/// Test that an outstanding bid is retried on each liveness poll.
#[test]
fn acquiring_node_prepares_again_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    clock.set(ms(1600));
    node.poll_liveness();
    clock.advance(PERIOD);
    node.fire(Timer::PollLiveness);

    assert_eq!(
        node.messenger_mut().take(),
        vec![Sent::Prepare(pid(1, 1)), Sent::Prepare(pid(2, 1))]
    );
}

/// Test that winning a quorum of promises starts the heartbeat chain.
#[test]
fn leadership_starts_pulse_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    clock.set(ms(1600));
    node.poll_liveness();
    node.receive_promise(1, pid(1, 1), None, None);
    node.receive_promise(2, pid(1, 1), None, None);

    assert!(node.is_leader());
    assert!(!node.is_acquiring_leadership());
    assert_eq!(node.leader_uid(), Some(1));
    assert_eq!(node.leader_proposal_id(), Some(pid(1, 1)));
    assert_eq!(
        node.messenger_mut().take(),
        vec![
            Sent::Prepare(pid(1, 1)),
            Sent::LeadershipAcquired,
            Sent::Heartbeat(pid(1, 1)),
            Sent::LeadershipChange(None, Some(1)),
        ]
    );
    assert_eq!(node.scheduler_mut().scheduled, vec![(PERIOD, Timer::Pulse)]);

    // A late third promise does not restart anything.
    node.receive_promise(3, pid(1, 1), None, None);
    assert!(node.messenger().sent.is_empty(), "Got {:?}", node.messenger().sent);
}

/// Test that each pulse emits one heartbeat and schedules the next.
#[test]
fn pulse_reschedules_while_leader_test() {
    let clock = ManualClock::new();
    let mut node = elected_leader(&clock);

    for _ in 0..3 {
        clock.advance(PERIOD);
        node.fire(Timer::Pulse);
    }
    assert_eq!(node.messenger().count(|s| matches!(s, Sent::Heartbeat(_))), 3);
    assert_eq!(node.scheduler_mut().scheduled.len(), 3);
    assert!(node.leader_is_alive(), "The leader's own pulses count as heartbeats");
}

/// Test that a heartbeat with a higher proposal takes leadership away.
#[test]
fn higher_heartbeat_steps_leader_down_test() {
    let clock = ManualClock::new();
    let mut node = elected_leader(&clock);

    node.receive_heartbeat(2, pid(2, 2));

    assert!(!node.is_leader());
    assert_eq!(node.leader_uid(), Some(2));
    assert_eq!(node.leader_proposal_id(), Some(pid(2, 2)));
    assert_eq!(
        node.messenger_mut().take(),
        vec![Sent::LeadershipLost, Sent::LeadershipChange(Some(1), Some(2))]
    );

    // The pulse chain ends by itself.
    node.fire(Timer::Pulse);
    assert!(node.messenger().sent.is_empty());
    assert!(node.scheduler_mut().scheduled.is_empty());

    // The next bid outbids the new leader.
    node.prepare(true);
    assert!(node.node().proposal_id() > pid(2, 2));
}

/// Test that a quorum of accept NACKs makes a leader step down.
#[test]
fn accept_nacks_step_leader_down_test() {
    let clock = ManualClock::new();
    let mut node = elected_leader(&clock);

    node.receive_accept_nack(2, pid(1, 1), pid(3, 2));
    assert!(node.is_leader(), "One NACK is not a quorum");
    node.receive_accept_nack(2, pid(1, 1), pid(3, 2));
    assert!(node.is_leader(), "The same acceptor counts once");

    node.receive_accept_nack(3, pid(1, 1), pid(3, 3));
    assert!(!node.is_leader());
    assert_eq!(node.leader_uid(), None);
    assert_eq!(node.leader_proposal_id(), None);
    assert_eq!(
        node.messenger_mut().take(),
        vec![Sent::LeadershipLost, Sent::LeadershipChange(Some(1), None)]
    );

    node.prepare(true);
    assert!(
        node.node().proposal_id() > pid(3, 3),
        "Expected to outbid (3, 3), got {}",
        node.node().proposal_id()
    );
}

/// Test that NACKs for an older round are not counted.
#[test]
fn accept_nacks_for_old_round_ignored_test() {
    let clock = ManualClock::new();
    let mut node = elected_leader(&clock);

    node.receive_accept_nack(2, pid(0, 1), pid(3, 2));
    node.receive_accept_nack(3, pid(0, 1), pid(3, 3));
    assert!(node.is_leader());
}

/// Test that a prepare NACK during a bid triggers an immediate higher bid.
#[test]
fn prepare_nack_retries_bid_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    clock.set(ms(1600));
    node.poll_liveness();
    node.receive_prepare_nack(2, pid(1, 1), pid(5, 2));

    assert_eq!(
        node.messenger_mut().take(),
        vec![Sent::Prepare(pid(1, 1)), Sent::Prepare(pid(6, 1))]
    );
}

/// Test that a follower does not bid on a prepare NACK.
#[test]
fn prepare_nack_without_bid_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    node.receive_prepare_nack(2, pid(1, 1), pid(5, 2));
    assert!(node.messenger().sent.is_empty());
}

/// Test that steady heartbeats keep every follower from starting an election.
#[test]
fn steady_heartbeats_prevent_elections_test() {
    let clock = ManualClock::new();
    let mut followers: Vec<TestNode> = (2..=5).map(|uid| follower(uid, 3, &clock)).collect();

    for _ in 0..100 {
        clock.advance(PERIOD);
        for node in followers.iter_mut() {
            node.receive_heartbeat(1, pid(1, 1));
            node.poll_liveness();
        }
    }

    for node in followers.iter() {
        assert_eq!(node.leader_uid(), Some(1));
        assert!(!node.is_acquiring_leadership());
        assert_eq!(
            node.messenger().count(|s| matches!(s, Sent::Prepare(_))),
            0,
            "Node {} started an election under a live leader",
            node.uid()
        );
    }
}

/// Test that a recently seen prepare from another node delays our own bid.
#[test]
fn recent_prepare_delays_election_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    clock.set(ms(1000));
    node.receive_prepare(3, pid(1, 3));
    assert!(node.observed_recent_prepare());

    clock.set(ms(2400));
    node.poll_liveness();
    assert!(!node.is_acquiring_leadership(), "Node 3 is still mid-election");

    clock.set(ms(2600));
    node.poll_liveness();
    assert!(node.is_acquiring_leadership());
    assert_eq!(
        node.messenger().count(|s| *s == Sent::Prepare(pid(2, 1))),
        1,
        "The bid should already outbid the prepare it saw"
    );
}

/// Test that a heartbeat below the known leader's proposal is ignored.
#[test]
fn lower_heartbeat_ignored_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    node.receive_heartbeat(2, pid(5, 2));
    clock.set(ms(900));
    node.receive_heartbeat(3, pid(4, 3));

    assert_eq!(node.leader_uid(), Some(2));
    clock.set(ms(1100));
    assert!(!node.leader_is_alive(), "A stale heartbeat must not refresh the leader");
}

/// Test that a designated leader skips phase 1 and followers trust it.
#[test]
fn designated_leader_test() {
    let clock = ManualClock::new();
    let mut leader = node_with(NodeConfig::new(1, 2).with_leader(Some(1)), &clock);
    let mut other = node_with(NodeConfig::new(2, 2).with_leader(Some(1)), &clock);

    assert!(leader.is_leader());
    assert_eq!(other.leader_uid(), Some(1));
    assert_eq!(other.leader_proposal_id(), Some(pid(0, 1)));

    leader.set_proposal("X".to_string());
    leader.pulse();
    assert_eq!(
        leader.messenger_mut().take(),
        vec![Sent::Accept(pid(0, 1), "X".to_string()), Sent::Heartbeat(pid(0, 1))]
    );

    clock.set(ms(900));
    other.receive_heartbeat(1, pid(0, 1));
    clock.set(ms(1800));
    assert!(other.leader_is_alive(), "The matching heartbeat refreshed the leader");
    other.poll_liveness();
    assert!(other.messenger().sent.is_empty());
}

/// Test that inbound messages are routed to the matching handler.
#[test]
fn receive_dispatches_messages_test() {
    let clock = ManualClock::new();
    let mut node = follower(1, 2, &clock);

    node.receive(2, Message::Prepare { proposal_id: pid(1, 2) });
    assert!(node.persistence_required());
    node.persisted();
    node.receive(
        2,
        Message::Accept {
            proposal_id: pid(1, 2),
            value: "X".to_string(),
        },
    );
    node.persisted();
    node.receive(2, Message::Accepted { proposal_id: pid(1, 2), value: "X".to_string() });
    node.receive(3, Message::Accepted { proposal_id: pid(1, 2), value: "X".to_string() });
    node.receive(2, Message::Heartbeat { leader_proposal_id: pid(1, 2) });

    assert_eq!(node.final_value().ok(), Some(&"X".to_string()));
    assert_eq!(node.leader_uid(), Some(2));
    assert_eq!(
        node.messenger_mut().take(),
        vec![
            Sent::Promise {
                to: 2,
                proposal_id: pid(1, 2),
                prev_accepted_id: None,
                prev_accepted_value: None,
            },
            Sent::Accepted(pid(1, 2), "X".to_string()),
            Sent::Resolution(pid(1, 2), "X".to_string()),
            Sent::LeadershipChange(None, Some(2)),
        ]
    );
}

/// Test that an enormous liveness window does not overflow the grace period.
#[test]
fn huge_liveness_window_does_not_overflow_test() {
    let clock = ManualClock::new();
    let mut config = NodeConfig::new(1, 2);
    config.liveness_window_ms = u64::MAX;
    let node: TestNode = HeartbeatNode::new(
        &config,
        RecordingMessenger::new(),
        RecordingScheduler::default(),
        clock.clone(),
    );

    clock.set(ms(10_000));
    assert!(node.observed_recent_prepare());
    assert!(node.leader_is_alive());
}
