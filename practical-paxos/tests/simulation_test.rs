use practical_paxos::network::simulation::{Simulation, SimulationConfig};
use practical_paxos::PaxosError;

fn config(dir: &tempfile::TempDir, nodes: usize, seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig::new(dir.path());
    config.nodes = nodes;
    config.seed = seed;
    config
}

/// Test that a reliable cluster resolves one value on every node.
#[test]
fn reliable_cluster_agrees_test() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let report = Simulation::new(config(&dir, 3, 7))
        .expect("valid config")
        .run()
        .expect("simulation should run");

    assert!(report.all_resolved(), "Every node should resolve, got {:?}", report.resolved);
    assert!(report.is_consistent(), "Nodes disagree: {:?}", report.resolved);
    assert!(report.leadership_acquisitions >= 1);
    assert_eq!(report.messages_dropped, 0);

    let value = report.agreed_value().expect("a value was agreed on");
    assert!(value.starts_with("value-from-"), "Unexpected value {}", value);
}

/// Test that agreement holds over several seeds with message loss.
#[test]
fn lossy_network_never_disagrees_test() {
    for seed in 0..5 {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = config(&dir, 5, seed);
        config.drop_rate = 0.2;

        let report = Simulation::new(config)
            .expect("valid config")
            .run()
            .expect("simulation should run");
        assert!(report.is_consistent(), "Seed {}: nodes disagree: {:?}", seed, report.resolved);
        assert!(report.all_resolved(), "Seed {}: unresolved nodes: {:?}", seed, report.resolved);
    }
}

/// Test that a crashed and restarted leader comes back to the same value.
#[test]
fn leader_crash_and_restart_test() {
    for seed in 0..3 {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = config(&dir, 3, seed);
        config.crash_leader = true;

        let report = Simulation::new(config)
            .expect("valid config")
            .run()
            .expect("simulation should run");
        assert!(report.crashed.is_some(), "Seed {}: the leader should have been crashed", seed);
        assert!(report.all_resolved(), "Seed {}: unresolved nodes: {:?}", seed, report.resolved);
        assert!(report.is_consistent(), "Seed {}: nodes disagree: {:?}", seed, report.resolved);
    }
}

/// Test that the same seed replays the same run.
#[test]
fn runs_are_deterministic_test() {
    let run = || {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = config(&dir, 5, 42);
        config.drop_rate = 0.1;
        Simulation::new(config)
            .expect("valid config")
            .run()
            .expect("simulation should run")
    };

    let first = run();
    let second = run();
    assert_eq!(first.resolved, second.resolved);
    assert_eq!(first.elapsed, second.elapsed);
    assert_eq!(first.messages_sent, second.messages_sent);
}

/// Test that invalid settings are rejected up front.
#[test]
fn invalid_config_rejected_test() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let mut bad_rate = config(&dir, 3, 0);
    bad_rate.drop_rate = 1.5;
    assert!(matches!(Simulation::new(bad_rate), Err(PaxosError::Config(_))));

    let empty = config(&dir, 0, 0);
    assert!(matches!(Simulation::new(empty), Err(PaxosError::Config(_))));
}
