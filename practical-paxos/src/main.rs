use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use practical_paxos::config::NodeConfig;
use practical_paxos::network::simulation::{Simulation, SimulationConfig, SimulationReport};
use practical_paxos::PaxosError;

#[derive(Parser)]
#[clap(about = "Runs a simulated Paxos cluster and checks that every node agrees")]
struct Args {
    /// number of nodes in the cluster
    #[clap(long, default_value_t = 5)]
    nodes: usize,

    /// seed of the first run
    #[clap(long, default_value_t = 1)]
    seed: u64,

    /// probability that a message between two nodes is lost
    #[clap(long, default_value_t = 0.1)]
    drop_rate: f64,

    /// number of independent runs, on consecutive seeds
    #[clap(long, default_value_t = 1)]
    rounds: u64,

    /// node config (json) to take the heartbeat timing from
    #[clap(long)]
    config: Option<String>,

    /// keep the leader running for the whole simulation
    #[clap(long)]
    no_crash: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut failures = 0;
    for round in 0..args.rounds {
        let seed = args.seed + round;
        match run_once(&args, seed) {
            Ok(report) => {
                print_report(seed, &report);
                if !report.is_consistent() {
                    error!("Seed {}: nodes disagree on the chosen value", seed);
                    failures += 1;
                }
            }
            Err(e) => {
                error!("Seed {}: simulation failed: {}", seed, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_once(args: &Args, seed: u64) -> Result<SimulationReport, PaxosError> {
    let dir = tempfile::tempdir().map_err(practical_paxos::StorageError::from)?;

    let mut config = SimulationConfig::new(dir.path());
    config.nodes = args.nodes;
    config.seed = seed;
    config.drop_rate = args.drop_rate;
    config.crash_leader = !args.no_crash;

    if let Some(path) = &args.config {
        let node_config = NodeConfig::from_json_file(path)?;
        config.heartbeat_period = node_config.heartbeat_period();
        config.liveness_window = node_config.liveness_window();
        config.max_time = config.max_time.max(node_config.liveness_window() * 100);
    }

    info!("Seed {}: starting {} nodes", seed, config.nodes);
    Simulation::new(config)?.run()
}

fn print_report(seed: u64, report: &SimulationReport) {
    println!("seed {} finished after {:?}", seed, report.elapsed);
    for (uid, value) in &report.resolved {
        match value {
            Some(value) => println!("  node {uid}: {value}"),
            None => println!("  node {uid}: unresolved"),
        }
    }
    if let Some(uid) = report.crashed {
        println!("  crashed and restarted: node {uid}");
    }
    println!(
        "  messages: {} sent, {} dropped; leadership acquired {} times",
        report.messages_sent,
        report.messages_dropped,
        report.leadership_acquisitions
    );
    match report.agreed_value() {
        Some(value) => println!("  agreed on {value}"),
        None if report.is_consistent() => println!("  nothing resolved"),
        None => println!("  DISAGREEMENT"),
    }
}
