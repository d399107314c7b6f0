use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::{Clock, ManualClock};
use crate::config::NodeConfig;
use crate::error::PaxosError;
use crate::heartbeat::HeartbeatNode;
use crate::message::Message;
use crate::messenger::{HeartbeatMessenger, Messenger, Scheduler, Timer};
use crate::proposal::{NodeId, ProposalId};
use crate::storage::FileStore;

/// Outgoing message. `to == None` means every node.
#[derive(Debug, Clone)]
pub struct Envelope<V> {
    pub to: Option<NodeId>,
    pub message: Message<V>,
}

/// Messenger that queues everything for the simulated network.
#[derive(Debug)]
pub struct SimMessenger<V> {
    pub outbox: Vec<Envelope<V>>,
    pub leadership_acquired: usize,
}

impl<V> SimMessenger<V> {
    pub fn new() -> Self {
        SimMessenger {
            outbox: Vec::new(),
            leadership_acquired: 0,
        }
    }

    fn broadcast(&mut self, message: Message<V>) {
        self.outbox.push(Envelope { to: None, message });
    }

    fn send(&mut self, to: NodeId, message: Message<V>) {
        self.outbox.push(Envelope { to: Some(to), message });
    }
}

impl<V> Default for SimMessenger<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Messenger<V> for SimMessenger<V> {
    fn send_prepare(&mut self, proposal_id: ProposalId) {
        self.broadcast(Message::Prepare { proposal_id });
    }

    fn send_promise(
        &mut self,
        to: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<&V>,
    ) {
        self.send(
            to,
            Message::Promise {
                proposal_id,
                prev_accepted_id,
                prev_accepted_value: prev_accepted_value.cloned(),
            },
        );
    }

    fn send_accept(&mut self, proposal_id: ProposalId, value: &V) {
        self.broadcast(Message::Accept {
            proposal_id,
            value: value.clone(),
        });
    }

    fn send_accepted(&mut self, proposal_id: ProposalId, value: &V) {
        self.broadcast(Message::Accepted {
            proposal_id,
            value: value.clone(),
        });
    }

    fn send_prepare_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.send(to, Message::PrepareNack { proposal_id, promised_id });
    }

    fn send_accept_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.send(to, Message::AcceptNack { proposal_id, promised_id });
    }

    fn on_resolution(&mut self, proposal_id: ProposalId, _value: &V) {
        debug!("Simulation: Resolution reached with {}", proposal_id);
    }

    fn on_leadership_acquired(&mut self) {
        self.leadership_acquired += 1;
    }
}

impl<V: Clone> HeartbeatMessenger<V> for SimMessenger<V> {
    fn send_heartbeat(&mut self, leader_proposal_id: ProposalId) {
        self.broadcast(Message::Heartbeat { leader_proposal_id });
    }
}

/// Collects timer requests until the simulation drains them.
#[derive(Debug, Default)]
pub struct SimScheduler {
    pub pending: Vec<(Duration, Timer)>,
}

impl Scheduler for SimScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.pending.push((delay, timer));
    }
}

pub type SimNode = HeartbeatNode<String, SimMessenger<String>, SimScheduler, ManualClock>;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub nodes: usize,
    pub seed: u64,
    /// Probability that a message between two different nodes is lost.
    pub drop_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub heartbeat_period: Duration,
    pub liveness_window: Duration,
    /// Crash the leader once a value is resolved, then restart it from disk.
    pub crash_leader: bool,
    pub max_time: Duration,
    /// Directory for the acceptors' durable files.
    pub storage_dir: PathBuf,
}

impl SimulationConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        SimulationConfig {
            nodes: 3,
            seed: 0,
            drop_rate: 0.0,
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            heartbeat_period: Duration::from_millis(200),
            liveness_window: Duration::from_millis(1000),
            crash_leader: false,
            max_time: Duration::from_secs(120),
            storage_dir: storage_dir.into(),
        }
    }

    fn validate(&self) -> Result<(), PaxosError> {
        if self.nodes == 0 {
            return Err(PaxosError::Config("a cluster needs at least one node".to_string()));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(PaxosError::Config(format!(
                "drop rate {} must be in [0, 1)",
                self.drop_rate
            )));
        }
        if self.min_delay > self.max_delay {
            return Err(PaxosError::Config("min_delay exceeds max_delay".to_string()));
        }
        self.node_config(1).validate()
    }

    fn node_config(&self, uid: NodeId) -> NodeConfig {
        NodeConfig::new(uid, NodeConfig::majority(self.nodes))
            .with_timing(self.heartbeat_period, self.liveness_window)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Value each node ended up with, `None` if it never resolved.
    pub resolved: BTreeMap<NodeId, Option<String>>,
    pub elapsed: Duration,
    pub messages_sent: usize,
    pub messages_dropped: usize,
    pub leadership_acquisitions: usize,
    pub crashed: Option<NodeId>,
}

impl SimulationReport {
    pub fn all_resolved(&self) -> bool {
        self.resolved.values().all(Option::is_some)
    }

    /// True when no two nodes resolved different values.
    pub fn is_consistent(&self) -> bool {
        let mut values = self.resolved.values().flatten();
        match values.next() {
            Some(first) => values.all(|v| v == first),
            None => true,
        }
    }

    pub fn agreed_value(&self) -> Option<&String> {
        if !self.is_consistent() {
            return None;
        }
        self.resolved.values().flatten().next()
    }
}

#[derive(Debug)]
enum Event {
    Deliver {
        from: NodeId,
        to: NodeId,
        message: Message<String>,
    },
    Fire {
        uid: NodeId,
        incarnation: u32,
        timer: Timer,
    },
    Restart {
        uid: NodeId,
    },
}

fn store_name(uid: NodeId) -> String {
    format!("node{uid}-acceptor")
}

struct Slot {
    node: Option<SimNode>,
    incarnation: u32,
    store: FileStore,
}

/// Deterministic cluster of heartbeat nodes over a lossy, reordering network.
///
/// Every event is taken from a time-ordered queue and applied to a single
/// node, so a given seed always replays the same run.
pub struct Simulation {
    config: SimulationConfig,
    clock: ManualClock,
    rng: StdRng,
    slots: BTreeMap<NodeId, Slot>,
    events: BTreeMap<(Duration, u64), Event>,
    seq: u64,
    messages_sent: usize,
    messages_dropped: usize,
    leadership_acquisitions: usize,
    crashed: Option<NodeId>,
    restarted: bool,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, PaxosError> {
        config.validate()?;

        let mut slots = BTreeMap::new();
        for uid in 1..=config.nodes as NodeId {
            let store = FileStore::open(&config.storage_dir, &store_name(uid))?;
            slots.insert(
                uid,
                Slot {
                    node: None,
                    incarnation: 0,
                    store,
                },
            );
        }

        Ok(Simulation {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            clock: ManualClock::new(),
            slots,
            events: BTreeMap::new(),
            seq: 0,
            messages_sent: 0,
            messages_dropped: 0,
            leadership_acquisitions: 0,
            crashed: None,
            restarted: false,
        })
    }

    pub fn run(mut self) -> Result<SimulationReport, PaxosError> {
        let uids: Vec<NodeId> = self.slots.keys().copied().collect();
        for uid in uids {
            self.boot(uid)?;
        }

        while let Some(((at, _), event)) = self.events.pop_first() {
            if at > self.config.max_time {
                warn!("Simulation: Stopping at time limit {:?}", self.config.max_time);
                break;
            }
            self.clock.set(at);

            match event {
                Event::Deliver { from, to, message } => {
                    if let Some(node) = self.slots.get_mut(&to).and_then(|s| s.node.as_mut()) {
                        node.receive(from, message);
                        self.flush(to)?;
                    }
                }
                Event::Fire {
                    uid,
                    incarnation,
                    timer,
                } => self.fire(uid, incarnation, timer)?,
                Event::Restart { uid } => {
                    info!("Simulation: Restarting node {}", uid);
                    let store = FileStore::open(&self.config.storage_dir, &store_name(uid))?;
                    if let Some(slot) = self.slots.get_mut(&uid) {
                        slot.store = store;
                    }
                    self.boot(uid)?;
                    self.restarted = true;
                }
            }

            self.maybe_crash_leader();

            if self.finished() {
                break;
            }
        }

        Ok(self.report())
    }

    fn finished(&self) -> bool {
        let crash_done = !self.config.crash_leader || self.restarted;
        crash_done
            && self
                .slots
                .values()
                .all(|s| s.node.as_ref().is_some_and(|n| n.is_complete()))
    }

    fn report(&self) -> SimulationReport {
        let resolved = self
            .slots
            .iter()
            .map(|(uid, slot)| {
                let value = slot
                    .node
                    .as_ref()
                    .and_then(|n| n.final_value().ok())
                    .cloned();
                (*uid, value)
            })
            .collect();

        SimulationReport {
            resolved,
            elapsed: self.clock.now(),
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
            leadership_acquisitions: self.leadership_acquisitions,
            crashed: self.crashed,
        }
    }

    /// Starts (or restarts) a node, restoring its acceptor from disk.
    fn boot(&mut self, uid: NodeId) -> Result<(), PaxosError> {
        let config = self.config.node_config(uid);
        let slot = self
            .slots
            .get_mut(&uid)
            .ok_or_else(|| PaxosError::Config(format!("unknown node {uid}")))?;

        let mut node = HeartbeatNode::new(
            &config,
            SimMessenger::new(),
            SimScheduler::default(),
            self.clock.clone(),
        );
        if node.recover_from(&mut slot.store)? {
            info!("Simulation: Node {} recovered its acceptor state", uid);
        }
        node.set_proposal(format!("value-from-{uid}"));

        slot.incarnation += 1;
        let incarnation = slot.incarnation;
        slot.node = Some(node);

        // Stagger the liveness checks so the nodes do not all bid at once.
        let window = config.liveness_window_ms;
        let first_poll = config.heartbeat_period() + Duration::from_millis(self.rng.random_range(0..=window));
        self.push(
            first_poll,
            Event::Fire {
                uid,
                incarnation,
                timer: Timer::PollLiveness,
            },
        );
        self.flush(uid)
    }

    fn fire(&mut self, uid: NodeId, incarnation: u32, timer: Timer) -> Result<(), PaxosError> {
        let period = self.config.heartbeat_period;
        let Some(slot) = self.slots.get_mut(&uid) else {
            return Ok(());
        };
        if slot.incarnation != incarnation {
            return Ok(());
        }
        let Some(node) = slot.node.as_mut() else {
            return Ok(());
        };

        node.fire(timer);
        if timer == Timer::Pulse {
            // Accepts and Accepteds may have been lost; keep them flowing.
            node.resend_accept();
        }
        if timer == Timer::PollLiveness {
            self.push(
                period,
                Event::Fire {
                    uid,
                    incarnation,
                    timer: Timer::PollLiveness,
                },
            );
        }
        self.flush(uid)
    }

    fn maybe_crash_leader(&mut self) {
        if !self.config.crash_leader || self.crashed.is_some() {
            return;
        }
        let any_resolved = self
            .slots
            .values()
            .any(|s| s.node.as_ref().is_some_and(|n| n.is_complete()));
        if !any_resolved {
            return;
        }

        let leader = self
            .slots
            .iter()
            .find(|(_, s)| s.node.as_ref().is_some_and(|n| n.is_leader()))
            .map(|(uid, _)| *uid);

        if let Some(uid) = leader {
            info!("Simulation: Crashing leader {}", uid);
            if let Some(slot) = self.slots.get_mut(&uid) {
                slot.node = None;
            }
            self.crashed = Some(uid);
            let downtime = self.config.liveness_window * 3;
            self.push(downtime, Event::Restart { uid });
        }
    }

    /// Persists pending acceptor state, then hands the node's outgoing
    /// messages and timers to the network.
    fn flush(&mut self, uid: NodeId) -> Result<(), PaxosError> {
        let Some(slot) = self.slots.get_mut(&uid) else {
            return Ok(());
        };
        let Some(node) = slot.node.as_mut() else {
            return Ok(());
        };

        if node.persistence_required() {
            node.persist(&mut slot.store)?;
        }

        let messenger = node.messenger_mut();
        let outbox = std::mem::take(&mut messenger.outbox);
        self.leadership_acquisitions += std::mem::take(&mut messenger.leadership_acquired);
        let timers = std::mem::take(&mut node.scheduler_mut().pending);

        let all: Vec<NodeId> = self.slots.keys().copied().collect();
        for envelope in outbox {
            let targets = match envelope.to {
                Some(to) => vec![to],
                None => all.clone(),
            };
            for to in targets {
                self.messages_sent += 1;
                if to != uid && self.rng.random_bool(self.config.drop_rate) {
                    debug!("Simulation: Dropped {} from {} to {}", envelope.message.kind(), uid, to);
                    self.messages_dropped += 1;
                    continue;
                }
                let delay = self.random_delay();
                self.push(
                    delay,
                    Event::Deliver {
                        from: uid,
                        to,
                        message: envelope.message.clone(),
                    },
                );
            }
        }

        let incarnation = self.slots.get(&uid).map_or(0, |s| s.incarnation);
        for (delay, timer) in timers {
            self.push(
                delay,
                Event::Fire {
                    uid,
                    incarnation,
                    timer,
                },
            );
        }
        Ok(())
    }

    fn random_delay(&mut self) -> Duration {
        let min = u64::try_from(self.config.min_delay.as_millis()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.config.max_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.rng.random_range(min..=max))
    }

    fn push(&mut self, delay: Duration, event: Event) {
        let at = self.clock.now() + delay;
        self.seq += 1;
        self.events.insert((at, self.seq), event);
    }
}
