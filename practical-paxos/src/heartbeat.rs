//! Leader election and failure detection on top of [`Node`].
//!
//! The leader broadcasts a heartbeat every `heartbeat_period`. A follower that
//! hears nothing from the leader for longer than `liveness_window` starts a
//! prepare round of its own, unless some other node was seen preparing
//! within the last one and a half windows. Leadership is lost on a heartbeat
//! carrying a higher proposal, or on a quorum of NACKs to this node's Accepts.
//!
//! None of this touches the safety of the underlying Paxos rounds; it only
//! decides who tries to drive them.

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::PaxosError;
use crate::message::Message;
use crate::messenger::{HeartbeatMessenger, Scheduler, Timer};
use crate::node::Node;
use crate::proposal::{NodeId, ProposalId};
use crate::storage::DurableStore;

pub struct HeartbeatNode<V, M, S, C> {
    node: Node<V, M>,
    scheduler: S,
    clock: C,

    leader_uid: Option<NodeId>,
    leader_proposal_id: Option<ProposalId>,
    last_heartbeat: Duration,
    last_prepare: Duration,
    heartbeat_period: Duration,
    liveness_window: Duration,
    acquiring: bool,
    accept_nacks: HashSet<NodeId>,
}

impl<V, M, S, C> HeartbeatNode<V, M, S, C>
where
    V: Clone + PartialEq,
    M: HeartbeatMessenger<V>,
    S: Scheduler,
    C: Clock,
{
    /// Builds a node from `config`.
    ///
    /// A designated leader starts out holding round 0, which no other
    /// proposer ever prepares, so it may send Accepts without a phase 1.
    /// Everyone else starts out believing that round 0 proposal leads.
    pub fn new(config: &NodeConfig, messenger: M, scheduler: S, clock: C) -> Self {
        let mut node = Node::new(messenger, config.uid, config.quorum_size);
        if config.leader == Some(config.uid) {
            node.set_leader(true);
        }

        let now = clock.now();
        HeartbeatNode {
            node,
            scheduler,
            clock,
            leader_uid: config.leader,
            leader_proposal_id: config.leader.map(|leader| ProposalId::new(0, leader)),
            last_heartbeat: now,
            last_prepare: now,
            heartbeat_period: config.heartbeat_period(),
            liveness_window: config.liveness_window(),
            acquiring: false,
            accept_nacks: HashSet::new(),
        }
    }

    pub fn node(&self) -> &Node<V, M> {
        &self.node
    }

    pub fn uid(&self) -> NodeId {
        self.node.uid()
    }

    pub fn messenger(&self) -> &M {
        self.node.messenger()
    }

    pub fn messenger_mut(&mut self) -> &mut M {
        self.node.messenger_mut()
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn leader_uid(&self) -> Option<NodeId> {
        self.leader_uid
    }

    pub fn leader_proposal_id(&self) -> Option<ProposalId> {
        self.leader_proposal_id
    }

    pub fn is_leader(&self) -> bool {
        self.node.is_leader()
    }

    pub fn is_acquiring_leadership(&self) -> bool {
        self.acquiring
    }

    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
    }

    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    pub fn leader_is_alive(&self) -> bool {
        self.clock.now().saturating_sub(self.last_heartbeat) <= self.liveness_window
    }

    pub fn observed_recent_prepare(&self) -> bool {
        let grace = self.liveness_window.saturating_add(self.liveness_window / 2);
        self.clock.now().saturating_sub(self.last_prepare) <= grace
    }

    /// Starts a new round, forgetting the Accept NACKs of the previous one.
    pub fn prepare(&mut self, increment_round: bool) {
        if increment_round {
            self.accept_nacks.clear();
        }
        self.node.prepare(increment_round);
    }

    /// Called periodically by the driver.
    pub fn poll_liveness(&mut self) {
        if self.leader_is_alive() || self.observed_recent_prepare() {
            return;
        }

        if self.acquiring {
            debug!("Node {}: Still acquiring leadership, preparing again", self.uid());
            self.prepare(true);
        } else {
            self.acquire_leadership();
        }
    }

    fn acquire_leadership(&mut self) {
        if self.leader_is_alive() {
            self.acquiring = false;
        } else {
            info!(
                "Node {}: Leader {:?} looks dead, bidding for leadership",
                self.uid(),
                self.leader_uid
            );
            self.acquiring = true;
            self.prepare(true);
        }
    }

    pub fn receive_heartbeat(&mut self, from: NodeId, proposal_id: ProposalId) {
        if self.leader_proposal_id.is_none_or(|current| proposal_id > current) {
            self.acquiring = false;
            let old_leader = self.leader_uid;

            self.leader_uid = Some(from);
            self.leader_proposal_id = Some(proposal_id);

            if self.node.is_leader() && from != self.uid() {
                warn!("Node {}: Lost leadership to node {} ({})", self.uid(), from, proposal_id);
                self.node.step_down();
                self.node.messenger_mut().on_leadership_lost();
                self.node.observe_proposal(from, proposal_id);
            }

            self.node
                .messenger_mut()
                .on_leadership_change(old_leader, Some(from));
        }

        if self.leader_proposal_id == Some(proposal_id) {
            self.last_heartbeat = self.clock.now();
        }
    }

    /// Emits one heartbeat and schedules the next. The chain stops by itself
    /// once this node is no longer leader.
    pub fn pulse(&mut self) {
        if !self.node.is_leader() {
            return;
        }

        let proposal_id = self.node.proposal_id();
        self.receive_heartbeat(self.uid(), proposal_id);
        self.node.messenger_mut().send_heartbeat(proposal_id);
        self.scheduler.schedule(self.heartbeat_period, Timer::Pulse);
    }

    /// Runs an expired timer.
    pub fn fire(&mut self, timer: Timer) {
        match timer {
            Timer::Pulse => self.pulse(),
            Timer::PollLiveness => self.poll_liveness(),
        }
    }

    pub fn receive_prepare(&mut self, from: NodeId, proposal_id: ProposalId) {
        self.node.receive_prepare(from, proposal_id);
        if proposal_id != self.node.proposal_id() {
            self.last_prepare = self.clock.now();
        }
    }

    pub fn receive_promise(
        &mut self,
        from: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<V>,
    ) {
        let was_leader = self.node.is_leader();

        self.node
            .receive_promise(from, proposal_id, prev_accepted_id, prev_accepted_value);

        if !was_leader && self.node.is_leader() {
            let old_leader = self.leader_uid;
            let uid = self.uid();

            self.leader_uid = Some(uid);
            self.leader_proposal_id = Some(self.node.proposal_id());
            self.acquiring = false;

            self.pulse();
            self.node
                .messenger_mut()
                .on_leadership_change(old_leader, Some(uid));
        }
    }

    pub fn receive_prepare_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.node.receive_prepare_nack(from, proposal_id, promised_id);

        if self.acquiring {
            self.prepare(true);
        }
    }

    pub fn receive_accept_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.node.receive_accept_nack(from, proposal_id, promised_id);

        if proposal_id == self.node.proposal_id() {
            self.accept_nacks.insert(from);
        }

        if self.node.is_leader() && self.accept_nacks.len() >= self.node.quorum_size() {
            let uid = self.uid();
            warn!(
                "Node {}: {} acceptors rejected {}, stepping down",
                uid,
                self.accept_nacks.len(),
                proposal_id
            );
            self.node.step_down();
            self.leader_uid = None;
            self.leader_proposal_id = None;
            self.node.messenger_mut().on_leadership_lost();
            self.node.messenger_mut().on_leadership_change(Some(uid), None);
            self.node.observe_proposal(from, promised_id);
        }
    }

    pub fn receive_accept_request(&mut self, from: NodeId, proposal_id: ProposalId, value: V) {
        self.node.receive_accept_request(from, proposal_id, value);
    }

    pub fn receive_accepted(&mut self, from: NodeId, proposal_id: ProposalId, value: V) {
        self.node.receive_accepted(from, proposal_id, value);
    }

    /// Routes an inbound message to the matching handler.
    pub fn receive(&mut self, from: NodeId, message: Message<V>) {
        match message {
            Message::Prepare { proposal_id } => self.receive_prepare(from, proposal_id),
            Message::Promise {
                proposal_id,
                prev_accepted_id,
                prev_accepted_value,
            } => self.receive_promise(from, proposal_id, prev_accepted_id, prev_accepted_value),
            Message::PrepareNack {
                proposal_id,
                promised_id,
            } => self.receive_prepare_nack(from, proposal_id, promised_id),
            Message::Accept { proposal_id, value } => self.receive_accept_request(from, proposal_id, value),
            Message::AcceptNack {
                proposal_id,
                promised_id,
            } => self.receive_accept_nack(from, proposal_id, promised_id),
            Message::Accepted { proposal_id, value } => self.receive_accepted(from, proposal_id, value),
            Message::Heartbeat { leader_proposal_id } => self.receive_heartbeat(from, leader_proposal_id),
        }
    }

    pub fn set_proposal(&mut self, value: V) {
        self.node.set_proposal(value);
    }

    pub fn resend_accept(&mut self) {
        self.node.resend_accept();
    }

    pub fn set_active(&mut self, active: bool) {
        self.node.set_active(active);
    }

    pub fn persistence_required(&self) -> bool {
        self.node.persistence_required()
    }

    pub fn persisted(&mut self) {
        self.node.persisted();
    }

    pub fn persist<D: DurableStore<V>>(&mut self, store: &mut D) -> Result<(), PaxosError> {
        self.node.persist(store)
    }

    pub fn recover_from<D: DurableStore<V>>(&mut self, store: &mut D) -> Result<bool, PaxosError> {
        self.node.recover_from(store)
    }

    pub fn is_complete(&self) -> bool {
        self.node.is_complete()
    }

    pub fn final_value(&self) -> Result<&V, PaxosError> {
        self.node.final_value()
    }

    pub fn final_proposal_id(&self) -> Result<ProposalId, PaxosError> {
        self.node.final_proposal_id()
    }
}
