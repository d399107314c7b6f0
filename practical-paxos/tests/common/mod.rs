#![allow(dead_code)]

use std::time::Duration;

use practical_paxos::{HeartbeatMessenger, Messenger, NodeId, ProposalId, Scheduler, Timer};

/// Everything a node asked its messenger to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Prepare(ProposalId),
    Promise {
        to: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<String>,
    },
    Accept(ProposalId, String),
    Accepted(ProposalId, String),
    PrepareNack {
        to: NodeId,
        proposal_id: ProposalId,
        promised_id: ProposalId,
    },
    AcceptNack {
        to: NodeId,
        proposal_id: ProposalId,
        promised_id: ProposalId,
    },
    Resolution(ProposalId, String),
    LeadershipAcquired,
    LeadershipLost,
    LeadershipChange(Option<NodeId>, Option<NodeId>),
    Heartbeat(ProposalId),
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    pub sent: Vec<Sent>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and forgets everything recorded so far.
    pub fn take(&mut self) -> Vec<Sent> {
        std::mem::take(&mut self.sent)
    }

    pub fn count(&self, pred: impl Fn(&Sent) -> bool) -> usize {
        self.sent.iter().filter(|s| pred(s)).count()
    }
}

impl Messenger<String> for RecordingMessenger {
    fn send_prepare(&mut self, proposal_id: ProposalId) {
        self.sent.push(Sent::Prepare(proposal_id));
    }

    fn send_promise(
        &mut self,
        to: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<&String>,
    ) {
        self.sent.push(Sent::Promise {
            to,
            proposal_id,
            prev_accepted_id,
            prev_accepted_value: prev_accepted_value.cloned(),
        });
    }

    fn send_accept(&mut self, proposal_id: ProposalId, value: &String) {
        self.sent.push(Sent::Accept(proposal_id, value.clone()));
    }

    fn send_accepted(&mut self, proposal_id: ProposalId, value: &String) {
        self.sent.push(Sent::Accepted(proposal_id, value.clone()));
    }

    fn send_prepare_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.sent.push(Sent::PrepareNack {
            to,
            proposal_id,
            promised_id,
        });
    }

    fn send_accept_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.sent.push(Sent::AcceptNack {
            to,
            proposal_id,
            promised_id,
        });
    }

    fn on_resolution(&mut self, proposal_id: ProposalId, value: &String) {
        self.sent.push(Sent::Resolution(proposal_id, value.clone()));
    }

    fn on_leadership_acquired(&mut self) {
        self.sent.push(Sent::LeadershipAcquired);
    }
}

impl HeartbeatMessenger<String> for RecordingMessenger {
    fn send_heartbeat(&mut self, leader_proposal_id: ProposalId) {
        self.sent.push(Sent::Heartbeat(leader_proposal_id));
    }

    fn on_leadership_lost(&mut self) {
        self.sent.push(Sent::LeadershipLost);
    }

    fn on_leadership_change(&mut self, previous_leader: Option<NodeId>, new_leader: Option<NodeId>) {
        self.sent.push(Sent::LeadershipChange(previous_leader, new_leader));
    }
}

#[derive(Debug, Default)]
pub struct RecordingScheduler {
    pub scheduled: Vec<(Duration, Timer)>,
}

impl Scheduler for RecordingScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.scheduled.push((delay, timer));
    }
}

pub fn pid(round: u64, uid: NodeId) -> ProposalId {
    ProposalId::new(round, uid)
}
