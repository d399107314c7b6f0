use std::time::Duration;

use crate::proposal::{NodeId, ProposalId};

/// Outbound side of the protocol. The roles never touch the network
/// themselves; every message they want sent goes through here.
pub trait Messenger<V> {
    /// Broadcasts a Prepare to all acceptors.
    fn send_prepare(&mut self, proposal_id: ProposalId);

    /// Sends a Promise to the proposer that asked for it.
    fn send_promise(
        &mut self,
        to: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<&V>,
    );

    /// Broadcasts an Accept request to all acceptors.
    fn send_accept(&mut self, proposal_id: ProposalId, value: &V);

    /// Broadcasts an Accepted notification to all learners.
    fn send_accepted(&mut self, proposal_id: ProposalId, value: &V);

    fn send_prepare_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId);

    fn send_accept_nack(&mut self, to: NodeId, proposal_id: ProposalId, promised_id: ProposalId);

    /// Called exactly once, when a learner sees a quorum for one proposal.
    fn on_resolution(&mut self, proposal_id: ProposalId, value: &V);

    /// Called when a proposer gathers a quorum of promises. Leadership is a
    /// belief, not a guarantee: another proposer may already hold a higher round.
    fn on_leadership_acquired(&mut self) {}
}

/// Extra hooks needed once leaders are elected through heartbeats.
pub trait HeartbeatMessenger<V>: Messenger<V> {
    /// Broadcasts a heartbeat on behalf of the current leader.
    fn send_heartbeat(&mut self, leader_proposal_id: ProposalId);

    fn on_leadership_lost(&mut self) {}

    fn on_leadership_change(&mut self, _previous_leader: Option<NodeId>, _new_leader: Option<NodeId>) {}
}

/// Deferred work a node asks its driver to run later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Emit the next leader heartbeat.
    Pulse,
    /// Check whether the believed leader is still alive.
    PollLiveness,
}

/// Fires a [`Timer`] once after `delay`. The driver hands the timer back to
/// the node (see `HeartbeatNode::fire`) when it expires.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer);
}
