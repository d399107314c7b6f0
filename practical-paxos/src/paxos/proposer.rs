use std::collections::HashSet;

use log::{debug, info};

use crate::messenger::Messenger;
use crate::paxos::ProposerTrait;
use crate::proposal::{NodeId, ProposalId};

/// Paxos proposer that tracks whether it believes itself to be the leader.
///
/// Several proposers may hold that belief at the same time; it only means a
/// quorum promised this proposer's current round at some point. A passive
/// proposer (`active == false`) processes everything but sends nothing.
#[derive(Debug, Clone)]
pub struct PracticalProposer<V> {
    uid: NodeId,
    quorum_size: usize,
    proposal_id: ProposalId,
    next_round: u64,
    proposed_value: Option<V>,
    last_accepted_id: Option<ProposalId>,
    promises_received: HashSet<NodeId>,
    leader: bool,
    active: bool,
}

impl<V> PracticalProposer<V> {
    pub fn new(uid: NodeId, quorum_size: usize) -> Self {
        PracticalProposer {
            uid,
            quorum_size,
            proposal_id: ProposalId::new(0, uid),
            next_round: 1,
            proposed_value: None,
            last_accepted_id: None,
            promises_received: HashSet::new(),
            leader: false,
            active: true,
        }
    }

    pub fn uid(&self) -> NodeId {
        self.uid
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    pub fn set_quorum_size(&mut self, quorum_size: usize) {
        self.quorum_size = quorum_size;
    }

    pub fn proposal_id(&self) -> ProposalId {
        self.proposal_id
    }

    /// Round the next incrementing `prepare` will use.
    pub fn next_round(&self) -> u64 {
        self.next_round
    }

    pub fn proposed_value(&self) -> Option<&V> {
        self.proposed_value.as_ref()
    }

    pub fn last_accepted_id(&self) -> Option<ProposalId> {
        self.last_accepted_id
    }

    pub fn num_promises(&self) -> usize {
        self.promises_received.len()
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn set_leader(&mut self, leader: bool) {
        self.leader = leader;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Drops leadership together with the promises that granted it.
    pub(crate) fn step_down(&mut self) {
        self.leader = false;
        self.promises_received.clear();
    }
}

impl<V: Clone> ProposerTrait<V> for PracticalProposer<V> {
    fn set_proposal<M: Messenger<V>>(&mut self, messenger: &mut M, value: V) {
        if self.proposed_value.is_some() {
            return;
        }

        if self.leader && self.active {
            messenger.send_accept(self.proposal_id, &value);
        }
        self.proposed_value = Some(value);
    }

    fn prepare<M: Messenger<V>>(&mut self, messenger: &mut M, increment_round: bool) {
        if increment_round {
            self.leader = false;
            self.promises_received.clear();
            self.proposal_id.round = self.next_round;
            self.next_round += 1;
            debug!("Proposer {}: Starting round {}", self.uid, self.proposal_id);
        }

        if self.active {
            messenger.send_prepare(self.proposal_id);
        }
    }

    fn observe_proposal(&mut self, _from: NodeId, proposal_id: ProposalId) {
        if proposal_id >= ProposalId::new(self.next_round, self.uid) {
            self.next_round = proposal_id.round + 1;
            debug!(
                "Proposer {}: Observed {}, next round is {}",
                self.uid, proposal_id, self.next_round
            );
        }
    }

    fn receive_prepare_nack(&mut self, from: NodeId, _proposal_id: ProposalId, promised_id: ProposalId) {
        self.observe_proposal(from, promised_id);
    }

    fn receive_accept_nack(&mut self, _from: NodeId, _proposal_id: ProposalId, _promised_id: ProposalId) {}

    fn resend_accept<M: Messenger<V>>(&mut self, messenger: &mut M) {
        if !(self.leader && self.active) {
            return;
        }
        if let Some(value) = self.proposed_value.as_ref() {
            messenger.send_accept(self.proposal_id, value);
        }
    }

    fn receive_promise<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<V>,
    ) {
        self.observe_proposal(from, proposal_id);

        if self.leader || proposal_id != self.proposal_id || self.promises_received.contains(&from) {
            return;
        }

        self.promises_received.insert(from);

        if prev_accepted_id > self.last_accepted_id {
            self.last_accepted_id = prev_accepted_id;
            // A value accepted under an earlier round must be carried forward,
            // whatever the client asked for.
            if let Some(value) = prev_accepted_value {
                self.proposed_value = Some(value);
            }
        }

        if self.promises_received.len() >= self.quorum_size {
            self.leader = true;
            info!("Proposer {}: Acquired leadership with {}", self.uid, self.proposal_id);
            messenger.on_leadership_acquired();

            if self.active {
                if let Some(value) = self.proposed_value.as_ref() {
                    messenger.send_accept(self.proposal_id, value);
                }
            }
        }
    }
}
