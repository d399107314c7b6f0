use std::collections::HashSet;

use crate::error::PaxosError;
use crate::messenger::Messenger;
use crate::paxos::acceptor::PracticalAcceptor;
use crate::paxos::learner::PracticalLearner;
use crate::paxos::proposer::PracticalProposer;
use crate::paxos::{AcceptorTrait, LearnerTrait, ProposerTrait};
use crate::proposal::{NodeId, ProposalId};
use crate::storage::{AcceptorSnapshot, DurableStore};

/// One participant playing all three roles: proposer, acceptor and learner.
///
/// The node owns the messenger and lends it to whichever role handles the
/// event. Inbound events must be serialized by the caller.
pub struct Node<V, M> {
    messenger: M,
    proposer: PracticalProposer<V>,
    acceptor: PracticalAcceptor<V>,
    learner: PracticalLearner<V>,
}

impl<V, M> Node<V, M>
where
    V: Clone + PartialEq,
    M: Messenger<V>,
{
    pub fn new(messenger: M, uid: NodeId, quorum_size: usize) -> Self {
        Node {
            messenger,
            proposer: PracticalProposer::new(uid, quorum_size),
            acceptor: PracticalAcceptor::new(),
            learner: PracticalLearner::new(quorum_size),
        }
    }

    pub fn uid(&self) -> NodeId {
        self.proposer.uid()
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    pub fn messenger_mut(&mut self) -> &mut M {
        &mut self.messenger
    }

    pub fn proposer(&self) -> &PracticalProposer<V> {
        &self.proposer
    }

    pub fn acceptor(&self) -> &PracticalAcceptor<V> {
        &self.acceptor
    }

    pub fn learner(&self) -> &PracticalLearner<V> {
        &self.learner
    }

    pub fn quorum_size(&self) -> usize {
        self.proposer.quorum_size()
    }

    pub fn change_quorum_size(&mut self, quorum_size: usize) {
        self.proposer.set_quorum_size(quorum_size);
        self.learner.set_quorum_size(quorum_size);
    }

    pub fn is_active(&self) -> bool {
        self.proposer.is_active()
    }

    /// Learners always observe, so only the proposer and acceptor are toggled.
    pub fn set_active(&mut self, active: bool) {
        self.proposer.set_active(active);
        self.acceptor.set_active(active);
    }

    // -- Proposer --

    pub fn set_proposal(&mut self, value: V) {
        self.proposer.set_proposal(&mut self.messenger, value);
    }

    pub fn prepare(&mut self, increment_round: bool) {
        self.proposer.prepare(&mut self.messenger, increment_round);
    }

    pub fn observe_proposal(&mut self, from: NodeId, proposal_id: ProposalId) {
        self.proposer.observe_proposal(from, proposal_id);
    }

    pub fn receive_promise(
        &mut self,
        from: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<V>,
    ) {
        self.proposer.receive_promise(
            &mut self.messenger,
            from,
            proposal_id,
            prev_accepted_id,
            prev_accepted_value,
        );
    }

    pub fn receive_prepare_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.proposer.receive_prepare_nack(from, proposal_id, promised_id);
    }

    pub fn receive_accept_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId) {
        self.proposer.receive_accept_nack(from, proposal_id, promised_id);
    }

    pub fn resend_accept(&mut self) {
        self.proposer.resend_accept(&mut self.messenger);
    }

    pub fn is_leader(&self) -> bool {
        self.proposer.is_leader()
    }

    pub fn set_leader(&mut self, leader: bool) {
        self.proposer.set_leader(leader);
    }

    pub(crate) fn step_down(&mut self) {
        self.proposer.step_down();
    }

    pub fn proposal_id(&self) -> ProposalId {
        self.proposer.proposal_id()
    }

    pub fn proposed_value(&self) -> Option<&V> {
        self.proposer.proposed_value()
    }

    // -- Acceptor --

    /// Besides answering as an acceptor, lets the local proposer see the
    /// round so its next `prepare` already outbids it.
    pub fn receive_prepare(&mut self, from: NodeId, proposal_id: ProposalId) {
        self.proposer.observe_proposal(from, proposal_id);
        self.acceptor.receive_prepare(&mut self.messenger, from, proposal_id);
    }

    pub fn receive_accept_request(&mut self, from: NodeId, proposal_id: ProposalId, value: V) {
        self.acceptor
            .receive_accept_request(&mut self.messenger, from, proposal_id, value);
    }

    pub fn persistence_required(&self) -> bool {
        self.acceptor.persistence_required()
    }

    pub fn persisted(&mut self) {
        self.acceptor.persisted(&mut self.messenger);
    }

    pub fn recover(
        &mut self,
        promised_id: Option<ProposalId>,
        accepted_id: Option<ProposalId>,
        accepted_value: Option<V>,
    ) {
        self.acceptor.recover(promised_id, accepted_id, accepted_value);
    }

    pub fn snapshot(&self) -> AcceptorSnapshot<V> {
        AcceptorSnapshot {
            promised_id: self.acceptor.promised_id(),
            accepted_id: self.acceptor.accepted_id(),
            accepted_value: self.acceptor.accepted_value().cloned(),
        }
    }

    /// Writes pending acceptor state to `store` and then releases the held
    /// replies. Does nothing when no write is pending.
    pub fn persist<S: DurableStore<V>>(&mut self, store: &mut S) -> Result<(), PaxosError> {
        if !self.acceptor.persistence_required() {
            return Ok(());
        }
        store.save(&self.snapshot())?;
        self.acceptor.persisted(&mut self.messenger);
        Ok(())
    }

    /// Restores acceptor state from `store`. Returns whether anything was found.
    pub fn recover_from<S: DurableStore<V>>(&mut self, store: &mut S) -> Result<bool, PaxosError> {
        match store.load()? {
            Some(snapshot) => {
                // Rounds this node may have used before the crash must not be reused.
                let uid = self.uid();
                for id in [snapshot.promised_id, snapshot.accepted_id].into_iter().flatten() {
                    self.proposer.observe_proposal(uid, id);
                }
                self.acceptor
                    .recover(snapshot.promised_id, snapshot.accepted_id, snapshot.accepted_value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -- Learner --

    pub fn receive_accepted(&mut self, from: NodeId, proposal_id: ProposalId, accepted_value: V) {
        self.learner
            .receive_accepted(&mut self.messenger, from, proposal_id, accepted_value);
    }

    pub fn is_complete(&self) -> bool {
        self.learner.is_complete()
    }

    pub fn final_value(&self) -> Result<&V, PaxosError> {
        self.learner.final_value()
    }

    pub fn final_proposal_id(&self) -> Result<ProposalId, PaxosError> {
        self.learner.final_proposal_id()
    }

    pub fn final_acceptors(&self) -> Result<&HashSet<NodeId>, PaxosError> {
        self.learner.final_acceptors()
    }
}
