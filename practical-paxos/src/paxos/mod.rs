pub mod acceptor;
pub mod learner;
pub mod proposer;

use crate::error::PaxosError;
use crate::messenger::Messenger;
use crate::proposal::{NodeId, ProposalId};

pub trait AcceptorTrait<V> {
    /// Phase 1b. A newly promised id is not acknowledged until [`persisted`](Self::persisted).
    fn receive_prepare<M: Messenger<V>>(&mut self, messenger: &mut M, from: NodeId, proposal_id: ProposalId);
    /// Phase 2b. A newly accepted value is not acknowledged until [`persisted`](Self::persisted).
    fn receive_accept_request<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        value: V,
    );
    /// True while a promise or an acceptance waits to be written to stable media.
    fn persistence_required(&self) -> bool;
    /// Releases the replies held back until the state became durable.
    fn persisted<M: Messenger<V>>(&mut self, messenger: &mut M);
    /// Restores durable state after a restart.
    fn recover(&mut self, promised_id: Option<ProposalId>, accepted_id: Option<ProposalId>, accepted_value: Option<V>);
}

pub trait ProposerTrait<V> {
    /// Sets the value to propose, once. Sends an Accept right away if this
    /// proposer already holds leadership.
    fn set_proposal<M: Messenger<V>>(&mut self, messenger: &mut M, value: V);
    /// Phase 1a. Without `increment_round` the in-flight Prepare is retransmitted.
    fn prepare<M: Messenger<V>>(&mut self, messenger: &mut M, increment_round: bool);
    /// Raises the next round above any proposal seen on the network.
    fn observe_proposal(&mut self, from: NodeId, proposal_id: ProposalId);
    fn receive_prepare_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId);
    fn receive_accept_nack(&mut self, from: NodeId, proposal_id: ProposalId, promised_id: ProposalId);
    fn resend_accept<M: Messenger<V>>(&mut self, messenger: &mut M);
    fn receive_promise<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<V>,
    );
}

pub trait LearnerTrait<V> {
    fn receive_accepted<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        accepted_value: V,
    );
    fn is_complete(&self) -> bool;
    fn final_value(&self) -> Result<&V, PaxosError>;
    fn final_proposal_id(&self) -> Result<ProposalId, PaxosError>;
}
