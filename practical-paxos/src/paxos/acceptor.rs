use log::{debug, warn};

use crate::messenger::Messenger;
use crate::paxos::AcceptorTrait;
use crate::proposal::{NodeId, ProposalId};

/// Paxos acceptor with write-ahead acknowledgement.
///
/// Acceptors are the fault-tolerant memory of the protocol, so a promise or an
/// acceptance must reach stable media before anyone hears about it. After
/// `receive_prepare`/`receive_accept_request` the caller checks
/// [`persistence_required`](AcceptorTrait::persistence_required), writes
/// `promised_id`, `accepted_id` and `accepted_value` out, then calls
/// [`persisted`](AcceptorTrait::persisted) to flush the held replies. Only the
/// first request of each kind is tracked while a write is outstanding; later
/// ones are dropped, which Paxos tolerates like any lost message.
///
/// A passive acceptor (`active == false`) tracks state but sends nothing.
#[derive(Debug, Clone)]
pub struct PracticalAcceptor<V> {
    promised_id: Option<ProposalId>,
    accepted_id: Option<ProposalId>,
    accepted_value: Option<V>,
    pending_promise: Option<NodeId>,
    pending_accepted: Option<NodeId>,
    active: bool,
}

impl<V> PracticalAcceptor<V> {
    pub fn new() -> Self {
        PracticalAcceptor {
            promised_id: None,
            accepted_id: None,
            accepted_value: None,
            pending_promise: None,
            pending_accepted: None,
            active: true,
        }
    }

    pub fn promised_id(&self) -> Option<ProposalId> {
        self.promised_id
    }

    pub fn accepted_id(&self) -> Option<ProposalId> {
        self.accepted_id
    }

    pub fn accepted_value(&self) -> Option<&V> {
        self.accepted_value.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }
}

impl<V> Default for PracticalAcceptor<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + PartialEq> AcceptorTrait<V> for PracticalAcceptor<V> {
    fn receive_prepare<M: Messenger<V>>(&mut self, messenger: &mut M, from: NodeId, proposal_id: ProposalId) {
        match self.promised_id {
            Some(promised) if proposal_id == promised => {
                // Retransmitted prepare. Nothing changes, but the answer may
                // carry state that is not durable yet.
                if self.persistence_required() {
                    debug!("Acceptor: Holding duplicate promise for {} until persisted", proposal_id);
                } else if self.active {
                    messenger.send_promise(from, proposal_id, self.accepted_id, self.accepted_value.as_ref());
                }
            }
            Some(promised) if proposal_id < promised => {
                warn!(
                    "Acceptor: Rejected prepare {} from node {} (already promised {})",
                    proposal_id, from, promised
                );
                if self.persistence_required() {
                    debug!("Acceptor: Holding back prepare NACK for {} until persisted", proposal_id);
                } else if self.active {
                    messenger.send_prepare_nack(from, proposal_id, promised);
                }
            }
            _ => {
                if self.pending_promise.is_none() {
                    self.promised_id = Some(proposal_id);
                    debug!("Acceptor: Promised {} to node {}", proposal_id, from);
                    if self.active {
                        self.pending_promise = Some(from);
                    }
                } else {
                    debug!(
                        "Acceptor: Dropped prepare {} from node {} while a promise is pending",
                        proposal_id, from
                    );
                }
            }
        }
    }

    fn receive_accept_request<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        value: V,
    ) {
        if self.accepted_id == Some(proposal_id) && self.accepted_value.as_ref() == Some(&value) {
            if self.persistence_required() {
                debug!("Acceptor: Holding duplicate accepted for {} until persisted", proposal_id);
            } else if self.active {
                messenger.send_accepted(proposal_id, &value);
            }
            return;
        }

        match self.promised_id {
            Some(promised) if proposal_id < promised => {
                warn!(
                    "Acceptor: Rejected accept {} from node {} (already promised {})",
                    proposal_id, from, promised
                );
                if self.persistence_required() {
                    debug!("Acceptor: Holding back accept NACK for {} until persisted", proposal_id);
                } else if self.active {
                    messenger.send_accept_nack(from, proposal_id, promised);
                }
            }
            _ => {
                if self.pending_accepted.is_none() {
                    self.promised_id = Some(proposal_id);
                    self.accepted_id = Some(proposal_id);
                    self.accepted_value = Some(value);
                    debug!("Acceptor: Accepted {} from node {}", proposal_id, from);
                    if self.active {
                        self.pending_accepted = Some(from);
                    }
                } else {
                    debug!(
                        "Acceptor: Dropped accept {} from node {} while an acceptance is pending",
                        proposal_id, from
                    );
                }
            }
        }
    }

    fn persistence_required(&self) -> bool {
        self.pending_promise.is_some() || self.pending_accepted.is_some()
    }

    fn persisted<M: Messenger<V>>(&mut self, messenger: &mut M) {
        let pending_promise = self.pending_promise.take();
        let pending_accepted = self.pending_accepted.take();

        if !self.active {
            return;
        }

        if let (Some(to), Some(promised)) = (pending_promise, self.promised_id) {
            messenger.send_promise(to, promised, self.accepted_id, self.accepted_value.as_ref());
        }

        if pending_accepted.is_some() {
            if let (Some(accepted_id), Some(value)) = (self.accepted_id, self.accepted_value.as_ref()) {
                messenger.send_accepted(accepted_id, value);
            }
        }
    }

    fn recover(&mut self, promised_id: Option<ProposalId>, accepted_id: Option<ProposalId>, accepted_value: Option<V>) {
        debug!(
            "Acceptor: Recovered promised {:?}, accepted {:?}",
            promised_id, accepted_id
        );
        self.promised_id = promised_id;
        self.accepted_id = accepted_id;
        self.accepted_value = accepted_value;
        self.pending_promise = None;
        self.pending_accepted = None;
    }
}
