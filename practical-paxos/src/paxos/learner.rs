use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::error::PaxosError;
use crate::messenger::Messenger;
use crate::paxos::LearnerTrait;
use crate::proposal::{NodeId, ProposalId};

/// Votes gathered for one proposal.
#[derive(Debug, Clone)]
struct Tally<V> {
    /// Every acceptor that ever reported this proposal.
    accepted_by: HashSet<NodeId>,
    /// Acceptors whose latest report is still this proposal.
    retained_by: HashSet<NodeId>,
    value: V,
}

#[derive(Debug, Clone)]
struct Resolution<V> {
    proposal_id: ProposalId,
    value: V,
    acceptors: HashSet<NodeId>,
}

/// Aggregates Accepted notifications until one proposal reaches a quorum.
/// Resolution happens once and is never undone.
#[derive(Debug, Clone)]
pub struct PracticalLearner<V> {
    quorum_size: usize,
    proposals: HashMap<ProposalId, Tally<V>>,
    acceptors: HashMap<NodeId, ProposalId>,
    resolution: Option<Resolution<V>>,
}

impl<V> PracticalLearner<V> {
    pub fn new(quorum_size: usize) -> Self {
        PracticalLearner {
            quorum_size,
            proposals: HashMap::new(),
            acceptors: HashMap::new(),
            resolution: None,
        }
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    pub fn set_quorum_size(&mut self, quorum_size: usize) {
        self.quorum_size = quorum_size;
    }

    /// Acceptors that formed the resolving quorum.
    pub fn final_acceptors(&self) -> Result<&HashSet<NodeId>, PaxosError> {
        self.resolution
            .as_ref()
            .map(|r| &r.acceptors)
            .ok_or(PaxosError::NotResolved)
    }

    /// Number of proposals still being tallied.
    pub fn in_flight(&self) -> usize {
        self.proposals.len()
    }
}

impl<V: Clone + PartialEq> LearnerTrait<V> for PracticalLearner<V> {
    fn receive_accepted<M: Messenger<V>>(
        &mut self,
        messenger: &mut M,
        from: NodeId,
        proposal_id: ProposalId,
        accepted_value: V,
    ) {
        if self.resolution.is_some() {
            return;
        }

        let last = self.acceptors.get(&from).copied();
        if let Some(last) = last {
            if proposal_id <= last {
                debug!(
                    "Learner: Ignoring {} from node {} (already reported {})",
                    proposal_id, from, last
                );
                return;
            }
        }

        if let Some(tally) = self.proposals.get(&proposal_id) {
            if tally.value != accepted_value {
                warn!(
                    "Learner: Node {} reported a different value for {}, ignoring",
                    from, proposal_id
                );
                return;
            }
        }

        self.acceptors.insert(from, proposal_id);

        if let Some(last) = last {
            let now_empty = match self.proposals.get_mut(&last) {
                Some(old) => {
                    old.retained_by.remove(&from);
                    old.retained_by.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.proposals.remove(&last);
            }
        }

        let tally = self.proposals.entry(proposal_id).or_insert_with(|| Tally {
            accepted_by: HashSet::new(),
            retained_by: HashSet::new(),
            value: accepted_value,
        });
        tally.accepted_by.insert(from);
        tally.retained_by.insert(from);

        if tally.accepted_by.len() >= self.quorum_size {
            let resolution = Resolution {
                proposal_id,
                value: tally.value.clone(),
                acceptors: tally.accepted_by.clone(),
            };
            self.proposals.clear();
            self.acceptors.clear();

            info!("Learner: Resolved {} with {} acceptors", proposal_id, resolution.acceptors.len());
            messenger.on_resolution(proposal_id, &resolution.value);
            self.resolution = Some(resolution);
        }
    }

    fn is_complete(&self) -> bool {
        self.resolution.is_some()
    }

    fn final_value(&self) -> Result<&V, PaxosError> {
        self.resolution
            .as_ref()
            .map(|r| &r.value)
            .ok_or(PaxosError::NotResolved)
    }

    fn final_proposal_id(&self) -> Result<ProposalId, PaxosError> {
        self.resolution
            .as_ref()
            .map(|r| r.proposal_id)
            .ok_or(PaxosError::NotResolved)
    }
}
