use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a participant. Used both as the proposer tie-breaker inside a
/// [`ProposalId`] and as the address of acceptors and learners.
pub type NodeId = u64;

/// A totally ordered proposal number.
///
/// Ordering compares `round` first and falls back to `uid`, so two distinct
/// proposers can never generate equal ids. The derived `Ord` relies on the
/// field declaration order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    /// Round number
    pub round: u64,
    /// Proposer that owns this id
    pub uid: NodeId,
}

impl ProposalId {
    pub fn new(round: u64, uid: NodeId) -> Self {
        ProposalId { round, uid }
    }

    /// Advances the round in place. Only the owning proposer calls this.
    pub fn increment_round(&mut self) {
        self.round += 1;
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.round, self.uid)
    }
}
