use serde::{Deserialize, Serialize};

use crate::proposal::ProposalId;

/// Inbound protocol events, as a transport would hand them to a node.
/// The sender is passed alongside, not inside, each message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message<V> {
    // Phase 1a
    Prepare {
        proposal_id: ProposalId,
    },
    // Phase 1b
    Promise {
        proposal_id: ProposalId,
        prev_accepted_id: Option<ProposalId>,
        prev_accepted_value: Option<V>,
    },
    PrepareNack {
        proposal_id: ProposalId,
        promised_id: ProposalId,
    },
    // Phase 2a
    Accept {
        proposal_id: ProposalId,
        value: V,
    },
    AcceptNack {
        proposal_id: ProposalId,
        promised_id: ProposalId,
    },
    // Phase 2b
    Accepted {
        proposal_id: ProposalId,
        value: V,
    },
    Heartbeat {
        leader_proposal_id: ProposalId,
    },
}

impl<V> Message<V> {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Prepare { .. } => "Prepare",
            Message::Promise { .. } => "Promise",
            Message::PrepareNack { .. } => "PrepareNack",
            Message::Accept { .. } => "Accept",
            Message::AcceptNack { .. } => "AcceptNack",
            Message::Accepted { .. } => "Accepted",
            Message::Heartbeat { .. } => "Heartbeat",
        }
    }
}
