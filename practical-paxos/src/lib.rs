//! Practical single-decree Paxos.
//!
//! The three roles live in [`paxos`], [`node::Node`] bundles them, and
//! [`heartbeat::HeartbeatNode`] adds leader election on top. Nothing here
//! does I/O by itself: messages leave through a [`messenger::Messenger`],
//! time comes from a [`clock::Clock`], and acceptor state is written through
//! a [`storage::DurableStore`].

pub mod clock;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod messenger;
pub mod network;
pub mod node;
pub mod paxos;
pub mod proposal;
pub mod storage;

pub use error::{PaxosError, StorageError};
pub use heartbeat::HeartbeatNode;
pub use message::Message;
pub use messenger::{HeartbeatMessenger, Messenger, Scheduler, Timer};
pub use node::Node;
pub use proposal::{NodeId, ProposalId};
