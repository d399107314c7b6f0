use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaxosError {
    /// The learner has not seen a quorum yet.
    #[error("no value has been resolved yet")]
    NotResolved,

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode state: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode state: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("no valid copy of the durable state survived")]
    Unrecoverable,
}
