use thiserror::Error;

/// Reasons a local send is refused by a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Refusing to send an empty payload.")]
    EmptyPayload,

    #[error("Ordering channel {0} is out of range.")]
    InvalidChannel(u8),

    #[error("The connection is dead.")]
    DeadConnection,

    /// The payload would need more parts than the session allows.
    #[error("Payload would be split into {0} parts.")]
    TooManySplits(usize),
}
