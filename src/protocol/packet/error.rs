use thiserror::Error;

/// Errors that may occur while decoding frame entries.
///
/// Running out of bits at an entry boundary is not an error; the frame reader
/// treats it as the end of the datagram. Everything here means the datagram
/// was truncated or malformed mid-entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer did not contain enough bits to decode the requested value.
    #[error("Unexpected EoF, not enough bits to read requested type.")]
    UnexpectedEof,

    #[error("An unknown reliability value was provided. Reliability bits: {0}")]
    UnknownReliability(u8),

    /// Zero length payloads and payloads larger than the biggest MTU are rejected.
    #[error("Invalid payload length of {0} bits.")]
    InvalidPayloadLength(u32),

    /// Split metadata that can never describe a valid message.
    #[error("Invalid split metadata: part {index} of {count}.")]
    InvalidSplit { index: u32, count: u32 },
}
