mod error;

pub use error::DecodeError;

use crate::protocol::types::{BitReader, BitWriter};

/// Trait for types that know how to write/read themselves to and from the
/// bit-packed frame format.
///
/// Implementations do not align; byte alignment is explicit and only
/// happens in front of payload bytes.
pub trait BitEncodable: Sized {
    /// Append this value to the frame being written.
    fn encode_bits(&self, dst: &mut BitWriter);

    /// Decode a value of this type from the current reader position.
    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError>;
}
