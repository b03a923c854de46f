//! Wire-level value types: the bit cursor pair and wrapping counters.

mod bits;
mod sequence;

pub use bits::{BitReader, BitWriter, bits_to_bytes, compressed_bit_len};
pub use sequence::{OrderingIndex, SequenceNumber, SplitId};
