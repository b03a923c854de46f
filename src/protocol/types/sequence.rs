use crate::protocol::packet::{BitEncodable, DecodeError};
use crate::protocol::types::{BitReader, BitWriter};

const HALF: u16 = u16::MAX / 2 + 1;

/// Defines a wrapping 16 bit counter as it travels on the wire.
///
/// Comparisons are only meaningful between values less than half the range
/// apart, which is why none of these implement `Ord`.
macro_rules! define_wrapping_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(u16);

        impl $name {
            pub const fn new(v: u16) -> Self {
                Self(v)
            }

            pub const fn value(self) -> u16 {
                self.0
            }

            // clone mutations.

            pub const fn next(self) -> Self {
                Self(self.0.wrapping_add(1))
            }

            pub const fn prev(self) -> Self {
                Self(self.0.wrapping_sub(1))
            }

            /// Forward distance from `base` to `self`, modulo 2^16.
            pub const fn distance_from(self, base: Self) -> u16 {
                self.0.wrapping_sub(base.0)
            }

            /// True if `self` lies within the half-range strictly below `reference`.
            pub const fn is_older_than(self, reference: Self) -> bool {
                let d = reference.0.wrapping_sub(self.0);
                d != 0 && d < HALF
            }

            /// Post-increment: returns the current value and advances `self`.
            pub fn take_next(&mut self) -> Self {
                let current = *self;
                *self = current.next();
                current
            }
        }

        impl From<u16> for $name {
            fn from(v: u16) -> Self {
                Self(v)
            }
        }

        impl From<$name> for u16 {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl BitEncodable for $name {
            fn encode_bits(&self, dst: &mut BitWriter) {
                self.0.encode_bits(dst);
            }

            fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
                Ok(Self(u16::decode_bits(src)?))
            }
        }
    };
}

define_wrapping_index!(
    /// Per-connection, per-direction packet number used for acks and duplicate detection.
    SequenceNumber
);

define_wrapping_index!(
    /// Per-(channel, ordered/sequenced) counter.
    OrderingIndex
);

define_wrapping_index!(
    /// Shared by all parts of one split message. Reuse after wraparound is fine.
    SplitId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_next() {
        let max = SequenceNumber::new(u16::MAX);
        assert_eq!(max.next().value(), 0);
        assert_eq!(SequenceNumber::new(0).prev().value(), u16::MAX);
    }

    #[test]
    fn older_handles_wrap() {
        let a = OrderingIndex::new(u16::MAX);
        let b = a.next();
        assert!(a.is_older_than(b));
        assert!(!b.is_older_than(a));
        assert!(!a.is_older_than(a));
    }

    #[test]
    fn older_is_bounded_by_half_range() {
        let reference = OrderingIndex::new(100);
        assert!(OrderingIndex::new(100u16.wrapping_sub(HALF - 1)).is_older_than(reference));
        assert!(!OrderingIndex::new(100u16.wrapping_sub(HALF)).is_older_than(reference));
    }

    #[test]
    fn take_next_post_increments() {
        let mut idx = SplitId::new(u16::MAX);
        assert_eq!(idx.take_next().value(), u16::MAX);
        assert_eq!(idx.value(), 0);
    }
}
