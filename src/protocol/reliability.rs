use bitflags::bitflags;

use crate::protocol::{
    constants::RELIABILITY_BITS,
    packet::{BitEncodable, DecodeError},
    types::{BitReader, BitWriter},
};

bitflags! {
    /// Delivery guarantees implied by a [`Reliability`] mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct DeliveryFlags: u8 {
        /// Kept for retransmission until acknowledged.
        const RELIABLE  = 0b001;
        /// Delivered strictly in send order per channel, waiting for gaps.
        const ORDERED   = 0b010;
        /// Newest wins per channel; older arrivals are dropped.
        const SEQUENCED = 0b100;

        const CHANNELED = Self::ORDERED.bits() | Self::SEQUENCED.bits();
    }
}

/// Delivery contract for one message. Written with 3 bits on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reliability {
    /// Plain datagram semantics, minus duplicates.
    Unreliable = 0,
    /// Not retransmitted; arrivals older than the newest seen are dropped.
    UnreliableSequenced = 1,
    /// Retransmitted until acknowledged, delivered in arrival order.
    Reliable = 2,
    /// Retransmitted until acknowledged, delivered in send order.
    ReliableOrdered = 3,
    /// Retransmitted until acknowledged or superseded by a newer message.
    ReliableSequenced = 4,
}

impl Reliability {
    pub fn flags(self) -> DeliveryFlags {
        match self {
            Reliability::Unreliable => DeliveryFlags::empty(),
            Reliability::UnreliableSequenced => DeliveryFlags::SEQUENCED,
            Reliability::Reliable => DeliveryFlags::RELIABLE,
            Reliability::ReliableOrdered => DeliveryFlags::RELIABLE | DeliveryFlags::ORDERED,
            Reliability::ReliableSequenced => DeliveryFlags::RELIABLE | DeliveryFlags::SEQUENCED,
        }
    }

    pub fn is_reliable(self) -> bool {
        self.flags().contains(DeliveryFlags::RELIABLE)
    }

    pub fn is_ordered(self) -> bool {
        self.flags().contains(DeliveryFlags::ORDERED)
    }

    pub fn is_sequenced(self) -> bool {
        self.flags().contains(DeliveryFlags::SEQUENCED)
    }

    /// Whether an ordering channel and index travel with the packet.
    pub fn uses_channel(self) -> bool {
        self.flags().intersects(DeliveryFlags::CHANNELED)
    }

    /// The reliable counterpart of this mode. Split parts always travel reliably,
    /// since losing one part would silently lose the whole message.
    pub fn as_reliable(self) -> Reliability {
        match self {
            Reliability::Unreliable => Reliability::Reliable,
            Reliability::UnreliableSequenced => Reliability::ReliableSequenced,
            other => other,
        }
    }
}

impl TryFrom<u8> for Reliability {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Reliability::Unreliable,
            1 => Reliability::UnreliableSequenced,
            2 => Reliability::Reliable,
            3 => Reliability::ReliableOrdered,
            4 => Reliability::ReliableSequenced,
            other => return Err(DecodeError::UnknownReliability(other)),
        })
    }
}

impl BitEncodable for Reliability {
    fn encode_bits(&self, dst: &mut BitWriter) {
        dst.write_bits(*self as u32, RELIABILITY_BITS);
    }

    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
        Reliability::try_from(src.read_bits(RELIABILITY_BITS)? as u8)
    }
}

/// Send ordering between queued messages; has no effect on reliability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    /// Reserved for the transport's own traffic.
    System = 0,
    High = 1,
    #[default]
    Medium = 2,
    /// Drained after every other queue.
    Low = 3,
}

impl Priority {
    pub const COUNT: usize = 4;
    pub const ALL: [Priority; Priority::COUNT] =
        [Priority::System, Priority::High, Priority::Medium, Priority::Low];

    pub fn index(self) -> usize {
        self as usize
    }
}
