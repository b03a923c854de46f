use crate::protocol::{
    constants::{ACK_BIT_LENGTH, MAXIMUM_MTU_SIZE, ORDERING_CHANNEL_BITS, RELIABILITY_BITS},
    packet::{BitEncodable, DecodeError},
    reliability::{Priority, Reliability},
    types::{
        BitReader, BitWriter, OrderingIndex, SequenceNumber, SplitId, bits_to_bytes,
        compressed_bit_len,
    },
};
use bytes::Bytes;

/// Width in bytes of the compressed split index/count fields.
const SPLIT_FIELD_WIDTH: usize = 4;
/// Width in bytes of the compressed payload bit length.
const LENGTH_FIELD_WIDTH: usize = 2;

/// Fragment metadata for one part of a split message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitInfo {
    pub id: SplitId,
    pub index: u32,
    pub count: u32,
}

/// Channel and per-channel index of a sequenced or ordered packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ordering {
    pub channel: u8,
    pub index: OrderingIndex,
}

/// One logical message (or one part of it) in flight.
///
/// Scheduling timestamps live with the queue holding the packet (resend
/// entries, reassembly sets), not on the packet itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPacket {
    pub sequence_number: SequenceNumber,
    pub reliability: Reliability,
    /// Present exactly when `reliability.uses_channel()`.
    pub ordering: Option<Ordering>,
    pub split: Option<SplitInfo>,
    /// Local send ordering only; never transmitted.
    pub priority: Priority,
    /// Payload length in bits; the last byte of `payload` may be partially used.
    pub bit_length: u32,
    pub payload: Bytes,
}

impl InternalPacket {
    /// Payload length in bytes (derived from bit_length).
    pub fn payload_len(&self) -> usize {
        bits_to_bytes(self.bit_length as usize)
    }

    /// Exact number of header bits this packet encodes to, excluding the pad
    /// in front of the payload.
    pub fn header_bit_len(&self) -> usize {
        let mut bits = ACK_BIT_LENGTH + RELIABILITY_BITS + 1;
        if self.reliability.uses_channel() {
            bits += ORDERING_CHANNEL_BITS + 16;
        }
        if let Some(split) = &self.split {
            bits += 16
                + compressed_bit_len(split.index, SPLIT_FIELD_WIDTH)
                + compressed_bit_len(split.count, SPLIT_FIELD_WIDTH);
        }
        bits + compressed_bit_len(self.bit_length, LENGTH_FIELD_WIDTH)
    }

    /// Bits this packet occupies when written at bit offset `offset` of a frame,
    /// including the alignment pad.
    pub fn encoded_bit_len_at(&self, offset: usize) -> usize {
        let header_end = offset + self.header_bit_len();
        let aligned = bits_to_bytes(header_end) * 8;
        aligned - offset + self.payload_len() * 8
    }

    /// Upper bound on the header size of any packet with this reliability,
    /// alignment pad included. Used to size split parts so one always fits an
    /// empty frame.
    pub fn max_header_bytes(reliability: Reliability, split: bool) -> usize {
        let mut bits = ACK_BIT_LENGTH + RELIABILITY_BITS + 1;
        if reliability.uses_channel() {
            bits += ORDERING_CHANNEL_BITS + 16;
        }
        if split {
            bits += 16 + 2 * compressed_bit_len(u32::MAX, SPLIT_FIELD_WIDTH);
        }
        bits += compressed_bit_len(u16::MAX as u32, LENGTH_FIELD_WIDTH);
        bits_to_bytes(bits + 7)
    }

    /// Writes this packet as a data entry of a frame.
    pub fn encode_entry(&self, dst: &mut BitWriter) {
        // 1) sequence number + ack flag
        self.sequence_number.encode_bits(dst);
        false.encode_bits(dst);

        // 2) reliability and channel metadata
        self.reliability.encode_bits(dst);
        if self.reliability.uses_channel() {
            debug_assert!(self.ordering.is_some());
            let ordering = self.ordering.unwrap_or_default();
            dst.write_bits(ordering.channel as u32, ORDERING_CHANNEL_BITS);
            ordering.index.encode_bits(dst);
        }

        // 3) split metadata
        self.split.is_some().encode_bits(dst);
        if let Some(split) = &self.split {
            split.id.encode_bits(dst);
            dst.write_compressed(split.index, SPLIT_FIELD_WIDTH);
            dst.write_compressed(split.count, SPLIT_FIELD_WIDTH);
        }

        // 4) payload
        debug_assert!(self.bit_length > 0 && self.payload_len() < MAXIMUM_MTU_SIZE);
        dst.write_compressed(self.bit_length, LENGTH_FIELD_WIDTH);
        dst.write_aligned_bytes(&self.payload[..self.payload_len()]);
    }
}

/// One record inside a frame: either an acknowledgement or a data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEntry {
    Ack(SequenceNumber),
    Data(InternalPacket),
}

impl FrameEntry {
    pub fn sequence_number(&self) -> SequenceNumber {
        match self {
            FrameEntry::Ack(seq) => *seq,
            FrameEntry::Data(pkt) => pkt.sequence_number,
        }
    }

    pub fn encoded_bit_len_at(&self, offset: usize) -> usize {
        match self {
            FrameEntry::Ack(_) => ACK_BIT_LENGTH,
            FrameEntry::Data(pkt) => pkt.encoded_bit_len_at(offset),
        }
    }
}

impl BitEncodable for FrameEntry {
    fn encode_bits(&self, dst: &mut BitWriter) {
        match self {
            FrameEntry::Ack(seq) => {
                seq.encode_bits(dst);
                true.encode_bits(dst);
            }
            FrameEntry::Data(pkt) => pkt.encode_entry(dst),
        }
    }

    fn decode_bits(src: &mut BitReader) -> Result<Self, DecodeError> {
        let sequence_number = SequenceNumber::decode_bits(src)?;
        if bool::decode_bits(src)? {
            return Ok(FrameEntry::Ack(sequence_number));
        }

        let reliability = Reliability::decode_bits(src)?;
        let ordering = if reliability.uses_channel() {
            let channel = src.read_bits(ORDERING_CHANNEL_BITS)? as u8;
            let index = OrderingIndex::decode_bits(src)?;
            Some(Ordering { channel, index })
        } else {
            None
        };

        let split = if bool::decode_bits(src)? {
            let id = SplitId::decode_bits(src)?;
            let index = src.read_compressed(SPLIT_FIELD_WIDTH)?;
            let count = src.read_compressed(SPLIT_FIELD_WIDTH)?;
            if count == 0 || index >= count {
                return Err(DecodeError::InvalidSplit { index, count });
            }
            Some(SplitInfo { id, index, count })
        } else {
            None
        };

        let bit_length = src.read_compressed(LENGTH_FIELD_WIDTH)?;
        let payload_len = bits_to_bytes(bit_length as usize);
        if bit_length == 0 || payload_len >= MAXIMUM_MTU_SIZE {
            return Err(DecodeError::InvalidPayloadLength(bit_length));
        }
        let payload = src.read_aligned_bytes(payload_len)?;

        Ok(FrameEntry::Data(InternalPacket {
            sequence_number,
            reliability,
            ordering,
            split,
            priority: Priority::default(),
            bit_length,
            payload,
        }))
    }
}
