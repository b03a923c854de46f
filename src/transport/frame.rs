use bytes::Bytes;

use crate::{
    protocol::{
        constants::ACK_BIT_LENGTH,
        packet::{BitEncodable, DecodeError},
        types::{BitReader, BitWriter, SequenceNumber},
    },
    transport::internal_packet::{FrameEntry, InternalPacket},
};

/// A frame ends once fewer than this many bits are left unread; no entry can
/// be shorter than its sequence number.
const MINIMUM_ENTRY_BITS: usize = 16;

/// Packs entries into one outgoing datagram without exceeding its bit budget.
#[derive(Debug)]
pub struct FrameWriter {
    writer: BitWriter,
    max_bits: usize,
    entries: usize,
}

impl FrameWriter {
    /// `max_bytes` is the usable payload size of one datagram.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            writer: BitWriter::with_capacity(max_bytes),
            max_bits: max_bytes * 8,
            entries: 0,
        }
    }

    pub fn bit_len(&self) -> usize {
        self.writer.bit_len()
    }

    pub fn remaining_bits(&self) -> usize {
        self.max_bits - self.writer.bit_len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn fits_packet(&self, pkt: &InternalPacket) -> bool {
        pkt.encoded_bit_len_at(self.writer.bit_len()) <= self.remaining_bits()
    }

    /// Appends `entry` if it fits. Returns false and leaves the frame untouched
    /// otherwise.
    pub fn push(&mut self, entry: &FrameEntry) -> bool {
        match entry {
            FrameEntry::Ack(seq) => self.push_ack(*seq),
            FrameEntry::Data(pkt) => self.push_packet(pkt),
        }
    }

    pub fn push_ack(&mut self, seq: SequenceNumber) -> bool {
        if ACK_BIT_LENGTH > self.remaining_bits() {
            return false;
        }
        FrameEntry::Ack(seq).encode_bits(&mut self.writer);
        self.entries += 1;
        true
    }

    pub fn push_packet(&mut self, pkt: &InternalPacket) -> bool {
        if !self.fits_packet(pkt) {
            return false;
        }
        pkt.encode_entry(&mut self.writer);
        self.entries += 1;
        true
    }

    /// Hands out the encoded frame and resets the writer for the next one.
    pub fn finish(&mut self) -> Bytes {
        self.entries = 0;
        self.writer.take()
    }
}

/// Iterates the entries of a received datagram.
///
/// Yields `Err` at most once; a malformed entry poisons the rest of the frame
/// since entry boundaries can no longer be found.
#[derive(Debug)]
pub struct FrameReader {
    reader: BitReader,
    failed: bool,
}

impl FrameReader {
    pub fn new(data: Bytes) -> Self {
        Self {
            reader: BitReader::new(data),
            failed: false,
        }
    }
}

impl Iterator for FrameReader {
    type Item = Result<FrameEntry, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.remaining_bits() < MINIMUM_ENTRY_BITS {
            return None;
        }
        let entry = FrameEntry::decode_bits(&mut self.reader);
        self.failed = entry.is_err();
        Some(entry)
    }
}

/// Decodes a whole datagram, failing on the first malformed entry.
pub fn decode_frame(data: Bytes) -> Result<Vec<FrameEntry>, DecodeError> {
    FrameReader::new(data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reliability::{Priority, Reliability};

    fn data(seq: u16, payload: &'static [u8]) -> FrameEntry {
        FrameEntry::Data(InternalPacket {
            sequence_number: SequenceNumber::new(seq),
            reliability: Reliability::Reliable,
            ordering: None,
            split: None,
            priority: Priority::Medium,
            bit_length: payload.len() as u32 * 8,
            payload: Bytes::from_static(payload),
        })
    }

    #[test]
    fn entries_round_trip_through_one_frame() {
        let mut frame = FrameWriter::new(64);
        let entries = vec![
            FrameEntry::Ack(SequenceNumber::new(4)),
            data(9, b"first"),
            FrameEntry::Ack(SequenceNumber::new(5)),
            data(10, b"second"),
        ];
        for entry in &entries {
            assert!(frame.push(entry));
        }
        assert_eq!(frame.entries(), 4);
        let decoded = decode_frame(frame.finish()).unwrap();
        let seqs: Vec<u16> = decoded.iter().map(|e| e.sequence_number().value()).collect();
        assert_eq!(seqs, vec![4, 9, 5, 10]);
        assert_eq!(decoded, entries);
        assert!(frame.is_empty());
    }

    #[test]
    fn trailing_pad_is_not_an_entry() {
        let mut frame = FrameWriter::new(8);
        frame.push(&FrameEntry::Ack(SequenceNumber::new(1)));
        let bytes = frame.finish();
        // 17 bits rounded up to 3 bytes leaves a 7 bit pad
        assert_eq!(bytes.len(), 3);
        assert_eq!(FrameReader::new(bytes).count(), 1);
    }

    #[test]
    fn full_frame_rejects_entry() {
        let mut frame = FrameWriter::new(4);
        assert!(frame.push(&FrameEntry::Ack(SequenceNumber::new(1))));
        assert!(!frame.push(&FrameEntry::Ack(SequenceNumber::new(2))));
        assert!(!frame.push(&data(3, b"x")));
        assert_eq!(frame.entries(), 1);
    }

    #[test]
    fn truncated_entry_is_underflow() {
        let mut frame = FrameWriter::new(64);
        frame.push(&data(1, b"payload"));
        let bytes = frame.finish();
        let cut = bytes.slice(..bytes.len() - 2);

        let mut reader = FrameReader::new(cut);
        assert_eq!(reader.next(), Some(Err(DecodeError::UnexpectedEof)));
        assert_eq!(reader.next(), None);
    }

    #[test]
    fn empty_datagram_has_no_entries() {
        assert_eq!(decode_frame(Bytes::new()).unwrap(), Vec::new());
        assert_eq!(decode_frame(Bytes::from_static(&[0xFF])).unwrap(), Vec::new());
    }
}
