use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::protocol::{reliability::Reliability, types::{OrderingIndex, SequenceNumber}};
use crate::transport::internal_packet::InternalPacket;

#[derive(Debug)]
struct ResendEntry {
    packet: InternalPacket,
    next_action: Instant,
}

/// Reliable packets sent but not yet acknowledged.
///
/// Send order is kept in a queue of sequence numbers while the packets live in
/// a map, so an ack removes its entry in O(1). A queued number with no map
/// entry is a tombstone and is skipped when it reaches the front.
#[derive(Debug, Default)]
pub struct ResendQueue {
    order: VecDeque<SequenceNumber>,
    entries: HashMap<SequenceNumber, ResendEntry>,
}

impl ResendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets awaiting acknowledgement.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, packet: InternalPacket, next_action: Instant) {
        let seq = packet.sequence_number;
        self.order.push_back(seq);
        self.entries.insert(seq, ResendEntry { packet, next_action });
    }

    /// Removes the packet acknowledged by `seq`.
    pub fn acknowledge(&mut self, seq: SequenceNumber) -> Option<InternalPacket> {
        let entry = self.entries.remove(&seq)?;
        self.compact();
        Some(entry.packet)
    }

    /// The packet at the front of the queue, if it is due at `now`.
    pub fn peek_due(&mut self, now: Instant) -> Option<&InternalPacket> {
        self.skip_tombstones();
        let seq = self.order.front()?;
        self.entries
            .get(seq)
            .filter(|entry| entry.next_action <= now)
            .map(|entry| &entry.packet)
    }

    pub fn pop_front(&mut self) -> Option<InternalPacket> {
        self.skip_tombstones();
        let seq = self.order.pop_front()?;
        self.entries.remove(&seq).map(|entry| entry.packet)
    }

    /// Drops reliable sequenced packets on `channel` older than `index`; a
    /// newer message on that channel has been acknowledged, so they would be
    /// discarded on arrival anyway.
    pub fn drop_superseded(&mut self, channel: u8, index: OrderingIndex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let pkt = &entry.packet;
            match pkt.ordering {
                Some(o) if pkt.reliability == Reliability::ReliableSequenced => {
                    o.channel != channel || !o.index.is_older_than(index)
                }
                _ => true,
            }
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.compact();
        }
        dropped
    }

    /// Total payload bits waiting for acknowledgement.
    pub fn pending_bits(&self) -> u64 {
        self.entries
            .values()
            .map(|entry| entry.packet.bit_length as u64)
            .sum()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    fn skip_tombstones(&mut self) {
        while let Some(seq) = self.order.front() {
            if self.entries.contains_key(seq) {
                break;
            }
            self.order.pop_front();
        }
    }

    fn compact(&mut self) {
        if self.order.len() > 2 * self.entries.len() + 16 {
            let entries = &self.entries;
            self.order.retain(|seq| entries.contains_key(seq));
        }
    }
}

#[cfg(test)]
impl ResendQueue {
    fn contains(&self, seq: SequenceNumber) -> bool {
        self.entries.contains_key(&seq)
    }
}
