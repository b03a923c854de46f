use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::protocol::constants::SPLIT_FRAGMENT_OVERHEAD;
use crate::protocol::types::{OrderingIndex, SplitId, bits_to_bytes};
use crate::transport::internal_packet::{InternalPacket, Ordering};

/// Cuts a payload into chunks of `chunk` bytes. Every part but the last
/// carries exactly `chunk * 8` bits.
pub fn split_payload(payload: &Bytes, bit_length: u32, chunk: usize) -> Vec<(Bytes, u32)> {
    debug_assert!(chunk > 0);
    let len = bits_to_bytes(bit_length as usize);
    let mut parts = Vec::with_capacity(len.div_ceil(chunk));
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        let bits = if end == len {
            bit_length - (start as u32) * 8
        } else {
            (chunk * 8) as u32
        };
        parts.push((payload.slice(start..end), bits));
        start = end;
    }
    parts
}

/// Result of handing one fragment to the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembly {
    Complete(InternalPacket),
    Pending,
    /// Inconsistent with the fragments already held for that id.
    Rejected,
    /// Holding the fragment would exceed the reassembly byte cap.
    Overflow,
}

#[derive(Debug)]
struct SplitGroup {
    parts: BTreeMap<u32, InternalPacket>,
    count: u32,
    bytes: usize,
    first_seen: Instant,
    reliable: bool,
    sequenced: Option<Ordering>,
}

fn fragment_cost(pkt: &InternalPacket) -> usize {
    pkt.payload_len() + SPLIT_FRAGMENT_OVERHEAD
}

/// Holds fragments of partially received messages, keyed by split id.
///
/// Fragments are stored sparsely, so a group costs only what has arrived.
/// The total across all groups is capped at `max_bytes`.
#[derive(Debug)]
pub struct SplitAssembler {
    groups: HashMap<SplitId, SplitGroup>,
    max_parts: usize,
    max_bytes: usize,
    bytes: usize,
}

impl SplitAssembler {
    pub fn new(max_parts: usize, max_bytes: usize) -> Self {
        Self {
            groups: HashMap::new(),
            max_parts,
            max_bytes,
            bytes: 0,
        }
    }

    /// Fragments currently held.
    pub fn pending(&self) -> usize {
        self.groups.values().map(|g| g.parts.len()).sum()
    }

    /// Bytes charged against the cap by the fragments currently held.
    pub fn pending_bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn insert(&mut self, pkt: InternalPacket, now: Instant) -> Reassembly {
        let Some(split) = pkt.split else {
            return Reassembly::Complete(pkt);
        };
        if split.count as usize > self.max_parts || split.index >= split.count {
            return Reassembly::Rejected;
        }
        if let Some(group) = self.groups.get(&split.id) {
            if group.count != split.count {
                return Reassembly::Rejected;
            }
            if group.parts.contains_key(&split.index) {
                return Reassembly::Pending;
            }
        }

        let cost = fragment_cost(&pkt);
        let completes = self
            .groups
            .get(&split.id)
            .map_or(split.count == 1, |g| g.parts.len() + 1 == g.count as usize);
        if !completes && self.bytes + cost > self.max_bytes {
            return Reassembly::Overflow;
        }

        let group = self.groups.entry(split.id).or_insert_with(|| SplitGroup {
            parts: BTreeMap::new(),
            count: split.count,
            bytes: 0,
            first_seen: now,
            reliable: pkt.reliability.is_reliable(),
            sequenced: pkt.ordering.filter(|_| pkt.reliability.is_sequenced()),
        });
        group.parts.insert(split.index, pkt);
        group.bytes += cost;
        self.bytes += cost;
        if group.parts.len() < group.count as usize {
            return Reassembly::Pending;
        }

        let Some(group) = self.groups.remove(&split.id) else {
            return Reassembly::Pending;
        };
        self.bytes -= group.bytes;
        match assemble(group.parts) {
            Some(whole) => Reassembly::Complete(whole),
            None => Reassembly::Pending,
        }
    }

    /// Drops unreliable groups that have waited longer than `expiry`.
    /// Reliable groups always complete eventually through retransmission.
    pub fn purge_expired(&mut self, now: Instant, expiry: Duration) -> usize {
        self.drop_where(|g| {
            !g.reliable && now.saturating_duration_since(g.first_seen) > expiry
        })
    }

    /// Drops sequenced groups on `channel` whose index is older than the
    /// channel's read index `read`.
    pub fn drop_superseded(&mut self, channel: u8, read: OrderingIndex) -> usize {
        self.drop_where(|g| {
            g.sequenced
                .is_some_and(|o| o.channel == channel && o.index.is_older_than(read))
        })
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.bytes = 0;
    }

    fn drop_where(&mut self, mut doomed: impl FnMut(&SplitGroup) -> bool) -> usize {
        let before = self.groups.len();
        let mut freed = 0;
        self.groups.retain(|_, g| {
            let drop = doomed(g);
            if drop {
                freed += g.bytes;
            }
            !drop
        });
        self.bytes -= freed;
        before - self.groups.len()
    }
}

fn assemble(parts: BTreeMap<u32, InternalPacket>) -> Option<InternalPacket> {
    let mut parts = parts.into_values();
    let mut whole = parts.next()?;
    let mut buf = BytesMut::with_capacity(whole.payload_len() * 2);
    buf.extend_from_slice(&whole.payload[..whole.payload_len()]);
    for part in parts {
        buf.extend_from_slice(&part.payload[..part.payload_len()]);
        whole.bit_length += part.bit_length;
    }
    whole.split = None;
    whole.payload = buf.freeze();
    Some(whole)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        reliability::{Priority, Reliability},
        types::SequenceNumber,
    };
    use crate::transport::internal_packet::SplitInfo;

    fn fragments(payload: &Bytes, chunk: usize, reliability: Reliability) -> Vec<InternalPacket> {
        let parts = split_payload(payload, payload.len() as u32 * 8, chunk);
        let count = parts.len() as u32;
        parts
            .into_iter()
            .enumerate()
            .map(|(i, (bytes, bits))| InternalPacket {
                sequence_number: SequenceNumber::new(i as u16),
                reliability,
                ordering: reliability.uses_channel().then_some(Ordering {
                    channel: 1,
                    index: OrderingIndex::new(3),
                }),
                split: Some(SplitInfo {
                    id: SplitId::new(9),
                    index: i as u32,
                    count,
                }),
                priority: Priority::Medium,
                bit_length: bits,
                payload: bytes,
            })
            .collect()
    }

    #[test]
    fn split_sizes_cover_payload() {
        let payload = Bytes::from(vec![7u8; 35]);
        let parts = split_payload(&payload, 35 * 8 - 3, 10);
        let bits: Vec<u32> = parts.iter().map(|(_, b)| *b).collect();
        assert_eq!(bits, vec![80, 80, 80, 37]);
        assert_eq!(parts[3].0.len(), 5);
    }

    #[test]
    fn reverse_order_reassembles_on_last_part() {
        let payload: Bytes = (0..35u8).collect::<Vec<_>>().into();
        let now = Instant::now();
        let mut asm = SplitAssembler::new(1024, usize::MAX);

        let mut frags = fragments(&payload, 10, Reliability::Reliable);
        assert_eq!(frags.len(), 4);
        let last = frags.remove(0);
        for frag in frags.into_iter().rev() {
            assert_eq!(asm.insert(frag, now), Reassembly::Pending);
        }
        assert_eq!(asm.pending(), 3);

        match asm.insert(last, now) {
            Reassembly::Complete(pkt) => {
                assert_eq!(pkt.payload, payload);
                assert_eq!(pkt.bit_length, 35 * 8);
                assert!(pkt.split.is_none());
            }
            other => panic!("expected a complete message, got {other:?}"),
        }
        assert!(asm.is_empty());
    }

    #[test]
    fn repeated_fragment_is_ignored() {
        let payload = Bytes::from(vec![1u8; 20]);
        let now = Instant::now();
        let mut asm = SplitAssembler::new(1024, usize::MAX);
        let frags = fragments(&payload, 10, Reliability::Reliable);
        assert_eq!(asm.insert(frags[0].clone(), now), Reassembly::Pending);
        assert_eq!(asm.insert(frags[0].clone(), now), Reassembly::Pending);
        assert_eq!(asm.pending(), 1);
        assert!(matches!(asm.insert(frags[1].clone(), now), Reassembly::Complete(_)));
    }

    #[test]
    fn mismatched_count_is_rejected() {
        let payload = Bytes::from(vec![1u8; 30]);
        let now = Instant::now();
        let mut asm = SplitAssembler::new(1024, usize::MAX);
        let frags = fragments(&payload, 10, Reliability::Reliable);
        asm.insert(frags[0].clone(), now);

        let mut odd = frags[1].clone();
        odd.split = Some(SplitInfo {
            id: SplitId::new(9),
            index: 1,
            count: 2,
        });
        assert_eq!(asm.insert(odd, now), Reassembly::Rejected);
    }

    #[test]
    fn only_unreliable_groups_expire() {
        let start = Instant::now();
        let expiry = Duration::from_secs(5);
        let mut asm = SplitAssembler::new(1024, usize::MAX);
        let payload = Bytes::from(vec![1u8; 30]);

        asm.insert(fragments(&payload, 10, Reliability::Unreliable)[0].clone(), start);
        let mut reliable = fragments(&payload, 10, Reliability::Reliable)[0].clone();
        reliable.split = reliable.split.map(|s| SplitInfo {
            id: SplitId::new(10),
            ..s
        });
        asm.insert(reliable, start);

        assert_eq!(asm.purge_expired(start + expiry, expiry), 0);
        assert_eq!(asm.purge_expired(start + expiry * 2, expiry), 1);
        assert_eq!(asm.pending(), 1);
        assert_eq!(asm.pending_bytes(), 10 + SPLIT_FRAGMENT_OVERHEAD);
    }

    #[test]
    fn held_fragments_are_capped_in_bytes() {
        let now = Instant::now();
        let cap = 100 * (1 + SPLIT_FRAGMENT_OVERHEAD);
        let mut asm = SplitAssembler::new(1024, cap);
        let template = fragments(&Bytes::from_static(&[5]), 1, Reliability::Reliable).remove(0);

        let mut overflowed = 0;
        for id in 0..2000u16 {
            let mut frag = template.clone();
            frag.split = Some(SplitInfo {
                id: SplitId::new(id),
                index: 0,
                count: 1024,
            });
            match asm.insert(frag, now) {
                Reassembly::Pending => {}
                Reassembly::Overflow => overflowed += 1,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(asm.pending(), 100);
        assert_eq!(asm.pending_bytes(), cap);
        assert_eq!(overflowed, 1900);

        // space comes back once groups go away
        asm.clear();
        assert_eq!(asm.pending_bytes(), 0);
        let mut frag = template.clone();
        frag.split = Some(SplitInfo {
            id: SplitId::new(1),
            index: 3,
            count: 1024,
        });
        assert_eq!(asm.insert(frag, now), Reassembly::Pending);
    }

    #[test]
    fn completing_fragment_is_accepted_at_the_cap() {
        let now = Instant::now();
        let payload = Bytes::from(vec![2u8; 20]);
        let frags = fragments(&payload, 10, Reliability::Reliable);
        let mut asm = SplitAssembler::new(1024, fragment_cost(&frags[0]));
        assert_eq!(asm.insert(frags[0].clone(), now), Reassembly::Pending);
        assert!(matches!(asm.insert(frags[1].clone(), now), Reassembly::Complete(_)));
        assert_eq!(asm.pending_bytes(), 0);
    }

    #[test]
    fn superseded_sequenced_groups_are_dropped() {
        let now = Instant::now();
        let mut asm = SplitAssembler::new(1024, usize::MAX);
        let payload = Bytes::from(vec![1u8; 30]);
        asm.insert(
            fragments(&payload, 10, Reliability::ReliableSequenced)[0].clone(),
            now,
        );

        assert_eq!(asm.drop_superseded(0, OrderingIndex::new(10)), 0);
        assert_eq!(asm.drop_superseded(1, OrderingIndex::new(3)), 0);
        assert_eq!(asm.drop_superseded(1, OrderingIndex::new(4)), 1);
        assert!(asm.is_empty());
    }
}
