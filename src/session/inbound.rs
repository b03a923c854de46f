use std::time::Instant;

use bytes::Bytes;

use crate::protocol::{
    packet::DecodeError,
    reliability::Reliability,
    types::SequenceNumber,
};
use crate::transport::{
    frame::FrameReader,
    internal_packet::{FrameEntry, InternalPacket},
};

use super::{
    PendingAck, ReceivedMessage, Session,
    ordering::OrderedArrival,
    received::Arrival,
    split::Reassembly,
};

impl Session {
    /// Feeds one received datagram through the session.
    ///
    /// Every well-formed entry before a malformed one is still processed; the
    /// decode error is returned afterwards so the owner can decide whether to
    /// drop the connection.
    pub fn handle_datagram(&mut self, data: Bytes, now: Instant) -> Result<(), DecodeError> {
        if self.is_dead() {
            return Ok(());
        }
        self.stats.frames_received += 1;
        self.stats.bits_received += data.len() as u64 * 8;

        let mut acks_in_frame = 0;
        let mut result = Ok(());
        for entry in FrameReader::new(data) {
            match entry {
                Ok(FrameEntry::Ack(seq)) => {
                    acks_in_frame += 1;
                    self.handle_ack(seq, now);
                }
                Ok(FrameEntry::Data(pkt)) => self.handle_packet(pkt, now),
                Err(err) => {
                    self.stats.invalid_messages_received += 1;
                    tracing::debug!(error = %err, "malformed frame entry");
                    result = Err(err);
                }
            }
        }

        let backlog = self.has_backlog();
        self.window.on_acks(now, acks_in_frame, backlog);
        result
    }

    fn handle_ack(&mut self, seq: SequenceNumber, now: Instant) {
        self.stats.acks_received += 1;
        let Some(acked) = self.resend.acknowledge(seq) else {
            self.stats.duplicate_acks_received += 1;
            return;
        };
        tracing::trace!(seq = %seq, "acked");

        if acked.reliability == Reliability::ReliableSequenced
            && let Some(o) = acked.ordering
        {
            let dropped = self.resend.drop_superseded(o.channel, o.index);
            if dropped > 0 {
                tracing::trace!(channel = o.channel, dropped, "superseded resends dropped");
            }
        }

        self.last_ack = if self.resend.is_empty() {
            None
        } else {
            Some(now)
        };
    }

    fn handle_packet(&mut self, pkt: InternalPacket, now: Instant) {
        // Acked even when it turns out to be a duplicate: our earlier ack may
        // be the thing that got lost.
        if pkt.reliability.is_reliable() {
            self.acks.push_back(PendingAck {
                seq: pkt.sequence_number,
                due: now + self.config.ack_coalesce(),
            });
        }

        if self.received.record(pkt.sequence_number, now) == Arrival::Duplicate {
            self.stats.duplicate_messages_received += 1;
            tracing::trace!(seq = %pkt.sequence_number, "duplicate dropped");
            return;
        }

        if pkt.split.is_some() {
            let purged = self.splits.purge_expired(now, self.config.split_expiry);
            if purged > 0 {
                self.stats.split_groups_purged += purged as u64;
                tracing::debug!(purged, "expired unreliable split groups dropped");
            }
        }

        let reliability = pkt.reliability;
        let ordering = pkt.ordering;

        if reliability.is_sequenced() {
            let Some(o) = ordering else { return };
            if self.ordering.is_sequenced_stale(o.channel, o.index) {
                self.stats.sequenced_out_of_order += 1;
                return;
            }
            let Some(whole) = self.reassemble(pkt, now) else {
                return;
            };
            // a newer message may have completed while this one was in pieces
            if !self.ordering.accept_sequenced(o.channel, o.index) {
                self.stats.sequenced_out_of_order += 1;
                return;
            }
            self.stats.sequenced_in_order += 1;
            let read = self.ordering.sequenced_read(o.channel);
            self.splits.drop_superseded(o.channel, read);
            self.deliver(whole.into());
            return;
        }

        let Some(whole) = self.reassemble(pkt, now) else {
            return;
        };

        if reliability.is_ordered() {
            let Some(o) = ordering else { return };
            let output = &mut self.output;
            let arrival = self.ordering.accept_ordered(o.channel, o.index, whole.into(), |msg| {
                output.push_back(msg)
            });
            match arrival {
                OrderedArrival::InOrder { released } => {
                    self.stats.ordered_in_order += 1;
                    self.stats.messages_received += 1 + released as u64;
                }
                OrderedArrival::Buffered | OrderedArrival::Stale => {
                    self.stats.ordered_out_of_order += 1;
                }
            }
            return;
        }

        self.deliver(whole.into());
    }

    /// Passes unsplit packets through; holds fragments until their message is
    /// complete.
    fn reassemble(&mut self, pkt: InternalPacket, now: Instant) -> Option<InternalPacket> {
        match self.splits.insert(pkt, now) {
            Reassembly::Complete(whole) => Some(whole),
            Reassembly::Pending => None,
            Reassembly::Rejected => {
                self.stats.invalid_messages_received += 1;
                tracing::debug!("inconsistent split fragment dropped");
                None
            }
            Reassembly::Overflow => {
                self.stats.invalid_messages_received += 1;
                tracing::warn!(
                    pending = self.splits.pending_bytes(),
                    "reassembly buffer full, split fragment dropped"
                );
                None
            }
        }
    }

    fn deliver(&mut self, msg: ReceivedMessage) {
        self.stats.messages_received += 1;
        self.output.push_back(msg);
    }
}
