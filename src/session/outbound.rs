use std::time::Instant;

use bytes::Bytes;

use crate::protocol::{
    constants::{MINIMUM_WINDOW_SIZE, NUMBER_OF_ORDERED_STREAMS},
    reliability::{Priority, Reliability},
    state::DisconnectReason,
    types::bits_to_bytes,
};
use crate::transport::{
    frame::FrameWriter,
    internal_packet::{InternalPacket, Ordering, SplitInfo},
};

use super::{SendError, Session, split::split_payload};

impl Session {
    /// Queues a whole-byte payload for sending.
    pub fn send(
        &mut self,
        payload: Bytes,
        priority: Priority,
        reliability: Reliability,
        channel: u8,
    ) -> Result<(), SendError> {
        let bit_length = u32::try_from(payload.len() * 8)
            .map_err(|_| SendError::TooManySplits(payload.len() / self.config.frame_budget().max(1)))?;
        self.send_bits(payload, bit_length, priority, reliability, channel)
    }

    /// Queues the first `bit_length` bits of `payload` for sending, splitting
    /// it when it does not fit one frame.
    pub fn send_bits(
        &mut self,
        payload: Bytes,
        bit_length: u32,
        priority: Priority,
        reliability: Reliability,
        channel: u8,
    ) -> Result<(), SendError> {
        if self.is_dead() {
            return Err(SendError::DeadConnection);
        }
        let bit_length = bit_length.min((payload.len() as u64 * 8).min(u32::MAX as u64) as u32);
        if bit_length == 0 {
            return Err(SendError::EmptyPayload);
        }
        if channel >= NUMBER_OF_ORDERED_STREAMS {
            return Err(SendError::InvalidChannel(channel));
        }

        let len = bits_to_bytes(bit_length as usize);
        let budget = self.config.frame_budget();
        let fits_whole = len + InternalPacket::max_header_bytes(reliability, false) <= budget;

        // Fragments travel reliably so a lost part is repaired, not fatal.
        let reliability = if fits_whole {
            reliability
        } else {
            reliability.as_reliable()
        };
        let chunk = budget.saturating_sub(InternalPacket::max_header_bytes(reliability, true));
        if !fits_whole {
            let parts = if chunk == 0 { usize::MAX } else { len.div_ceil(chunk) };
            if parts > self.config.max_split_parts {
                tracing::warn!(parts, bytes = len, "payload needs too many splits");
                return Err(SendError::TooManySplits(parts));
            }
        }

        let ordering = reliability.uses_channel().then(|| Ordering {
            channel,
            index: self.ordering.next_write_index(reliability, channel),
        });

        if fits_whole {
            let pkt = InternalPacket {
                sequence_number: self.next_sequence.take_next(),
                reliability,
                ordering,
                split: None,
                priority,
                bit_length,
                payload,
            };
            self.send_queues[priority.index()].push_back(pkt);
            self.stats.unsplit_messages_sent += 1;
            return Ok(());
        }

        let parts = split_payload(&payload, bit_length, chunk);
        let id = self.next_split_id.take_next();
        let count = parts.len() as u32;
        for (index, (bytes, bits)) in parts.into_iter().enumerate() {
            let pkt = InternalPacket {
                sequence_number: self.next_sequence.take_next(),
                reliability,
                ordering,
                split: Some(SplitInfo {
                    id,
                    index: index as u32,
                    count,
                }),
                priority,
                bit_length: bits,
                payload: bytes,
            };
            self.send_queues[priority.index()].push_back(pkt);
        }
        self.stats.split_messages_sent += 1;
        self.stats.total_splits += count as u64;
        tracing::trace!(split_id = %id, parts = count, "message split");
        Ok(())
    }

    /// Runs one tick: checks the ack timeout and builds every frame that is
    /// ready to go. Returns nothing once the connection is dead.
    pub fn update(&mut self, now: Instant) -> Vec<Bytes> {
        let mut frames = Vec::new();
        if self.is_dead() {
            return frames;
        }

        if let Some(last_ack) = self.last_ack
            && !self.resend.is_empty()
            && now.saturating_duration_since(last_ack) > self.config.connection_timeout
        {
            tracing::warn!(
                unacked = self.resend.len(),
                "no acknowledgement within the connection timeout, connection is dead"
            );
            self.mark_dead(DisconnectReason::TimedOut);
            return frames;
        }

        let mut frame = FrameWriter::new(self.config.frame_budget());
        let mut lost = false;
        while self.is_frame_ready(now) {
            self.generate_frame(&mut frame, now, &mut lost);
            if frame.is_empty() {
                break;
            }
            let bytes = frame.finish();
            self.stats.frames_sent += 1;
            self.stats.bits_sent += bytes.len() as u64 * 8;
            tracing::trace!(bytes = bytes.len(), "frame built");
            frames.push(bytes);
        }
        frames
    }

    /// Unacknowledged reliable packets already fill the window.
    pub fn is_send_throttled(&self) -> bool {
        self.window.is_full(self.resend.len())
    }

    fn acks_due(&self, now: Instant) -> bool {
        match self.acks.front() {
            Some(head) => self.acks.len() >= MINIMUM_WINDOW_SIZE || head.due <= now,
            None => false,
        }
    }

    /// A throttled session still sends due acks and overdue resends, otherwise
    /// the throttle would never lift.
    fn is_frame_ready(&mut self, now: Instant) -> bool {
        !self.is_send_throttled() || self.acks_due(now) || self.resend.peek_due(now).is_some()
    }

    fn generate_frame(&mut self, frame: &mut FrameWriter, now: Instant, lost: &mut bool) {
        // 1) acknowledgements, when enough have piled up or the oldest is due
        let mut acks_sent = false;
        if self.acks_due(now) {
            while let Some(ack) = self.acks.front() {
                if !frame.push_ack(ack.seq) {
                    self.stats.ack_only_frames_sent += 1;
                    return;
                }
                self.acks.pop_front();
                self.stats.acks_sent += 1;
                acks_sent = true;
            }
        }

        // 2) overdue resends, oldest first
        loop {
            match self.resend.peek_due(now) {
                Some(pkt) if !frame.fits_packet(pkt) => return,
                Some(_) => {}
                None => break,
            }
            let Some(pkt) = self.resend.pop_front() else {
                break;
            };
            frame.push_packet(&pkt);
            self.stats.messages_resent += 1;
            self.stats.resent_bits += pkt.bit_length as u64;
            tracing::trace!(seq = %pkt.sequence_number, "resend");
            if !*lost {
                *lost = true;
                self.window.on_loss(now);
            }
            self.resend.push(pkt, now + self.config.resend_delay);
        }

        // 3) fresh sends by priority while the window is open
        'priorities: for priority in Priority::ALL {
            let queue = priority.index();
            while let Some(pkt) = self.send_queues[queue].front() {
                if self.is_send_throttled() {
                    break 'priorities;
                }
                if !frame.fits_packet(pkt) {
                    continue 'priorities;
                }
                let Some(pkt) = self.send_queues[queue].pop_front() else {
                    break;
                };
                let before = frame.bit_len();
                frame.push_packet(&pkt);
                self.stats.messages_sent[queue] += 1;
                self.stats.message_data_bits_sent[queue] += pkt.bit_length as u64;
                self.stats.message_total_bits_sent[queue] += (frame.bit_len() - before) as u64;

                if pkt.reliability.is_reliable() {
                    if self.last_ack.is_none() {
                        self.last_ack = Some(now);
                    }
                    self.resend.push(pkt, now + self.config.resend_delay);
                }
            }
        }

        // 4) piggyback whatever acks still fit
        if !acks_sent && !frame.is_empty() {
            while let Some(ack) = self.acks.front() {
                if !frame.push_ack(ack.seq) {
                    break;
                }
                self.acks.pop_front();
                self.stats.acks_sent += 1;
            }
        }
    }
}
