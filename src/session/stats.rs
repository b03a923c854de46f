use std::time::Instant;

use crate::protocol::reliability::Priority;

/// Counters kept by a session, plus gauges filled in when a snapshot is taken
/// through [`Session::statistics`](super::Session::statistics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub connection_start: Instant,

    // outbound; fragments count as separate messages once on the wire
    pub messages_sent: [u64; Priority::COUNT],
    pub message_data_bits_sent: [u64; Priority::COUNT],
    /// Payload plus entry header bits.
    pub message_total_bits_sent: [u64; Priority::COUNT],
    pub unsplit_messages_sent: u64,
    pub split_messages_sent: u64,
    /// Fragments produced by splitting.
    pub total_splits: u64,
    pub messages_resent: u64,
    pub resent_bits: u64,
    pub acks_sent: u64,
    /// Frames that carried nothing but acknowledgements.
    pub ack_only_frames_sent: u64,
    pub frames_sent: u64,
    pub bits_sent: u64,

    // inbound
    pub frames_received: u64,
    pub bits_received: u64,
    pub acks_received: u64,
    /// Acks matching nothing in the resend queue.
    pub duplicate_acks_received: u64,
    pub messages_received: u64,
    pub duplicate_messages_received: u64,
    pub invalid_messages_received: u64,
    pub sequenced_in_order: u64,
    pub sequenced_out_of_order: u64,
    pub ordered_in_order: u64,
    pub ordered_out_of_order: u64,
    pub split_groups_purged: u64,

    // gauges
    pub send_buffer: [usize; Priority::COUNT],
    pub acks_pending: usize,
    pub resend_queue_len: usize,
    pub resend_bits_pending: u64,
    pub reassembly_pending: usize,
    /// Sequence numbers skipped by the peer and not yet received or expired.
    pub receive_holes: usize,
    pub ordering_waiting: usize,
    pub output_queue_len: usize,
    pub window_size: usize,
    pub lossy_window_size: usize,
}

impl Statistics {
    pub fn new(connection_start: Instant) -> Self {
        Self {
            connection_start,
            messages_sent: [0; Priority::COUNT],
            message_data_bits_sent: [0; Priority::COUNT],
            message_total_bits_sent: [0; Priority::COUNT],
            unsplit_messages_sent: 0,
            split_messages_sent: 0,
            total_splits: 0,
            messages_resent: 0,
            resent_bits: 0,
            acks_sent: 0,
            ack_only_frames_sent: 0,
            frames_sent: 0,
            bits_sent: 0,
            frames_received: 0,
            bits_received: 0,
            acks_received: 0,
            duplicate_acks_received: 0,
            messages_received: 0,
            duplicate_messages_received: 0,
            invalid_messages_received: 0,
            sequenced_in_order: 0,
            sequenced_out_of_order: 0,
            ordered_in_order: 0,
            ordered_out_of_order: 0,
            split_groups_purged: 0,
            send_buffer: [0; Priority::COUNT],
            acks_pending: 0,
            resend_queue_len: 0,
            resend_bits_pending: 0,
            reassembly_pending: 0,
            receive_holes: 0,
            ordering_waiting: 0,
            output_queue_len: 0,
            window_size: 0,
            lossy_window_size: 0,
        }
    }

    pub fn total_messages_sent(&self) -> u64 {
        self.messages_sent.iter().sum()
    }

    /// Resends per first transmission.
    pub fn resend_ratio(&self) -> f64 {
        let sent = self.total_messages_sent();
        if sent == 0 {
            return 0.0;
        }
        self.messages_resent as f64 / sent as f64
    }
}
