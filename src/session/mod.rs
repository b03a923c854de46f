//! Per-connection reliability layer.
//!
//! A [`Session`] turns application sends into frames and frames back into
//! messages. It never touches a socket and never reads the clock: every call
//! that depends on time takes `now`, and [`Session::update`] hands back the
//! frames to transmit.

mod config;
mod error;
mod inbound;
mod ordering;
mod outbound;
mod received;
mod resend;
mod split;
mod stats;
mod window;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::protocol::{
    constants::{MINIMUM_RESEND_DELAY, RECEIVED_LOG_CAPACITY},
    reliability::{Priority, Reliability},
    state::DisconnectReason,
    types::{SequenceNumber, SplitId},
};
use crate::transport::internal_packet::InternalPacket;

pub use config::SessionConfig;
pub use error::SendError;
pub use stats::Statistics;

use ordering::OrderingTracker;
use received::ReceivedLog;
use resend::ResendQueue;
use split::SplitAssembler;
use window::SlidingWindow;

/// A complete message handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub payload: Bytes,
    /// Bits of `payload` actually used; the last byte may be partial.
    pub bit_length: u32,
    pub reliability: Reliability,
    /// Ordering channel, 0 for modes without one.
    pub channel: u8,
}

impl From<InternalPacket> for ReceivedMessage {
    fn from(pkt: InternalPacket) -> Self {
        Self {
            channel: pkt.ordering.map(|o| o.channel).unwrap_or(0),
            payload: pkt.payload,
            bit_length: pkt.bit_length,
            reliability: pkt.reliability,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingAck {
    seq: SequenceNumber,
    due: Instant,
}

/// Reliability state of one connection, one direction pair.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,

    next_sequence: SequenceNumber,
    next_split_id: SplitId,
    ordering: OrderingTracker<ReceivedMessage>,
    received: ReceivedLog,

    send_queues: [VecDeque<InternalPacket>; Priority::COUNT],
    resend: ResendQueue,
    acks: VecDeque<PendingAck>,
    splits: SplitAssembler,
    output: VecDeque<ReceivedMessage>,

    window: SlidingWindow,
    /// Armed while reliable data is unacknowledged; the last ack or the first
    /// send after the queue drained.
    last_ack: Option<Instant>,
    dead: Option<DisconnectReason>,

    stats: Statistics,
}

impl Session {
    pub fn new(mut config: SessionConfig, now: Instant) -> Self {
        config.resend_delay = config.resend_delay.max(MINIMUM_RESEND_DELAY);
        Self {
            next_sequence: SequenceNumber::default(),
            next_split_id: SplitId::default(),
            ordering: OrderingTracker::new(),
            received: ReceivedLog::new(config.connection_timeout, RECEIVED_LOG_CAPACITY),
            send_queues: Default::default(),
            resend: ResendQueue::new(),
            acks: VecDeque::new(),
            splits: SplitAssembler::new(config.max_split_parts, config.max_reassembly_bytes),
            output: VecDeque::new(),
            window: SlidingWindow::new(config.window_cooldown()),
            last_ack: None,
            dead: None,
            stats: Statistics::new(now),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Pops the next complete message, if any.
    pub fn receive(&mut self) -> Option<ReceivedMessage> {
        self.output.pop_front()
    }

    pub fn is_dead(&self) -> bool {
        self.dead.is_some()
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.dead
    }

    /// Forces the connection into the dead state, e.g. after malformed data.
    pub fn kill(&mut self) {
        self.mark_dead(DisconnectReason::Killed);
    }

    /// Tears the connection down locally, dropping undelivered output too.
    pub fn close(&mut self) {
        self.mark_dead(DisconnectReason::ClosedLocally);
        self.output.clear();
    }

    pub fn resend_delay(&self) -> Duration {
        self.config.resend_delay
    }

    /// Adjusts the retransmission delay; values below
    /// [`MINIMUM_RESEND_DELAY`] are raised to it. The ack coalescing delay and
    /// the window cooldown follow.
    pub fn set_resend_delay(&mut self, delay: Duration) {
        self.config.resend_delay = delay.max(MINIMUM_RESEND_DELAY);
        self.window.set_cooldown(self.config.window_cooldown());
    }

    /// Whether anything is still queued, in flight, or waiting to be read.
    pub fn has_pending_data(&self) -> bool {
        self.send_queues.iter().any(|q| !q.is_empty())
            || !self.acks.is_empty()
            || !self.resend.is_empty()
            || !self.output.is_empty()
            || self.ordering.waiting() > 0
            || !self.splits.is_empty()
    }

    /// Counters plus a sample of the current queue sizes.
    pub fn statistics(&self) -> Statistics {
        let mut stats = self.stats.clone();
        for (slot, queue) in stats.send_buffer.iter_mut().zip(&self.send_queues) {
            *slot = queue.len();
        }
        stats.acks_pending = self.acks.len();
        stats.resend_queue_len = self.resend.len();
        stats.resend_bits_pending = self.resend.pending_bits();
        stats.reassembly_pending = self.splits.pending();
        stats.receive_holes = self.received.holes();
        stats.ordering_waiting = self.ordering.waiting();
        stats.output_queue_len = self.output.len();
        stats.window_size = self.window.size();
        stats.lossy_window_size = self.window.lossy_size();
        stats
    }

    fn has_backlog(&self) -> bool {
        self.send_queues.iter().any(|q| !q.is_empty())
    }

    fn mark_dead(&mut self, reason: DisconnectReason) {
        if self.dead.is_none() {
            self.dead = Some(reason);
        }
        for queue in &mut self.send_queues {
            queue.clear();
        }
        self.resend.clear();
        self.acks.clear();
        self.splits.clear();
        self.ordering.clear();
        self.received.clear();
        self.last_ack = None;
    }
}
