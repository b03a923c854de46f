use std::time::Duration;

use crate::protocol::constants::{
    CONNECTION_TIMEOUT, DEFAULT_MTU_SIZE, DEFAULT_RESEND_DELAY, MAXIMUM_MTU_SIZE,
    MAXIMUM_REASSEMBLY_BYTES, MAXIMUM_SPLIT_PARTS, MINIMUM_RESEND_DELAY, UDP_HEADER_SIZE, UNRELIABLE_SPLIT_EXPIRY,
};

/// Tunables of one reliability session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mtu: usize,
    pub resend_delay: Duration,
    pub connection_timeout: Duration,
    pub split_expiry: Duration,
    /// Bytes reserved at the end of every frame for a transport-level cipher.
    pub encryption_overhead: usize,
    pub max_split_parts: usize,
    /// Cap on fragment bytes held for reassembly across all split ids.
    pub max_reassembly_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU_SIZE,
            resend_delay: DEFAULT_RESEND_DELAY,
            connection_timeout: CONNECTION_TIMEOUT,
            split_expiry: UNRELIABLE_SPLIT_EXPIRY,
            encryption_overhead: 0,
            max_split_parts: MAXIMUM_SPLIT_PARTS,
            max_reassembly_bytes: MAXIMUM_REASSEMBLY_BYTES,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to [`MAXIMUM_MTU_SIZE`].
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.min(MAXIMUM_MTU_SIZE);
        self
    }

    /// Never goes below [`MINIMUM_RESEND_DELAY`].
    pub fn resend_delay(mut self, delay: Duration) -> Self {
        self.resend_delay = delay.max(MINIMUM_RESEND_DELAY);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn split_expiry(mut self, expiry: Duration) -> Self {
        self.split_expiry = expiry;
        self
    }

    pub fn encryption_overhead(mut self, bytes: usize) -> Self {
        self.encryption_overhead = bytes;
        self
    }

    pub fn max_split_parts(mut self, parts: usize) -> Self {
        self.max_split_parts = parts;
        self
    }

    pub fn max_reassembly_bytes(mut self, bytes: usize) -> Self {
        self.max_reassembly_bytes = bytes;
        self
    }

    /// How long a received reliable packet may wait for its ack to be sent,
    /// so several acks share one frame.
    pub fn ack_coalesce(&self) -> Duration {
        self.resend_delay / 4
    }

    /// Minimum time between two window increases driven by the cooldown rule.
    pub fn window_cooldown(&self) -> Duration {
        self.resend_delay * 2
    }

    /// Usable bytes of one frame after the IP/UDP headers and cipher overhead.
    pub fn frame_budget(&self) -> usize {
        self.mtu
            .saturating_sub(UDP_HEADER_SIZE)
            .saturating_sub(self.encryption_overhead)
    }
}
