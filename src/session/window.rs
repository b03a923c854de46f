use std::time::{Duration, Instant};

use crate::protocol::constants::{LOSSY_WINDOW_HEADROOM, MAXIMUM_WINDOW_SIZE, MINIMUM_WINDOW_SIZE};

/// Loss-driven window over the number of unacknowledged reliable packets.
///
/// Shrinks by one per update that had to resend, grows by one when a full
/// window worth of acks arrives while data is still queued.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    size: usize,
    /// Size at the last loss; growth below it is not rate limited.
    lossy: usize,
    last_increase: Option<Instant>,
    cooldown: Duration,
}

impl SlidingWindow {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            size: MINIMUM_WINDOW_SIZE,
            lossy: MAXIMUM_WINDOW_SIZE + 1,
            last_increase: None,
            cooldown,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn lossy_size(&self) -> usize {
        self.lossy
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Whether `in_flight` unacknowledged packets already fill the window.
    pub fn is_full(&self, in_flight: usize) -> bool {
        in_flight >= self.size
    }

    pub fn on_loss(&mut self, now: Instant) {
        self.size = self.size.saturating_sub(1).max(MINIMUM_WINDOW_SIZE);
        self.lossy = self.size;
        self.last_increase = Some(now);
        tracing::debug!(window = self.size, "window shrunk after loss");
    }

    /// Called once per received datagram with the number of ack entries it
    /// carried, duplicates included.
    /// Returns true if the window grew.
    pub fn on_acks(&mut self, now: Instant, acked: usize, backlog: bool) -> bool {
        if acked < self.size || !backlog {
            return false;
        }

        let below_lossy = self.size < self.lossy;
        let cooled = self
            .last_increase
            .is_none_or(|t| now.saturating_duration_since(t) > self.cooldown);
        if !below_lossy && !cooled {
            return false;
        }

        self.size = (self.size + 1).min(MAXIMUM_WINDOW_SIZE);
        if cooled {
            self.last_increase = Some(now);
        }
        if self.size == MAXIMUM_WINDOW_SIZE || self.size > self.lossy + LOSSY_WINDOW_HEADROOM {
            self.lossy += 1;
        }
        tracing::debug!(window = self.size, lossy = self.lossy, "window grew");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(2);

    fn window_at(size: usize) -> SlidingWindow {
        let mut w = SlidingWindow::new(COOLDOWN);
        w.size = size;
        w
    }

    #[test]
    fn loss_shrinks_to_floor() {
        let now = Instant::now();
        let mut w = window_at(7);
        w.on_loss(now);
        assert_eq!(w.size(), 6);
        assert_eq!(w.lossy_size(), 6);

        let mut w = window_at(MINIMUM_WINDOW_SIZE);
        w.on_loss(now);
        assert_eq!(w.size(), MINIMUM_WINDOW_SIZE);
    }

    #[test]
    fn grows_only_on_full_window_of_acks_with_backlog() {
        let now = Instant::now();
        let mut w = SlidingWindow::new(COOLDOWN);
        assert!(!w.on_acks(now, MINIMUM_WINDOW_SIZE - 1, true));
        assert!(!w.on_acks(now, MINIMUM_WINDOW_SIZE, false));
        assert!(w.on_acks(now, MINIMUM_WINDOW_SIZE, true));
        assert_eq!(w.size(), MINIMUM_WINDOW_SIZE + 1);
    }

    #[test]
    fn growth_at_lossy_ceiling_waits_for_cooldown() {
        let start = Instant::now();
        let mut w = window_at(8);
        w.on_loss(start);
        assert_eq!(w.size(), 7);

        assert!(!w.on_acks(start + COOLDOWN, 7, true));
        assert!(w.on_acks(start + COOLDOWN + Duration::from_millis(1), 7, true));
        assert_eq!(w.size(), 8);

        // the cooldown restarts from that increase
        let t = start + COOLDOWN + Duration::from_millis(1);
        assert!(!w.on_acks(t + Duration::from_millis(10), 8, true));
        assert!(w.on_acks(t + COOLDOWN + Duration::from_millis(1), 8, true));
    }

    #[test]
    fn below_lossy_grows_immediately() {
        let start = Instant::now();
        let mut w = window_at(10);
        w.on_loss(start);
        w.on_loss(start);
        assert_eq!(w.size(), 8);
        // lossy follows the window down, so a recovery to it waits for cooldown
        assert!(!w.on_acks(start, 8, true));

        w.lossy = 12;
        assert!(w.on_acks(start, 8, true));
        assert!(w.on_acks(start, 9, true));
        assert_eq!(w.size(), 10);
    }

    #[test]
    fn cooled_growth_below_lossy_restarts_cooldown() {
        let start = Instant::now();
        let mut w = window_at(8);
        w.lossy = 9;
        assert!(w.last_increase.is_none());

        assert!(w.on_acks(start, 8, true));
        assert_eq!(w.last_increase, Some(start));
        // now at the ceiling, and the cooldown began with the previous step
        assert!(!w.on_acks(start + Duration::from_millis(1), 9, true));
        assert!(w.on_acks(start + COOLDOWN + Duration::from_millis(1), 9, true));
    }

    #[test]
    fn lossy_ceiling_rises_past_headroom() {
        let now = Instant::now();
        let mut w = window_at(20);
        w.lossy = 15;
        w.last_increase = None;
        assert!(w.on_acks(now, 20, true));
        assert_eq!(w.size(), 21);
        assert_eq!(w.lossy_size(), 16);
    }
}
