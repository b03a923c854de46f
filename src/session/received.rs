use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::protocol::types::SequenceNumber;

const HALF_RANGE: u16 = 1 << 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Not yet seen. Expires like an arrival so the base can move past it.
    Hole(Instant),
    Received(Instant),
}

impl Slot {
    fn since(self) -> Instant {
        match self {
            Slot::Hole(t) | Slot::Received(t) => t,
        }
    }
}

/// Outcome of recording one sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    New,
    Duplicate,
}

/// Duplicate/hole tracker over a moving window of sequence numbers.
///
/// Slot `k` of the ring describes `base + k`. Anything behind `base` has
/// already been seen or given up on.
#[derive(Debug)]
pub struct ReceivedLog {
    base: SequenceNumber,
    ring: VecDeque<Slot>,
    timeout: Duration,
}

impl ReceivedLog {
    pub fn new(timeout: Duration, capacity: usize) -> Self {
        Self {
            base: SequenceNumber::default(),
            ring: VecDeque::with_capacity(capacity),
            timeout,
        }
    }

    /// Sequence numbers skipped over and still awaited.
    pub fn holes(&self) -> usize {
        self.ring
            .iter()
            .filter(|slot| matches!(slot, Slot::Hole(_)))
            .count()
    }

    pub fn record(&mut self, seq: SequenceNumber, now: Instant) -> Arrival {
        let offset = seq.distance_from(self.base);
        if offset >= HALF_RANGE {
            return Arrival::Duplicate;
        }

        let offset = offset as usize;
        let arrival = if offset < self.ring.len() {
            match self.ring[offset] {
                Slot::Hole(_) => {
                    self.ring[offset] = Slot::Received(now);
                    Arrival::New
                }
                Slot::Received(_) => Arrival::Duplicate,
            }
        } else {
            while self.ring.len() < offset {
                self.ring.push_back(Slot::Hole(now));
            }
            self.ring.push_back(Slot::Received(now));
            Arrival::New
        };

        self.advance(now);
        arrival
    }

    /// Pops received slots and expired holes off the front, moving the base.
    fn advance(&mut self, now: Instant) {
        while let Some(&front) = self.ring.front() {
            let expired = now.saturating_duration_since(front.since()) > self.timeout;
            if !matches!(front, Slot::Received(_)) && !expired {
                break;
            }
            self.ring.pop_front();
            self.base = self.base.next();
        }
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

#[cfg(test)]
impl ReceivedLog {
    fn base(&self) -> SequenceNumber {
        self.base
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> ReceivedLog {
        ReceivedLog::new(Duration::from_secs(10), 8)
    }

    #[test]
    fn in_order_arrivals_advance_base() {
        let now = Instant::now();
        let mut log = log();
        for n in 0..5 {
            assert_eq!(log.record(SequenceNumber::new(n), now), Arrival::New);
        }
        assert_eq!(log.base().value(), 5);
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn repeated_number_is_duplicate() {
        let now = Instant::now();
        let mut log = log();
        assert_eq!(log.record(SequenceNumber::new(0), now), Arrival::New);
        assert_eq!(log.record(SequenceNumber::new(0), now), Arrival::Duplicate);
    }

    #[test]
    fn gap_is_filled_once() {
        let now = Instant::now();
        let mut log = log();
        assert_eq!(log.record(SequenceNumber::new(3), now), Arrival::New);
        assert_eq!(log.base().value(), 0);
        assert_eq!(log.holes(), 3);

        assert_eq!(log.record(SequenceNumber::new(3), now), Arrival::Duplicate);
        assert_eq!(log.record(SequenceNumber::new(1), now), Arrival::New);
        assert_eq!(log.record(SequenceNumber::new(1), now), Arrival::Duplicate);
        assert_eq!(log.record(SequenceNumber::new(0), now), Arrival::New);
        assert_eq!(log.base().value(), 2);
        assert_eq!(log.record(SequenceNumber::new(2), now), Arrival::New);
        assert_eq!(log.base().value(), 4);
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn expired_holes_release_the_base() {
        let start = Instant::now();
        let mut log = log();
        log.record(SequenceNumber::new(2), start);
        assert_eq!(log.base().value(), 0);

        let later = start + Duration::from_secs(11);
        assert_eq!(log.record(SequenceNumber::new(3), later), Arrival::New);
        assert_eq!(log.base().value(), 4);
        // anything behind the base now counts as seen
        assert_eq!(log.record(SequenceNumber::new(1), later), Arrival::Duplicate);
    }

    #[test]
    fn tracks_across_wraparound() {
        let now = Instant::now();
        let mut log = log();
        log.base = SequenceNumber::new(u16::MAX - 1);
        assert_eq!(log.record(SequenceNumber::new(0), now), Arrival::New);
        assert_eq!(log.record(SequenceNumber::new(u16::MAX - 1), now), Arrival::New);
        assert_eq!(log.record(SequenceNumber::new(u16::MAX), now), Arrival::New);
        assert_eq!(log.base().value(), 1);
        assert_eq!(log.record(SequenceNumber::new(u16::MAX), now), Arrival::Duplicate);
    }
}
