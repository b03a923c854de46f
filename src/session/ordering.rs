use std::collections::HashMap;

use crate::protocol::{
    constants::NUMBER_OF_ORDERED_STREAMS, reliability::Reliability, types::OrderingIndex,
};

/// How an ordered arrival was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderedArrival {
    /// Matched the expected index; it and `released` buffered followers were delivered.
    InOrder { released: usize },
    /// Ahead of the expected index; held until the gap fills.
    Buffered,
    /// Behind the expected index, or already waiting.
    Stale,
}

#[derive(Debug)]
struct Channel<T> {
    ordered_write: OrderingIndex,
    sequenced_write: OrderingIndex,
    ordered_read: OrderingIndex,
    sequenced_read: OrderingIndex,
    waiting: HashMap<OrderingIndex, T>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            ordered_write: OrderingIndex::default(),
            sequenced_write: OrderingIndex::default(),
            ordered_read: OrderingIndex::default(),
            sequenced_read: OrderingIndex::default(),
            waiting: HashMap::new(),
        }
    }
}

/// Per-channel ordered and sequenced counters for both directions, plus the
/// wait lists of ordered messages that arrived early.
#[derive(Debug)]
pub struct OrderingTracker<T> {
    channels: Vec<Channel<T>>,
}

impl<T> Default for OrderingTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderingTracker<T> {
    pub fn new() -> Self {
        Self {
            channels: (0..NUMBER_OF_ORDERED_STREAMS)
                .map(|_| Channel::default())
                .collect(),
        }
    }

    /// Assigns the next outgoing index for `reliability` on `channel`.
    /// Sequenced modes share one counter, ordered uses the other.
    pub fn next_write_index(&mut self, reliability: Reliability, channel: u8) -> OrderingIndex {
        let ch = &mut self.channels[channel as usize];
        if reliability.is_sequenced() {
            ch.sequenced_write.take_next()
        } else {
            ch.ordered_write.take_next()
        }
    }

    pub fn sequenced_read(&self, channel: u8) -> OrderingIndex {
        self.channels[channel as usize].sequenced_read
    }

    pub fn is_sequenced_stale(&self, channel: u8, index: OrderingIndex) -> bool {
        index.is_older_than(self.sequenced_read(channel))
    }

    /// Accepts a sequenced arrival unless something newer already got through.
    pub fn accept_sequenced(&mut self, channel: u8, index: OrderingIndex) -> bool {
        let ch = &mut self.channels[channel as usize];
        if index.is_older_than(ch.sequenced_read) {
            return false;
        }
        ch.sequenced_read = index.next();
        true
    }

    /// Feeds one ordered arrival, handing every message that becomes
    /// deliverable to `deliver` in channel order.
    pub fn accept_ordered(
        &mut self,
        channel: u8,
        index: OrderingIndex,
        item: T,
        mut deliver: impl FnMut(T),
    ) -> OrderedArrival {
        let ch = &mut self.channels[channel as usize];
        if index == ch.ordered_read {
            ch.ordered_read = ch.ordered_read.next();
            deliver(item);

            let mut released = 0;
            while let Some(next) = ch.waiting.remove(&ch.ordered_read) {
                ch.ordered_read = ch.ordered_read.next();
                released += 1;
                deliver(next);
            }
            return OrderedArrival::InOrder { released };
        }

        if index.is_older_than(ch.ordered_read) || ch.waiting.contains_key(&index) {
            return OrderedArrival::Stale;
        }
        ch.waiting.insert(index, item);
        OrderedArrival::Buffered
    }

    /// Messages buffered across all channels.
    pub fn waiting(&self) -> usize {
        self.channels.iter().map(|ch| ch.waiting.len()).sum()
    }

    /// Drops buffered messages; counters are kept.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.waiting.clear();
        }
    }
}
