//! Tokio-based UDP transport for reliability sessions.
//!
//! - `PeerTable`: synchronous map from peer address to `Session`, usable
//!   with any socket.
//! - `Endpoint` / `EndpointHandle`: one `UdpSocket` and one muxer task that
//!   owns the table; the application only exchanges messages with it.
//!
//! Connection establishment is not handled here: peers are added and removed
//! explicitly by whatever handshake sits on top.

use bytes::Bytes;

use crate::protocol::{
    constants::NUMBER_OF_ORDERED_STREAMS,
    reliability::{Priority, Reliability},
};
use crate::session::SendError;

pub mod endpoint;
pub mod frame;
pub mod internal_packet;
mod mux;
pub mod peers;

pub use endpoint::{Endpoint, EndpointConfig, EndpointHandle, Event};
pub use peers::{PeerEvent, PeerTable};

/// High-level message object for sending data.
/// Wraps the payload and delivery options (reliability, channel, priority).
#[derive(Debug, Clone)]
pub struct Message {
    pub buffer: Bytes,
    pub reliability: Reliability,
    pub channel: u8,
    pub priority: Priority,
}

impl Message {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        Self {
            buffer: buffer.into(),
            reliability: Reliability::ReliableOrdered,
            channel: 0,
            priority: Priority::Medium,
        }
    }

    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Checks what can be checked before the message reaches a session.
    pub fn validate(&self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        if self.channel >= NUMBER_OF_ORDERED_STREAMS {
            return Err(SendError::InvalidChannel(self.channel));
        }
        Ok(())
    }
}

impl From<Bytes> for Message {
    fn from(buffer: Bytes) -> Self {
        Self::new(buffer)
    }
}

impl From<Vec<u8>> for Message {
    fn from(vec: Vec<u8>) -> Self {
        Self::new(vec)
    }
}

impl From<&'static [u8]> for Message {
    fn from(slice: &'static [u8]) -> Self {
        Self::new(Bytes::from(slice))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::new(Bytes::from(s))
    }
}
