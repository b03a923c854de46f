//! Reliable UDP on top of Tokio.
//!
//! The [`session`] module holds the per-connection reliability layer: acks,
//! retransmission, ordered and sequenced channels, split packets and a
//! loss-driven send window. It is synchronous and clock-free so it can be
//! driven from any scheduler.
//!
//! The [`transport`] module multiplexes many sessions over one `UdpSocket`:
//! a single muxer task owns every session and the application talks to it
//! through channels.

pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::TransportError;
pub use protocol::reliability::{Priority, Reliability};
pub use protocol::state::DisconnectReason;
pub use session::{ReceivedMessage, SendError, Session, SessionConfig, Statistics};
pub use transport::{Endpoint, EndpointConfig, EndpointHandle, Event, Message, PeerTable};
