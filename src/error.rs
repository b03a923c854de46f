use std::net::SocketAddr;

use thiserror::Error;

use crate::session::SendError;

/// Errors surfaced by the peer table and the endpoint handle.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Sends are only accepted for peers with active connection state.
    #[error("No connection state for peer {0}.")]
    UnknownPeer(SocketAddr),

    #[error("The endpoint has shut down.")]
    Closed,

    #[error(transparent)]
    Send(#[from] SendError),
}
