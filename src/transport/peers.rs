use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;

use crate::error::TransportError;
use crate::protocol::{packet::DecodeError, state::DisconnectReason};
use crate::session::{ReceivedMessage, Session, SessionConfig, Statistics};
use crate::transport::Message;

/// Something the owner of a [`PeerTable`] should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The session died or was destroyed; its state is gone.
    Lost {
        peer: SocketAddr,
        reason: DisconnectReason,
    },
    /// A datagram from this peer had a malformed entry. Entries before it
    /// were processed.
    Malformed { peer: SocketAddr, error: DecodeError },
}

/// Connection state for every known peer, keyed by address.
///
/// Socket-agnostic: datagrams go in through [`on_datagram`](Self::on_datagram)
/// and frames to send come out of [`tick`](Self::tick).
#[derive(Debug)]
pub struct PeerTable {
    config: SessionConfig,
    sessions: HashMap<SocketAddr, Session>,
    received: VecDeque<(SocketAddr, ReceivedMessage)>,
    events: VecDeque<PeerEvent>,
}

impl PeerTable {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            received: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.sessions.contains_key(peer)
    }

    /// Creates connection state for `peer`. Returns false if it already exists.
    pub fn create(&mut self, peer: SocketAddr, now: Instant) -> bool {
        if self.sessions.contains_key(&peer) {
            return false;
        }
        tracing::debug!(peer = %peer, mtu = self.config.mtu, "create_session");
        self.sessions
            .insert(peer, Session::new(self.config.clone(), now));
        true
    }

    /// Drops the connection state for `peer` and reports it as closed locally.
    pub fn destroy(&mut self, peer: SocketAddr) -> bool {
        let Some(mut session) = self.sessions.remove(&peer) else {
            return false;
        };
        tracing::debug!(peer = %peer, "destroy_session");
        session.close();
        self.events.push_back(PeerEvent::Lost {
            peer,
            reason: DisconnectReason::ClosedLocally,
        });
        true
    }

    /// Marks the session dead; it is removed on the next [`tick`](Self::tick).
    pub fn kill(&mut self, peer: SocketAddr) -> bool {
        match self.sessions.get_mut(&peer) {
            Some(session) => {
                session.kill();
                true
            }
            None => false,
        }
    }

    pub fn session(&self, peer: &SocketAddr) -> Option<&Session> {
        self.sessions.get(peer)
    }

    pub fn session_mut(&mut self, peer: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(peer)
    }

    pub fn statistics(&self, peer: &SocketAddr) -> Option<Statistics> {
        self.sessions.get(peer).map(Session::statistics)
    }

    /// Queues `msg` for `peer`.
    ///
    /// Only a missing peer is an error here. A message the session refuses is
    /// logged and dropped so that one bad send cannot fail the caller's loop.
    pub fn send(&mut self, peer: SocketAddr, msg: Message) -> Result<(), TransportError> {
        let session = self
            .sessions
            .get_mut(&peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        if let Err(e) = session.send(msg.buffer, msg.priority, msg.reliability, msg.channel) {
            tracing::warn!(peer = %peer, error = %e, "send dropped");
        }
        tracing::trace!(peer = %peer, "outbound queued");
        Ok(())
    }

    /// Routes one datagram to its session. Datagrams from unknown peers are
    /// ignored.
    pub fn on_datagram(&mut self, peer: SocketAddr, data: Bytes, now: Instant) {
        let Some(session) = self.sessions.get_mut(&peer) else {
            tracing::trace!(peer = %peer, bytes = data.len(), "datagram from unknown peer");
            return;
        };
        if let Err(error) = session.handle_datagram(data, now) {
            tracing::debug!(peer = %peer, error = %error, "failed to decode datagram");
            self.events.push_back(PeerEvent::Malformed { peer, error });
        }
        while let Some(msg) = session.receive() {
            self.received.push_back((peer, msg));
        }
    }

    /// Updates every session and returns the frames to put on the wire.
    /// Sessions that died are removed and reported through
    /// [`poll_event`](Self::poll_event).
    pub fn tick(&mut self, now: Instant) -> Vec<(SocketAddr, Bytes)> {
        let mut out = Vec::new();
        let mut dead = Vec::new();

        for (&peer, session) in self.sessions.iter_mut() {
            out.extend(session.update(now).into_iter().map(|frame| (peer, frame)));
            if let Some(reason) = session.disconnect_reason() {
                dead.push((peer, reason));
            }
        }

        for (peer, reason) in dead {
            self.sessions.remove(&peer);
            tracing::debug!(peer = %peer, reason = %reason, "session removed");
            self.events.push_back(PeerEvent::Lost { peer, reason });
        }
        out
    }

    /// Next completed message from any peer.
    pub fn receive(&mut self) -> Option<(SocketAddr, ReceivedMessage)> {
        self.received.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<PeerEvent> {
        self.events.pop_front()
    }
}
