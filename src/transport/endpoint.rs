use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TransportError;
use crate::protocol::{
    constants::{DEFAULT_TICK_INTERVAL, MAXIMUM_MTU_SIZE},
    state::DisconnectReason,
};
use crate::session::{ReceivedMessage, SessionConfig, Statistics};
use crate::transport::{
    Message,
    mux::{flush, new_tick_interval},
    peers::{PeerEvent, PeerTable},
};

type SharedPeers = Arc<RwLock<HashSet<SocketAddr>>>;

/// Settings for [`Endpoint::bind`].
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub bind: SocketAddr,
    /// How often every session is updated.
    pub tick_interval: Duration,
    pub command_capacity: usize,
    pub event_capacity: usize,
    /// Kill a peer's session as soon as it sends a malformed datagram.
    pub close_on_malformed: bool,
    pub session: SessionConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            tick_interval: DEFAULT_TICK_INTERVAL,
            command_capacity: 1024,
            event_capacity: 1024,
            close_on_malformed: false,
            session: SessionConfig::default(),
        }
    }
}

impl EndpointConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Self::default()
        }
    }

    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn close_on_malformed(mut self, close: bool) -> Self {
        self.close_on_malformed = close;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// What the muxer reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message {
        peer: SocketAddr,
        message: ReceivedMessage,
    },
    /// Fired once per connection when its state is removed.
    Disconnected {
        peer: SocketAddr,
        reason: DisconnectReason,
    },
}

enum Command {
    AddPeer(SocketAddr),
    RemovePeer(SocketAddr),
    Send {
        peer: SocketAddr,
        message: Message,
    },
    Statistics {
        peer: SocketAddr,
        reply: oneshot::Sender<Option<Statistics>>,
    },
    Shutdown,
}

/// A UDP socket carrying reliability sessions for any number of peers.
///
/// All session state lives in one background task; this handle and its
/// [`EndpointHandle`] clones talk to it over channels.
pub struct Endpoint {
    local_addr: SocketAddr,
    handle: EndpointHandle,
    events: mpsc::Receiver<Event>,
    task: JoinHandle<()>,
}

impl Endpoint {
    /// Binds the socket and spawns the muxer task.
    pub async fn bind(config: EndpointConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind).await?;
        let local_addr = socket.local_addr()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let peers: SharedPeers = Arc::new(RwLock::new(HashSet::new()));

        tracing::info!(addr = %local_addr, mtu = config.session.mtu, "endpoint bound");
        let task = tokio::spawn(run_endpoint_muxer(
            socket,
            config,
            command_rx,
            event_tx,
            peers.clone(),
        ));

        Ok(Self {
            local_addr,
            handle: EndpointHandle {
                commands: command_tx,
                peers,
            },
            events: event_rx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A cloneable handle for sending from other tasks.
    pub fn handle(&self) -> EndpointHandle {
        self.handle.clone()
    }

    pub async fn add_peer(&self, peer: SocketAddr) -> Result<(), TransportError> {
        self.handle.add_peer(peer).await
    }

    pub async fn remove_peer(&self, peer: SocketAddr) -> Result<(), TransportError> {
        self.handle.remove_peer(peer).await
    }

    pub async fn send(
        &self,
        peer: SocketAddr,
        msg: impl Into<Message>,
    ) -> Result<(), TransportError> {
        self.handle.send(peer, msg).await
    }

    /// Waits for the next event. `None` once the muxer has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Stops the muxer and waits for it to exit. Queued data is not flushed.
    pub async fn shutdown(self) {
        let _ = self.handle.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "endpoint task failed");
        }
    }
}

/// Sending side of an [`Endpoint`].
#[derive(Clone)]
pub struct EndpointHandle {
    commands: mpsc::Sender<Command>,
    peers: SharedPeers,
}

impl EndpointHandle {
    /// Creates connection state for `peer`. Adding a known peer is a no-op.
    pub async fn add_peer(&self, peer: SocketAddr) -> Result<(), TransportError> {
        if let Ok(mut guard) = self.peers.write() {
            guard.insert(peer);
        }
        self.command(Command::AddPeer(peer)).await
    }

    /// Drops the connection state for `peer`; a `Disconnected` event follows.
    pub async fn remove_peer(&self, peer: SocketAddr) -> Result<(), TransportError> {
        if let Ok(mut guard) = self.peers.write() {
            guard.remove(&peer);
        }
        self.command(Command::RemovePeer(peer)).await
    }

    pub fn is_connected(&self, peer: &SocketAddr) -> bool {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(peer)
    }

    /// Queues a message for `peer`. Waits only while the command queue is
    /// full; the message goes out on the next tick.
    pub async fn send(
        &self,
        peer: SocketAddr,
        msg: impl Into<Message>,
    ) -> Result<(), TransportError> {
        let message = msg.into();
        if !self.is_connected(&peer) {
            return Err(TransportError::UnknownPeer(peer));
        }
        message.validate()?;
        self.command(Command::Send { peer, message }).await
    }

    /// Snapshot of a peer's session counters.
    pub async fn statistics(&self, peer: SocketAddr) -> Result<Option<Statistics>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Statistics { peer, reply }).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    async fn command(&self, cmd: Command) -> Result<(), TransportError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

async fn run_endpoint_muxer(
    socket: UdpSocket,
    config: EndpointConfig,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
    peers: SharedPeers,
) {
    // peers may run a larger mtu than ours
    let mut buf = vec![0u8; MAXIMUM_MTU_SIZE + 64];
    let mut table = PeerTable::new(config.session.clone());
    let mut tick = new_tick_interval(config.tick_interval);

    loop {
        tokio::select! {
            res = socket.recv_from(&mut buf) => {
                match res {
                    Ok((len, peer)) => {
                        table.on_datagram(peer, Bytes::copy_from_slice(&buf[..len]), Instant::now());
                    }
                    Err(e) => {
                        if e.kind() == std::io::ErrorKind::ConnectionReset {
                            // ICMP port unreachable on some platforms
                            continue;
                        }
                        tracing::error!("UDP socket error: {}", e);
                        continue;
                    }
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(Command::AddPeer(peer)) => {
                        table.create(peer, Instant::now());
                    }
                    Some(Command::RemovePeer(peer)) => {
                        table.destroy(peer);
                    }
                    Some(Command::Send { peer, message }) => {
                        if let Err(e) = table.send(peer, message) {
                            tracing::debug!(peer = %peer, error = %e, "send for removed peer dropped");
                        }
                    }
                    Some(Command::Statistics { peer, reply }) => {
                        let _ = reply.send(table.statistics(&peer));
                    }
                    Some(Command::Shutdown) | None => break,
                }
            }

            _ = tick.tick() => {
                let frames = table.tick(Instant::now());
                flush(&socket, frames).await;
            }
        }

        if !forward_events(&mut table, &events, &peers, config.close_on_malformed).await {
            break;
        }
    }
    tracing::debug!(peers = table.len(), "endpoint muxer stopped");
}

/// Hands completed messages and connection events to the application.
/// Returns false once the application side is gone.
async fn forward_events(
    table: &mut PeerTable,
    events: &mpsc::Sender<Event>,
    peers: &SharedPeers,
    close_on_malformed: bool,
) -> bool {
    while let Some((peer, message)) = table.receive() {
        if events.send(Event::Message { peer, message }).await.is_err() {
            return false;
        }
    }
    while let Some(event) = table.poll_event() {
        match event {
            PeerEvent::Lost { peer, reason } => {
                if let Ok(mut guard) = peers.write() {
                    guard.remove(&peer);
                }
                tracing::info!(peer = %peer, reason = %reason, "connection lost");
                if events.send(Event::Disconnected { peer, reason }).await.is_err() {
                    return false;
                }
            }
            PeerEvent::Malformed { peer, error } => {
                if close_on_malformed {
                    tracing::debug!(peer = %peer, error = %error, "closing after malformed datagram");
                    table.kill(peer);
                }
            }
        }
    }
    true
}
