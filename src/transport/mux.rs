use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Update timer for the muxer. A late tick is skipped rather than bursted;
/// sessions read the clock themselves so nothing is lost.
pub(crate) fn new_tick_interval(period: Duration) -> Interval {
    let mut tick = interval(period.max(Duration::from_millis(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

/// Writes frames to the socket. Send failures are logged and dropped, the
/// reliability layer repairs whatever mattered.
pub(crate) async fn flush(socket: &UdpSocket, frames: Vec<(SocketAddr, Bytes)>) {
    for (peer, frame) in frames {
        if let Err(e) = socket.send_to(&frame, peer).await {
            tracing::debug!(peer = %peer, error = %e, "send_to failed");
        }
    }
}
