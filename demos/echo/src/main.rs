use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio_rakudp::{Endpoint, EndpointConfig, Event, Priority, Reliability, SessionConfig};
use tokio_rakudp::transport::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let loopback: SocketAddr = "127.0.0.1:0".parse()?;
    let session = SessionConfig::new().mtu(1200);

    let mut server = Endpoint::bind(EndpointConfig::new(loopback).session(session.clone())).await?;
    let mut client = Endpoint::bind(EndpointConfig::new(loopback).session(session)).await?;
    let server_addr = server.local_addr();
    let client_addr = client.local_addr();
    println!("Echo server on {}, client on {}", server_addr, client_addr);

    // No handshake: both sides register each other up front.
    server.add_peer(client_addr).await?;
    client.add_peer(server_addr).await?;

    let server_task = tokio::spawn(async move {
        while let Some(event) = server.recv().await {
            match event {
                Event::Message { peer, message } => {
                    let reply = Message::new(message.payload)
                        .reliability(message.reliability)
                        .channel(message.channel);
                    if let Err(e) = server.send(peer, reply).await {
                        tracing::warn!(%peer, error = %e, "echo failed");
                    }
                }
                Event::Disconnected { peer, reason } => {
                    tracing::info!(%peer, %reason, "server side disconnected");
                    break;
                }
            }
        }
        server.shutdown().await;
    });

    let big = Bytes::from(vec![0xAB; 16 * 1024]);
    let outgoing = vec![
        Message::from("ordered hello"),
        Message::from("unreliable ping").reliability(Reliability::Unreliable),
        Message::from("sequenced state")
            .reliability(Reliability::UnreliableSequenced)
            .channel(3),
        Message::new(big).priority(Priority::Low),
        Message::from("urgent").priority(Priority::High),
    ];
    let expected = outgoing.len();
    for msg in outgoing {
        client.send(server_addr, msg).await?;
    }

    let mut echoed = 0;
    while echoed < expected {
        match tokio::time::timeout(Duration::from_secs(5), client.recv()).await {
            Ok(Some(Event::Message { message, .. })) => {
                echoed += 1;
                println!(
                    "[client] echo {}/{}: {} bytes, {:?} on channel {}",
                    echoed,
                    expected,
                    message.payload.len(),
                    message.reliability,
                    message.channel
                );
            }
            Ok(Some(Event::Disconnected { peer, reason })) => {
                tracing::info!(%peer, %reason, "client side disconnected");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(echoed, expected, "timed out waiting for echoes");
                break;
            }
        }
    }

    if let Some(stats) = client.handle().statistics(server_addr).await? {
        println!(
            "[client] frames sent {}, resends {}, acks received {}, window {}",
            stats.frames_sent, stats.messages_resent, stats.acks_received, stats.window_size
        );
    }

    client.remove_peer(server_addr).await?;
    client.shutdown().await;
    server_task.abort();
    println!("Done.");
    Ok(())
}
