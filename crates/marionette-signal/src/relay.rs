//! Reference signaling relay - naive fanout
//!
//! Forwards every line it receives to every connected client, the sender
//! included; echo suppression is the client's job. This is the relay the
//! integration tests negotiate through, and a usable single-binary relay
//! for two-peer deployments. It keeps no session state and inspects no
//! payloads.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use marionette_core::{MarionetteError, MarionetteResult};

/// Fanout buffer depth; negotiation exchanges a handful of envelopes
const FANOUT_CAPACITY: usize = 64;

/// Naive fanout relay
pub struct SignalingRelay {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SignalingRelay {
    /// Bind the relay to a local address
    pub async fn bind(addr: SocketAddr) -> MarionetteResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;

        Ok(SignalingRelay {
            listener,
            local_addr,
        })
    }

    /// Bound address (useful when binding to port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and fan out forever
    pub async fn run(self) {
        let (fanout, _) = broadcast::channel::<String>(FANOUT_CAPACITY);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("relay accept error: {}", e);
                    continue;
                }
            };
            tracing::debug!(%peer, "relay client connected");
            Self::serve_client(stream, fanout.clone());
        }
    }

    fn serve_client(stream: TcpStream, fanout: broadcast::Sender<String>) {
        let (read_half, mut write_half) = stream.into_split();
        let outbound = fanout.subscribe();

        // Inbound: every line this client sends enters the fanout.
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if fanout.send(line).is_err() {
                    break;
                }
            }
        });

        // Outbound: every fanout line goes to this client.
        tokio::spawn(async move {
            let mut outbound = outbound;
            loop {
                match outbound.recv().await {
                    Ok(mut line) => {
                        line.push('\n');
                        if write_half.write_all(line.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("relay client lagged, skipped {} lines", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_fanout_includes_sender() {
        let relay = SignalingRelay::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = relay.local_addr();
        tokio::spawn(relay.run());

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();

        a.write_all(b"hello\n").await.unwrap();

        // Both clients receive the line - the relay echoes to everyone.
        let mut buf = [0u8; 6];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");

        a.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }
}
