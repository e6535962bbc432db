//! Signaling client - one persistent relay connection per session
//!
//! Envelopes are newline-delimited JSON over TCP. The read side runs as a
//! background task that parses lines, drops self-echoes, and hands remote
//! signals to the session layer through a channel; the channel closing is
//! the terminal "relay is gone" signal.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use marionette_core::{MarionetteError, MarionetteResult, SessionToken};

use crate::{decode_envelope, encode_envelope, RemoteSignal, Signal};

/// Remote-signal receiver handed to the session layer.
/// `recv()` returning `None` means the relay connection closed.
pub type SignalReceiver = mpsc::Receiver<RemoteSignal>;

/// Client side of the signaling relay connection
pub struct SignalingClient {
    token: SessionToken,
    writer: Mutex<OwnedWriteHalf>,
}

impl SignalingClient {
    /// Connect to the relay and assign a fresh session token.
    ///
    /// Returns the client plus the stream of remote signals (self-echoes
    /// already filtered out).
    pub async fn connect(relay_addr: SocketAddr) -> MarionetteResult<(Self, SignalReceiver)> {
        let stream = TcpStream::connect(relay_addr)
            .await
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;

        let token = SessionToken::generate();
        let (read_half, write_half) = stream.into_split();
        let receiver = start_receive_loop(read_half, token.clone(), 64);

        tracing::info!(token = %token, relay = %relay_addr, "signaling connected");

        Ok((
            SignalingClient {
                token,
                writer: Mutex::new(write_half),
            },
            receiver,
        ))
    }

    /// This peer's token on the relay
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Send one envelope. Best-effort: a write failure means the relay
    /// connection is gone and the session must be restarted.
    pub async fn send(&self, signal: &Signal) -> MarionetteResult<()> {
        let mut line = encode_envelope(&self.token, signal);
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|_| MarionetteError::SignalingClosed)?;
        Ok(())
    }

    /// Close the relay connection.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Start the background read loop. The returned receiver yields remote
/// signals until the relay connection drops.
fn start_receive_loop(
    read_half: OwnedReadHalf,
    local_token: SessionToken,
    buffer_size: usize,
) -> SignalReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let remote = match decode_envelope(&line) {
                        Ok(remote) => remote,
                        Err(e) => {
                            tracing::warn!("discarding bad envelope: {}", e);
                            continue;
                        }
                    };
                    // Ignore messages from ourselves; the relay fans out
                    // to every client, sender included.
                    if remote.from == local_token {
                        continue;
                    }
                    if tx.send(remote).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Ok(None) => {
                    tracing::warn!("signaling connection closed by relay");
                    break;
                }
                Err(e) => {
                    tracing::warn!("signaling read error: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionDescription, SignalingRelay};

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let relay = SignalingRelay::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let relay_addr = relay.local_addr();
        tokio::spawn(relay.run());

        let (alice, _alice_rx) = SignalingClient::connect(relay_addr).await.unwrap();
        let (bob, mut bob_rx) = SignalingClient::connect(relay_addr).await.unwrap();

        alice
            .send(&Signal::Description(SessionDescription::offer()))
            .await
            .unwrap();

        let received = bob_rx.recv().await.unwrap();
        assert_eq!(received.from, *alice.token());
        assert!(matches!(received.signal, Signal::Description(_)));

        drop(bob);
    }

    #[tokio::test]
    async fn test_self_echo_suppressed() {
        let relay = SignalingRelay::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let relay_addr = relay.local_addr();
        tokio::spawn(relay.run());

        let (alice, mut alice_rx) = SignalingClient::connect(relay_addr).await.unwrap();
        let (bob, mut bob_rx) = SignalingClient::connect(relay_addr).await.unwrap();

        alice
            .send(&Signal::Description(SessionDescription::offer()))
            .await
            .unwrap();

        // Bob sees it; Alice must not see her own echo.
        assert!(bob_rx.recv().await.is_some());
        bob.send(&Signal::Description(SessionDescription::answer()))
            .await
            .unwrap();

        let next = alice_rx.recv().await.unwrap();
        assert_eq!(next.from, *bob.token());
        assert!(matches!(
            next.signal,
            Signal::Description(SessionDescription {
                kind: crate::SdpKind::Answer,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_relay_drop_closes_receiver() {
        // A "relay" that hangs up immediately after accepting.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let (_client, mut rx) = SignalingClient::connect(addr).await.unwrap();

        // With the relay gone, the receive loop terminates and the channel
        // yields None - the terminal ConnectionClosed condition.
        assert!(rx.recv().await.is_none());
    }
}
