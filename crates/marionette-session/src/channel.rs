//! Peer channel - the direct UDP link the negotiation opens
//!
//! Datagrams are either single-byte control messages (probe/bye) or slot
//! message payloads from the wire crate. A slot message is at least six
//! bytes, so one-byte control datagrams are unambiguous.
//!
//! Readiness: the caller probes once it knows a remote path; the first
//! datagram seen from the peer (usually that probe, or its reply) flips the
//! channel open on both ends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use marionette_core::{MarionetteError, MarionetteResult};

/// Probe datagram - "is anyone there" / "yes, I am"
const CONTROL_PROBE: u8 = 0xFF;

/// Bye datagram - orderly close
const CONTROL_BYE: u8 = 0xFE;

/// Largest datagram the channel will accept
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Counter name the stats sampler monitors by default
pub const STAT_BYTES_RECEIVED: &str = "bytes_received";

/// Counter name for the send direction
pub const STAT_BYTES_SENT: &str = "bytes_sent";

/// Events surfaced by the channel receive loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// First contact with the peer - the channel is usable
    Ready,
    /// One data payload (a slot message)
    Message(Vec<u8>),
    /// Peer said bye or the socket died
    Closed,
}

/// Transport-level byte counters, polled by the stats sampler
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// UDP peer channel
pub struct PeerChannel {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    remote: Mutex<Option<SocketAddr>>,
    open: AtomicBool,
    closed: AtomicBool,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl PeerChannel {
    /// Bind the channel endpoint to a local address
    pub async fn bind(addr: SocketAddr) -> MarionetteResult<Arc<Self>> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;

        Ok(Arc::new(PeerChannel {
            socket: Arc::new(socket),
            local_addr,
            remote: Mutex::new(None),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }))
    }

    /// Local endpoint address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Point the channel at a candidate path. The first candidate wins
    /// once the channel is open; before that, the latest one is used.
    pub fn set_remote(&self, addr: SocketAddr) {
        let mut remote = self.remote.lock();
        if self.open.load(Ordering::Acquire) && remote.is_some() {
            return;
        }
        *remote = Some(addr);
    }

    /// Configured remote path, if any
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.lock()
    }

    /// Channel is usable for frame traffic
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }

    /// Channel has been closed (locally or by the peer) and will not reopen
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of the byte counters
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    /// Send a probe toward the configured remote (caller side)
    pub async fn probe(&self) -> MarionetteResult<()> {
        let Some(remote) = self.remote() else {
            return Ok(()); // No path yet; the next candidate will trigger one
        };
        self.socket
            .send_to(&[CONTROL_PROBE], remote)
            .await
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;
        Ok(())
    }

    /// Send one data payload to the peer
    pub async fn send_bytes(&self, bytes: &[u8]) -> MarionetteResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MarionetteError::ChannelClosed);
        }
        let remote = self.remote().ok_or(MarionetteError::ChannelClosed)?;

        self.socket
            .send_to(bytes, remote)
            .await
            .map_err(|e| MarionetteError::TransportError(e.to_string()))?;
        self.bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Orderly close: tell the peer bye, then stop accepting sends.
    /// Idempotent - closing a closed channel is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(remote) = self.remote() {
            let _ = self.socket.send_to(&[CONTROL_BYE], remote).await;
        }
        self.open.store(false, Ordering::Release);

        // Nudge our own receive loop so it observes the closed flag
        // instead of blocking on a socket nothing will write to again.
        let mut wake_addr = self.local_addr;
        if wake_addr.ip().is_unspecified() {
            wake_addr.set_ip(std::net::IpAddr::from([127, 0, 0, 1]));
        }
        let _ = self.socket.send_to(&[CONTROL_BYE], wake_addr).await;
    }

    /// Start the background receive loop.
    ///
    /// Mirrors the send side of readiness: on the first datagram from the
    /// peer the channel flips open, emits `Ready`, and answers a probe so
    /// the other end opens too.
    pub fn start_receive_loop(self: &Arc<Self>, buffer_size: usize) -> mpsc::Receiver<ChannelEvent> {
        let (tx, rx) = mpsc::channel(buffer_size);
        let channel = Arc::clone(self);

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, from) = match channel.socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!("channel receive error: {}", e);
                        let _ = tx.send(ChannelEvent::Closed).await;
                        break;
                    }
                };

                if channel.closed.load(Ordering::Acquire) {
                    break;
                }

                // Adopt the peer's observed address if negotiation has not
                // supplied one yet (receiver side, lazy endpoint).
                {
                    let mut remote = channel.remote.lock();
                    if remote.is_none() {
                        *remote = Some(from);
                    } else if *remote != Some(from) {
                        drop(remote);
                        tracing::debug!(%from, "dropping datagram from unexpected source");
                        continue;
                    }
                }

                let newly_open = !channel.open.swap(true, Ordering::AcqRel);
                if newly_open {
                    // Answer so the peer's first contact also opens them.
                    let _ = channel.socket.send_to(&[CONTROL_PROBE], from).await;
                    if tx.send(ChannelEvent::Ready).await.is_err() {
                        break;
                    }
                }

                match &buf[..len] {
                    [CONTROL_PROBE] => continue,
                    [CONTROL_BYE] => {
                        channel.open.store(false, Ordering::Release);
                        channel.closed.store(true, Ordering::Release);
                        let _ = tx.send(ChannelEvent::Closed).await;
                        break;
                    }
                    _ => {
                        channel
                            .bytes_received
                            .fetch_add(len as u64, Ordering::Relaxed);
                        if tx.send(ChannelEvent::Message(buf[..len].to_vec())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pair() -> (Arc<PeerChannel>, Arc<PeerChannel>) {
        let a = PeerChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = PeerChannel::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        a.set_remote(b.local_addr());
        b.set_remote(a.local_addr());
        (a, b)
    }

    #[tokio::test]
    async fn test_probe_opens_both_ends() {
        let (a, b) = pair().await;
        let mut a_events = a.start_receive_loop(8);
        let mut b_events = b.start_receive_loop(8);

        a.probe().await.unwrap();

        assert_eq!(b_events.recv().await.unwrap(), ChannelEvent::Ready);
        assert_eq!(a_events.recv().await.unwrap(), ChannelEvent::Ready);
        assert!(a.is_open());
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn test_message_counts_bytes() {
        let (a, b) = pair().await;
        let mut b_events = b.start_receive_loop(8);
        let _a_events = a.start_receive_loop(8);

        a.probe().await.unwrap();
        assert_eq!(b_events.recv().await.unwrap(), ChannelEvent::Ready);

        a.send_bytes(&[1, 2, 3, 4, 5, 6, 7]).await.unwrap();
        assert_eq!(
            b_events.recv().await.unwrap(),
            ChannelEvent::Message(vec![1, 2, 3, 4, 5, 6, 7])
        );

        assert_eq!(a.stats().bytes_sent, 7);
        assert_eq!(b.stats().bytes_received, 7);
    }

    #[tokio::test]
    async fn test_bye_closes_peer() {
        let (a, b) = pair().await;
        let mut b_events = b.start_receive_loop(8);
        let _a_events = a.start_receive_loop(8);

        a.probe().await.unwrap();
        assert_eq!(b_events.recv().await.unwrap(), ChannelEvent::Ready);

        a.close().await;
        assert_eq!(b_events.recv().await.unwrap(), ChannelEvent::Closed);
        assert!(!b.is_open());

        // Sends after close fail cleanly.
        assert!(matches!(
            a.send_bytes(&[0; 8]).await,
            Err(MarionetteError::ChannelClosed)
        ));
    }
}
