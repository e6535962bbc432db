//! End-to-end negotiation through a live relay on loopback.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use marionette_core::{EpochMillis, PoseEstimate, Role};
use marionette_session::{ChannelEvent, NegotiationState, OpenSession, PeerSession, SessionConfig};
use marionette_signal::SignalingRelay;
use marionette_wire::{FrameGroup, GroupAssembler, SlotMessage};

const DEADLINE: Duration = Duration::from_secs(5);

async fn start_relay() -> SocketAddr {
    let relay = SignalingRelay::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = relay.local_addr();
    tokio::spawn(relay.run());
    addr
}

fn config(relay_addr: SocketAddr) -> SessionConfig {
    let mut config = SessionConfig::new(relay_addr);
    config.bind_addr = "127.0.0.1:0".parse().unwrap();
    config
}

async fn open_pair(relay_addr: SocketAddr, glare: bool) -> (OpenSession, OpenSession) {
    // The passive peer must be listening on the relay before the offer
    // goes out; connect it first.
    let receiver = PeerSession::connect(config(relay_addr)).await.unwrap();
    let mut caller = PeerSession::connect(config(relay_addr)).await.unwrap();

    caller.initiate().await.unwrap();
    let mut receiver = receiver;
    if glare {
        receiver.initiate().await.unwrap();
    }

    let (caller, receiver) = timeout(
        DEADLINE,
        futures_join(caller.wait_open(), receiver.wait_open()),
    )
    .await
    .expect("negotiation timed out");

    (caller.unwrap(), receiver.unwrap())
}

// tokio::join! in a helper fn form, to keep call sites tidy
async fn futures_join<A, B>(a: A, b: B) -> (A::Output, B::Output)
where
    A: std::future::Future,
    B: std::future::Future,
{
    tokio::join!(a, b)
}

#[tokio::test]
async fn single_initiator_reaches_open_on_both_sides() {
    let relay_addr = start_relay().await;
    let (caller, receiver) = open_pair(relay_addr, false).await;

    assert_eq!(caller.session.state, NegotiationState::Open);
    assert_eq!(receiver.session.state, NegotiationState::Open);
    assert_eq!(caller.session.role, Some(Role::Caller));
    assert_eq!(receiver.session.role, Some(Role::Receiver));

    // Exactly one channel: the pair of endpoints points at each other.
    assert_eq!(
        caller.channel.remote().unwrap(),
        receiver.channel.local_addr()
    );
    assert_eq!(
        receiver.channel.remote().unwrap(),
        caller.channel.local_addr()
    );
}

#[tokio::test]
async fn glare_resolves_to_one_caller_one_receiver() {
    let relay_addr = start_relay().await;
    let (a, b) = open_pair(relay_addr, true).await;

    assert_eq!(a.session.state, NegotiationState::Open);
    assert_eq!(b.session.state, NegotiationState::Open);

    // Token tie-break: one side kept Caller, the other yielded.
    let roles = (a.session.role.unwrap(), b.session.role.unwrap());
    assert!(
        roles == (Role::Caller, Role::Receiver) || roles == (Role::Receiver, Role::Caller),
        "glare must leave exactly one caller, got {:?}",
        roles
    );

    let winner_kept_caller = if a.session.token.outranks(&b.session.token) {
        a.session.role == Some(Role::Caller)
    } else {
        b.session.role == Some(Role::Caller)
    };
    assert!(winner_kept_caller, "lower token must keep the caller role");
}

#[tokio::test]
async fn frame_group_crosses_the_open_channel() {
    let relay_addr = start_relay().await;
    let (sender, mut receiver) = open_pair(relay_addr, false).await;

    let mut pose = PoseEstimate::empty(0.9);
    pose.keypoints[0].score = 0.8;
    pose.keypoints[0].position = marionette_core::Point2::new(120.0, 80.0);

    let group = FrameGroup::from_estimates(
        1,
        Some(&pose),
        None,
        EpochMillis::from_millis(1000),
        EpochMillis::from_millis(1020),
    );
    for message in group.into_messages() {
        sender.channel.send_bytes(&message.encode()).await.unwrap();
    }

    let mut events = receiver.take_events().unwrap();
    let mut assembler = GroupAssembler::new();
    let delivered = timeout(DEADLINE, async {
        loop {
            match events.recv().await {
                Some(ChannelEvent::Message(bytes)) => {
                    let message = SlotMessage::parse(&bytes).unwrap();
                    if let Some(group) = assembler.accept(message).unwrap() {
                        return group;
                    }
                }
                Some(_) => continue,
                None => panic!("channel closed before frame completed"),
            }
        }
    })
    .await
    .expect("frame did not arrive");

    let decoded = delivered.decode().unwrap();
    let pose = decoded.pose.expect("pose present");
    assert!((pose.score - 0.9).abs() < 1e-4);
    assert_eq!(decoded.capture_ts.as_millis(), 1000);
    assert!(decoded.face.is_none());
}

#[tokio::test]
async fn disconnect_closes_the_remote_end() {
    let relay_addr = start_relay().await;
    let (mut caller, mut receiver) = open_pair(relay_addr, false).await;

    let mut events = receiver.take_events().unwrap();
    caller.disconnect().await;

    let event = timeout(DEADLINE, async {
        loop {
            match events.recv().await {
                Some(ChannelEvent::Closed) | None => return ChannelEvent::Closed,
                Some(_) => continue,
            }
        }
    })
    .await
    .expect("remote never observed the close");

    assert_eq!(event, ChannelEvent::Closed);
    assert!(!receiver.channel.is_open());
}
