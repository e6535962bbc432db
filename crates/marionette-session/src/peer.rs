//! Session driver - executes the negotiator's effects against real IO
//!
//! One `PeerSession` per process. The driver loop multiplexes relay
//! signals, channel events and the probe timer onto the state machine,
//! with no IO inside the machine itself.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use marionette_core::{MarionetteError, MarionetteResult, Role, SessionToken};
use marionette_signal::{Candidate, SessionDescription, SignalReceiver, SignalingClient};

use crate::{
    ChannelEvent, Effect, NegotiationInput, NegotiationState, Negotiator, PeerChannel,
};

/// Session driver configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Signaling relay address
    pub relay_addr: SocketAddr,
    /// Local bind address for the peer channel (port 0 = ephemeral)
    pub bind_addr: SocketAddr,
    /// Address advertised in candidates, when the bind address is not
    /// routable as-is (e.g. bound to 0.0.0.0)
    pub advertised_ip: Option<IpAddr>,
    /// Caller-side probe retry cadence until first contact
    pub probe_interval: Duration,
}

impl SessionConfig {
    pub fn new(relay_addr: SocketAddr) -> Self {
        SessionConfig {
            relay_addr,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            advertised_ip: None,
            probe_interval: Duration::from_millis(100),
        }
    }
}

/// Snapshot of session identity and progress
#[derive(Clone, Debug)]
pub struct Session {
    pub token: SessionToken,
    pub role: Option<Role>,
    pub state: NegotiationState,
}

/// Everything the pipeline needs once negotiation completes
pub struct OpenSession {
    pub session: Session,
    /// Send side of the peer channel
    pub channel: Arc<PeerChannel>,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    signaling: SignalingClient,
}

impl OpenSession {
    /// Take the inbound channel events (messages, closure). The receive
    /// handler owns them; the first caller wins.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events.take()
    }

    /// Orderly teardown: channel first, then the relay connection.
    pub async fn disconnect(&mut self) {
        self.channel.close().await;
        self.signaling.close().await;
    }
}

/// A session being established
pub struct PeerSession {
    config: SessionConfig,
    signaling: SignalingClient,
    signals: SignalReceiver,
    negotiator: Negotiator,
    channel: Option<Arc<PeerChannel>>,
    channel_events: Option<mpsc::Receiver<ChannelEvent>>,
    remote_description: Option<SessionDescription>,
    proactive: bool,
    opened: bool,
    last_status: Option<String>,
}

impl PeerSession {
    /// Connect to the signaling relay; negotiation has not started yet.
    pub async fn connect(config: SessionConfig) -> MarionetteResult<Self> {
        let (signaling, signals) = SignalingClient::connect(config.relay_addr).await?;
        let negotiator = Negotiator::new(signaling.token().clone());

        Ok(PeerSession {
            config,
            signaling,
            signals,
            negotiator,
            channel: None,
            channel_events: None,
            remote_description: None,
            proactive: false,
            opened: false,
            last_status: None,
        })
    }

    pub fn token(&self) -> &SessionToken {
        self.signaling.token()
    }

    pub fn session(&self) -> Session {
        Session {
            token: self.token().clone(),
            role: self.negotiator.role(),
            state: self.negotiator.state(),
        }
    }

    /// Peer's channel description, once negotiated
    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    /// Declare connect intent: become the Caller and send the offer.
    pub async fn initiate(&mut self) -> MarionetteResult<()> {
        self.dispatch(NegotiationInput::ConnectIntent).await
    }

    /// Drive negotiation to completion. Consumes the driver and hands the
    /// open channel to the pipeline.
    pub async fn wait_open(mut self) -> MarionetteResult<OpenSession> {
        loop {
            match self.negotiator.state() {
                NegotiationState::Open => break,
                NegotiationState::Closed => {
                    return Err(MarionetteError::NegotiationFailed(
                        self.last_status
                            .take()
                            .unwrap_or_else(|| "session closed during negotiation".into()),
                    ))
                }
                _ => {}
            }

            let input = self.next_input().await?;
            if let Some(input) = input {
                self.dispatch(input).await?;
            }
        }

        let channel = self
            .channel
            .take()
            .ok_or_else(|| MarionetteError::NegotiationFailed("open without endpoint".into()))?;
        let events = self
            .channel_events
            .take()
            .ok_or_else(|| MarionetteError::NegotiationFailed("open without endpoint".into()))?;

        Ok(OpenSession {
            session: Session {
                token: self.signaling.token().clone(),
                role: self.negotiator.role(),
                state: NegotiationState::Open,
            },
            channel,
            events: Some(events),
            signaling: self.signaling,
        })
    }

    /// Wait for the next negotiation input from any source.
    /// `Ok(None)` means a probe tick was handled and there is no input.
    async fn next_input(&mut self) -> MarionetteResult<Option<NegotiationInput>> {
        enum Wake {
            Signal(Option<marionette_signal::RemoteSignal>),
            Channel(Option<ChannelEvent>),
            Probe,
        }

        let probe = tokio::time::sleep(self.config.probe_interval);
        tokio::pin!(probe);

        let wake = if let Some(channel_events) = self.channel_events.as_mut() {
            tokio::select! {
                signal = self.signals.recv() => Wake::Signal(signal),
                event = channel_events.recv() => Wake::Channel(event),
                _ = &mut probe => Wake::Probe,
            }
        } else {
            tokio::select! {
                signal = self.signals.recv() => Wake::Signal(signal),
                _ = &mut probe => Wake::Probe,
            }
        };

        match wake {
            Wake::Signal(Some(remote)) => Ok(Some(NegotiationInput::Remote(remote))),
            Wake::Signal(None) => Err(MarionetteError::SignalingClosed),
            Wake::Channel(Some(ChannelEvent::Ready)) => Ok(Some(NegotiationInput::ChannelReady)),
            // Data before Open means the peer is already streaming; treat
            // first contact as readiness.
            Wake::Channel(Some(ChannelEvent::Message(_))) => {
                Ok(Some(NegotiationInput::ChannelReady))
            }
            Wake::Channel(Some(ChannelEvent::Closed)) | Wake::Channel(None) => {
                Ok(Some(NegotiationInput::ChannelLost))
            }
            Wake::Probe => {
                self.probe_if_caller().await;
                Ok(None)
            }
        }
    }

    async fn probe_if_caller(&self) {
        if !self.proactive || self.opened {
            return;
        }
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.probe().await {
                tracing::warn!("probe failed: {}", e);
            }
        }
    }

    /// Feed one input through the machine and execute its effects.
    /// Effects can generate follow-up inputs (e.g. endpoint creation
    /// yields local candidates); those are processed in FIFO order.
    async fn dispatch(&mut self, input: NegotiationInput) -> MarionetteResult<()> {
        let mut inputs = VecDeque::from([input]);

        while let Some(input) = inputs.pop_front() {
            let effects = self.negotiator.apply(input);
            for effect in effects {
                self.perform(effect, &mut inputs).await?;
            }
        }

        Ok(())
    }

    async fn perform(
        &mut self,
        effect: Effect,
        inputs: &mut VecDeque<NegotiationInput>,
    ) -> MarionetteResult<()> {
        match effect {
            Effect::CreateEndpoint { proactive } => {
                let channel = PeerChannel::bind(self.config.bind_addr).await?;
                let events = channel.start_receive_loop(64);
                self.proactive = proactive;

                let candidate = Candidate::host(self.advertised_addr(channel.local_addr()));
                inputs.push_back(NegotiationInput::LocalCandidate(candidate));

                self.channel = Some(channel);
                self.channel_events = Some(events);
            }
            Effect::SendSignal(signal) => {
                self.signaling.send(&signal).await?;
            }
            Effect::ApplyRemoteDescription(description) => {
                if description.wire_version != SessionDescription::WIRE_VERSION {
                    let status =
                        format!("peer wire version {} unsupported", description.wire_version);
                    tracing::warn!("{}", status);
                    self.last_status = Some(status);
                    inputs.push_back(NegotiationInput::DisconnectIntent);
                    return Ok(());
                }
                tracing::debug!(label = %description.label, "remote description set");
                self.remote_description = Some(description);
            }
            Effect::ApplyCandidate(candidate) => {
                if let Some(channel) = &self.channel {
                    channel.set_remote(candidate.address);
                    // A caller with a fresh path probes immediately rather
                    // than waiting out the timer.
                    self.probe_if_caller().await;
                }
            }
            Effect::StartPipeline => {
                self.opened = true;
            }
            Effect::Teardown => {
                if let Some(channel) = &self.channel {
                    channel.close().await;
                }
                self.signaling.close().await;
            }
            Effect::Notify(message) => {
                tracing::info!("{}", message);
                self.last_status = Some(message);
            }
        }

        Ok(())
    }

    /// Candidate address for a bound endpoint. An unspecified bind IP is
    /// not routable; swap in the advertised IP, defaulting to loopback.
    fn advertised_addr(&self, local: SocketAddr) -> SocketAddr {
        if local.ip().is_unspecified() {
            let ip = self
                .config
                .advertised_ip
                .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]));
            SocketAddr::new(ip, local.port())
        } else {
            local
        }
    }
}
