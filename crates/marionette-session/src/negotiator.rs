//! Negotiation state machine
//!
//! Pure transitions: `apply(input) -> effects`. The driver owns every
//! socket and timer; nothing in here blocks or performs IO.
//!
//! Offer/answer rules:
//! - A connect intent makes us Caller: create the endpoint proactively and
//!   send an offer.
//! - Any remote signal while Idle makes us Receiver: the endpoint is
//!   created lazily and we wait for the peer's channel to reach us.
//! - A Receiver answers the first offer exactly once; repeated offers in
//!   the same session are ignored.
//! - Candidates arriving before the remote description are queued and
//!   flushed after it is set.
//! - Glare (both sides offered): tokens break the tie. The
//!   lexicographically lower token keeps the Caller role and ignores the
//!   competing offer; the higher token abandons its own offer and answers
//!   as Receiver. Exactly one channel results.

use marionette_core::{Role, SessionToken};
use marionette_signal::{Candidate, RemoteSignal, SdpKind, SessionDescription, Signal};

/// Negotiation lifecycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    Negotiating(Role),
    Open,
    Closed,
}

/// Inputs fed by the driver
#[derive(Clone, Debug)]
pub enum NegotiationInput {
    /// Local operator asked to connect
    ConnectIntent,
    /// Envelope from the relay (self-echoes already filtered)
    Remote(RemoteSignal),
    /// A local channel candidate became available
    LocalCandidate(Candidate),
    /// The peer channel reported first contact
    ChannelReady,
    /// The peer channel closed abruptly
    ChannelLost,
    /// Local operator asked to disconnect
    DisconnectIntent,
}

/// Effects for the driver to execute, in order
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Bind the channel endpoint. `proactive` distinguishes the Caller
    /// (probes the peer) from the Receiver (waits to be probed).
    CreateEndpoint { proactive: bool },
    /// Forward an envelope through the relay
    SendSignal(Signal),
    /// Record the peer's channel description
    ApplyRemoteDescription(SessionDescription),
    /// Point the channel at a candidate path
    ApplyCandidate(Candidate),
    /// Fan-out point: unblock the frame pipeline
    StartPipeline,
    /// Close the channel, then the relay connection, in that order
    Teardown,
    /// Operator-facing status line
    Notify(String),
}

/// The session-establishment state machine
pub struct Negotiator {
    token: SessionToken,
    state: NegotiationState,
    role: Option<Role>,
    has_remote_description: bool,
    answered: bool,
    pending_candidates: Vec<Candidate>,
}

impl Negotiator {
    pub fn new(token: SessionToken) -> Self {
        Negotiator {
            token,
            state: NegotiationState::Idle,
            role: None,
            has_remote_description: false,
            answered: false,
            pending_candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Role assigned during negotiation; survives the transition to Open.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Apply one input, returning the effects to execute
    pub fn apply(&mut self, input: NegotiationInput) -> Vec<Effect> {
        match (self.state, input) {
            // Closed is terminal; nothing revives the session.
            (NegotiationState::Closed, _) => Vec::new(),

            (_, NegotiationInput::DisconnectIntent) => {
                self.state = NegotiationState::Closed;
                vec![
                    Effect::Teardown,
                    Effect::Notify("session disconnected".into()),
                ]
            }

            (_, NegotiationInput::ChannelLost) => {
                self.state = NegotiationState::Closed;
                vec![
                    Effect::Teardown,
                    Effect::Notify("peer channel closed; session over".into()),
                ]
            }

            (NegotiationState::Idle, NegotiationInput::ConnectIntent) => {
                self.state = NegotiationState::Negotiating(Role::Caller);
                self.role = Some(Role::Caller);
                vec![
                    Effect::CreateEndpoint { proactive: true },
                    Effect::SendSignal(Signal::Description(SessionDescription::offer())),
                ]
            }

            (_, NegotiationInput::ConnectIntent) => {
                tracing::debug!("connect intent ignored outside Idle");
                Vec::new()
            }

            // First remote signal while Idle: we are the Receiver.
            (NegotiationState::Idle, NegotiationInput::Remote(remote)) => {
                self.state = NegotiationState::Negotiating(Role::Receiver);
                self.role = Some(Role::Receiver);
                let mut effects = vec![Effect::CreateEndpoint { proactive: false }];
                effects.extend(self.on_remote(remote));
                effects
            }

            (NegotiationState::Negotiating(_), NegotiationInput::Remote(remote)) => {
                self.on_remote(remote)
            }

            // Late candidates after open are applied as received; late
            // descriptions have nothing left to negotiate.
            (NegotiationState::Open, NegotiationInput::Remote(remote)) => match remote.signal {
                Signal::Candidate(candidate) => vec![Effect::ApplyCandidate(candidate)],
                Signal::Description(_) => Vec::new(),
            },

            (NegotiationState::Negotiating(_), NegotiationInput::LocalCandidate(candidate)) => {
                vec![Effect::SendSignal(Signal::Candidate(candidate))]
            }

            (_, NegotiationInput::LocalCandidate(_)) => Vec::new(),

            (NegotiationState::Negotiating(_), NegotiationInput::ChannelReady) => {
                self.state = NegotiationState::Open;
                vec![
                    Effect::StartPipeline,
                    Effect::Notify("peer channel open".into()),
                ]
            }

            (_, NegotiationInput::ChannelReady) => Vec::new(),
        }
    }

    /// Handle a remote signal while negotiating
    fn on_remote(&mut self, remote: RemoteSignal) -> Vec<Effect> {
        match remote.signal {
            Signal::Candidate(candidate) => {
                if self.has_remote_description {
                    vec![Effect::ApplyCandidate(candidate)]
                } else {
                    // Early candidate: hold until the description lands.
                    self.pending_candidates.push(candidate);
                    Vec::new()
                }
            }
            Signal::Description(description) => match description.kind {
                SdpKind::Offer => self.on_offer(remote.from, description),
                SdpKind::Answer => self.on_answer(description),
            },
        }
    }

    fn on_offer(&mut self, from: SessionToken, description: SessionDescription) -> Vec<Effect> {
        match self.state {
            NegotiationState::Negotiating(Role::Receiver) => {
                if self.answered {
                    // Only the first offer in a session gets an answer.
                    tracing::debug!("repeated offer ignored");
                    return Vec::new();
                }
                self.answered = true;
                self.accept_description(description, true)
            }
            NegotiationState::Negotiating(Role::Caller) => {
                // Glare: both sides offered. Lower token keeps the Caller
                // role; higher token backs down and answers.
                if self.token.outranks(&from) {
                    tracing::debug!(peer = %from, "glare: peer will yield");
                    return Vec::new();
                }
                self.state = NegotiationState::Negotiating(Role::Receiver);
                self.role = Some(Role::Receiver);
                self.answered = true;
                let mut effects = vec![Effect::Notify(
                    "glare: yielding caller role to peer".into(),
                )];
                effects.extend(self.accept_description(description, true));
                effects
            }
            _ => Vec::new(),
        }
    }

    fn on_answer(&mut self, description: SessionDescription) -> Vec<Effect> {
        match self.state {
            NegotiationState::Negotiating(Role::Caller) => {
                self.accept_description(description, false)
            }
            _ => {
                tracing::debug!("answer ignored in {:?}", self.state);
                Vec::new()
            }
        }
    }

    /// Record the remote description, flush queued candidates, and answer
    /// if this description was an offer to us.
    fn accept_description(
        &mut self,
        description: SessionDescription,
        send_answer: bool,
    ) -> Vec<Effect> {
        self.has_remote_description = true;

        let mut effects = vec![Effect::ApplyRemoteDescription(description)];
        for candidate in self.pending_candidates.drain(..) {
            effects.push(Effect::ApplyCandidate(candidate));
        }
        if send_answer {
            effects.push(Effect::SendSignal(Signal::Description(
                SessionDescription::answer(),
            )));
        }
        effects
    }
}
