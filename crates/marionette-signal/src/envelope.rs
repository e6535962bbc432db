//! Signal envelopes - the JSON exchanged through the relay
//!
//! Wire shape: `{"sdp": {...}, "uuid": "..."}` or `{"ice": {...}, "uuid": "..."}`.
//! No envelope versioning; unknown fields are ignored on parse.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use marionette_core::{MarionetteError, MarionetteResult, SessionToken};

/// Whether a description opens a negotiation or answers one
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Description of the channel a peer intends to open.
///
/// Deliberately small: the channel parameters our transport negotiates are
/// a label and a wire version; network paths travel separately as
/// candidates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub label: String,
    pub wire_version: u8,
}

impl SessionDescription {
    /// Current channel wire version
    pub const WIRE_VERSION: u8 = 0;

    /// Default channel label
    pub const LABEL: &'static str = "marionette frame channel";

    pub fn offer() -> Self {
        SessionDescription {
            kind: SdpKind::Offer,
            label: Self::LABEL.to_string(),
            wire_version: Self::WIRE_VERSION,
        }
    }

    pub fn answer() -> Self {
        SessionDescription {
            kind: SdpKind::Answer,
            label: Self::LABEL.to_string(),
            wire_version: Self::WIRE_VERSION,
        }
    }
}

/// Proposed network path for the peer channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// Address read directly off a local interface
    Host,
    /// Server-reflexive address discovered through an external observer
    Reflexive,
}

/// One channel candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: SocketAddr,
    pub kind: CandidateKind,
}

impl Candidate {
    pub fn host(address: SocketAddr) -> Self {
        Candidate {
            address,
            kind: CandidateKind::Host,
        }
    }
}

/// Parsed signal content, self-echoes already stripped
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    Description(SessionDescription),
    Candidate(Candidate),
}

/// A signal plus the token of the peer that sent it
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteSignal {
    pub from: SessionToken,
    pub signal: Signal,
}

/// On-the-wire envelope shape
#[derive(Serialize, Deserialize)]
struct EnvelopeWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    sdp: Option<SessionDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ice: Option<Candidate>,
    uuid: String,
}

/// Serialize a signal into one relay line
pub fn encode_envelope(token: &SessionToken, signal: &Signal) -> String {
    let wire = match signal {
        Signal::Description(sdp) => EnvelopeWire {
            sdp: Some(sdp.clone()),
            ice: None,
            uuid: token.as_str().to_string(),
        },
        Signal::Candidate(candidate) => EnvelopeWire {
            sdp: None,
            ice: Some(*candidate),
            uuid: token.as_str().to_string(),
        },
    };

    // Serialization of these shapes cannot fail; fall back to an empty
    // object rather than panicking in the signaling path.
    serde_json::to_string(&wire).unwrap_or_else(|_| "{}".to_string())
}

/// Parse one relay line into a remote signal.
///
/// Envelopes carrying neither `sdp` nor `ice` are invalid; envelopes
/// carrying both are resolved in favor of `sdp` (the relay never produces
/// them, but a naive fanout forwards whatever it was given).
pub fn decode_envelope(line: &str) -> MarionetteResult<RemoteSignal> {
    let wire: EnvelopeWire = serde_json::from_str(line)
        .map_err(|e| MarionetteError::InvalidEnvelope(e.to_string()))?;

    let from = SessionToken::from_string(wire.uuid);
    let signal = if let Some(sdp) = wire.sdp {
        Signal::Description(sdp)
    } else if let Some(ice) = wire.ice {
        Signal::Candidate(ice)
    } else {
        return Err(MarionetteError::InvalidEnvelope(
            "envelope carries neither sdp nor ice".into(),
        ));
    };

    Ok(RemoteSignal { from, signal })
}
