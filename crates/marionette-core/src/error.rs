//! Error types for the marionette stack

use thiserror::Error;

/// Errors across the wire, signaling, negotiation and capture boundaries.
///
/// Severity is positional, not structural: wire errors are per-frame and
/// recoverable (drop the frame, keep the loop alive); signaling and channel
/// closure are terminal for the session.
#[derive(Error, Debug)]
pub enum MarionetteError {
    // Wire errors
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown slot discriminant: {0}")]
    UnknownSlotTag(u8),

    #[error("Slot index out of range: {0}")]
    SlotOutOfRange(u8),

    // Signaling errors
    #[error("Signaling connection closed")]
    SignalingClosed,

    #[error("Invalid signal envelope: {0}")]
    InvalidEnvelope(String),

    // Negotiation errors
    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("Peer channel closed")]
    ChannelClosed,

    // Capture errors
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Result type for marionette operations
pub type MarionetteResult<T> = Result<T, MarionetteError>;

impl MarionetteError {
    /// Per-frame errors are swallowed by the pipeline; everything else
    /// tears the session down.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            MarionetteError::MalformedFrame(_)
                | MarionetteError::BufferTooShort { .. }
                | MarionetteError::UnknownSlotTag(_)
                | MarionetteError::SlotOutOfRange(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_classification() {
        assert!(MarionetteError::MalformedFrame("stride".into()).is_per_frame());
        assert!(!MarionetteError::SignalingClosed.is_per_frame());
        assert!(!MarionetteError::ChannelClosed.is_per_frame());
    }
}
