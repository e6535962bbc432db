//! Marionette Session - negotiating the direct peer channel
//!
//! The negotiator is a pure state machine: `(state, input) -> effects`.
//! All IO - relay envelopes, UDP datagrams, timers - lives in the driver,
//! which feeds inputs in and executes effects out. This keeps every
//! transition unit-testable without sockets, and keeps the race-prone parts
//! (glare, early candidates, channel readiness) in one auditable place.
//!
//! States: `Idle -> Negotiating(Caller|Receiver) -> Open -> Closed`.

pub mod channel;
pub mod negotiator;
pub mod peer;

pub use channel::*;
pub use negotiator::*;
pub use peer::*;
