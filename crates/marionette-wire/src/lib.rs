//! Marionette Wire - binary encoding for pose/face frame groups
//!
//! One pipeline tick produces one frame group: six slot messages in fixed
//! order (pose confidences, pose positions, face positions, face
//! confidence, capture timestamp, extraction timestamp). Scores travel as
//! fixed-point i16 (x10000), positions as raw-pixel i16 pairs, mesh points
//! as f32 triples. Absent detections are explicit `Absent` slots, never
//! ambiguous zero-length buffers.
//!
//! Every slot message carries the group sequence number and its slot index,
//! so the receiver reassembles by (seq, slot) instead of trusting arrival
//! order.

pub mod codec;
pub mod group;
pub mod slot;

pub use codec::*;
pub use group::*;
pub use slot::*;
