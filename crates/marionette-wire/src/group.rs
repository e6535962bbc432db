//! Frame groups - assembly and reassembly of the six-slot wire unit
//!
//! The sender turns one tick's detections into exactly six slot messages.
//! The receiver reassembles them by (sequence, slot); a group is delivered
//! once all six slots of a sequence have arrived. Groups older than the
//! last delivered sequence are discarded, and a newer sequence abandons any
//! partial group in flight - a lost message costs one frame, never
//! desynchronizes the stream.

use marionette_core::{
    EpochMillis, FaceEstimate, MarionetteError, MarionetteResult, PoseEstimate,
};

use crate::{
    decode_face, decode_pose, encode_face, encode_pose, Slot, SlotKind, SlotMessage,
};

/// Wire form of one pipeline tick
#[derive(Clone, Debug, PartialEq)]
pub struct FrameGroup {
    /// Group sequence number, monotonic per session
    pub seq: u32,
    /// Encoded (confidences, positions) - always a pair, never split
    pub pose: Option<(Vec<u8>, Vec<u8>)>,
    /// Flattened face mesh buffer
    pub face_positions: Option<Vec<u8>>,
    /// Face in-view confidence, present iff `face_positions` is
    pub face_confidence: Option<f32>,
    /// Sender clock at capture start
    pub capture_ts: EpochMillis,
    /// Sender clock after detection + encoding
    pub extraction_ts: EpochMillis,
}

/// A frame group decoded back into collaborator-facing estimates
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    pub pose: Option<PoseEstimate>,
    pub face: Option<FaceEstimate>,
    pub capture_ts: EpochMillis,
    pub extraction_ts: EpochMillis,
}

impl FrameGroup {
    /// Encode one tick's detections into a frame group
    pub fn from_estimates(
        seq: u32,
        pose: Option<&PoseEstimate>,
        face: Option<&FaceEstimate>,
        capture_ts: EpochMillis,
        extraction_ts: EpochMillis,
    ) -> Self {
        FrameGroup {
            seq,
            pose: encode_pose(pose),
            face_positions: encode_face(face),
            face_confidence: face.map(|f| f.face_in_view_confidence),
            capture_ts,
            extraction_ts,
        }
    }

    /// Split into the six slot messages, in wire order
    pub fn into_messages(self) -> Vec<SlotMessage> {
        let (confidences, positions) = match self.pose {
            Some((confidences, positions)) => {
                (Slot::Present(confidences), Slot::Present(positions))
            }
            None => (Slot::Absent, Slot::Absent),
        };
        let face_positions = match self.face_positions {
            Some(buf) => Slot::Present(buf),
            None => Slot::Absent,
        };
        let face_confidence = match self.face_confidence {
            Some(value) => Slot::from_f32(value),
            None => Slot::Absent,
        };

        vec![
            SlotMessage::new(self.seq, SlotKind::PoseConfidences, confidences),
            SlotMessage::new(self.seq, SlotKind::PosePositions, positions),
            SlotMessage::new(self.seq, SlotKind::FacePositions, face_positions),
            SlotMessage::new(self.seq, SlotKind::FaceConfidence, face_confidence),
            SlotMessage::new(
                self.seq,
                SlotKind::CaptureTimestamp,
                Slot::from_millis(self.capture_ts.as_millis()),
            ),
            SlotMessage::new(
                self.seq,
                SlotKind::ExtractionTimestamp,
                Slot::from_millis(self.extraction_ts.as_millis()),
            ),
        ]
    }

    /// Rebuild a group from six reassembled slots
    fn from_slots(seq: u32, slots: [Slot; SlotKind::COUNT]) -> MarionetteResult<Self> {
        let [confidences, positions, face_positions, face_confidence, capture, extraction] = slots;

        // Pose slots travel as a unit.
        let pose = match (confidences, positions) {
            (Slot::Present(confidences), Slot::Present(positions)) => {
                Some((confidences, positions))
            }
            (Slot::Absent, Slot::Absent) => None,
            _ => {
                return Err(MarionetteError::MalformedFrame(
                    "pose confidences/positions presence mismatch".into(),
                ))
            }
        };

        // So do the face slots.
        let (face_positions, face_confidence) = match (face_positions, &face_confidence) {
            (Slot::Present(buf), Slot::Present(_)) => {
                (Some(buf), Some(face_confidence.as_f32()?))
            }
            (Slot::Absent, Slot::Absent) => (None, None),
            _ => {
                return Err(MarionetteError::MalformedFrame(
                    "face positions/confidence presence mismatch".into(),
                ))
            }
        };

        Ok(FrameGroup {
            seq,
            pose,
            face_positions,
            face_confidence,
            capture_ts: EpochMillis::from_millis(capture.as_millis()?),
            extraction_ts: EpochMillis::from_millis(extraction.as_millis()?),
        })
    }

    /// Decode into collaborator-facing estimates
    pub fn decode(&self) -> MarionetteResult<DecodedFrame> {
        let pose = match &self.pose {
            Some((confidences, positions)) => Some(decode_pose(confidences, positions)?),
            None => None,
        };
        let face = match (&self.face_positions, self.face_confidence) {
            (Some(buf), Some(confidence)) => Some(decode_face(buf, confidence)?),
            _ => None,
        };

        Ok(DecodedFrame {
            pose,
            face,
            capture_ts: self.capture_ts,
            extraction_ts: self.extraction_ts,
        })
    }
}

/// Receiver-side reassembly state
#[derive(Default)]
pub struct GroupAssembler {
    current_seq: Option<u32>,
    slots: [Option<Slot>; SlotKind::COUNT],
    last_delivered: Option<u32>,
}

impl GroupAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one slot message. Returns a frame group when it completes one.
    ///
    /// Stale messages (at or before the last delivered sequence) are
    /// dropped silently; a newer sequence abandons the partial group.
    pub fn accept(&mut self, message: SlotMessage) -> MarionetteResult<Option<FrameGroup>> {
        if let Some(delivered) = self.last_delivered {
            if message.seq <= delivered {
                return Ok(None);
            }
        }

        match self.current_seq {
            Some(seq) if message.seq == seq => {}
            Some(seq) if message.seq < seq => return Ok(None),
            _ => {
                // Newer group (or first message ever): restart assembly.
                self.current_seq = Some(message.seq);
                self.slots = Default::default();
            }
        }

        self.slots[message.kind.index()] = Some(message.slot);

        if self.slots.iter().all(|slot| slot.is_some()) {
            let seq = self.current_seq.take().unwrap_or(message.seq);
            let slots = std::mem::take(&mut self.slots).map(|slot| slot.unwrap_or(Slot::Absent));
            self.last_delivered = Some(seq);

            return FrameGroup::from_slots(seq, slots).map(Some);
        }

        Ok(None)
    }
}
