//! Slot messages - the unit actually handed to the peer channel
//!
//! Message layout (little-endian):
//! - Bytes 0-3: group sequence number
//! - Byte 4: slot index
//! - Byte 5: tag (0 = absent, 1 = present)
//! - Bytes 6..: payload when present
//!
//! The tag byte replaces runtime type inspection: an absent detection is an
//! explicit discriminant, not a scalar zero masquerading as a buffer.

use marionette_core::{MarionetteError, MarionetteResult};

/// Slot message header size in bytes
pub const SLOT_HEADER_SIZE: usize = 6;

/// Tag byte for an absent slot
pub const TAG_ABSENT: u8 = 0;

/// Tag byte for a present slot
pub const TAG_PRESENT: u8 = 1;

/// The six slots of one frame group, in wire order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SlotKind {
    PoseConfidences = 0,
    PosePositions = 1,
    FacePositions = 2,
    FaceConfidence = 3,
    CaptureTimestamp = 4,
    ExtractionTimestamp = 5,
}

impl SlotKind {
    /// Slots per frame group
    pub const COUNT: usize = 6;

    /// All slots in wire order
    pub fn all() -> &'static [SlotKind] {
        &[
            SlotKind::PoseConfidences,
            SlotKind::PosePositions,
            SlotKind::FacePositions,
            SlotKind::FaceConfidence,
            SlotKind::CaptureTimestamp,
            SlotKind::ExtractionTimestamp,
        ]
    }

    pub fn from_byte(byte: u8) -> Option<SlotKind> {
        match byte {
            0 => Some(SlotKind::PoseConfidences),
            1 => Some(SlotKind::PosePositions),
            2 => Some(SlotKind::FacePositions),
            3 => Some(SlotKind::FaceConfidence),
            4 => Some(SlotKind::CaptureTimestamp),
            5 => Some(SlotKind::ExtractionTimestamp),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Slot payload - present with bytes, or explicitly absent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Present(Vec<u8>),
    Absent,
}

impl Slot {
    pub fn is_present(&self) -> bool {
        matches!(self, Slot::Present(_))
    }

    /// Payload bytes if present
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Slot::Present(bytes) => Some(bytes),
            Slot::Absent => None,
        }
    }

    /// Wrap an i64 timestamp payload
    pub fn from_millis(millis: i64) -> Slot {
        Slot::Present(millis.to_le_bytes().to_vec())
    }

    /// Unwrap an i64 timestamp payload
    pub fn as_millis(&self) -> MarionetteResult<i64> {
        let bytes = self.bytes().ok_or_else(|| {
            MarionetteError::MalformedFrame("timestamp slot absent".into())
        })?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| {
            MarionetteError::MalformedFrame(format!("timestamp length {}", bytes.len()))
        })?;
        Ok(i64::from_le_bytes(arr))
    }

    /// Wrap an f32 confidence payload
    pub fn from_f32(value: f32) -> Slot {
        Slot::Present(value.to_le_bytes().to_vec())
    }

    /// Unwrap an f32 confidence payload
    pub fn as_f32(&self) -> MarionetteResult<f32> {
        let bytes = self.bytes().ok_or_else(|| {
            MarionetteError::MalformedFrame("confidence slot absent".into())
        })?;
        let arr: [u8; 4] = bytes.try_into().map_err(|_| {
            MarionetteError::MalformedFrame(format!("confidence length {}", bytes.len()))
        })?;
        Ok(f32::from_le_bytes(arr))
    }
}

/// One channel message: a slot of a sequenced frame group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotMessage {
    pub seq: u32,
    pub kind: SlotKind,
    pub slot: Slot,
}

impl SlotMessage {
    pub fn new(seq: u32, kind: SlotKind, slot: Slot) -> Self {
        SlotMessage { seq, kind, slot }
    }

    /// Serialize to channel bytes
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.slot.bytes().map(|b| b.len()).unwrap_or(0);
        let mut buf = Vec::with_capacity(SLOT_HEADER_SIZE + payload_len);

        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.push(self.kind.to_byte());
        match &self.slot {
            Slot::Present(bytes) => {
                buf.push(TAG_PRESENT);
                buf.extend_from_slice(bytes);
            }
            Slot::Absent => buf.push(TAG_ABSENT),
        }

        buf
    }

    /// Parse from channel bytes
    pub fn parse(buf: &[u8]) -> MarionetteResult<SlotMessage> {
        if buf.len() < SLOT_HEADER_SIZE {
            return Err(MarionetteError::BufferTooShort {
                expected: SLOT_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let seq = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let kind = SlotKind::from_byte(buf[4]).ok_or(MarionetteError::SlotOutOfRange(buf[4]))?;
        let slot = match buf[5] {
            TAG_ABSENT => {
                if buf.len() > SLOT_HEADER_SIZE {
                    return Err(MarionetteError::MalformedFrame(
                        "absent slot carries payload".into(),
                    ));
                }
                Slot::Absent
            }
            TAG_PRESENT => Slot::Present(buf[SLOT_HEADER_SIZE..].to_vec()),
            tag => return Err(MarionetteError::UnknownSlotTag(tag)),
        };

        Ok(SlotMessage { seq, kind, slot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_message_roundtrip() {
        let message = SlotMessage::new(7, SlotKind::PosePositions, Slot::Present(vec![1, 2, 3]));
        let parsed = SlotMessage::parse(&message.encode()).unwrap();

        assert_eq!(parsed, message);
    }

    #[test]
    fn test_absent_roundtrip() {
        let message = SlotMessage::new(42, SlotKind::FacePositions, Slot::Absent);
        let parsed = SlotMessage::parse(&message.encode()).unwrap();

        assert_eq!(parsed.seq, 42);
        assert!(!parsed.slot.is_present());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut bytes = SlotMessage::new(1, SlotKind::FaceConfidence, Slot::Absent).encode();
        bytes[5] = 9;

        assert!(matches!(
            SlotMessage::parse(&bytes),
            Err(MarionetteError::UnknownSlotTag(9))
        ));
    }

    #[test]
    fn test_bad_slot_index_rejected() {
        let mut bytes = SlotMessage::new(1, SlotKind::PoseConfidences, Slot::Absent).encode();
        bytes[4] = 6;

        assert!(matches!(
            SlotMessage::parse(&bytes),
            Err(MarionetteError::SlotOutOfRange(6))
        ));
    }

    #[test]
    fn test_timestamp_payload() {
        let slot = Slot::from_millis(1_700_000_000_123);
        assert_eq!(slot.as_millis().unwrap(), 1_700_000_000_123);

        assert!(Slot::Absent.as_millis().is_err());
    }

    #[test]
    fn test_confidence_payload() {
        let slot = Slot::from_f32(0.875);
        assert_eq!(slot.as_f32().unwrap(), 0.875);
    }

    #[test]
    fn test_slot_order_table() {
        for (i, kind) in SlotKind::all().iter().enumerate() {
            assert_eq!(kind.index(), i);
            assert_eq!(SlotKind::from_byte(i as u8), Some(*kind));
        }
        assert_eq!(SlotKind::from_byte(6), None);
    }
}
