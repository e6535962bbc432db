//! Pose and face payload encoding
//!
//! Layout (all little-endian):
//! - Confidences: 18 x i16 - index 0 is the overall pose score x10000,
//!   indices 1-17 the per-keypoint scores in `Keypart::all()` order.
//! - Positions: 34 x i16 - (x, y) pairs per keypoint, raw pixels.
//! - Face positions: 12-byte stride per mesh point (x, y, z as f32).
//!
//! Quantization to 4 decimal digits is lossy by design; scores round-trip
//! within 1e-4. Coordinates beyond i16 range saturate - accepted precision
//! loss, not an error.

use marionette_core::{
    FaceEstimate, Keypart, Keypoint, MarionetteError, MarionetteResult, MeshPoint, Point2,
    PoseEstimate,
};

/// Fixed-point scale for confidence scores
pub const SCORE_SCALE: f32 = 10_000.0;

/// Confidence entries per pose (1 overall + 17 keypoints)
pub const CONFIDENCE_COUNT: usize = 18;

/// Position entries per pose (x, y per keypoint)
pub const POSITION_COUNT: usize = 34;

/// Byte length of an encoded confidences buffer
pub const CONFIDENCES_LEN: usize = CONFIDENCE_COUNT * 2;

/// Byte length of an encoded positions buffer
pub const POSITIONS_LEN: usize = POSITION_COUNT * 2;

/// Byte stride of one encoded mesh point
pub const MESH_STRIDE: usize = 12;

#[inline]
fn quantize(score: f32) -> i16 {
    (score * SCORE_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
fn quantize_coord(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode a pose into its (confidences, positions) buffer pair.
///
/// `None` in, `None` out: the caller transmits the sentinel pair instead.
/// The two buffers are a unit - they are never sent independently.
pub fn encode_pose(pose: Option<&PoseEstimate>) -> Option<(Vec<u8>, Vec<u8>)> {
    let pose = pose?;

    let mut confidences = Vec::with_capacity(CONFIDENCES_LEN);
    let mut positions = Vec::with_capacity(POSITIONS_LEN);

    confidences.extend_from_slice(&quantize(pose.score).to_le_bytes());
    for keypoint in pose.keypoints.iter().take(Keypart::count()) {
        confidences.extend_from_slice(&quantize(keypoint.score).to_le_bytes());
        positions.extend_from_slice(&quantize_coord(keypoint.position.x).to_le_bytes());
        positions.extend_from_slice(&quantize_coord(keypoint.position.y).to_le_bytes());
    }

    // A short keypoint list pads out with zeroed entries so the buffers
    // keep their fixed length.
    while confidences.len() < CONFIDENCES_LEN {
        confidences.extend_from_slice(&0i16.to_le_bytes());
    }
    while positions.len() < POSITIONS_LEN {
        positions.extend_from_slice(&0i16.to_le_bytes());
    }

    Some((confidences, positions))
}

/// Decode a (confidences, positions) pair back into a pose.
///
/// Keypoint parts are reconstructed positionally from `Keypart::all()`.
pub fn decode_pose(confidences: &[u8], positions: &[u8]) -> MarionetteResult<PoseEstimate> {
    if confidences.len() != CONFIDENCES_LEN {
        return Err(MarionetteError::MalformedFrame(format!(
            "confidences length {} != {}",
            confidences.len(),
            CONFIDENCES_LEN
        )));
    }
    if positions.len() != POSITIONS_LEN {
        return Err(MarionetteError::MalformedFrame(format!(
            "positions length {} != {}",
            positions.len(),
            POSITIONS_LEN
        )));
    }

    let read_i16 = |buf: &[u8], index: usize| {
        i16::from_le_bytes([buf[index * 2], buf[index * 2 + 1]])
    };

    let score = read_i16(confidences, 0) as f32 / SCORE_SCALE;

    let mut keypoints = Vec::with_capacity(Keypart::count());
    for (i, &part) in Keypart::all().iter().enumerate() {
        let keypoint_score = read_i16(confidences, i + 1) as f32 / SCORE_SCALE;
        let x = read_i16(positions, i * 2) as f32;
        let y = read_i16(positions, i * 2 + 1) as f32;
        keypoints.push(Keypoint::new(keypoint_score, part, Point2::new(x, y)));
    }

    Ok(PoseEstimate { score, keypoints })
}

/// Encode a face mesh into a flat buffer. `None` in, `None` out.
///
/// The in-view confidence travels in its own slot, not in this buffer.
pub fn encode_face(face: Option<&FaceEstimate>) -> Option<Vec<u8>> {
    let face = face?;

    let mut buf = Vec::with_capacity(face.scaled_mesh.len() * MESH_STRIDE);
    for point in &face.scaled_mesh {
        buf.extend_from_slice(&point.x.to_le_bytes());
        buf.extend_from_slice(&point.y.to_le_bytes());
        buf.extend_from_slice(&point.z.to_le_bytes());
    }

    Some(buf)
}

/// Decode a face mesh buffer plus its companion confidence.
pub fn decode_face(buf: &[u8], confidence: f32) -> MarionetteResult<FaceEstimate> {
    if buf.len() % MESH_STRIDE != 0 {
        return Err(MarionetteError::MalformedFrame(format!(
            "face buffer length {} not a multiple of stride {}",
            buf.len(),
            MESH_STRIDE
        )));
    }

    let mut scaled_mesh = Vec::with_capacity(buf.len() / MESH_STRIDE);
    for chunk in buf.chunks_exact(MESH_STRIDE) {
        let x = f32::from_le_bytes(chunk[0..4].try_into().unwrap());
        let y = f32::from_le_bytes(chunk[4..8].try_into().unwrap());
        let z = f32::from_le_bytes(chunk[8..12].try_into().unwrap());
        scaled_mesh.push(MeshPoint::new(x, y, z));
    }

    Ok(FaceEstimate::new(scaled_mesh, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_pose() -> PoseEstimate {
        let mut pose = PoseEstimate::empty(0.9);
        pose.keypoints[0].score = 0.8;
        pose.keypoints[0].position = Point2::new(120.0, 80.0);
        pose
    }

    #[test]
    fn test_encode_none_is_none() {
        assert!(encode_pose(None).is_none());
        assert!(encode_face(None).is_none());
    }

    #[test]
    fn test_pose_wire_layout() {
        let (confidences, positions) = encode_pose(Some(&sample_pose())).unwrap();

        assert_eq!(confidences.len(), CONFIDENCES_LEN);
        assert_eq!(positions.len(), POSITIONS_LEN);

        // score 0.9 -> 9000 at index 0
        assert_eq!(i16::from_le_bytes([confidences[0], confidences[1]]), 9000);
        // nose score 0.8 -> 8000 at index 1
        assert_eq!(i16::from_le_bytes([confidences[2], confidences[3]]), 8000);
        // nose position (120, 80) in the first two position entries
        assert_eq!(i16::from_le_bytes([positions[0], positions[1]]), 120);
        assert_eq!(i16::from_le_bytes([positions[2], positions[3]]), 80);
    }

    #[test]
    fn test_pose_roundtrip() {
        let pose = sample_pose();
        let (confidences, positions) = encode_pose(Some(&pose)).unwrap();
        let decoded = decode_pose(&confidences, &positions).unwrap();

        assert!((decoded.score - 0.9).abs() < 1e-4);
        assert!((decoded.keypoints[0].score - 0.8).abs() < 1e-4);
        assert_eq!(decoded.keypoints[0].position, Point2::new(120.0, 80.0));
        assert_eq!(decoded.keypoints[0].part, Keypart::Nose);
    }

    #[test]
    fn test_fixed_order_invariant() {
        let mut pose = PoseEstimate::empty(1.0);
        for (i, keypoint) in pose.keypoints.iter_mut().enumerate() {
            keypoint.position = Point2::new(i as f32 * 10.0, i as f32 * 20.0);
        }

        let (confidences, positions) = encode_pose(Some(&pose)).unwrap();
        let decoded = decode_pose(&confidences, &positions).unwrap();

        for (i, keypoint) in decoded.keypoints.iter().enumerate() {
            assert_eq!(keypoint.part, Keypart::all()[i]);
            assert_eq!(keypoint.position.x, i as f32 * 10.0);
        }
    }

    #[test]
    fn test_malformed_lengths_rejected() {
        let (confidences, positions) = encode_pose(Some(&sample_pose())).unwrap();

        assert!(matches!(
            decode_pose(&confidences[..10], &positions),
            Err(MarionetteError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_pose(&confidences, &positions[..positions.len() - 1]),
            Err(MarionetteError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_face_roundtrip() {
        let face = FaceEstimate::new(
            vec![
                MeshPoint::new(10.5, 20.25, -3.0),
                MeshPoint::new(0.0, 1.0, 2.0),
            ],
            0.95,
        );

        let buf = encode_face(Some(&face)).unwrap();
        assert_eq!(buf.len(), 2 * MESH_STRIDE);

        let decoded = decode_face(&buf, 0.95).unwrap();
        assert_eq!(decoded, face);
    }

    #[test]
    fn test_face_bad_stride_rejected() {
        let face = FaceEstimate::new(vec![MeshPoint::new(1.0, 2.0, 3.0)], 0.5);
        let buf = encode_face(Some(&face)).unwrap();

        assert!(matches!(
            decode_face(&buf[..buf.len() - 3], 0.5),
            Err(MarionetteError::MalformedFrame(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_pose_roundtrip_quantized(
            score in 0.0f32..=1.0,
            keypoint_scores in proptest::collection::vec(0.0f32..=1.0, 17),
            coords in proptest::collection::vec(-32768i32..=32767, 34),
        ) {
            let mut pose = PoseEstimate::empty(score);
            for (i, keypoint) in pose.keypoints.iter_mut().enumerate() {
                keypoint.score = keypoint_scores[i];
                keypoint.position = Point2::new(coords[i * 2] as f32, coords[i * 2 + 1] as f32);
            }

            let (confidences, positions) = encode_pose(Some(&pose)).unwrap();
            let decoded = decode_pose(&confidences, &positions).unwrap();

            prop_assert!((decoded.score - pose.score).abs() < 1e-4 + f32::EPSILON);
            for (a, b) in decoded.keypoints.iter().zip(pose.keypoints.iter()) {
                prop_assert!((a.score - b.score).abs() < 1e-4 + f32::EPSILON);
                prop_assert_eq!(a.position, b.position);
                prop_assert_eq!(a.part, b.part);
            }
        }
    }
}
