//! Shared configuration surface
//!
//! Debug toggles are purely observational - they never change the wire
//! protocol beyond suppressing sends.

/// Options passed to the pose detector each frame
#[derive(Clone, Copy, Debug)]
pub struct DetectorOptions {
    /// Mirror the input before detection (front camera compensation)
    pub flip_horizontal: bool,
    /// Maximum simultaneous detections; the pipeline streams one
    pub max_detections: usize,
    /// Per-part minimum confidence
    pub score_threshold: f32,
    /// Non-maximum-suppression radius in pixels
    pub nms_radius: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        DetectorOptions {
            flip_horizontal: true,
            max_detections: 1,
            score_threshold: 0.1,
            nms_radius: 30.0,
        }
    }
}

/// Minimum overall pose confidence before the debug overlay draws it
pub const MIN_POSE_CONFIDENCE: f32 = 0.15;

/// Operator-facing debug toggles
#[derive(Clone, Copy, Debug)]
pub struct DebugConfig {
    /// Draw raw keypoints/skeleton on the sender preview
    pub show_detection_debug: bool,
    /// Draw the illustration's internal bones on the receiver
    pub show_illustration_debug: bool,
    /// Kill switch: keep the loop cadence but send nothing
    pub do_not_transmit: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        DebugConfig {
            show_detection_debug: true,
            show_illustration_debug: false,
            do_not_transmit: false,
        }
    }
}
