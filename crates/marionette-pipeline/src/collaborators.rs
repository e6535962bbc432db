//! Collaborator interfaces - detection, capture, rendering
//!
//! These are the swappable edges of the system. The pipeline never looks
//! inside a frame or a mesh; it moves estimates between a detector on one
//! peer and a renderer on the other.

use marionette_core::{DetectorOptions, FaceEstimate, MarionetteResult, PoseEstimate};

/// One captured video frame, opaque to the pipeline
#[derive(Clone, Debug)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data in whatever layout the detector expects
    pub pixels: Vec<u8>,
}

/// Camera / video capture collaborator.
///
/// A failure from the very first frame is fatal at startup - the pipeline
/// never starts. Later failures cost single frames.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> MarionetteResult<CameraFrame>;
}

/// Pose and face detection collaborator (black-box models)
pub trait Detector: Send {
    fn estimate_poses(
        &mut self,
        frame: &CameraFrame,
        options: &DetectorOptions,
    ) -> MarionetteResult<Vec<PoseEstimate>>;

    fn estimate_faces(&mut self, frame: &CameraFrame) -> MarionetteResult<Vec<FaceEstimate>>;
}

/// Avatar skeleton source handed to the renderer at bind time
#[derive(Clone, Debug)]
pub struct SkeletonDefinition {
    pub name: String,
    /// SVG illustration source the renderer binds bones against
    pub svg: String,
}

/// Avatar reconstruction collaborator
pub trait AvatarRenderer: Send {
    /// Drawing target owned by the embedding application
    type Surface: Send;

    /// Bind an illustration's skeleton; called once before rendering
    fn bind_skeleton(&mut self, skeleton: SkeletonDefinition);

    /// Update bone bindings from a decoded pose, optionally with face data
    fn update_skeleton(&mut self, pose: &PoseEstimate, face: Option<&FaceEstimate>);

    /// Render the current skeleton state
    fn draw(&mut self, surface: &mut Self::Surface, width: f32, height: f32);

    /// Render internal bone debug geometry; observational only
    fn debug_draw(&mut self, _surface: &mut Self::Surface) {}
}

/// Sender-side observer for raw detections (debug overlay feed)
pub type DetectionTap = Box<dyn FnMut(&[PoseEstimate], &[FaceEstimate]) + Send>;
