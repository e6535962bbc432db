//! Pose estimates - skeletal keypoints as produced by the detector
//!
//! The wire format never carries part names. Reconstruction is positional:
//! keypoint `i` on the wire is `Keypart::all()[i]`, always. Encoder and
//! decoder must share this one table or indices silently mismatch.

/// Named skeletal joint, in fixed wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keypart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Keypart {
    /// All parts in wire order. This is THE ordering table - both ends of
    /// the channel index into it, never into a name lookup.
    pub fn all() -> &'static [Keypart] {
        &[
            Keypart::Nose,
            Keypart::LeftEye,
            Keypart::RightEye,
            Keypart::LeftEar,
            Keypart::RightEar,
            Keypart::LeftShoulder,
            Keypart::RightShoulder,
            Keypart::LeftElbow,
            Keypart::RightElbow,
            Keypart::LeftWrist,
            Keypart::RightWrist,
            Keypart::LeftHip,
            Keypart::RightHip,
            Keypart::LeftKnee,
            Keypart::RightKnee,
            Keypart::LeftAnkle,
            Keypart::RightAnkle,
        ]
    }

    /// Number of parts
    pub fn count() -> usize {
        17
    }

    /// Wire index of this part
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Part at a wire index
    pub fn from_index(index: usize) -> Option<Keypart> {
        Keypart::all().get(index).copied()
    }

    /// Detector-vocabulary name for this part
    pub fn name(self) -> &'static str {
        match self {
            Keypart::Nose => "nose",
            Keypart::LeftEye => "leftEye",
            Keypart::RightEye => "rightEye",
            Keypart::LeftEar => "leftEar",
            Keypart::RightEar => "rightEar",
            Keypart::LeftShoulder => "leftShoulder",
            Keypart::RightShoulder => "rightShoulder",
            Keypart::LeftElbow => "leftElbow",
            Keypart::RightElbow => "rightElbow",
            Keypart::LeftWrist => "leftWrist",
            Keypart::RightWrist => "rightWrist",
            Keypart::LeftHip => "leftHip",
            Keypart::RightHip => "rightHip",
            Keypart::LeftKnee => "leftKnee",
            Keypart::RightKnee => "rightKnee",
            Keypart::LeftAnkle => "leftAnkle",
            Keypart::RightAnkle => "rightAnkle",
        }
    }
}

/// 2D position in raw pixel coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One detected keypoint (score + part + position)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub score: f32,
    pub part: Keypart,
    pub position: Point2,
}

impl Keypoint {
    pub fn new(score: f32, part: Keypart, position: Point2) -> Self {
        Self {
            score,
            part,
            position,
        }
    }
}

/// Complete pose estimate for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    /// Overall detection confidence [0.0 - 1.0]
    pub score: f32,

    /// Keypoints in wire order (`Keypart::all()` order, always 17)
    pub keypoints: Vec<Keypoint>,
}

impl PoseEstimate {
    /// Build a pose with every keypoint at the origin
    pub fn empty(score: f32) -> Self {
        let keypoints = Keypart::all()
            .iter()
            .map(|&part| Keypoint::new(0.0, part, Point2::default()))
            .collect();
        PoseEstimate { score, keypoints }
    }

    /// Keypoint by part
    pub fn keypoint(&self, part: Keypart) -> Option<&Keypoint> {
        self.keypoints.get(part.index())
    }

    /// Mirror all keypoints across the vertical axis of a frame of the
    /// given width. The sender captures mirrored video; the receiver flips
    /// back before binding the skeleton.
    pub fn flip_horizontal(&mut self, width: f32) {
        for keypoint in &mut self.keypoints {
            keypoint.position.x = width - keypoint.position.x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_table_order() {
        let all = Keypart::all();

        assert_eq!(all.len(), Keypart::count());
        assert_eq!(all[0], Keypart::Nose);
        assert_eq!(all[16], Keypart::RightAnkle);

        // name <-> index bijection
        for (i, part) in all.iter().enumerate() {
            assert_eq!(part.index(), i);
            assert_eq!(Keypart::from_index(i), Some(*part));
        }
        assert_eq!(Keypart::from_index(17), None);
    }

    #[test]
    fn test_empty_pose_has_all_parts() {
        let pose = PoseEstimate::empty(0.5);

        assert_eq!(pose.keypoints.len(), 17);
        assert_eq!(pose.keypoint(Keypart::Nose).unwrap().part, Keypart::Nose);
    }

    #[test]
    fn test_flip_horizontal() {
        let mut pose = PoseEstimate::empty(1.0);
        pose.keypoints[0].position = Point2::new(120.0, 80.0);

        pose.flip_horizontal(500.0);

        assert_eq!(pose.keypoints[0].position.x, 380.0);
        assert_eq!(pose.keypoints[0].position.y, 80.0);
    }
}
