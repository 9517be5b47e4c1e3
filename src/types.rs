use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeypointName {
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

impl KeypointName {
    pub const COUNT: usize = 17;

    /// Model output channel order.
    pub const ALL: [KeypointName; Self::COUNT] = [
        KeypointName::Nose,
        KeypointName::LeftEye,
        KeypointName::RightEye,
        KeypointName::LeftEar,
        KeypointName::RightEar,
        KeypointName::LeftShoulder,
        KeypointName::RightShoulder,
        KeypointName::LeftElbow,
        KeypointName::RightElbow,
        KeypointName::LeftWrist,
        KeypointName::RightWrist,
        KeypointName::LeftHip,
        KeypointName::RightHip,
        KeypointName::LeftKnee,
        KeypointName::RightKnee,
        KeypointName::LeftAnkle,
        KeypointName::RightAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeypointName::Nose => "nose",
            KeypointName::LeftEye => "leftEye",
            KeypointName::RightEye => "rightEye",
            KeypointName::LeftEar => "leftEar",
            KeypointName::RightEar => "rightEar",
            KeypointName::LeftShoulder => "leftShoulder",
            KeypointName::RightShoulder => "rightShoulder",
            KeypointName::LeftElbow => "leftElbow",
            KeypointName::RightElbow => "rightElbow",
            KeypointName::LeftWrist => "leftWrist",
            KeypointName::RightWrist => "rightWrist",
            KeypointName::LeftHip => "leftHip",
            KeypointName::RightHip => "rightHip",
            KeypointName::LeftKnee => "leftKnee",
            KeypointName::RightKnee => "rightKnee",
            KeypointName::LeftAnkle => "leftAnkle",
            KeypointName::RightAnkle => "rightAnkle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub name: KeypointName,
    pub position: (f32, f32),
    pub score: f32,
}

impl Keypoint {
    pub fn new(name: KeypointName, x: f32, y: f32, score: f32) -> Self {
        Self {
            name,
            position: (x, y),
            score,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    pub score: f32,
}

impl Pose {
    /// Builds a pose whose overall score is the mean keypoint score.
    pub fn from_keypoints(keypoints: Vec<Keypoint>) -> Self {
        let score = if keypoints.is_empty() {
            0.0
        } else {
            keypoints.iter().map(|k| k.score).sum::<f32>() / keypoints.len() as f32
        };
        Self { keypoints, score }
    }

    pub fn keypoint(&self, name: KeypointName) -> Option<&Keypoint> {
        self.keypoints.iter().find(|k| k.name == name)
    }

    /// Flattened `[x0, y0, x1, y1, ...]` in keypoint order.
    pub fn feature_vector(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.keypoints.len() * 2);
        for keypoint in &self.keypoints {
            out.push(keypoint.position.0);
            out.push(keypoint.position.1);
        }
        out
    }

    /// Mirrors every keypoint around the vertical axis of an image `width` pixels wide.
    pub fn flip_horizontal(&mut self, width: u32) {
        let max_x = width.saturating_sub(1) as f32;
        for keypoint in &mut self.keypoints {
            keypoint.position.0 = max_x - keypoint.position.0;
        }
    }
}

#[derive(Clone, Debug)]
pub struct Prediction {
    pub label: u32,
    pub confidences: Vec<(u32, f32)>,
}

impl Prediction {
    pub fn display_text(&self) -> String {
        let confidence = self
            .confidences
            .iter()
            .find(|(label, _)| *label == self.label)
            .map(|(_, c)| *c)
            .unwrap_or(0.0);
        format!("class {} ({:.0}%)", self.label, confidence * 100.0)
    }
}

#[derive(Clone, Debug)]
pub enum ClassifierEvent {
    ExampleAdded { label: u32, total: usize },
    Predicted(Prediction),
}

#[derive(Clone, Debug)]
pub struct PoseUpdate {
    pub frame: Frame,
    /// `None` when the estimator found nobody in the frame.
    pub pose: Option<Pose>,
    pub classifier: Option<ClassifierEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_of(points: &[(f32, f32, f32)]) -> Pose {
        let keypoints = points
            .iter()
            .zip(KeypointName::ALL)
            .map(|(&(x, y, s), name)| Keypoint::new(name, x, y, s))
            .collect();
        Pose::from_keypoints(keypoints)
    }

    #[test]
    fn pose_score_is_mean_of_keypoints() {
        let pose = pose_of(&[(0.0, 0.0, 0.2), (1.0, 1.0, 0.6)]);
        assert!((pose.score - 0.4).abs() < 1e-6);
        assert_eq!(Pose::from_keypoints(Vec::new()).score, 0.0);
    }

    #[test]
    fn feature_vector_interleaves_coordinates() {
        let pose = pose_of(&[(1.0, 2.0, 0.9), (3.0, 4.0, 0.9)]);
        assert_eq!(pose.feature_vector(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn flip_mirrors_x_only() {
        let mut pose = pose_of(&[(10.0, 5.0, 0.9)]);
        pose.flip_horizontal(152);
        assert_eq!(pose.keypoints[0].position, (141.0, 5.0));
    }

    #[test]
    fn keypoint_order_matches_indices() {
        for (idx, name) in KeypointName::ALL.iter().enumerate() {
            assert_eq!(name.index(), idx);
        }
        assert_eq!(KeypointName::RightAnkle.label(), "rightAnkle");
    }
}
