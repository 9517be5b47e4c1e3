use crate::types::{KeypointName, Pose, Size};

/// PoseNet adjacency used for skeleton segments.
pub const CONNECTIONS: &[(KeypointName, KeypointName)] = &[
    (KeypointName::LeftHip, KeypointName::LeftShoulder),
    (KeypointName::LeftElbow, KeypointName::LeftShoulder),
    (KeypointName::LeftElbow, KeypointName::LeftWrist),
    (KeypointName::LeftHip, KeypointName::LeftKnee),
    (KeypointName::LeftKnee, KeypointName::LeftAnkle),
    (KeypointName::RightHip, KeypointName::RightShoulder),
    (KeypointName::RightElbow, KeypointName::RightShoulder),
    (KeypointName::RightElbow, KeypointName::RightWrist),
    (KeypointName::RightHip, KeypointName::RightKnee),
    (KeypointName::RightKnee, KeypointName::RightAnkle),
    (KeypointName::LeftShoulder, KeypointName::RightShoulder),
    (KeypointName::LeftHip, KeypointName::RightHip),
];

pub const MIN_PART_CONFIDENCE: f32 = 0.1;
pub const MARKER_RADIUS: f32 = 3.0;
pub const SEGMENT_WIDTH: f32 = 3.0;
pub const SKELETON_COLOR: [u8; 4] = [0, 255, 0, 255];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub name: KeypointName,
    pub center: (f32, f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub from: (f32, f32),
    pub to: (f32, f32),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonDrawing {
    pub markers: Vec<Marker>,
    pub segments: Vec<Segment>,
}

pub trait DrawSurface {
    fn clear(&mut self);
    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: [u8; 4]);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: [u8; 4]);
}

/// Maps poses from model-input coordinates onto a display surface.
#[derive(Clone, Copy, Debug)]
pub struct SkeletonRenderer {
    scale: (f32, f32),
    min_confidence: f32,
}

impl SkeletonRenderer {
    pub fn new(model_input: Size, display: Size, min_confidence: f32) -> Self {
        let axis = |display: u32, input: u32| {
            if input == 0 {
                1.0
            } else {
                display as f32 / input as f32
            }
        };
        Self {
            scale: (
                axis(display.width, model_input.width),
                axis(display.height, model_input.height),
            ),
            min_confidence,
        }
    }

    fn project(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (x * self.scale.0, y * self.scale.1)
    }

    pub fn layout(&self, pose: &Pose) -> SkeletonDrawing {
        let markers = pose
            .keypoints
            .iter()
            .filter(|k| k.score >= self.min_confidence)
            .map(|k| Marker {
                name: k.name,
                center: self.project(k.position),
            })
            .collect();

        let segments = CONNECTIONS
            .iter()
            .filter_map(|&(a, b)| {
                let a = pose.keypoint(a)?;
                let b = pose.keypoint(b)?;
                (a.score >= self.min_confidence && b.score >= self.min_confidence).then(|| {
                    Segment {
                        from: self.project(a.position),
                        to: self.project(b.position),
                    }
                })
            })
            .collect();

        SkeletonDrawing { markers, segments }
    }

    /// Replaces whatever the surface showed with this pose's skeleton.
    pub fn draw<D: DrawSurface>(&self, pose: &Pose, surface: &mut D) -> SkeletonDrawing {
        let drawing = self.layout(pose);
        surface.clear();
        for segment in &drawing.segments {
            surface.stroke_line(segment.from, segment.to, SEGMENT_WIDTH, SKELETON_COLOR);
        }
        for marker in &drawing.markers {
            surface.fill_circle(marker.center, MARKER_RADIUS, SKELETON_COLOR);
        }
        drawing
    }
}
