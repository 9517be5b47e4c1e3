mod decode;
mod posenet;

use std::path::PathBuf;

use crate::types::{Frame, Pose};

pub use posenet::OrtPoseNet;

pub const DEFAULT_MODEL_FILENAME: &str = "posenet_mobilenet_v1_075.onnx";

pub trait PoseEstimator: Send + 'static {
    /// `Ok(None)` when the frame holds no usable pose.
    fn estimate(&mut self, frame: &Frame, flip_horizontal: bool) -> anyhow::Result<Option<Pose>>;
}

impl PoseEstimator for Box<dyn PoseEstimator> {
    fn estimate(&mut self, frame: &Frame, flip_horizontal: bool) -> anyhow::Result<Option<Pose>> {
        (**self).estimate(frame, flip_horizontal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    MobileNetV1,
    ResNet50,
}

impl Architecture {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "mobilenetv1" | "mobilenet" => Some(Architecture::MobileNetV1),
            "resnet50" | "resnet" => Some(Architecture::ResNet50),
            _ => None,
        }
    }
}

/// PoseNet export parameters. The decoder reads `output_stride`,
/// `input_resolution` and `architecture`; the rest is carried for logging.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub download_url: Option<String>,
    pub architecture: Architecture,
    pub output_stride: u32,
    pub multiplier: f32,
    pub input_resolution: u32,
    pub quant_bytes: u8,
    /// Heatmaps come out as logits and need a sigmoid.
    pub heatmap_logits: bool,
    /// Poses whose mean keypoint score is below this are reported as absent.
    pub min_pose_score: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join(DEFAULT_MODEL_FILENAME),
            download_url: None,
            architecture: Architecture::MobileNetV1,
            output_stride: 16,
            multiplier: 0.75,
            input_resolution: 257,
            quant_bytes: 4,
            heatmap_logits: true,
            min_pose_score: 0.1,
        }
    }
}
