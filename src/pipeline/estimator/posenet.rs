use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::{Array3, Array4};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::{
    Architecture, ModelConfig, PoseEstimator,
    decode::{self, NUM_KEYPOINTS},
};
use crate::types::{Frame, Pose};

const RESNET_MEAN: [f32; 3] = [-123.15, -115.90, -103.06];

/// Maps model-input pixels back onto the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> (Self, u32, u32) {
        let scale = target as f32 / width.max(height).max(1) as f32;
        let new_w = (width as f32 * scale).round().max(1.0) as u32;
        let new_h = (height as f32 * scale).round().max(1.0) as u32;
        let letterbox = Self {
            scale,
            pad_x: (target.saturating_sub(new_w) / 2) as f32,
            pad_y: (target.saturating_sub(new_h) / 2) as f32,
        };
        (letterbox, new_w, new_h)
    }

    pub fn unproject(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct OrtPoseNet {
    session: Session,
    config: ModelConfig,
}

impl OrtPoseNet {
    pub fn load(config: ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&config.path)
            .with_context(|| format!("failed to load ORT session from {}", config.path.display()))?;
        log::info!(
            "PoseNet {:?} ready from {} (stride {}, input {}, multiplier {}, quant bytes {})",
            config.architecture,
            config.path.display(),
            config.output_stride,
            config.input_resolution,
            config.multiplier,
            config.quant_bytes
        );
        Ok(Self { session, config })
    }
}

impl PoseEstimator for OrtPoseNet {
    fn estimate(&mut self, frame: &Frame, flip_horizontal: bool) -> Result<Option<Pose>> {
        let (input, letterbox) = prepare_input(
            frame,
            self.config.input_resolution,
            self.config.architecture,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        let mut heatmaps: Option<Array3<f32>> = None;
        let mut offsets: Option<Array3<f32>> = None;
        for idx in 0..outputs.len() {
            let raw = outputs[idx].try_extract_array::<f32>()?;
            match decode::channel_count(raw.shape()) {
                Some(NUM_KEYPOINTS) if heatmaps.is_none() => {
                    heatmaps = Some(decode::to_hwc(raw, NUM_KEYPOINTS)?);
                }
                Some(c) if c == NUM_KEYPOINTS * 2 && offsets.is_none() => {
                    offsets = Some(decode::to_hwc(raw, NUM_KEYPOINTS * 2)?);
                }
                _ => {}
            }
        }
        let heatmaps = heatmaps.ok_or_else(|| anyhow!("model produced no heatmap output"))?;
        let offsets = offsets.ok_or_else(|| anyhow!("model produced no offset output"))?;

        let mut keypoints = decode::decode_single_pose(
            heatmaps.view(),
            offsets.view(),
            self.config.output_stride,
            self.config.heatmap_logits,
        )?;
        for keypoint in &mut keypoints {
            keypoint.position = letterbox.unproject(keypoint.position);
        }

        let mut pose = Pose::from_keypoints(keypoints);
        if pose.score < self.config.min_pose_score {
            log::trace!("pose score {:.3} below threshold", pose.score);
            return Ok(None);
        }
        if flip_horizontal {
            pose.flip_horizontal(frame.width);
        }
        Ok(Some(pose))
    }
}

/// Letterboxes the frame into a `target` square and normalises it for the
/// given backbone. Output is NHWC.
pub fn prepare_input(
    frame: &Frame,
    target: u32,
    architecture: Architecture,
) -> Result<(Array4<f32>, Letterbox)> {
    let expected_len = frame.expected_len();
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }

    let (letterbox, new_w, new_h) = Letterbox::fit(frame.width, frame.height, target);
    let src_image = fir::images::ImageRef::new(
        frame.width,
        frame.height,
        &frame.rgba,
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let side = target as usize;
    let mut canvas = vec![0u8; side * side * 4];
    let (pad_x, pad_y) = (letterbox.pad_x as usize, letterbox.pad_y as usize);
    let src_stride = new_w as usize * 4;
    for row in 0..new_h as usize {
        let dst_offset = (pad_y + row) * side * 4 + pad_x * 4;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[row * src_stride..(row + 1) * src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            let rgb = [px[0] as f32, px[1] as f32, px[2] as f32];
            match architecture {
                Architecture::MobileNetV1 => rgb.map(|v| v / 127.5 - 1.0),
                Architecture::ResNet50 => [
                    rgb[0] + RESNET_MEAN[0],
                    rgb[1] + RESNET_MEAN[1],
                    rgb[2] + RESNET_MEAN[2],
                ],
            }
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((input, letterbox))
}
