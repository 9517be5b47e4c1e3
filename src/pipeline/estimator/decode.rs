use anyhow::{Result, anyhow};
use ndarray::{Array3, ArrayView3, ArrayViewD, Axis, Ix4};

use crate::types::{Keypoint, KeypointName};

pub const NUM_KEYPOINTS: usize = KeypointName::COUNT;

/// Picks the highest heatmap cell per part and refines it with the offset
/// vectors. Positions are in model-input pixels.
///
/// `heatmaps` is `(H, W, 17)`, `offsets` is `(H, W, 34)` with the y offsets in
/// the first 17 channels and x offsets in the last 17.
pub fn decode_single_pose(
    heatmaps: ArrayView3<f32>,
    offsets: ArrayView3<f32>,
    output_stride: u32,
    heatmap_logits: bool,
) -> Result<Vec<Keypoint>> {
    let (height, width, parts) = heatmaps.dim();
    if parts != NUM_KEYPOINTS {
        return Err(anyhow!("heatmaps have {parts} channels, need {NUM_KEYPOINTS}"));
    }
    if offsets.dim() != (height, width, NUM_KEYPOINTS * 2) {
        return Err(anyhow!(
            "offsets shape {:?} does not match heatmaps ({height}, {width})",
            offsets.dim()
        ));
    }
    if height == 0 || width == 0 {
        return Err(anyhow!("empty heatmap grid"));
    }

    let stride = output_stride as f32;
    let mut keypoints = Vec::with_capacity(NUM_KEYPOINTS);
    for (part, name) in KeypointName::ALL.iter().enumerate() {
        let channel = heatmaps.index_axis(Axis(2), part);
        let mut best = (0usize, 0usize, f32::MIN);
        for ((y, x), &value) in channel.indexed_iter() {
            if value > best.2 {
                best = (y, x, value);
            }
        }
        let (y, x, raw) = best;
        let score = if heatmap_logits { sigmoid(raw) } else { raw };
        let offset_y = offsets[[y, x, part]];
        let offset_x = offsets[[y, x, part + NUM_KEYPOINTS]];
        keypoints.push(Keypoint::new(
            *name,
            x as f32 * stride + offset_x,
            y as f32 * stride + offset_y,
            score,
        ));
    }
    Ok(keypoints)
}

/// Brings a raw `(1, H, W, C)` or `(1, C, H, W)` output to `(H, W, C)`.
pub fn to_hwc(raw: ArrayViewD<f32>, channels: usize) -> Result<Array3<f32>> {
    let four = raw
        .into_dimensionality::<Ix4>()
        .map_err(|err| anyhow!("expected a 4D output tensor: {err}"))?;
    let shape = four.shape().to_vec();
    let batch = four.index_axis(Axis(0), 0);
    if shape[3] == channels {
        Ok(batch.to_owned())
    } else if shape[1] == channels {
        Ok(batch.permuted_axes([1, 2, 0]).to_owned())
    } else {
        Err(anyhow!(
            "output shape {shape:?} has no axis with {channels} channels"
        ))
    }
}

/// Channel count of the last or second axis, whichever identifies the output.
pub fn channel_count(shape: &[usize]) -> Option<usize> {
    if shape.len() != 4 {
        return None;
    }
    [shape[3], shape[1]]
        .into_iter()
        .find(|c| *c == NUM_KEYPOINTS || *c == NUM_KEYPOINTS * 2)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn grids(h: usize, w: usize) -> (Array3<f32>, Array3<f32>) {
        (
            Array3::from_elem((h, w, NUM_KEYPOINTS), -5.0),
            Array3::zeros((h, w, NUM_KEYPOINTS * 2)),
        )
    }

    #[test]
    fn peak_cell_plus_offset() {
        let (mut heat, mut offsets) = grids(4, 3);
        let nose = KeypointName::Nose.index();
        heat[[2, 1, nose]] = 3.0;
        offsets[[2, 1, nose]] = 4.0;
        offsets[[2, 1, nose + NUM_KEYPOINTS]] = -2.0;

        let keypoints = decode_single_pose(heat.view(), offsets.view(), 16, true).unwrap();
        assert_eq!(keypoints.len(), NUM_KEYPOINTS);
        let kp = keypoints[nose];
        assert_eq!(kp.name, KeypointName::Nose);
        assert_eq!(kp.position, (14.0, 36.0));
        assert!((kp.score - sigmoid(3.0)).abs() < 1e-6);
        assert!(keypoints[1].score < 0.01);
    }

    #[test]
    fn probabilities_pass_through() {
        let (mut heat, offsets) = grids(2, 2);
        heat.fill(0.0);
        heat[[0, 1, 5]] = 0.7;
        let keypoints = decode_single_pose(heat.view(), offsets.view(), 8, false).unwrap();
        assert_eq!(keypoints[5].position, (8.0, 0.0));
        assert!((keypoints[5].score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let heat = Array3::<f32>::zeros((2, 2, NUM_KEYPOINTS));
        let offsets = Array3::<f32>::zeros((3, 2, NUM_KEYPOINTS * 2));
        assert!(decode_single_pose(heat.view(), offsets.view(), 16, true).is_err());
    }

    #[test]
    fn nchw_is_transposed() {
        let mut raw = Array4::<f32>::zeros((1, NUM_KEYPOINTS, 2, 3));
        raw[[0, 4, 1, 2]] = 9.0;
        let hwc = to_hwc(raw.view().into_dyn(), NUM_KEYPOINTS).unwrap();
        assert_eq!(hwc.dim(), (2, 3, NUM_KEYPOINTS));
        assert_eq!(hwc[[1, 2, 4]], 9.0);
        assert_eq!(channel_count(&[1, NUM_KEYPOINTS, 2, 3]), Some(NUM_KEYPOINTS));
        assert_eq!(channel_count(&[1, 9, 9, 34]), Some(34));
        assert_eq!(channel_count(&[1, 9, 9]), None);
    }
}
