use std::sync::Arc;

use gpui::RenderImage;
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::pipeline::CompositedFrame;

pub(super) fn frame_to_image(frame: &CompositedFrame) -> Option<Arc<RenderImage>> {
    let mut rgba = frame.rgba.clone();

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer =
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.size.width, frame.size.height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}
