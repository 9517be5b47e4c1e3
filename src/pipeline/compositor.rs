use std::borrow::Cow;

use anyhow::Result;
use rayon::prelude::*;

use super::{
    canvas::RgbaCanvas,
    skeleton::{DrawSurface, SkeletonDrawing, SkeletonRenderer},
    source::resize_rgba,
};
use crate::types::{PoseUpdate, Size};

/// Display-sized frame with the skeleton blended on top.
#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub rgba: Vec<u8>,
    pub size: Size,
    pub drawing: SkeletonDrawing,
}

/// Scales loop output up to the display and draws the overlay. The overlay
/// canvas is reused, so each frame starts from a cleared surface.
///
/// With `mirror` set the frame is flipped left to right before display, to
/// match poses estimated with `flip_horizontal`.
pub struct OverlayCompositor {
    renderer: SkeletonRenderer,
    canvas: RgbaCanvas,
    display: Size,
    mirror: bool,
}

impl OverlayCompositor {
    pub fn new(model_input: Size, display: Size, min_confidence: f32, mirror: bool) -> Self {
        Self {
            renderer: SkeletonRenderer::new(model_input, display, min_confidence),
            canvas: RgbaCanvas::new(display),
            display,
            mirror,
        }
    }

    pub fn compose(&mut self, update: &PoseUpdate) -> Result<CompositedFrame> {
        let source: Cow<'_, [u8]> = if self.mirror {
            let mut mirrored = update.frame.rgba.clone();
            mirror_rows(&mut mirrored, update.frame.width);
            Cow::Owned(mirrored)
        } else {
            Cow::Borrowed(&update.frame.rgba)
        };

        let mut rgba = Vec::new();
        resize_rgba(
            &source,
            Size::new(update.frame.width, update.frame.height),
            self.display,
            &mut rgba,
        )?;

        let drawing = match &update.pose {
            Some(pose) => self.renderer.draw(pose, &mut self.canvas),
            None => {
                self.canvas.clear();
                SkeletonDrawing::default()
            }
        };
        self.canvas.composite_onto(&mut rgba);

        Ok(CompositedFrame {
            rgba,
            size: self.display,
            drawing,
        })
    }
}

fn mirror_rows(rgba: &mut [u8], width: u32) {
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    rgba.par_chunks_exact_mut(stride).for_each(|row| {
        let pixels = row.len() / 4;
        for x in 0..pixels / 2 {
            let (left, right) = (x * 4, (pixels - 1 - x) * 4);
            for channel in 0..4 {
                row.swap(left + channel, right + channel);
            }
        }
    });
}
