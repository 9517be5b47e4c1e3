use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;

use crate::types::{Frame, Size};

/// Pull-based frame producer. `try_next` never blocks; every frame it hands out
/// must come back through `release` exactly once.
pub trait FrameSource: Send + 'static {
    fn try_next(&mut self) -> Option<Frame>;
    fn release(&mut self, frame: Frame);
}

impl FrameSource for Box<dyn FrameSource> {
    fn try_next(&mut self) -> Option<Frame> {
        (**self).try_next()
    }

    fn release(&mut self, frame: Frame) {
        (**self).release(frame)
    }
}

/// Resizes an RGBA buffer into `out`, reusing its allocation.
pub fn resize_rgba(src: &[u8], src_size: Size, dst_size: Size, out: &mut Vec<u8>) -> Result<()> {
    let expected = (src_size.width as usize) * (src_size.height as usize) * 4;
    if src.len() < expected {
        return Err(anyhow!(
            "frame buffer too small: got {}, expected {}",
            src.len(),
            expected
        ));
    }

    out.clear();
    out.resize((dst_size.width as usize) * (dst_size.height as usize) * 4, 0);

    if src_size == dst_size {
        out.copy_from_slice(&src[..expected]);
        return Ok(());
    }

    let src_image = fir::images::ImageRef::new(
        src_size.width,
        src_size.height,
        &src[..expected],
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::from_slice_u8(
        dst_size.width,
        dst_size.height,
        out.as_mut_slice(),
        fir::PixelType::U8x4,
    )?;
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    Ok(())
}

/// Serves one still image over and over, optionally a bounded number of times.
pub struct StillImageSource {
    rgba: Vec<u8>,
    size: Size,
    remaining: Option<usize>,
    released: usize,
}

impl StillImageSource {
    pub fn new(rgba: Vec<u8>, size: Size, limit: Option<usize>) -> Self {
        Self {
            rgba,
            size,
            remaining: limit,
            released: 0,
        }
    }

    pub fn open(path: &Path, target: Size, limit: Option<usize>) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let mut rgba = Vec::new();
        resize_rgba(image.as_raw(), Size::new(width, height), target, &mut rgba)?;
        log::info!(
            "serving still image {} ({width}x{height} -> {}x{})",
            path.display(),
            target.width,
            target.height
        );
        Ok(Self::new(rgba, target, limit))
    }

    #[cfg(test)]
    pub fn released(&self) -> usize {
        self.released
    }
}

impl FrameSource for StillImageSource {
    fn try_next(&mut self) -> Option<Frame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        Some(Frame::new(self.rgba.clone(), self.size.width, self.size.height))
    }

    fn release(&mut self, _frame: Frame) {
        self.released += 1;
    }
}
