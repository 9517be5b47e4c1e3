use rayon::prelude::*;

use super::skeleton::DrawSurface;
use crate::types::Size;

/// Transparent RGBA overlay the skeleton is drawn into before compositing.
#[derive(Clone, Debug)]
pub struct RgbaCanvas {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbaCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            pixels: vec![0; size.width as usize * size.height as usize * 4],
            width: size.width,
            height: size.height,
        }
    }

    #[cfg(test)]
    fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 4;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.pixels[idx..idx + 4]);
        Some(out)
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy * self.width + ux) as usize) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&color);
    }

    fn stamp(&mut self, cx: i32, cy: i32, radius: i32, color: [u8; 4]) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Blends the overlay over `frame` (same size, RGBA) in place.
    pub fn composite_onto(&self, frame: &mut [u8]) {
        frame
            .par_chunks_exact_mut(4)
            .zip(self.pixels.par_chunks_exact(4))
            .for_each(|(dst, src)| {
                let alpha = src[3] as u32;
                if alpha == 0 {
                    return;
                }
                for channel in 0..3 {
                    let blended =
                        (src[channel] as u32 * alpha + dst[channel] as u32 * (255 - alpha)) / 255;
                    dst[channel] = blended as u8;
                }
                dst[3] = 255;
            });
    }
}

impl DrawSurface for RgbaCanvas {
    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn fill_circle(&mut self, center: (f32, f32), radius: f32, color: [u8; 4]) {
        self.stamp(
            center.0.round() as i32,
            center.1.round() as i32,
            radius.round() as i32,
            color,
        );
    }

    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: [u8; 4]) {
        let (mut x0, mut y0) = (from.0.round() as i32, from.1.round() as i32);
        let (x1, y1) = (to.0.round() as i32, to.1.round() as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = ((width.round() as i32).max(1) - 1) / 2;

        loop {
            self.stamp(x0, y0, radius, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }
}
