use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

/// Pixel layouts a capture device may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

/// Decodes a raw capture buffer into `out` as tightly packed RGBA.
/// Returns the decoded dimensions, which differ from the nominal ones only for MJPEG.
pub fn convert_into(
    layout: PixelLayout,
    data: &[u8],
    width: u32,
    height: u32,
    out: &mut Vec<u8>,
) -> Result<(u32, u32)> {
    match layout {
        PixelLayout::Nv12 => nv12_into(data, width, height, out).map(|_| (width, height)),
        PixelLayout::Yuyv => yuyv_into(data, width, height, out).map(|_| (width, height)),
        PixelLayout::Mjpeg => mjpeg_into(data, out),
        PixelLayout::Rgb => packed_into(data, width, height, 3, false, out).map(|_| (width, height)),
        PixelLayout::Bgr => packed_into(data, width, height, 3, true, out).map(|_| (width, height)),
        PixelLayout::Gray => packed_into(data, width, height, 1, false, out).map(|_| (width, height)),
    }
}

fn ensure_len(data: &[u8], expected: usize, what: &str) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{what} buffer too small: got {}, expected {}",
            data.len(),
            expected
        ));
    }
    Ok(())
}

fn reset_rgba(out: &mut Vec<u8>, pixels: usize) {
    out.clear();
    out.resize(pixels * 4, 0);
}

fn nv12_into(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) -> Result<()> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;
    ensure_len(data, y_plane_len + uv_plane_len, "NV12")?;

    reset_rgba(out, y_plane_len);
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        out,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))
}

fn yuyv_into(data: &[u8], width: u32, height: u32, out: &mut Vec<u8>) -> Result<()> {
    let pixels = width as usize * height as usize;
    ensure_len(data, pixels * 2, "YUYV")?;

    reset_rgba(out, pixels);
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        out,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))
}

fn mjpeg_into(data: &[u8], out: &mut Vec<u8>) -> Result<(u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder returned no image info"))?;

    let width = u32::from(info.width);
    let height = u32::from(info.height);
    let expected = usize::try_from(width)
        .and_then(|w| usize::try_from(height).map(|h| w * h * 4))
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    ensure_len(&rgba, expected, "MJPEG output")?;

    *out = rgba;
    out.truncate(expected);
    Ok((width, height))
}

fn packed_into(
    data: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    swap_rb: bool,
    out: &mut Vec<u8>,
) -> Result<()> {
    let pixels = width as usize * height as usize;
    let what = if channels == 1 { "GRAY" } else { "RGB" };
    ensure_len(data, pixels * channels, what)?;

    reset_rgba(out, pixels);
    out.par_chunks_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            match (channels, swap_rb) {
                (1, _) => {
                    dst[0] = src[0];
                    dst[1] = src[0];
                    dst[2] = src[0];
                }
                (_, true) => {
                    dst[0] = src[2];
                    dst[1] = src[1];
                    dst[2] = src[0];
                }
                _ => dst[..3].copy_from_slice(&src[..3]),
            }
            dst[3] = 255;
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_swaps_channels() {
        let mut out = Vec::new();
        let dims = convert_into(PixelLayout::Bgr, &[1, 2, 3, 4, 5, 6], 2, 1, &mut out).unwrap();
        assert_eq!(dims, (2, 1));
        assert_eq!(out, vec![3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn gray_expands_to_rgba() {
        let mut out = vec![7; 100];
        convert_into(PixelLayout::Gray, &[9, 200], 2, 1, &mut out).unwrap();
        assert_eq!(out, vec![9, 9, 9, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        let mut out = Vec::new();
        assert!(convert_into(PixelLayout::Rgb, &[0; 5], 2, 1, &mut out).is_err());
        assert!(convert_into(PixelLayout::Yuyv, &[0; 3], 2, 1, &mut out).is_err());
        assert!(convert_into(PixelLayout::Nv12, &[0; 2], 2, 2, &mut out).is_err());
    }
}
