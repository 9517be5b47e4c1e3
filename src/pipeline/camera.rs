use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
};

use super::{
    rgba_converter::{self, PixelLayout},
    source::{FrameSource, resize_rgba},
};
use crate::types::{Frame, Size};

// macOS built-in cameras often reject YUYV even though Nokhwa reports it.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

// Frames queued between capture and the frame loop, plus one in flight.
const FRAME_QUEUE: usize = 1;
const RECYCLE_QUEUE: usize = 3;

fn requested_formats(texture: Size) -> [RequestedFormat<'static>; 4] {
    let resolution = Resolution::new(texture.width, texture.height);
    [
        RequestedFormat::with_formats(
            RequestedFormatType::Closest(CameraFormat::new(resolution, FrameFormat::MJPEG, 30)),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Any decodable format, preferring higher FPS over driver defaults.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .enumerate()
        .map(|(position, info)| CameraDevice {
            index: match info.index() {
                CameraIndex::Index(idx) => *idx,
                CameraIndex::String(_) => position as u32,
            },
            label: info.human_name(),
        })
        .collect())
}

fn layout_of(format: FrameFormat) -> PixelLayout {
    match format {
        FrameFormat::NV12 => PixelLayout::Nv12,
        FrameFormat::YUYV => PixelLayout::Yuyv,
        FrameFormat::MJPEG => PixelLayout::Mjpeg,
        FrameFormat::RAWRGB => PixelLayout::Rgb,
        FrameFormat::RAWBGR => PixelLayout::Bgr,
        FrameFormat::GRAY => PixelLayout::Gray,
    }
}

fn build_camera(index: u32, texture: Size) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats(texture) {
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Live camera frames, decoded and resized to the tensor resolution on a
/// capture thread. Released buffers are sent back and reused.
pub struct CameraSource {
    frame_rx: Receiver<Frame>,
    recycle_tx: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraSource {
    pub fn start(index: u32, texture: Size, target: Size) -> Result<Self> {
        // Fail fast before spawning the capture thread.
        build_camera(index, texture)?;

        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE);
        let (recycle_tx, recycle_rx) = bounded(RECYCLE_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index, texture) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to open camera {index}: {err:?}");
                    return;
                }
            };
            log::info!("camera {index} streaming as {:?}", camera.camera_format());
            capture_loop(&mut camera, target, &stop_flag, &frame_tx, &recycle_rx);
            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        });

        Ok(Self {
            frame_rx,
            recycle_tx,
            stop,
            handle: Some(handle),
        })
    }
}

fn capture_loop(
    camera: &mut Camera,
    target: Size,
    stop: &AtomicBool,
    frame_tx: &Sender<Frame>,
    recycle_rx: &Receiver<Vec<u8>>,
) {
    let mut decoded = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        let frame_start = Instant::now();
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!(
                    "camera frame read failed (after {:?}): {err:?}",
                    frame_start.elapsed()
                );
                continue;
            }
        };

        let resolution = buffer.resolution();
        let decoded_size = match rgba_converter::convert_into(
            layout_of(buffer.source_frame_format()),
            buffer.buffer(),
            resolution.width_x,
            resolution.height_y,
            &mut decoded,
        ) {
            Ok((w, h)) => Size::new(w, h),
            Err(err) => {
                log::warn!("failed to decode camera frame {err:?}");
                continue;
            }
        };

        let mut rgba = recycle_rx.try_recv().unwrap_or_default();
        if let Err(err) = resize_rgba(&decoded, decoded_size, target, &mut rgba) {
            log::warn!("failed to resize camera frame {err:?}");
            continue;
        }

        // Drop the frame if the loop is busy; the next one replaces it.
        let _ = frame_tx.try_send(Frame::new(rgba, target.width, target.height));
    }
}

impl FrameSource for CameraSource {
    fn try_next(&mut self) -> Option<Frame> {
        self.frame_rx.try_recv().ok()
    }

    fn release(&mut self, frame: Frame) {
        let _ = self.recycle_tx.try_send(frame.rgba);
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
