#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod canvas;
pub mod compositor;
pub mod estimator;
pub mod frame_loop;
pub mod lifecycle;
#[cfg(feature = "camera-nokhwa")]
pub mod rgba_converter;
pub mod skeleton;
pub mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};

use crate::{
    classifier::{ClassifierCommand, ExampleClassifier, KnnClassifier, LabelCounter, PoseClassifier},
    config::AppConfig,
    model_download::{ModelDownloadEvent, ensure_model_ready},
    types::{Frame, Pose, PoseUpdate},
};

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraSource, available_cameras};
pub use compositor::{CompositedFrame, OverlayCompositor};
pub use estimator::OrtPoseNet;
pub use frame_loop::{FrameLoopHandle, FrameLoopOptions, PoseSink, spawn_frame_loop};
pub use lifecycle::LoopControl;
pub use source::{FrameSource, StillImageSource};

// Results waiting for the UI; the oldest is dropped when it falls behind.
const UPDATE_QUEUE: usize = 2;

/// Runs the classifier on each pose and forwards the result to a channel.
pub struct ChannelSink<C: ExampleClassifier = KnnClassifier> {
    classifier: PoseClassifier<C>,
    tx: Sender<PoseUpdate>,
    stale: Receiver<PoseUpdate>,
}

impl<C: ExampleClassifier> ChannelSink<C> {
    /// Returns the sink and the receiving end of a `capacity`-bounded queue.
    pub fn bounded(classifier: PoseClassifier<C>, capacity: usize) -> (Self, Receiver<PoseUpdate>) {
        let (tx, rx) = bounded(capacity);
        let sink = Self {
            classifier,
            tx,
            stale: rx.clone(),
        };
        (sink, rx)
    }
}

impl<C: ExampleClassifier> PoseSink for ChannelSink<C> {
    fn deliver(&mut self, frame: &Frame, pose: Option<&Pose>) {
        self.classifier.apply_pending_commands();
        let classifier = pose.and_then(|pose| self.classifier.process(pose));
        let update = PoseUpdate {
            frame: frame.clone(),
            pose: pose.cloned(),
            classifier,
        };
        if let Err(TrySendError::Full(update)) = self.tx.try_send(update) {
            let _ = self.stale.try_recv();
            let _ = self.tx.try_send(update);
        }
    }
}

/// Picks the still image if one was given, otherwise the camera.
pub fn open_source(config: &AppConfig, camera_index: u32) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &config.image {
        let source = StillImageSource::open(path, config.tensor, None)?;
        return Ok(Box::new(source));
    }
    open_camera(config, camera_index)
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(config: &AppConfig, camera_index: u32) -> Result<Box<dyn FrameSource>> {
    let source = CameraSource::start(camera_index, config.texture, config.tensor)
        .with_context(|| format!("failed to start camera {camera_index}"))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_config: &AppConfig, _camera_index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without camera support; pass --image <path>")
}

pub struct Pipeline {
    pub handle: FrameLoopHandle,
    pub updates: Receiver<PoseUpdate>,
    pub commands: Sender<ClassifierCommand>,
}

/// Spawns the frame loop with the ORT PoseNet estimator. The model is
/// fetched and loaded on the loop thread.
pub fn start_pipeline<S: FrameSource>(config: &AppConfig, source: S, counter: LabelCounter) -> Pipeline {
    let (commands, command_rx) = unbounded();
    let (sink, updates) = ChannelSink::bounded(
        PoseClassifier::with_knn(counter).with_commands(command_rx),
        UPDATE_QUEUE,
    );
    let model = config.model.clone();
    let options = FrameLoopOptions {
        flip_horizontal: config.flip_horizontal,
        ..FrameLoopOptions::default()
    };

    let handle = spawn_frame_loop(
        Arc::new(LoopControl::new()),
        source,
        move || {
            ensure_model_ready(&model.path, model.download_url.as_deref(), |event| match event {
                ModelDownloadEvent::Started { total } => {
                    log::info!("downloading pose model ({total:?} bytes)")
                }
                ModelDownloadEvent::Finished => log::debug!("pose model ready"),
                _ => {}
            })
                .with_context(|| format!("failed to prepare pose model at {}", model.path.display()))?;
            OrtPoseNet::load(model)
        },
        sink,
        options,
    );

    Pipeline {
        handle,
        updates,
        commands,
    }
}
