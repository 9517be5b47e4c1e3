use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::RecvTimeoutError;

use crate::{
    classifier::LabelCounter,
    config::AppConfig,
    pipeline::{self, CompositedFrame, OverlayCompositor},
    types::{ClassifierEvent, PoseUpdate},
};

const UPDATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the loop without a window until `config.frames` results arrived.
pub fn run(config: &AppConfig, camera_index: u32, counter: LabelCounter) -> Result<()> {
    if let Some(dir) = &config.snapshot_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;
    }

    let source = pipeline::open_source(config, camera_index)?;
    let running = pipeline::start_pipeline(config, source, counter.clone());
    let mut compositor = OverlayCompositor::new(
        config.tensor,
        config.display,
        config.min_confidence,
        config.flip_horizontal,
    );
    log::info!(
        "headless run for {} frames, {}",
        config.frames,
        counter.mode().describe()
    );

    let mut with_pose = 0usize;
    for index in 0..config.frames {
        let update = match running.updates.recv_timeout(UPDATE_TIMEOUT) {
            Ok(update) => update,
            Err(RecvTimeoutError::Timeout) => {
                return Err(anyhow!(
                    "no frame after {UPDATE_TIMEOUT:?} (loop is {})",
                    running.handle.state().label()
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("frame loop exited early"));
            }
        };
        if update.pose.is_some() {
            with_pose += 1;
        }
        log_update(index, &update);

        if let Some(dir) = &config.snapshot_dir {
            let composed = compositor.compose(&update)?;
            write_snapshot(&dir.join(format!("frame_{index:04}.png")), &composed)?;
        }
    }

    if let Some(stats) = running.handle.shutdown() {
        log::info!(
            "processed {} frames, {} with a pose ({} inference failures)",
            stats.frames,
            with_pose,
            stats.failures
        );
    }
    Ok(())
}

fn log_update(index: usize, update: &PoseUpdate) {
    let Some(pose) = &update.pose else {
        log::info!("frame {index}: no pose");
        return;
    };
    if log::log_enabled!(log::Level::Debug) {
        let confident: Vec<&str> = pose
            .keypoints
            .iter()
            .filter(|k| k.score >= 0.5)
            .map(|k| k.name.label())
            .collect();
        log::debug!(
            "frame {index}: {:?} after capture, confident parts [{}]",
            update.frame.timestamp.elapsed(),
            confident.join(", ")
        );
    }
    match &update.classifier {
        Some(ClassifierEvent::ExampleAdded { label, total }) => {
            log::info!(
                "frame {index}: pose {:.2}, class {label} now has {total} examples",
                pose.score
            );
        }
        Some(ClassifierEvent::Predicted(prediction)) => {
            log::info!(
                "frame {index}: pose {:.2}, {}",
                pose.score,
                prediction.display_text()
            );
        }
        None => log::info!("frame {index}: pose {:.2}", pose.score),
    }
}

pub fn write_snapshot(path: &Path, frame: &CompositedFrame) -> Result<()> {
    let image = image::RgbaImage::from_raw(frame.size.width, frame.size.height, frame.rgba.clone())
        .ok_or_else(|| anyhow!("snapshot buffer does not match {:?}", frame.size))?;
    image
        .save(path)
        .with_context(|| format!("failed to write snapshot {}", path.display()))
}
