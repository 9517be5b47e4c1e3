use std::sync::Arc;

use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Root,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};

use crate::{
    classifier::{ClassifierCommand, ClassifierMode, LabelCounter},
    config::AppConfig,
    pipeline::{self, OverlayCompositor, Pipeline},
    storage::{CAMERA_INDEX_KEY, JsonFileStore, LABEL_COUNTER_KEY, PersistentStore},
    types::{ClassifierEvent, PoseUpdate},
};

mod main_view;
mod render_util;

pub struct UiSettings {
    pub config: AppConfig,
    pub store: PersistentStore<JsonFileStore>,
    pub counter: LabelCounter,
    pub camera_index: u32,
}

pub fn launch_ui(app: &mut App, settings: UiSettings) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Pose Universe".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(settings));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    config: AppConfig,
    store: PersistentStore<JsonFileStore>,
    counter: LabelCounter,
    cameras: Vec<(u32, String)>,
    camera_index: u32,
    pipeline: Option<Pipeline>,
    compositor: OverlayCompositor,
    latest_image: Option<Arc<RenderImage>>,
    latest_pose_score: Option<f32>,
    latest_event: Option<String>,
    frames_seen: u64,
    error: Option<String>,
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Vec<(u32, String)> {
    match pipeline::available_cameras() {
        Ok(devices) => devices.into_iter().map(|d| (d.index, d.label)).collect(),
        Err(err) => {
            log::warn!("failed to enumerate cameras: {err:?}");
            Vec::new()
        }
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Vec<(u32, String)> {
    Vec::new()
}

impl AppView {
    fn new(settings: UiSettings) -> Self {
        let UiSettings {
            config,
            store,
            counter,
            camera_index,
        } = settings;
        let cameras = if config.image.is_some() {
            Vec::new()
        } else {
            list_cameras()
        };
        let compositor = OverlayCompositor::new(
            config.tensor,
            config.display,
            config.min_confidence,
            config.flip_horizontal,
        );

        let mut view = Self {
            config,
            store,
            counter,
            cameras,
            camera_index,
            pipeline: None,
            compositor,
            latest_image: None,
            latest_pose_score: None,
            latest_event: None,
            frames_seen: 0,
            error: None,
        };
        view.start_source();
        view
    }

    fn start_source(&mut self) {
        match pipeline::open_source(&self.config, self.camera_index) {
            Ok(source) => {
                self.pipeline = Some(pipeline::start_pipeline(
                    &self.config,
                    source,
                    self.counter.clone(),
                ));
                self.error = None;
            }
            Err(err) => {
                log::error!("failed to open frame source: {err:?}");
                self.error = Some(format!("{err:#}"));
            }
        }
    }

    fn switch_camera(&mut self, index: u32) {
        if index == self.camera_index && self.pipeline.is_some() {
            return;
        }
        // joins the old loop before the device is reopened
        self.pipeline = None;
        self.camera_index = index;
        self.persist(CAMERA_INDEX_KEY, index);
        self.start_source();
    }

    fn toggle_running(&mut self) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let result = if pipeline.handle.is_running() {
            pipeline.handle.stop()
        } else {
            pipeline.handle.start()
        };
        if let Err(err) = result {
            log::warn!("frame loop: {err}");
            self.error = Some(err.to_string());
        }
    }

    fn next_label(&mut self) {
        let value = self.counter.advance();
        log::info!("label counter {value}: {}", self.counter.mode().describe());
        self.persist(LABEL_COUNTER_KEY, value);
    }

    fn reset_label(&mut self) {
        self.counter.reset();
        self.persist(LABEL_COUNTER_KEY, 0u32);
    }

    fn clear_examples(&mut self, all: bool) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let command = match (all, self.counter.mode()) {
            (true, _) => ClassifierCommand::ClearAll,
            (false, ClassifierMode::Train { label }) => ClassifierCommand::ClearClass(label),
            (false, _) => return,
        };
        if pipeline.commands.send(command).is_err() {
            log::warn!("frame loop is gone; {command:?} dropped");
        }
        self.latest_event = None;
    }

    fn persist(&mut self, key: &str, value: u32) {
        if let Err(err) = self.store.store(key, value) {
            log::warn!("{err}");
            self.error = Some(err.to_string());
        }
    }

    fn poll_updates(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let mut latest: Option<PoseUpdate> = None;
        while let Ok(update) = pipeline.updates.try_recv() {
            self.frames_seen += 1;
            latest = Some(update);
        }
        let Some(update) = latest else {
            return;
        };

        self.latest_pose_score = update.pose.as_ref().map(|p| p.score);
        match &update.classifier {
            Some(ClassifierEvent::ExampleAdded { label, total }) => {
                self.latest_event = Some(format!("class {label}: {total} examples"));
            }
            Some(ClassifierEvent::Predicted(prediction)) => {
                self.latest_event = Some(prediction.display_text());
            }
            None => {}
        }

        match self.compositor.compose(&update) {
            Ok(composed) => {
                if let Some(image) = render_util::frame_to_image(&composed) {
                    self.replace_latest_image(image, window, cx);
                }
            }
            Err(err) => log::warn!("failed to compose frame: {err:?}"),
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Release the previous texture or the sprite atlas keeps every frame.
            cx.drop_image(old_image, Some(window));
        }
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_updates(window, cx);
        self.render_main(cx)
    }
}
