#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod classifier;
mod config;
mod headless;
mod model_download;
mod pipeline;
mod storage;
mod types;
mod ui;

use anyhow::{Context, Result};
use gpui::Application;

use classifier::LabelCounter;
use config::AppConfig;
use storage::{CAMERA_INDEX_KEY, JsonFileStore, LABEL_COUNTER_KEY, PersistentStore};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::from_args(&args)?;

    let backend = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("failed to open settings {}", config.store_path.display()))?;
    log::debug!("settings loaded from {}", backend.path().display());
    let store = PersistentStore::new(backend);
    let counter = LabelCounter::new(store.load_u32_or(LABEL_COUNTER_KEY, 0));
    let camera_index = config
        .camera_index
        .unwrap_or_else(|| store.load_u32_or(CAMERA_INDEX_KEY, 0));
    log::info!(
        "starting with camera {camera_index}, {}",
        counter.mode().describe()
    );

    if config.headless {
        return headless::run(&config, camera_index, counter);
    }

    let settings = ui::UiSettings {
        config,
        store,
        counter,
        camera_index,
    };
    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, settings) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
