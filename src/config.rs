use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

use crate::{
    pipeline::{
        estimator::{Architecture, ModelConfig},
        skeleton::MIN_PART_CONFIDENCE,
    },
    types::Size,
};

pub const DEFAULT_TEXTURE: Size = Size::new(1600, 1200);
pub const DEFAULT_TENSOR: Size = Size::new(152, 200);
pub const DEFAULT_DISPLAY: Size = Size::new(480, 640);
pub const DEFAULT_STORE: &str = "data/settings.json";
pub const DEFAULT_HEADLESS_FRAMES: usize = 30;

const USAGE: &str = "Usage: pose-universe [--model <path>] [--model-url <url>] \
[--architecture mobilenetv1|resnet50] [--output-stride <n>] [--input-resolution <px>] \
[--camera <index>] [--image <path>] [--texture WxH] [--tensor WxH] [--display WxH] \
[--min-confidence <0-1>] [--no-flip] [--store <path>] \
[--headless] [--frames <n>] [--snapshot-dir <dir>]";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub model: ModelConfig,
    /// `None` means the stored camera index, falling back to 0.
    pub camera_index: Option<u32>,
    pub image: Option<PathBuf>,
    pub texture: Size,
    pub tensor: Size,
    pub display: Size,
    pub min_confidence: f32,
    pub flip_horizontal: bool,
    pub store_path: PathBuf,
    pub headless: bool,
    pub frames: usize,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            camera_index: None,
            image: None,
            texture: DEFAULT_TEXTURE,
            tensor: DEFAULT_TENSOR,
            display: DEFAULT_DISPLAY,
            min_confidence: MIN_PART_CONFIDENCE,
            flip_horizontal: true,
            store_path: PathBuf::from(DEFAULT_STORE),
            headless: false,
            frames: DEFAULT_HEADLESS_FRAMES,
            snapshot_dir: None,
        }
    }
}

fn value<'a>(args: &'a [String], idx: usize, flag: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn positive<T>(raw: &str, flag: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = raw
        .parse::<T>()
        .map_err(|_| anyhow!("{flag} must be a positive integer"))?;
    if parsed <= T::default() {
        bail!("{flag} must be a positive integer");
    }
    Ok(parsed)
}

/// Parses `WxH`, e.g. `152x200`.
pub fn parse_size(raw: &str) -> Result<Size> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WxH, got {raw:?}"))?;
    let width = positive::<u32>(w.trim(), "width").with_context(|| format!("in size {raw:?}"))?;
    let height = positive::<u32>(h.trim(), "height").with_context(|| format!("in size {raw:?}"))?;
    Ok(Size::new(width, height))
}

impl AppConfig {
    /// `args` includes the program name, as returned by `std::env::args`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = AppConfig::default();

        let mut idx = 1;
        while idx < args.len() {
            let flag = args[idx].as_str();
            match flag {
                "--model" => {
                    idx += 1;
                    config.model.path = PathBuf::from(value(args, idx, flag)?);
                }
                "--model-url" => {
                    idx += 1;
                    config.model.download_url = Some(value(args, idx, flag)?.to_string());
                }
                "--architecture" => {
                    idx += 1;
                    let raw = value(args, idx, flag)?;
                    config.model.architecture = Architecture::parse(raw)
                        .ok_or_else(|| anyhow!("unknown architecture {raw:?}"))?;
                }
                "--output-stride" => {
                    idx += 1;
                    config.model.output_stride = positive(value(args, idx, flag)?, flag)?;
                }
                "--input-resolution" => {
                    idx += 1;
                    config.model.input_resolution = positive(value(args, idx, flag)?, flag)?;
                }
                "--camera" => {
                    idx += 1;
                    let index = value(args, idx, flag)?
                        .parse::<u32>()
                        .with_context(|| format!("{flag} must be a camera index"))?;
                    config.camera_index = Some(index);
                }
                "--image" => {
                    idx += 1;
                    config.image = Some(PathBuf::from(value(args, idx, flag)?));
                }
                "--texture" => {
                    idx += 1;
                    config.texture = parse_size(value(args, idx, flag)?)?;
                }
                "--tensor" => {
                    idx += 1;
                    config.tensor = parse_size(value(args, idx, flag)?)?;
                }
                "--display" => {
                    idx += 1;
                    config.display = parse_size(value(args, idx, flag)?)?;
                }
                "--min-confidence" => {
                    idx += 1;
                    let threshold = value(args, idx, flag)?
                        .parse::<f32>()
                        .with_context(|| format!("{flag} must be a number"))?;
                    if !(0.0..=1.0).contains(&threshold) {
                        bail!("{flag} must be between 0 and 1");
                    }
                    config.min_confidence = threshold;
                }
                "--no-flip" => config.flip_horizontal = false,
                "--store" => {
                    idx += 1;
                    config.store_path = PathBuf::from(value(args, idx, flag)?);
                }
                "--headless" => config.headless = true,
                "--frames" => {
                    idx += 1;
                    config.frames = positive(value(args, idx, flag)?, flag)?;
                }
                "--snapshot-dir" => {
                    idx += 1;
                    config.snapshot_dir = Some(PathBuf::from(value(args, idx, flag)?));
                }
                "--help" | "-h" => bail!(USAGE),
                other => bail!("unknown argument {other:?}\n\n{USAGE}"),
            }
            idx += 1;
        }

        Ok(config)
    }
}
