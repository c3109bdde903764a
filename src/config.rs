use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::geometry::ViewSize;
use crate::ingest::SourceConfig;
use crate::screen::ScreenConfig;
use crate::smoother::DEFAULT_SMOOTHING_FACTOR;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3001";
const DEFAULT_CREDENTIALS_PATH: &str = "device-scan.credentials";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "scripted";
const DEFAULT_VIEW_WIDTH: f32 = 390.0;
const DEFAULT_VIEW_HEIGHT: f32 = 844.0;

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    server_url: Option<String>,
    credentials_path: Option<PathBuf>,
    device_token: Option<String>,
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    smoothing_factor: Option<f32>,
    view_width: Option<f32>,
    view_height: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub server_url: String,
    pub credentials_path: PathBuf,
    /// Push-delivery token sent with the phone sign-in step.
    pub device_token: String,
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    /// Minimum label confidence. `None` keeps the backend's own threshold.
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub smoothing_factor: f32,
    pub view: ViewSize,
}

impl ScannerConfig {
    /// Load from `DEVICE_SCAN_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DEVICE_SCAN_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        Self {
            server_url: file
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            credentials_path: file
                .credentials_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH)),
            device_token: file.device_token.unwrap_or_default(),
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                script_path: detector.script_path,
                min_confidence: detector.min_confidence,
            },
            overlay: OverlaySettings {
                smoothing_factor: overlay.smoothing_factor.unwrap_or(DEFAULT_SMOOTHING_FACTOR),
                view: ViewSize::new(
                    overlay.view_width.unwrap_or(DEFAULT_VIEW_WIDTH),
                    overlay.view_height.unwrap_or(DEFAULT_VIEW_HEIGHT),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("DEVICE_SCAN_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(path) = non_empty_env("DEVICE_SCAN_CREDENTIALS") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(url) = non_empty_env("DEVICE_SCAN_SOURCE") {
            self.source.url = url;
        }
        if let Some(backend) = non_empty_env("DEVICE_SCAN_BACKEND") {
            self.detector.backend = backend;
        }
        if let Some(model) = non_empty_env("DEVICE_SCAN_MODEL") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(script) = non_empty_env("DEVICE_SCAN_SCRIPT") {
            self.detector.script_path = Some(PathBuf::from(script));
        }
        if let Some(fps) = non_empty_env("DEVICE_SCAN_FPS") {
            self.source.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("DEVICE_SCAN_FPS must be a positive integer"))?;
        }
        if let Some(alpha) = non_empty_env("DEVICE_SCAN_SMOOTHING") {
            self.overlay.smoothing_factor = alpha
                .parse()
                .map_err(|_| anyhow!("DEVICE_SCAN_SMOOTHING must be a number in [0, 1]"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let url = url::Url::parse(&self.server_url)
            .map_err(|e| anyhow!("invalid server_url '{}': {}", self.server_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must use http or https"));
        }
        self.server_url = self.server_url.trim_end_matches('/').to_string();

        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be at least 1"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source frame size must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.overlay.smoothing_factor) {
            return Err(anyhow!("smoothing_factor must be within [0, 1]"));
        }
        if let Some(min) = self.detector.min_confidence.filter(|v| !(0.0..=1.0).contains(v)) {
            return Err(anyhow!("min_confidence {} must be within [0, 1]", min));
        }
        if self.overlay.view.is_empty() {
            return Err(anyhow!("overlay view size must be non-zero"));
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        Ok(())
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            url: self.source.url.clone(),
            width: self.source.width,
            height: self.source.height,
        }
    }

    pub fn screen_config(&self) -> ScreenConfig {
        ScreenConfig {
            target_fps: self.source.target_fps,
            view: self.overlay.view,
            smoothing_factor: self.overlay.smoothing_factor,
            min_confidence: self.detector.min_confidence.unwrap_or(0.0),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
