//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration structures for the thumbnail
//! service: where pages are captured from, how the cache is bounded, and the
//! fixed capture and thumbnail parameters.

use crate::ThumbnailError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default cache cost ceiling: 256 MiB of thumbnail bytes.
pub const DEFAULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum process lifetime.
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Main configuration structure for the thumbnail service
///
/// Every field has a default so a config file only needs to name what it
/// overrides. `run_url` and `port` have no usable default and must be
/// supplied by the file, the environment or the command line.
///
/// # Examples
///
/// ```rust
/// use webshot::Config;
///
/// let config = Config {
///     run_url: Some("https://run.example.com/plunks".to_string()),
///     port: Some(8080),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL pages are captured from; the resource id is appended as a
    /// path segment.
    #[serde(alias = "runURL")]
    pub run_url: Option<String>,

    /// Address the HTTP server binds to (default: 0.0.0.0)
    pub host: String,

    /// Port the HTTP server listens on
    pub port: Option<u16>,

    /// Upper bound on the summed size of cached thumbnails, in bytes
    /// (default: 256 MiB)
    pub cache_capacity: usize,

    /// The process exits after running this long (default: 1 hour)
    pub max_lifetime: Duration,

    /// Page capture parameters
    pub capture: CaptureSettings,

    /// Thumbnail transform parameters
    pub thumbnail: ThumbnailSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_url: None,
            host: "0.0.0.0".to_string(),
            port: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            capture: CaptureSettings::default(),
            thumbnail: ThumbnailSettings::default(),
        }
    }
}

impl Config {
    /// Load a JSON configuration file.
    pub async fn from_file(path: &Path) -> Result<Self, ThumbnailError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ThumbnailError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ThumbnailError> {
        self.base_url()?;

        if self.cache_capacity == 0 {
            return Err(config_error("cache capacity must be greater than 0"));
        }
        if self.max_lifetime.is_zero() {
            return Err(config_error("max lifetime must be greater than 0"));
        }
        if self.capture.viewport.width == 0 || self.capture.viewport.height == 0 {
            return Err(config_error("viewport dimensions must be greater than 0"));
        }
        self.thumbnail.validate()
    }

    /// Parsed `run_url`. Missing or malformed values are fatal at startup.
    pub fn base_url(&self) -> Result<Url, ThumbnailError> {
        let raw = self
            .run_url
            .as_deref()
            .ok_or_else(|| config_error("run_url is required"))?;
        let url = Url::parse(raw)?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(config_error(&format!(
                "run_url must be http or https, got {scheme}"
            ))),
        }
    }

    pub fn require_port(&self) -> Result<u16, ThumbnailError> {
        self.port.ok_or_else(|| config_error("port is required"))
    }
}

fn config_error(message: &str) -> ThumbnailError {
    ThumbnailError::Configuration(message.to_string())
}

/// Browser viewport used when rendering a page for capture
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1024)
    pub width: u32,

    /// Viewport height in pixels (default: 768)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,

    /// Whether to emulate a mobile device (default: false)
    pub mobile: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            device_scale_factor: 1.0,
            mobile: false,
        }
    }
}

/// Parameters handed to the capture collaborator
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub viewport: Viewport,

    /// Time to let the page settle before the screenshot is taken
    /// (default: 2 seconds)
    pub delay: Duration,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string (default: Chrome default)
    pub user_agent: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            delay: Duration::from_secs(2),
            chrome_path: None,
            user_agent: None,
        }
    }
}

/// Where the crop window sits on the resized image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CropAnchor {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

impl CropAnchor {
    /// Top-left corner of a `crop` sized window anchored inside `outer`.
    pub fn offset(self, outer: (u32, u32), crop: (u32, u32)) -> (u32, u32) {
        let spare_x = outer.0.saturating_sub(crop.0);
        let spare_y = outer.1.saturating_sub(crop.1);

        let x = match self {
            CropAnchor::NorthWest | CropAnchor::West | CropAnchor::SouthWest => 0,
            CropAnchor::North | CropAnchor::Center | CropAnchor::South => spare_x / 2,
            CropAnchor::NorthEast | CropAnchor::East | CropAnchor::SouthEast => spare_x,
        };
        let y = match self {
            CropAnchor::NorthWest | CropAnchor::North | CropAnchor::NorthEast => 0,
            CropAnchor::West | CropAnchor::Center | CropAnchor::East => spare_y / 2,
            CropAnchor::SouthWest | CropAnchor::South | CropAnchor::SouthEast => spare_y,
        };

        (x, y)
    }
}

/// Fixed thumbnail transform: resize to a width, crop at an anchor, encode
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Target width; height follows the aspect ratio (default: 248)
    pub resize_width: u32,

    /// Crop window width (default: 248)
    pub crop_width: u32,

    /// Crop window height (default: 372)
    pub crop_height: u32,

    /// Crop anchor (default: NorthWest)
    pub anchor: CropAnchor,

    /// Encoder quality, ImageMagick PNG convention (default: 75)
    pub quality: u8,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            resize_width: 248,
            crop_width: 248,
            crop_height: 372,
            anchor: CropAnchor::NorthWest,
            quality: 75,
        }
    }
}

impl ThumbnailSettings {
    pub fn validate(&self) -> Result<(), ThumbnailError> {
        if self.resize_width == 0 {
            return Err(config_error("resize width must be greater than 0"));
        }
        if self.crop_width == 0 || self.crop_height == 0 {
            return Err(config_error("crop dimensions must be greater than 0"));
        }
        if self.quality > 100 {
            return Err(config_error("quality must be between 0 and 100"));
        }
        Ok(())
    }
}

/// Generate Chrome command-line arguments for headless capture
pub fn get_chrome_args(settings: &CaptureSettings) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        format!(
            "--window-size={},{}",
            settings.viewport.width, settings.viewport.height
        ),
        format!("--user-data-dir=/tmp/webshot-chromium-{unique_id}"),
    ];

    if let Some(user_agent) = &settings.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    settings: &CaptureSettings,
) -> Result<chromiumoxide::browser::BrowserConfig, ThumbnailError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(settings.viewport.width, settings.viewport.height)
        .args(get_chrome_args(settings));

    if let Some(chrome_path) = &settings.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ThumbnailError::Configuration)
}
