//! Deployment configuration for the effect service.
//!
//! Everything in here is fixed per deployment (account, effect, endpoints)
//! and is never edited while a run is in flight.

use crate::backends::EffectKind;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.chromastudio.ai";
pub const DEFAULT_CONTENT_BASE: &str = "https://contents.maxstudio.ai";
pub const DEFAULT_USER_ID: &str = "DObRu1vyStbUynoQmTcHBlhs55z2";
pub const DEFAULT_EFFECT_ID: &str = "mugshot";
pub const DEFAULT_MODEL: &str = "image-effects";
pub const DEFAULT_TOOL_TYPE: &str = "image-effects";

/// Effect service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    /// Base URL of the upload-URL and generation endpoints
    pub api_base: String,

    /// Base URL uploaded objects are served from
    pub content_base: String,

    /// Account identifier jobs are submitted and addressed under
    pub user_id: String,

    /// Effect to apply
    pub effect_id: String,

    /// Processing model; `video-effects` selects the video endpoints
    pub model: String,

    /// Tool type sent with image submissions
    pub tool_type: String,

    /// Status polling cadence
    pub poll: PollConfig,

    /// Where and how downloads are saved
    pub download: DownloadConfig,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            effect_id: DEFAULT_EFFECT_ID.to_string(),
            model: DEFAULT_MODEL.to_string(),
            tool_type: DEFAULT_TOOL_TYPE.to_string(),
            poll: PollConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

impl EffectConfig {
    /// Endpoint family selected by the configured model
    pub fn effect_kind(&self) -> EffectKind {
        EffectKind::from_model(&self.model)
    }

    /// `api_base` joined with a path, without doubling slashes
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Public URL an uploaded object is expected to be served from
    pub fn content_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.content_base.trim_end_matches('/'), file_name)
    }

    /// With API endpoint
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    /// With content serving base
    pub fn with_content_base(mut self, url: impl Into<String>) -> Self {
        self.content_base = url.into();
        self
    }

    /// With processing model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With polling cadence
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// With download directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download.output_dir = dir.into();
        self
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON; missing keys fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// Status polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Wait between two status queries, in milliseconds
    pub interval_ms: u64,

    /// Queries issued before giving up
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_polls: 60,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_polls,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Local download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory saved results land in
    pub output_dir: PathBuf,

    /// Filename prefix, e.g. `mugshot` for `mugshot_Ab3x9Q.png`
    pub file_prefix: String,

    /// Length of the random part of the filename
    pub id_len: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "mugshot".to_string(),
            id_len: crate::ident::SHORT_ID_LEN,
        }
    }
}
