//! Saving a generated result locally.
//!
//! The resolver walks an ordered list of strategies and stops at the first
//! one that succeeds:
//!
//! 1. [`DirectFetch`]: download the bytes and save them.
//! 2. [`LocalReencode`]: re-encode the preview already on display as PNG
//!    (images only).
//! 3. [`OpenExternal`]: hand the URL to the system browser.
//!
//! Failures of individual tiers are logged and never reach the user.

use crate::config::DownloadConfig;
use crate::error::{PipelineError, Result};
use crate::ident::nano_id;
use crate::media::{extension_for, MediaKind};
use crate::view::DisplayedImage;
use anyhow::{bail, ensure, Context};
use async_trait::async_trait;
use image::ImageFormat;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Download strategy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTierKind {
    DirectFetch,
    LocalReencode,
    OpenExternal,
}

impl std::fmt::Display for DownloadTierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectFetch => write!(f, "direct-fetch"),
            Self::LocalReencode => write!(f, "local-reencode"),
            Self::OpenExternal => write!(f, "open-external"),
        }
    }
}

/// State of the download control for the invocation in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    Idle,
    Running(DownloadTierKind),
}

/// What a download ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, tier: DownloadTierKind },
    Opened { url: String },
}

/// Input shared by every tier of one download
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub displayed: Option<&'a DisplayedImage>,
}

/// One fallible download strategy
#[async_trait]
pub trait DownloadTier: Send + Sync {
    fn kind(&self) -> DownloadTierKind;

    /// Tiers that cannot handle a URL at all are skipped instead of failed
    fn applies_to(&self, _url: &str) -> bool {
        true
    }

    async fn attempt(&self, request: &DownloadRequest<'_>) -> anyhow::Result<DownloadOutcome>;
}

/// Opens a resource outside of the pipeline
pub trait ResourceOpener: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Opens URLs in the default web browser
#[derive(Debug, Default)]
pub struct BrowserOpener;

impl ResourceOpener for BrowserOpener {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        webbrowser::open(url).with_context(|| format!("failed to open {}", url))
    }
}

/// Directory downloads are written to, as `<prefix>_<id>.<ext>`
#[derive(Debug, Clone)]
pub struct DownloadDir {
    dir: PathBuf,
    prefix: String,
    id_len: usize,
}

impl DownloadDir {
    pub fn new(config: &DownloadConfig) -> Self {
        Self {
            dir: config.output_dir.clone(),
            prefix: config.file_prefix.clone(),
            id_len: config.id_len,
        }
    }

    pub fn file_name(&self, ext: &str) -> String {
        format!("{}_{}.{}", self.prefix, nano_id(self.id_len), ext)
    }

    pub async fn save(&self, ext: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(self.file_name(ext));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Tier 1: fetch the resource and save its bytes
pub struct DirectFetch {
    client: reqwest::Client,
    target: DownloadDir,
}

impl DirectFetch {
    pub fn new(client: reqwest::Client, target: DownloadDir) -> Self {
        Self { client, target }
    }
}

#[async_trait]
impl DownloadTier for DirectFetch {
    fn kind(&self) -> DownloadTierKind {
        DownloadTierKind::DirectFetch
    }

    async fn attempt(&self, request: &DownloadRequest<'_>) -> anyhow::Result<DownloadOutcome> {
        let response = self.client.get(request.url).send().await?;

        if !response.status().is_success() {
            bail!("network response was not ok: {}", response.status());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?;
        let ext = extension_for(&content_type, request.url);

        let path = self.target.save(ext, &bytes).await?;
        Ok(DownloadOutcome::Saved {
            path,
            tier: self.kind(),
        })
    }
}

/// Tier 2: re-encode the image on display as PNG
pub struct LocalReencode {
    target: DownloadDir,
}

impl LocalReencode {
    pub fn new(target: DownloadDir) -> Self {
        Self { target }
    }
}

#[async_trait]
impl DownloadTier for LocalReencode {
    fn kind(&self) -> DownloadTierKind {
        DownloadTierKind::LocalReencode
    }

    fn applies_to(&self, url: &str) -> bool {
        !MediaKind::from_url(url).is_video()
    }

    async fn attempt(&self, request: &DownloadRequest<'_>) -> anyhow::Result<DownloadOutcome> {
        let displayed = request
            .displayed
            .context("image not loaded")?;
        ensure!(
            displayed.src == request.url,
            "displayed image is {}, not {}",
            displayed.src,
            request.url
        );

        let (width, height) = displayed.dimensions();
        let mut bytes = Vec::new();
        displayed
            .image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        ensure!(!bytes.is_empty(), "PNG encoder produced no data");

        debug!("Re-encoded {}x{} preview ({} bytes)", width, height, bytes.len());

        let path = self.target.save("png", &bytes).await?;
        Ok(DownloadOutcome::Saved {
            path,
            tier: self.kind(),
        })
    }
}

/// Tier 3: let the browser deal with it
pub struct OpenExternal {
    opener: Arc<dyn ResourceOpener>,
}

impl OpenExternal {
    pub fn new(opener: Arc<dyn ResourceOpener>) -> Self {
        Self { opener }
    }
}

#[async_trait]
impl DownloadTier for OpenExternal {
    fn kind(&self) -> DownloadTierKind {
        DownloadTierKind::OpenExternal
    }

    async fn attempt(&self, request: &DownloadRequest<'_>) -> anyhow::Result<DownloadOutcome> {
        self.opener.open(request.url)?;
        Ok(DownloadOutcome::Opened {
            url: request.url.to_string(),
        })
    }
}

/// Resets the download state however the invocation ends
struct IdleOnDrop<'a>(&'a Mutex<DownloadState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = DownloadState::Idle;
    }
}

pub struct DownloadResolver {
    tiers: Vec<Box<dyn DownloadTier>>,
    state: Mutex<DownloadState>,
}

impl DownloadResolver {
    pub fn new(tiers: Vec<Box<dyn DownloadTier>>) -> Self {
        Self {
            tiers,
            state: Mutex::new(DownloadState::Idle),
        }
    }

    /// Direct fetch, then PNG re-encode, then the system browser
    pub fn standard(
        client: reqwest::Client,
        config: &DownloadConfig,
        opener: Arc<dyn ResourceOpener>,
    ) -> Self {
        let target = DownloadDir::new(config);
        Self::new(vec![
            Box::new(DirectFetch::new(client, target.clone())),
            Box::new(LocalReencode::new(target)),
            Box::new(OpenExternal::new(opener)),
        ])
    }

    pub fn state(&self) -> DownloadState {
        *self.state.lock()
    }

    /// Mirrors the disabled download control
    pub fn is_busy(&self) -> bool {
        self.state() != DownloadState::Idle
    }

    pub async fn download(
        &self,
        url: &str,
        displayed: Option<&DisplayedImage>,
    ) -> Result<DownloadOutcome> {
        let first = self
            .tiers
            .first()
            .map(|tier| tier.kind())
            .ok_or_else(|| PipelineError::DownloadTierExhausted(url.to_string()))?;

        {
            let mut state = self.state.lock();
            if *state != DownloadState::Idle {
                return Err(PipelineError::DownloadBusy);
            }
            *state = DownloadState::Running(first);
        }
        let _idle = IdleOnDrop(&self.state);

        let request = DownloadRequest { url, displayed };

        for tier in &self.tiers {
            let kind = tier.kind();
            if !tier.applies_to(url) {
                debug!("Skipping {} for {}", kind, url);
                continue;
            }

            *self.state.lock() = DownloadState::Running(kind);
            match tier.attempt(&request).await {
                Ok(outcome) => {
                    info!("Download of {} finished via {}", url, kind);
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!("{} failed for {}, trying fallback: {:#}", kind, url, e);
                }
            }
        }

        Err(PipelineError::DownloadTierExhausted(url.to_string()))
    }
}
