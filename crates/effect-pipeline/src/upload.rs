//! Upload of the source image to content storage.
//!
//! Two requests: ask the API for a pre-signed write URL for a fresh
//! filename, then PUT the raw bytes there. The public URL is derived from
//! the filename, the storage side is trusted to have put the object there.

use crate::config::EffectConfig;
use crate::error::{status_text, PipelineError, Result};
use crate::ident::{nano_id, DEFAULT_ID_LEN};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, info};

/// Extension used when the file name carries none
pub const DEFAULT_EXTENSION: &str = "jpg";

/// A file picked by the user
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its content type from the extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = image::ImageFormat::from_path(path)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");

        Ok(Self::new(name, content_type, bytes))
    }

    /// Extension of the file name, case preserved, `jpg` when absent
    pub fn extension(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext,
            _ => DEFAULT_EXTENSION,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Fresh storage name `<id>.<extension>`
    pub fn storage_name(&self) -> String {
        format!("{}.{}", nano_id(DEFAULT_ID_LEN), self.extension())
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub remote_url: String,
}

/// Anything able to put a local file somewhere the service can fetch it
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> Result<UploadResult>;
}

/// Uploader for the signed-URL storage flow
pub struct UploadClient {
    client: reqwest::Client,
    config: EffectConfig,
}

impl UploadClient {
    pub fn new(config: &EffectConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &EffectConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Ask the API for a pre-signed write URL
    async fn signed_url(&self, file_name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.config.api_url("get-emd-upload-url"))
            .query(&[("fileName", file_name)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::UploadUrl(status_text(response.status())));
        }

        let url = response.text().await?;
        Ok(url.trim().to_string())
    }

    /// Transfer the raw bytes to storage
    async fn transfer(&self, signed_url: &str, file: &LocalFile) -> Result<()> {
        let response = self
            .client
            .put(signed_url)
            .header(CONTENT_TYPE, &file.content_type)
            .body(file.bytes.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Transfer(status_text(response.status())));
        }

        Ok(())
    }
}

#[async_trait]
impl MediaUploader for UploadClient {
    async fn upload(&self, file: &LocalFile) -> Result<UploadResult> {
        let file_name = file.storage_name();
        debug!("Requesting upload URL for {}", file_name);

        let signed_url = self.signed_url(&file_name).await?;
        self.transfer(&signed_url, file).await?;

        let remote_url = self.config.content_url(&file_name);
        info!("Uploaded {} ({} bytes) as {}", file.name, file.bytes.len(), remote_url);

        Ok(UploadResult { remote_url })
    }
}
