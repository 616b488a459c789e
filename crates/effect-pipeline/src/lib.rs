//! Image effect pipeline
//!
//! Uploads a source image, submits it to the generation service, polls the
//! job until it settles, and saves the result locally with fallbacks.

pub mod api;
pub mod backends;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod ident;
pub mod media;
pub mod pipeline;
pub mod poller;
pub mod upload;
pub mod view;

#[cfg(test)]
mod test_support;

pub use api::{GenerationRequest, JobHandle, JobStatus};
pub use backends::{EffectKind, GenerationBackend, StudioBackend};
pub use config::{DownloadConfig, EffectConfig, PollConfig};
pub use download::{
    BrowserOpener, DownloadOutcome, DownloadResolver, DownloadState, DownloadTier,
    DownloadTierKind, ResourceOpener,
};
pub use error::{PipelineError, Result};
pub use extract::{extract, MediaItem, ResultPayload};
pub use media::MediaKind;
pub use pipeline::{EffectPipeline, PipelineState, RunOutcome};
pub use poller::StatusPoller;
pub use upload::{LocalFile, MediaUploader, UploadClient, UploadResult};
pub use view::{DisplayedImage, DisplayedResult, LogNotifier, Notifier, TriggerControl};
