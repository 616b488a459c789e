//! Generation backends.
//!
//! A backend accepts a generation request and answers status queries for
//! the jobs it created. [`StudioBackend`] talks to the hosted effect API;
//! tests drive the poller and the pipeline with scripted backends.

pub mod studio;

use crate::api::{GenerationRequest, JobHandle, JobStatus};
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub use studio::StudioBackend;

/// Endpoint family a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Image,
    Video,
}

impl EffectKind {
    /// `video-effects` selects video, every other model is an image effect
    pub fn from_model(model: &str) -> Self {
        if model == crate::api::VIDEO_MODEL {
            Self::Video
        } else {
            Self::Image
        }
    }

    /// Base path of the submission and status endpoints
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Image => "image-gen",
            Self::Video => "video-gen",
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Generation backend trait
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Submit a generation job
    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle>;

    /// Query the current state of a job, once
    async fn query_status(&self, handle: &JobHandle) -> Result<JobStatus>;
}
