//! Wire types exchanged with the generation service.

use crate::backends::EffectKind;
use crate::config::EffectConfig;
use crate::extract::ResultPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model name that routes a submission to the video endpoints
pub const VIDEO_MODEL: &str = "video-effects";

/// Generic reason used when the service fails a job without saying why
pub const DEFAULT_JOB_FAILURE: &str = "Job processing failed";

/// Generation request body, one shape per endpoint family
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationRequest {
    Image(ImageRequest),
    Video(VideoRequest),
}

/// Body for `POST /image-gen`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub model: String,
    pub tool_type: String,
    pub effect_id: String,
    pub image_url: String,
    pub user_id: String,
    pub remove_watermark: bool,
    pub is_private: bool,
}

/// Body for `POST /video-gen`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub image_url: Vec<String>,
    pub effect_id: String,
    pub user_id: String,
    pub remove_watermark: bool,
    pub model: String,
    pub is_private: bool,
}

impl GenerationRequest {
    /// Build the request for an uploaded source image
    pub fn for_source(config: &EffectConfig, source_url: &str) -> Self {
        match config.effect_kind() {
            EffectKind::Video => Self::Video(VideoRequest {
                image_url: vec![source_url.to_string()],
                effect_id: config.effect_id.clone(),
                user_id: config.user_id.clone(),
                remove_watermark: true,
                model: VIDEO_MODEL.to_string(),
                is_private: true,
            }),
            EffectKind::Image => Self::Image(ImageRequest {
                model: config.model.clone(),
                tool_type: config.tool_type.clone(),
                effect_id: config.effect_id.clone(),
                image_url: source_url.to_string(),
                user_id: config.user_id.clone(),
                remove_watermark: true,
                is_private: true,
            }),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Image(_) => EffectKind::Image,
            Self::Video(_) => EffectKind::Video,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::Image(req) => &req.user_id,
            Self::Video(req) => &req.user_id,
        }
    }
}

/// Handle to a submitted job.
///
/// Status queries address jobs by `(user_id, job_id)` under the endpoint
/// family the job was submitted to, so both travel with the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub user_id: String,
    pub kind: EffectKind,
}

impl JobHandle {
    /// Path of the status endpoint relative to the API base
    pub fn status_path(&self) -> String {
        format!(
            "{}/{}/{}/status",
            self.kind.endpoint(),
            self.user_id,
            self.job_id
        )
    }
}

/// Job state as reported by one status query
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Any non-terminal status string (`pending`, `processing`, ...)
    Pending { status: String },
    Completed(ResultPayload),
    Failed(String),
}

impl JobStatus {
    /// Interpret a status response body.
    ///
    /// Unknown or missing status values are treated as still running.
    pub fn from_response(body: &Value) -> Self {
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");

        match status {
            "completed" => {
                Self::Completed(ResultPayload::from_value(body.get("result")))
            }
            "failed" | "error" => {
                let reason = body
                    .get("error")
                    .and_then(Value::as_str)
                    .filter(|msg| !msg.is_empty())
                    .unwrap_or(DEFAULT_JOB_FAILURE);
                Self::Failed(reason.to_string())
            }
            other => Self::Pending {
                status: other.to_string(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending { .. })
    }
}
