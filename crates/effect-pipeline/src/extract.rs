//! Normalization of completed-job payloads into a single media URL.
//!
//! The service answers either with one result object or with a list of
//! them, and names the media location `mediaUrl`, `video` or `image`
//! depending on the effect. All accepted shapes go through
//! [`ResultPayload::from_value`].

use crate::error::{PipelineError, Result};
use serde_json::Value;

/// One result object; empty strings count as absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaItem {
    pub media_url: Option<String>,
    pub video: Option<String>,
    pub image: Option<String>,
}

impl MediaItem {
    fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            media_url: field("mediaUrl"),
            video: field("video"),
            image: field("image"),
        }
    }

    /// First present location in priority order `mediaUrl`, `video`, `image`
    pub fn location(&self) -> Option<&str> {
        self.media_url
            .as_deref()
            .or(self.video.as_deref())
            .or(self.image.as_deref())
    }
}

/// The `result` field of a completed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPayload {
    Absent,
    Single(MediaItem),
    Sequence(Vec<MediaItem>),
}

impl ResultPayload {
    pub fn from_value(result: Option<&Value>) -> Self {
        match result {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::Array(items)) => {
                Self::Sequence(items.iter().map(MediaItem::from_value).collect())
            }
            Some(other) => Self::Single(MediaItem::from_value(other)),
        }
    }

    /// The item the result URL is read from
    pub fn primary(&self) -> Option<&MediaItem> {
        match self {
            Self::Absent => None,
            Self::Single(item) => Some(item),
            Self::Sequence(items) => items.first(),
        }
    }
}

/// Resolve the result URL of a completed job
pub fn extract(payload: &ResultPayload) -> Result<String> {
    payload
        .primary()
        .and_then(MediaItem::location)
        .map(str::to_string)
        .ok_or(PipelineError::MissingResult)
}
