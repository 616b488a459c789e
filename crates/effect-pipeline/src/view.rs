//! Presentation state the pipeline exposes to a front end.

use crate::media::MediaKind;
use image::DynamicImage;
use std::sync::Arc;
use tracing::error;

/// Caption of the generate control when it is idle
pub const READY_CAPTION: &str = "Create Mugshot";

/// The control that starts a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerControl {
    /// Nothing uploaded yet
    #[default]
    Disabled,
    Uploading,
    /// Generation running; `attempt` is the last pending poll, 0 before the first
    Processing { attempt: u32 },
    Ready,
}

impl TriggerControl {
    pub fn caption(&self) -> String {
        match self {
            Self::Disabled | Self::Ready => READY_CAPTION.to_string(),
            Self::Uploading => "Uploading...".to_string(),
            Self::Processing { attempt: 0 } => "Processing...".to_string(),
            Self::Processing { attempt } => format!("Processing... ({})", attempt),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a spinner should be shown next to the caption
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Uploading | Self::Processing { .. })
    }
}

/// Decoded pixels of the result currently on display
#[derive(Debug, Clone)]
pub struct DisplayedImage {
    /// URL the pixels were loaded from
    pub src: String,
    pub image: Arc<DynamicImage>,
}

impl DisplayedImage {
    pub fn new(src: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            src: src.into(),
            image: Arc::new(image),
        }
    }

    /// Natural pixel dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Result of the last successful generation
#[derive(Debug, Clone)]
pub struct DisplayedResult {
    pub url: String,
    pub kind: MediaKind,
    /// Filled once the image has been loaded for display
    pub preview: Option<DisplayedImage>,
}

impl DisplayedResult {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            kind: MediaKind::from_url(&url),
            url,
            preview: None,
        }
    }
}

/// Blocking user-facing message channel
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        error!("{}", message);
    }
}
