use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to get signed URL: {0}")]
    UploadUrl(String),

    #[error("Failed to upload file: {0}")]
    Transfer(String),

    #[error("Failed to submit job: {0}")]
    Submission(String),

    #[error("Failed to check status: {0}")]
    StatusQuery(String),

    /// The service reported the job itself as failed.
    #[error("{0}")]
    Job(String),

    #[error("Job timed out after {polls} polls")]
    Timeout { polls: u32 },

    #[error("API returned status completed but no image URL found.")]
    MissingResult,

    #[error("not an image file: {0}")]
    InvalidFileType(String),

    #[error("no image has been uploaded yet")]
    NothingUploaded,

    #[error("a download is already running")]
    DownloadBusy,

    #[error("a generation is already running")]
    GenerationBusy,

    #[error("every download strategy failed for {0}")]
    DownloadTierExhausted(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Render a non-success HTTP status the way the service UI does (`404 Not Found`).
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
