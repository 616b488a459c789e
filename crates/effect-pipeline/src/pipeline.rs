//! End-to-end orchestration: select, upload, generate, display, download.
//!
//! [`EffectPipeline`] is a cheap handle around shared [`PipelineState`].
//! Every `select_file`, `generate` and `reset` starts a new run. Work that
//! finishes after its run was replaced is dropped without touching state or
//! notifying the user.

use crate::api::{GenerationRequest, JobHandle};
use crate::backends::{GenerationBackend, StudioBackend};
use crate::config::EffectConfig;
use crate::download::{BrowserOpener, DownloadOutcome, DownloadResolver};
use crate::error::{PipelineError, Result};
use crate::extract::extract;
use crate::poller::StatusPoller;
use crate::upload::{LocalFile, MediaUploader, UploadClient, UploadResult};
use crate::view::{DisplayedImage, DisplayedResult, LogNotifier, Notifier, TriggerControl};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INVALID_FILE_MESSAGE: &str = "Please upload a valid image file.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed. Please try again.";
pub const NOTHING_UPLOADED_MESSAGE: &str = "Please upload an image first.";

/// Snapshot of everything a front end renders
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Identifier of the current run
    pub run_id: u64,
    pub upload: Option<UploadResult>,
    pub job: Option<JobHandle>,
    pub trigger: TriggerControl,
    pub loading: bool,
    pub result: Option<DisplayedResult>,
    /// Set once a result is on display; enables the download control
    pub download_url: Option<String>,
}

impl PipelineState {
    fn clear(&mut self) {
        *self = Self {
            run_id: self.run_id,
            ..Default::default()
        };
    }
}

/// Whether a finished run was still current
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Applied(T),
    Superseded,
}

impl<T> RunOutcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

#[derive(Clone)]
pub struct EffectPipeline {
    config: Arc<EffectConfig>,
    uploader: Arc<dyn MediaUploader>,
    backend: Arc<dyn GenerationBackend>,
    poller: Arc<StatusPoller>,
    downloads: Arc<DownloadResolver>,
    client: reqwest::Client,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<PipelineState>>,
}

impl EffectPipeline {
    /// Pipeline talking to the configured service, saving into the
    /// configured download directory and notifying through the log
    pub fn new(config: EffectConfig) -> Self {
        let client = reqwest::Client::new();
        let uploader = Arc::new(UploadClient::with_client(client.clone(), &config));
        let backend: Arc<dyn GenerationBackend> =
            Arc::new(StudioBackend::with_client(client.clone(), &config));
        let downloads = Arc::new(DownloadResolver::standard(
            client.clone(),
            &config.download,
            Arc::new(BrowserOpener),
        ));

        Self {
            poller: Arc::new(StatusPoller::new(backend.clone(), config.poll)),
            config: Arc::new(config),
            uploader,
            backend,
            downloads,
            client,
            notifier: Arc::new(LogNotifier),
            state: Arc::new(Mutex::new(PipelineState::default())),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn MediaUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.poller = Arc::new(StatusPoller::new(backend.clone(), self.config.poll));
        self.backend = backend;
        self
    }

    pub fn with_downloads(mut self, downloads: Arc<DownloadResolver>) -> Self {
        self.downloads = downloads;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state.lock().clone()
    }

    pub fn is_download_busy(&self) -> bool {
        self.downloads.is_busy()
    }

    /// Start a new run and return its id
    fn begin_run(&self, update: impl FnOnce(&mut PipelineState)) -> u64 {
        let mut state = self.state.lock();
        state.run_id += 1;
        update(&mut state);
        state.run_id
    }

    /// Apply `update` only while `run` is still the current run
    fn apply<T>(&self, run: u64, update: impl FnOnce(&mut PipelineState) -> T) -> Option<T> {
        let mut state = self.state.lock();
        if state.run_id != run {
            return None;
        }
        Some(update(&mut state))
    }

    /// Validate and upload a newly selected source image
    pub async fn select_file(&self, file: LocalFile) -> Result<RunOutcome<UploadResult>> {
        if !file.is_image() {
            self.notifier.notify(INVALID_FILE_MESSAGE);
            return Err(PipelineError::InvalidFileType(file.content_type));
        }

        let run = self.begin_run(|state| {
            state.clear();
            state.trigger = TriggerControl::Uploading;
        });
        info!("Uploading {} ({} bytes)", file.name, file.bytes.len());

        match self.uploader.upload(&file).await {
            Ok(upload) => {
                let applied = self.apply(run, |state| {
                    state.upload = Some(upload.clone());
                    state.trigger = TriggerControl::Ready;
                });
                Ok(match applied {
                    Some(()) => RunOutcome::Applied(upload),
                    None => RunOutcome::Superseded,
                })
            }
            Err(e) => {
                if self.apply(run, PipelineState::clear).is_none() {
                    debug!("Ignoring upload failure of superseded run {}: {}", run, e);
                    return Ok(RunOutcome::Superseded);
                }
                warn!("Upload of {} failed: {}", file.name, e);
                self.notifier.notify(UPLOAD_FAILED_MESSAGE);
                Err(e)
            }
        }
    }

    /// Submit the uploaded image and wait for the result URL
    pub async fn generate(&self) -> Result<RunOutcome<String>> {
        let started = {
            let mut state = self.state.lock();
            if state.trigger.is_busy() {
                return Err(PipelineError::GenerationBusy);
            }
            state.upload.clone().map(|upload| {
                state.run_id += 1;
                state.job = None;
                state.result = None;
                state.download_url = None;
                state.loading = true;
                state.trigger = TriggerControl::Processing { attempt: 0 };
                (state.run_id, upload)
            })
        };
        let Some((run, upload)) = started else {
            self.notifier.notify(NOTHING_UPLOADED_MESSAGE);
            return Err(PipelineError::NothingUploaded);
        };

        match self.run_generation(run, &upload).await {
            Ok(url) => {
                let applied = self.apply(run, |state| {
                    state.result = Some(DisplayedResult::new(url.as_str()));
                    state.download_url = Some(url.clone());
                    state.loading = false;
                    state.trigger = TriggerControl::Ready;
                });
                match applied {
                    Some(()) => {
                        info!("Result ready: {}", url);
                        Ok(RunOutcome::Applied(url))
                    }
                    None => Ok(RunOutcome::Superseded),
                }
            }
            Err(e) => {
                let applied = self.apply(run, |state| {
                    state.loading = false;
                    state.trigger = TriggerControl::Ready;
                });
                if applied.is_none() {
                    debug!("Ignoring failure of superseded run {}: {}", run, e);
                    return Ok(RunOutcome::Superseded);
                }
                warn!("Generation failed: {}", e);
                self.notifier.notify(&format!("Generation failed: {}", e));
                Err(e)
            }
        }
    }

    async fn run_generation(&self, run: u64, upload: &UploadResult) -> Result<String> {
        let request = GenerationRequest::for_source(&self.config, &upload.remote_url);
        let handle = self.backend.submit(&request).await?;
        debug!(
            "Submitted {} job {} to {}",
            handle.kind,
            handle.job_id,
            self.backend.name()
        );
        self.apply(run, |state| state.job = Some(handle.clone()));

        let state = self.state.clone();
        let payload = self
            .poller
            .poll(&handle, move |attempt| {
                let mut state = state.lock();
                if state.run_id == run {
                    state.trigger = TriggerControl::Processing { attempt };
                }
            })
            .await?;

        extract(&payload)
    }

    /// Fetch and decode the image on display.
    ///
    /// Returns `None` when nothing is displayed or the result is a video.
    pub async fn load_preview(&self) -> Result<Option<DisplayedImage>> {
        let (run, result) = {
            let state = self.state.lock();
            (state.run_id, state.result.clone())
        };
        let Some(result) = result else {
            return Ok(None);
        };
        if result.kind.is_video() {
            return Ok(None);
        }

        let response = self.client.get(&result.url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let shown = DisplayedImage::new(result.url.as_str(), image::load_from_memory(&bytes)?);
        let (width, height) = shown.dimensions();
        debug!("Loaded preview {}x{} from {}", width, height, result.url);

        self.apply(run, |state| {
            if let Some(current) = state.result.as_mut().filter(|r| r.url == shown.src) {
                current.preview = Some(shown.clone());
            }
        });

        Ok(Some(shown))
    }

    /// Save the displayed result; `None` when there is nothing to download
    pub async fn download(&self) -> Result<Option<DownloadOutcome>> {
        let (url, preview) = {
            let state = self.state.lock();
            (
                state.download_url.clone(),
                state.result.as_ref().and_then(|r| r.preview.clone()),
            )
        };
        let Some(url) = url else {
            return Ok(None);
        };

        self.downloads.download(&url, preview.as_ref()).await.map(Some)
    }

    /// Forget the upload and any result, invalidating runs in flight
    pub fn reset(&self) {
        let run = self.begin_run(PipelineState::clear);
        debug!("Pipeline reset, now at run {}", run);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobStatus;
    use crate::config::PollConfig;
    use crate::download::OpenExternal;
    use crate::extract::{MediaItem, ResultPayload};
    use crate::media::MediaKind;
    use crate::test_support::{FakeUploader, RecordingNotifier, RecordingOpener, ScriptedBackend};
    use std::time::Duration;

    struct Harness {
        pipeline: EffectPipeline,
        backend: Arc<ScriptedBackend>,
        uploader: Arc<FakeUploader>,
        notifier: Arc<RecordingNotifier>,
        opener: Arc<RecordingOpener>,
    }

    fn harness(backend: ScriptedBackend, uploader: FakeUploader) -> Harness {
        let config =
            EffectConfig::default().with_poll(PollConfig::new(Duration::from_millis(1), 60));
        let backend = Arc::new(backend);
        let uploader = Arc::new(uploader);
        let notifier = Arc::new(RecordingNotifier::default());
        let opener = Arc::new(RecordingOpener::default());

        let pipeline = EffectPipeline::new(config)
            .with_backend(backend.clone())
            .with_uploader(uploader.clone())
            .with_notifier(notifier.clone())
            .with_downloads(Arc::new(DownloadResolver::new(vec![Box::new(
                OpenExternal::new(opener.clone()),
            )])));

        Harness {
            pipeline,
            backend,
            uploader,
            notifier,
            opener,
        }
    }

    fn completed(url: &str) -> JobStatus {
        JobStatus::Completed(ResultPayload::Single(MediaItem {
            media_url: Some(url.to_string()),
            ..Default::default()
        }))
    }

    fn photo() -> LocalFile {
        LocalFile::new("cat.jpg", "image/jpeg", vec![0xff, 0xd8, 0xff])
    }

    #[tokio::test]
    async fn test_rejects_non_image_files() {
        let h = harness(ScriptedBackend::new(vec![]), FakeUploader::new());

        let err = h
            .pipeline
            .select_file(LocalFile::new("notes.pdf", "application/pdf", vec![1]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::InvalidFileType(_)));
        assert_eq!(h.notifier.messages(), vec![INVALID_FILE_MESSAGE.to_string()]);
        assert_eq!(h.uploader.uploads(), 0);
        assert_eq!(h.pipeline.state().trigger, TriggerControl::Disabled);
    }

    #[tokio::test]
    async fn test_upload_enables_trigger() {
        let h = harness(ScriptedBackend::new(vec![]), FakeUploader::new());

        let upload = h.pipeline.select_file(photo()).await.unwrap().applied().unwrap();

        assert!(upload.remote_url.starts_with("https://contents.test/"));
        assert!(upload.remote_url.ends_with(".jpg"));
        let state = h.pipeline.state();
        assert_eq!(state.upload, Some(upload));
        assert!(state.trigger.is_enabled());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_resets_state() {
        let h = harness(ScriptedBackend::new(vec![]), FakeUploader::failing());

        let err = h.pipeline.select_file(photo()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transfer(_)));
        assert_eq!(h.notifier.messages(), vec![UPLOAD_FAILED_MESSAGE.to_string()]);
        let state = h.pipeline.state();
        assert!(state.upload.is_none());
        assert_eq!(state.trigger, TriggerControl::Disabled);
    }

    #[tokio::test]
    async fn test_generate_requires_upload() {
        let h = harness(ScriptedBackend::new(vec![]), FakeUploader::new());

        let err = h.pipeline.generate().await.unwrap_err();

        assert!(matches!(err, PipelineError::NothingUploaded));
        assert_eq!(h.notifier.messages(), vec![NOTHING_UPLOADED_MESSAGE.to_string()]);
        assert!(h.backend.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_generate_displays_result() {
        let h = harness(
            ScriptedBackend::new(vec![
                Ok(ScriptedBackend::pending()),
                Ok(ScriptedBackend::pending()),
                Ok(completed("https://out/result.png")),
            ]),
            FakeUploader::new(),
        );
        let upload = h.pipeline.select_file(photo()).await.unwrap().applied().unwrap();

        let url = h.pipeline.generate().await.unwrap();

        assert_eq!(url, RunOutcome::Applied("https://out/result.png".to_string()));
        assert_eq!(h.backend.queries(), 3);

        let submissions = h.backend.submissions();
        assert_eq!(submissions.len(), 1);
        let body = serde_json::to_value(&submissions[0]).unwrap();
        assert_eq!(body["imageUrl"], serde_json::json!(upload.remote_url));

        let state = h.pipeline.state();
        let result = state.result.unwrap();
        assert_eq!(result.url, "https://out/result.png");
        assert_eq!(result.kind, MediaKind::Image);
        assert_eq!(state.download_url.as_deref(), Some("https://out/result.png"));
        assert_eq!(state.job.unwrap().job_id, "j1");
        assert!(!state.loading);
        assert_eq!(state.trigger, TriggerControl::Ready);
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_video_result_is_displayed_as_video() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(completed("https://out/clip.MP4?sig=1"))]),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();
        h.pipeline.generate().await.unwrap();

        assert_eq!(h.pipeline.state().result.unwrap().kind, MediaKind::Video);
        assert!(h.pipeline.load_preview().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_job_failure_is_notified() {
        let h = harness(
            ScriptedBackend::new(vec![
                Ok(ScriptedBackend::pending()),
                Ok(JobStatus::Failed("no face found".to_string())),
            ]),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let err = h.pipeline.generate().await.unwrap_err();

        assert!(matches!(err, PipelineError::Job(_)));
        assert_eq!(
            h.notifier.messages(),
            vec!["Generation failed: no face found".to_string()]
        );
        let state = h.pipeline.state();
        assert!(!state.loading);
        assert!(state.result.is_none());
        assert!(state.download_url.is_none());
        assert_eq!(state.trigger, TriggerControl::Ready);
    }

    #[tokio::test]
    async fn test_timeout_is_notified() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(ScriptedBackend::pending())]),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let err = h.pipeline.generate().await.unwrap_err();

        assert!(matches!(err, PipelineError::Timeout { polls: 60 }));
        assert_eq!(
            h.notifier.messages(),
            vec!["Generation failed: Job timed out after 60 polls".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_result_and_rejected_submission() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(JobStatus::Completed(ResultPayload::Absent))]),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();
        assert!(matches!(
            h.pipeline.generate().await,
            Err(PipelineError::MissingResult)
        ));

        let rejecting = harness(ScriptedBackend::rejecting_submissions(), FakeUploader::new());
        rejecting.pipeline.select_file(photo()).await.unwrap();
        assert!(matches!(
            rejecting.pipeline.generate().await,
            Err(PipelineError::Submission(_))
        ));
        assert_eq!(rejecting.backend.queries(), 0);

        let messages = rejecting.notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Generation failed: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_updates_caption() {
        let h = harness(
            ScriptedBackend::new(vec![
                Ok(ScriptedBackend::pending()),
                Ok(completed("https://out/result.png")),
            ])
            .with_query_delay(Duration::from_millis(100)),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let pipeline = h.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.generate().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = h.pipeline.state();
        assert!(state.loading);
        assert_eq!(state.trigger.caption(), "Processing...");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.pipeline.state().trigger.caption(), "Processing... (1)");

        run.await.unwrap().unwrap();
        assert_eq!(h.pipeline.state().trigger.caption(), "Create Mugshot");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_while_processing_is_rejected() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(completed("https://out/result.png"))])
                .with_query_delay(Duration::from_millis(100)),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let pipeline = h.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.generate().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            h.pipeline.generate().await,
            Err(PipelineError::GenerationBusy)
        ));

        assert_eq!(
            run.await.unwrap().unwrap(),
            RunOutcome::Applied("https://out/result.png".to_string())
        );
        assert_eq!(h.backend.submissions().len(), 1);
        assert_eq!(h.backend.queries(), 1);
        assert!(h.notifier.messages().is_empty());
        assert!(h.pipeline.state().trigger.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_supersedes_running_generation() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(completed("https://out/result.png"))])
                .with_query_delay(Duration::from_millis(100)),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let pipeline = h.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.generate().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.pipeline.reset();

        assert!(run.await.unwrap().unwrap().is_superseded());
        let state = h.pipeline.state();
        assert!(state.result.is_none());
        assert!(state.upload.is_none());
        assert_eq!(state.trigger, TriggerControl::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_failure_is_silent() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(JobStatus::Failed("boom".to_string()))])
                .with_query_delay(Duration::from_millis(100)),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();

        let pipeline = h.pipeline.clone();
        let run = tokio::spawn(async move { pipeline.generate().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.pipeline.select_file(photo()).await.unwrap();

        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Superseded);
        assert!(h.notifier.messages().is_empty());
        assert!(h.pipeline.state().trigger.is_enabled());
    }

    #[tokio::test]
    async fn test_download_without_result() {
        let h = harness(ScriptedBackend::new(vec![]), FakeUploader::new());
        assert!(h.pipeline.download().await.unwrap().is_none());
        assert!(h.opener.opened().is_empty());
    }

    #[tokio::test]
    async fn test_download_uses_result_url() {
        let h = harness(
            ScriptedBackend::new(vec![Ok(completed("https://out/clip.mp4"))]),
            FakeUploader::new(),
        );
        h.pipeline.select_file(photo()).await.unwrap();
        h.pipeline.generate().await.unwrap();

        let outcome = h.pipeline.download().await.unwrap().unwrap();

        assert_eq!(
            outcome,
            DownloadOutcome::Opened {
                url: "https://out/clip.mp4".to_string()
            }
        );
        assert_eq!(h.opener.opened(), vec!["https://out/clip.mp4".to_string()]);
        assert!(!h.pipeline.is_download_busy());
    }
}
