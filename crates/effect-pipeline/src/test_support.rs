//! In-memory collaborators for unit tests.

use crate::api::{GenerationRequest, JobHandle, JobStatus};
use crate::backends::GenerationBackend;
use crate::download::ResourceOpener;
use crate::error::{PipelineError, Result};
use crate::upload::{LocalFile, MediaUploader, UploadResult};
use crate::view::Notifier;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Backend answering status queries from a script.
///
/// Once the script runs dry the last entry repeats. `Err` entries become
/// status query failures.
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<std::result::Result<JobStatus, String>>>,
    last: Mutex<Option<std::result::Result<JobStatus, String>>>,
    submissions: Mutex<Vec<GenerationRequest>>,
    queries: AtomicU32,
    reject_submit: bool,
    query_delay: Duration,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Vec<std::result::Result<JobStatus, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
            queries: AtomicU32::new(0),
            reject_submit: false,
            query_delay: Duration::ZERO,
        }
    }

    pub(crate) fn rejecting_submissions() -> Self {
        Self {
            reject_submit: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub(crate) fn pending() -> JobStatus {
        JobStatus::Pending {
            status: "pending".to_string(),
        }
    }

    pub(crate) fn queries(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn submissions(&self) -> Vec<GenerationRequest> {
        self.submissions.lock().clone()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle> {
        if self.reject_submit {
            return Err(PipelineError::Submission("500 Internal Server Error".to_string()));
        }
        self.submissions.lock().push(request.clone());

        Ok(JobHandle {
            job_id: "j1".to_string(),
            user_id: request.user_id().to_string(),
            kind: request.kind(),
        })
    }

    async fn query_status(&self, _handle: &JobHandle) -> Result<JobStatus> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        let step = {
            let mut script = self.script.lock();
            let mut last = self.last.lock();
            match script.pop_front() {
                Some(step) => {
                    *last = Some(step.clone());
                    Some(step)
                }
                None => last.clone(),
            }
        };

        match step {
            Some(Ok(status)) => Ok(status),
            Some(Err(reason)) => Err(PipelineError::StatusQuery(reason)),
            None => Ok(Self::pending()),
        }
    }
}

/// Uploader that never touches the network
pub(crate) struct FakeUploader {
    fail: bool,
    uploads: AtomicU32,
}

impl FakeUploader {
    pub(crate) fn new() -> Self {
        Self {
            fail: false,
            uploads: AtomicU32::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MediaUploader for FakeUploader {
    async fn upload(&self, file: &LocalFile) -> Result<UploadResult> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Transfer("403 Forbidden".to_string()));
        }
        Ok(UploadResult {
            remote_url: format!("https://contents.test/{}", file.storage_name()),
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[derive(Default)]
pub(crate) struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl ResourceOpener for RecordingOpener {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().push(url.to_string());
        Ok(())
    }
}
