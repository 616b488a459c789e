//! Status polling until a job reaches a terminal state.
//!
//! Queries are strictly sequential: the next one is only issued after the
//! previous answer was handled and the poll interval has elapsed. A failed
//! status request ends polling at once; only "still pending" answers are
//! retried, up to `max_polls` queries in total.

use crate::api::{JobHandle, JobStatus};
use crate::backends::GenerationBackend;
use crate::config::PollConfig;
use crate::error::{PipelineError, Result};
use crate::extract::ResultPayload;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StatusPoller {
    backend: Arc<dyn GenerationBackend>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: PollConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` until it completes, fails or runs out of attempts.
    ///
    /// `on_progress` receives the 1-based attempt number after every
    /// pending answer, right before the wait.
    pub async fn poll<F>(&self, handle: &JobHandle, mut on_progress: F) -> Result<ResultPayload>
    where
        F: FnMut(u32) + Send,
    {
        let mut polls = 0;

        while polls < self.config.max_polls {
            match self.backend.query_status(handle).await? {
                JobStatus::Completed(payload) => {
                    info!("Job {} completed after {} polls", handle.job_id, polls + 1);
                    return Ok(payload);
                }
                JobStatus::Failed(reason) => {
                    warn!("Job {} failed: {}", handle.job_id, reason);
                    return Err(PipelineError::Job(reason));
                }
                JobStatus::Pending { status } => {
                    debug!(
                        "Job {} still {:?} (poll {}/{})",
                        handle.job_id,
                        status,
                        polls + 1,
                        self.config.max_polls
                    );
                    on_progress(polls + 1);
                    tokio::time::sleep(self.config.interval()).await;
                    polls += 1;
                }
            }
        }

        warn!("Job {} timed out after {} polls", handle.job_id, polls);
        Err(PipelineError::Timeout { polls })
    }
}
