//! Synchronization-job lifecycle controller.

use crate::error::{EngineError, EngineResult};
use crate::http::HttpClient;
use crate::transport::RateLimitedTransport;
use graphsync_model::{CreateJobRequest, JobResponse, JobStatus, SynchronizationJob, UploadCounts};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns one remote synchronization job's lifecycle.
///
/// Status moves forward only; `abort` is idempotent and issues at most
/// one remote abort request. `finalize` refuses to run once the job is
/// aborted.
pub struct SynchronizationJobController<C: HttpClient> {
    transport: Arc<RateLimitedTransport<C>>,
    api_base_url: String,
    job: RwLock<Option<SynchronizationJob>>,
    abort_requested: AtomicBool,
}

impl<C: HttpClient> SynchronizationJobController<C> {
    /// Creates a controller targeting the given API.
    pub fn new(transport: Arc<RateLimitedTransport<C>>, api_base_url: impl Into<String>) -> Self {
        Self {
            transport,
            api_base_url: api_base_url.into(),
            job: RwLock::new(None),
            abort_requested: AtomicBool::new(false),
        }
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/persister/synchronization/jobs",
            self.api_base_url.trim_end_matches('/')
        )
    }

    fn job_url(&self, job_id: &str, operation: &str) -> String {
        format!("{}/{}/{}", self.jobs_url(), job_id, operation)
    }

    /// Requests a new job from the remote service.
    pub fn create(&self, instance_id: &str) -> EngineResult<SynchronizationJob> {
        let response: JobResponse = self
            .transport
            .post_json(&self.jobs_url(), &CreateJobRequest::new(instance_id))?;

        let mut job = response.job;
        if job.status == JobStatus::Created {
            job.status = JobStatus::AwaitingUploads;
        }
        info!(job_id = %job.id, "created synchronization job");
        *self.job.write() = Some(job.clone());
        Ok(job)
    }

    /// Returns a snapshot of the job record.
    pub fn job(&self) -> EngineResult<SynchronizationJob> {
        self.job.read().clone().ok_or(EngineError::JobNotCreated)
    }

    /// Accumulates counts from a successful batch upload.
    ///
    /// Counts arriving after the job reached a terminal status are
    /// discarded: once the terminal decision is made, in-flight upload
    /// results no longer matter.
    pub fn record_upload(&self, counts: UploadCounts) -> EngineResult<()> {
        let mut guard = self.job.write();
        let job = guard.as_mut().ok_or(EngineError::JobNotCreated)?;
        if job.status.is_terminal() {
            debug!(job_id = %job.id, "discarding upload counts after terminal status");
            return Ok(());
        }
        job.num_entities_uploaded += counts.entities;
        job.num_relationships_uploaded += counts.relationships;
        Ok(())
    }

    /// Requests remote finalize and returns the terminal record.
    pub fn finalize(&self) -> EngineResult<SynchronizationJob> {
        let job_id = {
            let mut guard = self.job.write();
            let job = guard.as_mut().ok_or(EngineError::JobNotCreated)?;
            if job.status != JobStatus::Finalizing {
                if !job.status.can_transition_to(JobStatus::Finalizing) {
                    return Err(EngineError::InvalidStateTransition {
                        from: job.status,
                        to: JobStatus::Finalizing,
                    });
                }
                job.status = JobStatus::Finalizing;
            }
            job.id.clone()
        };

        let response: JobResponse = self
            .transport
            .post_json(&self.job_url(&job_id, "finalize"), &serde_json::json!({}))?;

        let mut guard = self.job.write();
        let job = guard.as_mut().ok_or(EngineError::JobNotCreated)?;
        if !job.status.can_transition_to(JobStatus::Completed) {
            return Err(EngineError::InvalidStateTransition {
                from: job.status,
                to: JobStatus::Completed,
            });
        }
        job.status = JobStatus::Completed;
        // Prefer the larger of local and remote counts; the remote side
        // may have acknowledged batches this controller never recorded.
        job.num_entities_uploaded = job
            .num_entities_uploaded
            .max(response.job.num_entities_uploaded);
        job.num_relationships_uploaded = job
            .num_relationships_uploaded
            .max(response.job.num_relationships_uploaded);
        info!(
            job_id = %job.id,
            entities = job.num_entities_uploaded,
            relationships = job.num_relationships_uploaded,
            "finalized synchronization job"
        );
        Ok(job.clone())
    }

    /// Aborts the job, attaching the triggering cause.
    ///
    /// Idempotent: a second call returns the same terminal record without
    /// another remote request. A failed remote abort request is logged
    /// and the local record still terminates as aborted.
    pub fn abort(&self, cause: &str) -> EngineResult<SynchronizationJob> {
        let job_id = {
            let guard = self.job.read();
            let job = guard.as_ref().ok_or(EngineError::JobNotCreated)?;
            if job.status == JobStatus::Aborted {
                return Ok(job.clone());
            }
            job.id.clone()
        };

        if !self.abort_requested.swap(true, Ordering::SeqCst) {
            let request: EngineResult<serde_json::Value> = self
                .transport
                .post_json(&self.job_url(&job_id, "abort"), &serde_json::json!({}));
            if let Err(err) = request {
                warn!(job_id = %job_id, error = %err, "remote abort request failed");
            }
        }

        let mut guard = self.job.write();
        let job = guard.as_mut().ok_or(EngineError::JobNotCreated)?;
        if job.status != JobStatus::Aborted {
            job.status = JobStatus::Aborted;
            job.error_message = Some(cause.to_string());
            warn!(job_id = %job.id, cause, "aborted synchronization job");
        }
        Ok(job.clone())
    }
}
