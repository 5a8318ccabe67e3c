//! Run orchestration: steps in, terminal job record out.

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::HttpClient;
use crate::job::SynchronizationJobController;
use crate::raw_data::{RawDataStorage, RawDataUploader};
use crate::transport::RateLimitedTransport;
use crate::upload::BatchUploader;
use graphsync_model::{Entity, Relationship, SynchronizationJob};
use graphsync_store::{
    GraphObjectStore, InMemoryGraphObjectStore, ObjectFilter, StoreConfig, StoreCounts, StoreError,
};
use std::sync::Arc;
use tracing::{error, info};

/// A data-collection step.
///
/// Steps stage graph objects through their [`StepContext`]; a step failure
/// is a typed `Err`, which the orchestrator turns into a job abort.
pub trait SyncStep: Send + Sync {
    /// Stable identifier of the step.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Runs the step.
    fn execute(&self, ctx: &StepContext<'_>) -> EngineResult<()>;
}

/// A step built from a closure.
pub struct FnStep<F> {
    id: String,
    name: String,
    run: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepContext<'_>) -> EngineResult<()> + Send + Sync,
{
    /// Creates a step with the given id.
    pub fn new(id: impl Into<String>, run: F) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            run,
        }
    }

    /// Sets a display name distinct from the id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> SyncStep for FnStep<F>
where
    F: Fn(&StepContext<'_>) -> EngineResult<()> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &StepContext<'_>) -> EngineResult<()> {
        (self.run)(ctx)
    }
}

/// Delivers flushed pages to the job: raw data out of band, then the
/// batch upload, then the controller's running counts.
pub(crate) trait JobUploadSink: Send + Sync {
    fn flush_entities(&self, page: Vec<Entity>) -> EngineResult<()>;
    fn flush_relationships(&self, page: Vec<Relationship>) -> EngineResult<()>;
}

struct JobPipeline<'a, C: HttpClient> {
    job_id: &'a str,
    uploader: &'a BatchUploader<C>,
    controller: &'a SynchronizationJobController<C>,
    raw_data: Option<&'a RawDataUploader>,
}

impl<C: HttpClient> JobUploadSink for JobPipeline<'_, C> {
    fn flush_entities(&self, mut page: Vec<Entity>) -> EngineResult<()> {
        if let Some(raw_data) = self.raw_data {
            raw_data.process(&mut page);
        }
        let counts = self.uploader.upload_entities(self.job_id, &page)?;
        self.controller.record_upload(counts)
    }

    fn flush_relationships(&self, page: Vec<Relationship>) -> EngineResult<()> {
        let counts = self.uploader.upload_relationships(self.job_id, &page)?;
        self.controller.record_upload(counts)
    }
}

/// What a step sees while it runs: the shared store, wired so that
/// implicit page flushes upload to the run's job.
pub struct StepContext<'a> {
    step_id: &'a str,
    store: &'a dyn GraphObjectStore,
    sink: &'a dyn JobUploadSink,
}

impl StepContext<'_> {
    /// Identifier of the running step.
    pub fn step_id(&self) -> &str {
        self.step_id
    }

    /// Direct access to the shared store.
    pub fn store(&self) -> &dyn GraphObjectStore {
        self.store
    }

    /// Stages entities; a full `_type` partition uploads before returning.
    pub fn add_entities(&self, entities: Vec<Entity>) -> EngineResult<()> {
        let mut stashed: Option<EngineError> = None;
        let result = {
            let mut on_flushed = |page: Vec<Entity>| -> Result<(), StoreError> {
                self.sink.flush_entities(page).map_err(|err| {
                    let message = err.to_string();
                    stashed = Some(err);
                    StoreError::flush_callback(message)
                })
            };
            self.store
                .add_entities(self.step_id, entities, Some(&mut on_flushed))
        };
        unstash(result, stashed)
    }

    /// Stages relationships; symmetric to [`Self::add_entities`].
    pub fn add_relationships(&self, relationships: Vec<Relationship>) -> EngineResult<()> {
        let mut stashed: Option<EngineError> = None;
        let result = {
            let mut on_flushed = |page: Vec<Relationship>| -> Result<(), StoreError> {
                self.sink.flush_relationships(page).map_err(|err| {
                    let message = err.to_string();
                    stashed = Some(err);
                    StoreError::flush_callback(message)
                })
            };
            self.store
                .add_relationships(self.step_id, relationships, Some(&mut on_flushed))
        };
        unstash(result, stashed)
    }

    /// Looks up a previously staged entity, e.g. to build a relationship.
    pub fn find_entity(&self, key: &str) -> EngineResult<Option<Entity>> {
        Ok(self.store.find_entity(key)?)
    }

    /// Iterates staged entities matching the filter.
    pub fn iterate_entities(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Entity) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut stashed: Option<EngineError> = None;
        let result = self.store.iterate_entities(filter, &mut |entity| {
            iteratee(entity).map_err(|err| {
                let message = err.to_string();
                stashed = Some(err);
                StoreError::flush_callback(message)
            })
        });
        unstash(result, stashed)
    }

    /// Iterates staged relationships matching the filter.
    pub fn iterate_relationships(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Relationship) -> EngineResult<()>,
    ) -> EngineResult<()> {
        let mut stashed: Option<EngineError> = None;
        let result = self.store.iterate_relationships(filter, &mut |relationship| {
            iteratee(relationship).map_err(|err| {
                let message = err.to_string();
                stashed = Some(err);
                StoreError::flush_callback(message)
            })
        });
        unstash(result, stashed)
    }
}

/// Restores the engine error stashed across a store-callback boundary.
fn unstash(result: Result<(), StoreError>, stashed: Option<EngineError>) -> EngineResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => Err(stashed.unwrap_or(EngineError::Store(err))),
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step completed.
    Success,
    /// The step failed and ended the run.
    Failure,
}

/// Per-step record in the run result.
#[derive(Debug, Clone)]
pub struct StepSummary {
    /// Step identifier.
    pub id: String,
    /// Outcome.
    pub status: StepStatus,
    /// Error text for failed steps.
    pub error: Option<String>,
}

impl StepSummary {
    fn success(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Success,
            error: None,
        }
    }

    fn failure(id: &str, error: &EngineError) -> Self {
        Self {
            id: id.to_string(),
            status: StepStatus::Failure,
            error: Some(error.to_string()),
        }
    }
}

/// Result of one synchronization run, for display to the operator.
#[derive(Debug, Clone)]
pub struct SynchronizationResult {
    /// Terminal job record.
    pub job: SynchronizationJob,
    /// Per-step outcomes, in execution order.
    pub steps: Vec<StepSummary>,
    /// Store totals, including validation rejections.
    pub counts: StoreCounts,
}

impl SynchronizationResult {
    /// Returns true when the job completed.
    pub fn succeeded(&self) -> bool {
        self.job.status == graphsync_model::JobStatus::Completed
    }
}

/// Coordinates one run: create the job, execute steps, flush staged
/// objects, then finalize. On the first fatal error the job is
/// aborted exactly once instead.
pub struct SynchronizationOrchestrator<C: HttpClient> {
    config: SyncConfig,
    store: Arc<InMemoryGraphObjectStore>,
    uploader: BatchUploader<C>,
    controller: SynchronizationJobController<C>,
    raw_data: Option<RawDataUploader>,
}

impl<C: HttpClient> SynchronizationOrchestrator<C> {
    /// Creates an orchestrator over the given HTTP client.
    pub fn new(config: SyncConfig, client: C) -> Self {
        let mut transport = RateLimitedTransport::new(client, config.retry.clone());
        if let Some(token) = &config.access_token {
            transport = transport.with_authorization(token.clone());
        }
        let transport = Arc::new(transport);
        let uploader = BatchUploader::new(
            Arc::clone(&transport),
            config.api_base_url.clone(),
            config.upload.clone(),
        );
        let controller =
            SynchronizationJobController::new(transport, config.api_base_url.clone());
        let store = Arc::new(InMemoryGraphObjectStore::new(StoreConfig::new(
            config.store_page_size,
        )));

        Self {
            config,
            store,
            uploader,
            controller,
            raw_data: None,
        }
    }

    /// Routes entity raw data to the given storage during flushes.
    pub fn with_raw_data_storage(mut self, storage: Box<dyn RawDataStorage>) -> Self {
        self.raw_data = Some(RawDataUploader::new(storage));
        self
    }

    /// Handle to the shared store.
    pub fn store(&self) -> Arc<InMemoryGraphObjectStore> {
        Arc::clone(&self.store)
    }

    /// The job controller, e.g. for inspecting the record mid-run.
    pub fn controller(&self) -> &SynchronizationJobController<C> {
        &self.controller
    }

    /// Drives one run over the given steps.
    ///
    /// The first fatal error from a step, the store, the uploader, or
    /// the transport stops the run and aborts the job exactly once;
    /// finalize happens only when every step succeeded and every buffered
    /// object flushed.
    pub fn execute(&self, steps: &[Box<dyn SyncStep>]) -> EngineResult<SynchronizationResult> {
        let job = self.controller.create(&self.config.instance_id)?;
        info!(job_id = %job.id, steps = steps.len(), "starting synchronization run");

        let pipeline = JobPipeline {
            job_id: &job.id,
            uploader: &self.uploader,
            controller: &self.controller,
            raw_data: self.raw_data.as_ref(),
        };

        let mut summaries = Vec::new();
        let mut fatal: Option<EngineError> = None;

        for step in steps {
            let ctx = StepContext {
                step_id: step.id(),
                store: self.store.as_ref(),
                sink: &pipeline,
            };
            match step.execute(&ctx) {
                Ok(()) => summaries.push(StepSummary::success(step.id())),
                Err(err) => {
                    error!(step_id = step.id(), error = %err, "step failed");
                    let failure = match err {
                        failure @ EngineError::StepFailed { .. } => failure,
                        other => EngineError::StepFailed {
                            step_id: step.id().to_string(),
                            message: other.to_string(),
                        },
                    };
                    summaries.push(StepSummary::failure(step.id(), &failure));
                    fatal = Some(failure);
                    break;
                }
            }

            // Drain what the step staged before moving on.
            if let Err(err) = self.flush_through(&pipeline) {
                fatal = Some(err);
                break;
            }
        }

        if fatal.is_none() {
            if let Err(err) = self.flush_through(&pipeline) {
                fatal = Some(err);
            }
        }

        let job = match fatal {
            Some(cause) => self.controller.abort(&cause.to_string())?,
            None => self.controller.finalize()?,
        };

        Ok(SynchronizationResult {
            job,
            steps: summaries,
            counts: self.store.counts(),
        })
    }

    fn flush_through(&self, pipeline: &JobPipeline<'_, C>) -> EngineResult<()> {
        let mut entity_err: Option<EngineError> = None;
        let mut relationship_err: Option<EngineError> = None;
        let result = {
            let mut entity_sink = |page: Vec<Entity>| -> Result<(), StoreError> {
                pipeline.flush_entities(page).map_err(|err| {
                    let message = err.to_string();
                    entity_err = Some(err);
                    StoreError::flush_callback(message)
                })
            };
            let mut relationship_sink = |page: Vec<Relationship>| -> Result<(), StoreError> {
                pipeline.flush_relationships(page).map_err(|err| {
                    let message = err.to_string();
                    relationship_err = Some(err);
                    StoreError::flush_callback(message)
                })
            };
            self.store
                .flush(Some(&mut entity_sink), Some(&mut relationship_sink))
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(entity_err
                .take()
                .or_else(|| relationship_err.take())
                .unwrap_or(EngineError::Store(err))),
        }
    }
}
