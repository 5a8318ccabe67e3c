//! End-to-end run lifecycle against an in-process fake synchronization API.

use graphsync_engine::{
    EngineError, FnStep, HttpClient, HttpRequest, HttpResponse, InMemoryRawDataStorage,
    RetryConfig, SyncConfig, SyncStep, SynchronizationOrchestrator,
};
use graphsync_model::{Entity, JobStatus, Relationship};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fake of the synchronization API's job and upload endpoints.
///
/// Tracks request counts and uploaded-object totals so tests can assert
/// on exactly what reached the remote side.
#[derive(Default)]
struct FakeSyncApi {
    create_calls: AtomicU32,
    entity_upload_calls: AtomicU32,
    relationship_upload_calls: AtomicU32,
    finalize_calls: AtomicU32,
    abort_calls: AtomicU32,
    entities_received: AtomicU32,
    relationships_received: AtomicU32,
    entity_bodies: Mutex<Vec<serde_json::Value>>,
    /// Statuses to serve (once each) before uploads start succeeding.
    upload_failures: Mutex<Vec<u16>>,
}

impl FakeSyncApi {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_upload_failures(self: Arc<Self>, statuses: Vec<u16>) -> Arc<Self> {
        *self.upload_failures.lock() = statuses;
        self
    }

    fn job_body(&self, status: &str) -> Vec<u8> {
        format!(
            r#"{{"job":{{"id":"{}","status":"{}","numEntitiesUploaded":{},"numRelationshipsUploaded":{}}}}}"#,
            self.job_id(),
            status,
            self.entities_received.load(Ordering::SeqCst),
            self.relationships_received.load(Ordering::SeqCst),
        )
        .into_bytes()
    }

    fn job_id(&self) -> String {
        // One job per fake; a stable id keeps assertions simple.
        format!("job-{}", uuid::Uuid::nil())
    }
}

impl HttpClient for FakeSyncApi {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let url = request.url.as_str();

        if url.ends_with("/persister/synchronization/jobs") {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(200, self.job_body("AWAITING_UPLOADS")));
        }

        if url.ends_with("/entities") || url.ends_with("/relationships") {
            if let Some(status) = {
                let mut failures = self.upload_failures.lock();
                if failures.is_empty() {
                    None
                } else {
                    Some(failures.remove(0))
                }
            } {
                return Ok(HttpResponse::new(status, Vec::new()));
            }

            let body: serde_json::Value = request
                .body
                .as_deref()
                .map(|b| serde_json::from_slice(b).unwrap())
                .unwrap_or(serde_json::Value::Null);

            if url.ends_with("/entities") {
                self.entity_upload_calls.fetch_add(1, Ordering::SeqCst);
                let count = body["entities"].as_array().map_or(0, |a| a.len()) as u32;
                self.entities_received.fetch_add(count, Ordering::SeqCst);
                self.entity_bodies.lock().push(body);
            } else {
                self.relationship_upload_calls.fetch_add(1, Ordering::SeqCst);
                let count = body["relationships"].as_array().map_or(0, |a| a.len()) as u32;
                self.relationships_received.fetch_add(count, Ordering::SeqCst);
            }
            return Ok(HttpResponse::new(200, self.job_body("AWAITING_UPLOADS")));
        }

        if url.ends_with("/finalize") {
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(200, self.job_body("COMPLETED")));
        }

        if url.ends_with("/abort") {
            self.abort_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(200, self.job_body("ABORTED")));
        }

        Ok(HttpResponse::new(404, Vec::new()))
    }
}

fn test_config() -> SyncConfig {
    SyncConfig::new("https://api.example.com", "instance-1")
        .with_access_token("test-token")
        .with_retry(
            RetryConfig::new(5)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        )
}

fn collect_users_step() -> Box<dyn SyncStep> {
    Box::new(FnStep::new("fetch-users", |ctx| {
        ctx.add_entities(vec![
            Entity::new("user:1", "acme_user")
                .with_class("User")
                .with_property("username", "mochi"),
            Entity::new("user:2", "acme_user")
                .with_class("User")
                .with_property("username", "nori"),
        ])
    }))
}

fn relate_users_step() -> Box<dyn SyncStep> {
    Box::new(FnStep::new("build-user-relationships", |ctx| {
        // Relationships are built against previously staged entities.
        let user = ctx
            .find_entity("user:1")?
            .ok_or_else(|| EngineError::StepFailed {
                step_id: ctx.step_id().to_string(),
                message: "user:1 not staged".into(),
            })?;
        ctx.add_relationships(vec![Relationship::new(
            format!("{}|manages|user:2", user.key),
            "user_manages_user",
            user.key,
            "user:2",
        )])
    }))
}

#[test]
fn successful_run_finalizes_with_counts() {
    let api = FakeSyncApi::new();
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api));

    let steps = vec![collect_users_step(), relate_users_step()];
    let result = orchestrator.execute(&steps).unwrap();

    assert!(result.succeeded());
    assert_eq!(result.job.status, JobStatus::Completed);
    assert_eq!(result.job.num_entities_uploaded, 2);
    assert_eq!(result.job.num_relationships_uploaded, 1);

    assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.abort_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.entities_received.load(Ordering::SeqCst), 2);
    assert_eq!(api.relationships_received.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_step_aborts_before_any_flush() {
    let api = FakeSyncApi::new();
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api));

    let steps: Vec<Box<dyn SyncStep>> = vec![Box::new(FnStep::new("validate-config", |ctx| {
        Err(EngineError::StepFailed {
            step_id: ctx.step_id().to_string(),
            message: "missing credentials".into(),
        })
    }))];
    let result = orchestrator.execute(&steps).unwrap();

    assert!(!result.succeeded());
    assert_eq!(result.job.status, JobStatus::Aborted);
    assert_eq!(result.job.num_entities_uploaded, 0);
    assert_eq!(result.job.num_relationships_uploaded, 0);
    assert!(result
        .job
        .error_message
        .as_deref()
        .unwrap()
        .contains("validate-config"));

    assert_eq!(api.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(api.entity_upload_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn failure_after_successful_step_keeps_earlier_counts() {
    let api = FakeSyncApi::new();
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api));

    let steps: Vec<Box<dyn SyncStep>> = vec![
        collect_users_step(),
        Box::new(FnStep::new("fetch-devices", |ctx| {
            Err(EngineError::StepFailed {
                step_id: ctx.step_id().to_string(),
                message: "device API unreachable".into(),
            })
        })),
    ];
    let result = orchestrator.execute(&steps).unwrap();

    // The first step's page flushed before the failure; the terminal
    // record carries those pre-failure counts.
    assert_eq!(result.job.status, JobStatus::Aborted);
    assert_eq!(result.job.num_entities_uploaded, 2);
    assert_eq!(api.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 0);

    assert_eq!(result.steps.len(), 2);
    assert!(result.steps[1].error.is_some());
}

#[test]
fn rate_limited_upload_retries_through() {
    let api = FakeSyncApi::new().with_upload_failures(vec![429, 503]);
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api));

    let result = orchestrator.execute(&[collect_users_step()]).unwrap();

    assert!(result.succeeded());
    assert_eq!(result.job.num_entities_uploaded, 2);
    // Two transient responses, then the successful upload.
    assert_eq!(api.entity_upload_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn forbidden_upload_aborts_run() {
    let api = FakeSyncApi::new().with_upload_failures(vec![403]);
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api));

    let result = orchestrator.execute(&[collect_users_step()]).unwrap();

    assert_eq!(result.job.status, JobStatus::Aborted);
    assert!(result
        .job
        .error_message
        .as_deref()
        .unwrap()
        .contains("403 Forbidden"));
    assert_eq!(api.abort_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.finalize_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn raw_data_is_stored_out_of_band() {
    let api = FakeSyncApi::new();
    let storage = Arc::new(InMemoryRawDataStorage::new());
    let orchestrator = SynchronizationOrchestrator::new(test_config(), Arc::clone(&api))
        .with_raw_data_storage(Box::new(SharedStorage(Arc::clone(&storage))));

    let steps: Vec<Box<dyn SyncStep>> = vec![Box::new(FnStep::new("fetch-roles", |ctx| {
        ctx.add_entities(vec![Entity::new("role:1", "acme_role")
            .with_class("AccessRole")
            .with_raw_data("role", serde_json::json!({"arn": "arn:acme:role/1"}))])
    }))];
    let result = orchestrator.execute(&steps).unwrap();

    assert!(result.succeeded());
    assert_eq!(storage.len(), 1);

    let bodies = api.entity_bodies.lock();
    let uploaded = &bodies[0]["entities"][0];
    assert!(uploaded.get("_rawData").is_none());
    assert_eq!(
        uploaded["_rawDataTempUris"][0],
        "memory://raw-data/role:1/role"
    );
}

/// Forwards raw-data uploads to a shared in-memory storage.
struct SharedStorage(Arc<InMemoryRawDataStorage>);

impl graphsync_engine::RawDataStorage for SharedStorage {
    fn upload(
        &self,
        entity_key: &str,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<String, String> {
        self.0.upload(entity_key, name, payload)
    }
}

#[test]
fn implicit_page_flush_uploads_mid_step() {
    let api = FakeSyncApi::new();
    let config = test_config().with_store_page_size(2);
    let orchestrator = SynchronizationOrchestrator::new(config, Arc::clone(&api));

    let steps: Vec<Box<dyn SyncStep>> = vec![Box::new(FnStep::new("fetch-many-users", |ctx| {
        for i in 0..5 {
            ctx.add_entities(vec![Entity::new(format!("user:{i}"), "acme_user")])?;
        }
        Ok(())
    }))];
    let result = orchestrator.execute(&steps).unwrap();

    assert!(result.succeeded());
    assert_eq!(result.job.num_entities_uploaded, 5);
    // Two page-size flushes during the step plus the final drain.
    assert_eq!(api.entity_upload_calls.load(Ordering::SeqCst), 3);
    assert_eq!(api.entities_received.load(Ordering::SeqCst), 5);
}
