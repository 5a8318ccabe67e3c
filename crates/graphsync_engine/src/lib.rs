//! # graphsync Engine
//!
//! Drives one synchronization run: staged graph objects flow from the
//! store through the batch uploader to a remote synchronization job.
//!
//! This crate provides:
//! - HTTP client abstraction (`HttpClient`, `HttpRequest`, `HttpResponse`)
//! - Rate-limited transport with retry and backoff
//! - Batch uploader with payload re-splitting
//! - Raw-data uploader (source payloads stored out of band)
//! - Synchronization-job lifecycle controller (create → uploads →
//!   finalize | abort)
//! - Run orchestrator wiring steps, flushes, and the terminal decision
//!
//! ## Key Invariants
//!
//! - A transient response is retried up to the configured attempt budget;
//!   a forbidden response fails on the first attempt
//! - Retry waits honor server rate-limit guidance and never shrink across
//!   attempts of one request
//! - A run aborts its job exactly once on the first fatal error, and
//!   finalizes only when every buffered object flushed successfully
//! - No finalize can happen after abort

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod job;
mod orchestrator;
mod raw_data;
mod transport;
mod upload;

pub use config::{RetryConfig, SyncConfig, UploadConfig};
pub use error::{EngineError, EngineResult};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use job::SynchronizationJobController;
pub use orchestrator::{
    FnStep, StepContext, StepStatus, StepSummary, SyncStep, SynchronizationOrchestrator,
    SynchronizationResult,
};
pub use raw_data::{InMemoryRawDataStorage, RawDataStorage, RawDataUploader};
pub use transport::{compute_backoff, RateLimitedTransport};
pub use upload::BatchUploader;
