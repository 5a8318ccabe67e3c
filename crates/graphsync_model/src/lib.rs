//! # graphsync Model
//!
//! Graph-object data model and synchronization API messages.
//!
//! This crate provides:
//! - `Entity` and `Relationship` graph objects with a closed property-value
//!   variant for their dynamic property bags
//! - Raw-data tracking for entities (source payloads uploaded out of band)
//! - The synchronization-job record and its status lattice
//! - Request/response payloads for the remote synchronization API
//!
//! ## Key Invariants
//!
//! - `_key` identifies a graph object within its collection for one run
//! - `_class` normalizes to an ordered, de-duplicated sequence at write time
//! - A job status only moves forward through its lattice; `Completed` and
//!   `Aborted` are terminal and mutually exclusive
//! - Raw data is never serialized into upload payloads

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod job;
mod messages;
mod property;
mod relationship;

pub use entity::{normalize_classes, Entity, RawData};
pub use error::{ModelError, ModelResult};
pub use job::{JobStatus, SynchronizationJob};
pub use messages::{
    CreateJobRequest, EntityUploadRequest, JobResponse, RelationshipUploadRequest, UploadCounts,
};
pub use property::PropertyValue;
pub use relationship::Relationship;
