//! Request/response payloads for the synchronization API.

use crate::entity::Entity;
use crate::job::SynchronizationJob;
use crate::relationship::Relationship;
use serde::{Deserialize, Serialize};

/// Body of `POST /persister/synchronization/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    /// The integration instance this run belongs to.
    #[serde(rename = "integrationInstanceId")]
    pub instance_id: String,
}

impl CreateJobRequest {
    /// Creates a job-creation request.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }
}

/// Response wrapper returned by every job endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    /// The job record after the operation.
    pub job: SynchronizationJob,
}

/// Body of `POST /persister/synchronization/jobs/{id}/entities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUploadRequest {
    /// One batch of wire-shaped entities.
    pub entities: Vec<Entity>,
}

/// Body of `POST /persister/synchronization/jobs/{id}/relationships`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipUploadRequest {
    /// One batch of wire-shaped relationships.
    pub relationships: Vec<Relationship>,
}

/// Counts of objects delivered by one or more successful uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadCounts {
    /// Entities delivered.
    pub entities: u64,
    /// Relationships delivered.
    pub relationships: u64,
}

impl UploadCounts {
    /// Counts for an entity batch.
    pub fn entities(count: u64) -> Self {
        Self {
            entities: count,
            relationships: 0,
        }
    }

    /// Counts for a relationship batch.
    pub fn relationships(count: u64) -> Self {
        Self {
            entities: 0,
            relationships: count,
        }
    }

    /// Accumulates another set of counts.
    pub fn add(&mut self, other: UploadCounts) {
        self.entities += other.entities;
        self.relationships += other.relationships;
    }
}
