//! Synchronization-job record and status lattice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a remote synchronization job.
///
/// Statuses only move forward: `Created` → `AwaitingUploads` → `Finalizing`
/// → `Completed`, with `Aborted` reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job exists but has not yet accepted uploads.
    Created,
    /// Job is accepting entity/relationship batches.
    AwaitingUploads,
    /// Finalize has been requested; uploads are closed.
    Finalizing,
    /// Job finished successfully. Terminal.
    Completed,
    /// Job was aborted. Terminal.
    Aborted,
}

impl JobStatus {
    /// Returns true for `Completed` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Aborted)
    }

    /// Returns true if the job can still accept batch uploads.
    pub fn accepts_uploads(&self) -> bool {
        matches!(self, JobStatus::AwaitingUploads)
    }

    /// Returns true if `next` is a legal forward transition from `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Created, JobStatus::AwaitingUploads) => true,
            (JobStatus::AwaitingUploads, JobStatus::Finalizing) => true,
            (JobStatus::Finalizing, JobStatus::Completed) => true,
            (
                JobStatus::Created | JobStatus::AwaitingUploads | JobStatus::Finalizing,
                JobStatus::Aborted,
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Created => "CREATED",
            JobStatus::AwaitingUploads => "AWAITING_UPLOADS",
            JobStatus::Finalizing => "FINALIZING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// The remote unit of work receiving uploaded batches.
///
/// Created once per run, mutated by successful uploads and by the
/// orchestrator's terminal decision, immutable once terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationJob {
    /// Remote job identifier.
    pub id: String,
    /// Current status.
    pub status: JobStatus,
    /// Entities acknowledged by the job so far.
    #[serde(default)]
    pub num_entities_uploaded: u64,
    /// Relationships acknowledged by the job so far.
    #[serde(default)]
    pub num_relationships_uploaded: u64,
    /// Cause attached when the job was aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SynchronizationJob {
    /// Creates a job record in the `Created` status.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Created,
            num_entities_uploaded: 0,
            num_relationships_uploaded: 0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_is_forward_only() {
        assert!(JobStatus::Created.can_transition_to(JobStatus::AwaitingUploads));
        assert!(JobStatus::AwaitingUploads.can_transition_to(JobStatus::Finalizing));
        assert!(JobStatus::Finalizing.can_transition_to(JobStatus::Completed));

        assert!(!JobStatus::AwaitingUploads.can_transition_to(JobStatus::Created));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Aborted));
        assert!(!JobStatus::Aborted.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn abort_reachable_from_non_terminal() {
        assert!(JobStatus::Created.can_transition_to(JobStatus::Aborted));
        assert!(JobStatus::AwaitingUploads.can_transition_to(JobStatus::Aborted));
        assert!(JobStatus::Finalizing.can_transition_to(JobStatus::Aborted));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Aborted.is_terminal());
        assert!(!JobStatus::AwaitingUploads.is_terminal());
    }

    #[test]
    fn job_wire_shape() {
        let job: SynchronizationJob = serde_json::from_value(serde_json::json!({
            "id": "job-1",
            "status": "AWAITING_UPLOADS",
            "numEntitiesUploaded": 3,
            "numRelationshipsUploaded": 1
        }))
        .unwrap();

        assert_eq!(job.status, JobStatus::AwaitingUploads);
        assert_eq!(job.num_entities_uploaded, 3);

        let wire = serde_json::to_value(&job).unwrap();
        assert_eq!(wire["status"], "AWAITING_UPLOADS");
        assert!(wire.get("errorMessage").is_none());
    }
}
