//! Batch uploads against a synchronization job.

use crate::config::UploadConfig;
use crate::error::EngineResult;
use crate::http::HttpClient;
use crate::transport::RateLimitedTransport;
use graphsync_model::{
    Entity, EntityUploadRequest, Relationship, RelationshipUploadRequest, UploadCounts,
};
use std::sync::Arc;
use tracing::debug;

/// Serializes flushed pages into upload requests against a job.
///
/// The uploader re-splits a page that exceeds the configured batch size;
/// the store's page size and the upload limit are independent knobs.
/// Transport failures propagate unchanged; the transport's own retry is
/// the only retry.
pub struct BatchUploader<C: HttpClient> {
    transport: Arc<RateLimitedTransport<C>>,
    api_base_url: String,
    config: UploadConfig,
}

impl<C: HttpClient> BatchUploader<C> {
    /// Creates an uploader targeting the given API.
    pub fn new(
        transport: Arc<RateLimitedTransport<C>>,
        api_base_url: impl Into<String>,
        config: UploadConfig,
    ) -> Self {
        Self {
            transport,
            api_base_url: api_base_url.into(),
            config,
        }
    }

    fn upload_url(&self, job_id: &str, collection: &str) -> String {
        format!(
            "{}/persister/synchronization/jobs/{}/{}",
            self.api_base_url.trim_end_matches('/'),
            job_id,
            collection
        )
    }

    /// Uploads a page of entities to the job, one request per batch.
    pub fn upload_entities(&self, job_id: &str, entities: &[Entity]) -> EngineResult<UploadCounts> {
        if entities.is_empty() {
            return Ok(UploadCounts::default());
        }
        let url = self.upload_url(job_id, "entities");
        for chunk in entities.chunks(self.config.batch_size.max(1)) {
            let body = EntityUploadRequest {
                entities: chunk.to_vec(),
            };
            let _: serde_json::Value = self.transport.post_json(&url, &body)?;
        }
        debug!(job_id, count = entities.len(), "uploaded entity page");
        Ok(UploadCounts::entities(entities.len() as u64))
    }

    /// Uploads a page of relationships to the job, one request per batch.
    pub fn upload_relationships(
        &self,
        job_id: &str,
        relationships: &[Relationship],
    ) -> EngineResult<UploadCounts> {
        if relationships.is_empty() {
            return Ok(UploadCounts::default());
        }
        let url = self.upload_url(job_id, "relationships");
        for chunk in relationships.chunks(self.config.batch_size.max(1)) {
            let body = RelationshipUploadRequest {
                relationships: chunk.to_vec(),
            };
            let _: serde_json::Value = self.transport.post_json(&url, &body)?;
        }
        debug!(job_id, count = relationships.len(), "uploaded relationship page");
        Ok(UploadCounts::relationships(relationships.len() as u64))
    }
}
