//! Out-of-band upload of entity raw data.

use graphsync_model::Entity;
use parking_lot::Mutex;
use tracing::warn;

/// Destination for raw-data payloads.
///
/// Owned by an external collaborator; implementations return the storage
/// URI under which the payload can be retrieved later.
pub trait RawDataStorage: Send + Sync {
    /// Stores one payload and returns its URI.
    fn upload(
        &self,
        entity_key: &str,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<String, String>;
}

/// Moves entity raw data to temporary storage before upload.
///
/// Payloads are stripped from the entity so they never reach the
/// synchronization job; the returned URIs are recorded on the entity
/// instead. A storage failure is a warning, not a run failure; the
/// entity still uploads, minus the temp URI.
pub struct RawDataUploader {
    storage: Box<dyn RawDataStorage>,
}

impl RawDataUploader {
    /// Creates an uploader over the given storage.
    pub fn new(storage: Box<dyn RawDataStorage>) -> Self {
        Self { storage }
    }

    /// Processes a page of entities in place.
    pub fn process(&self, entities: &mut [Entity]) {
        for entity in entities {
            if entity.raw_data.is_empty() {
                continue;
            }
            let payloads = std::mem::take(&mut entity.raw_data);
            for raw in payloads {
                match self.storage.upload(&entity.key, &raw.name, &raw.raw_data) {
                    Ok(uri) => {
                        if !entity.raw_data_temp_uris.contains(&uri) {
                            entity.raw_data_temp_uris.push(uri);
                        }
                    }
                    Err(message) => {
                        warn!(
                            entity_key = %entity.key,
                            name = %raw.name,
                            %message,
                            "raw data upload failed"
                        );
                    }
                }
            }
        }
    }
}

/// Raw-data storage backed by process memory, for tests and local runs.
#[derive(Default)]
pub struct InMemoryRawDataStorage {
    uploads: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl InMemoryRawDataStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payloads.
    pub fn len(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Returns true when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.uploads.lock().is_empty()
    }
}

impl RawDataStorage for InMemoryRawDataStorage {
    fn upload(
        &self,
        entity_key: &str,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<String, String> {
        self.uploads
            .lock()
            .push((entity_key.to_string(), name.to_string(), payload.clone()));
        Ok(format!("memory://raw-data/{entity_key}/{name}"))
    }
}
