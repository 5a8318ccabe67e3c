//! Graph-object store trait and in-memory implementation.

use crate::error::{StoreError, StoreResult};
use crate::metadata::{CollectionKind, IndexMetadata, IndexMetadataProvider};
use crate::partition::Partition;
use graphsync_model::{Entity, ModelError, Relationship};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Behavior the store requires of a stageable graph object.
pub trait GraphObject: Clone + Send + Sync + 'static {
    /// The object's `_key`.
    fn key(&self) -> &str;

    /// The object's `_type`.
    fn object_type(&self) -> &str;

    /// Checks identity-field presence.
    fn validate(&self) -> Result<(), ModelError>;

    /// Normalizes write-time invariants (`_class` ordering/dedup).
    fn normalize(&mut self);

    /// Merges a same-key, same-type duplicate into this object.
    fn merge_duplicate(&mut self, incoming: Self);
}

impl GraphObject for Entity {
    fn key(&self) -> &str {
        &self.key
    }

    fn object_type(&self) -> &str {
        &self.entity_type
    }

    fn validate(&self) -> Result<(), ModelError> {
        Entity::validate(self)
    }

    fn normalize(&mut self) {
        Entity::normalize(self);
    }

    fn merge_duplicate(&mut self, incoming: Self) {
        self.merge(incoming);
    }
}

impl GraphObject for Relationship {
    fn key(&self) -> &str {
        &self.key
    }

    fn object_type(&self) -> &str {
        &self.relationship_type
    }

    fn validate(&self) -> Result<(), ModelError> {
        Relationship::validate(self)
    }

    fn normalize(&mut self) {
        Relationship::normalize(self);
    }

    fn merge_duplicate(&mut self, incoming: Self) {
        self.merge(incoming);
    }
}

/// Filter for typed iteration.
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    object_type: Option<String>,
}

impl ObjectFilter {
    /// Matches every object.
    pub fn all() -> Self {
        Self { object_type: None }
    }

    /// Matches objects of one `_type`.
    pub fn of_type(object_type: impl Into<String>) -> Self {
        Self {
            object_type: Some(object_type.into()),
        }
    }

    /// Returns true if a partition of the given type is selected.
    pub fn matches(&self, object_type: &str) -> bool {
        self.object_type
            .as_deref()
            .map_or(true, |t| t == object_type)
    }
}

/// Callback receiving flushed entity pages, one `_type` batch per call.
pub type EntityFlushSink<'a> = dyn FnMut(Vec<Entity>) -> StoreResult<()> + Send + 'a;

/// Callback receiving flushed relationship pages, one `_type` batch per call.
pub type RelationshipFlushSink<'a> = dyn FnMut(Vec<Relationship>) -> StoreResult<()> + Send + 'a;

/// Buffers entities and relationships for the duration of a run.
///
/// Implementations serialize mutations to their key indexes; flush
/// callbacks run without any store lock held, so steps may keep adding
/// while a page uploads.
pub trait GraphObjectStore: Send + Sync {
    /// Stages entities from a step.
    ///
    /// Objects failing key/type validation are rejected and counted as
    /// warnings; the call continues. A `_key` already staged with a
    /// different `_type` fails with [`StoreError::DuplicateKey`]; a
    /// matching `_type` merges instead. When a `_type` partition exceeds
    /// the configured page size, the partition is flushed through
    /// `on_flushed` before the call returns.
    fn add_entities(
        &self,
        step_id: &str,
        entities: Vec<Entity>,
        on_flushed: Option<&mut EntityFlushSink<'_>>,
    ) -> StoreResult<()>;

    /// Stages relationships from a step; symmetric to [`Self::add_entities`]
    /// over the relationship key space.
    fn add_relationships(
        &self,
        step_id: &str,
        relationships: Vec<Relationship>,
        on_flushed: Option<&mut RelationshipFlushSink<'_>>,
    ) -> StoreResult<()>;

    /// Looks up an entity by `_key`, buffered or already flushed.
    fn find_entity(&self, key: &str) -> StoreResult<Option<Entity>>;

    /// Iterates buffered entities matching the filter.
    ///
    /// The iteratee observes a snapshot taken at the start of iteration,
    /// in insertion order within each `_type` partition. Returning an error
    /// stops iteration and propagates.
    fn iterate_entities(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Entity) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Iterates buffered relationships matching the filter.
    fn iterate_relationships(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Relationship) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Drains every buffered partition through the callbacks, one `_type`
    /// batch per call, entities before relationships. A no-op when nothing
    /// is pending.
    fn flush(
        &self,
        on_entities_flushed: Option<&mut EntityFlushSink<'_>>,
        on_relationships_flushed: Option<&mut RelationshipFlushSink<'_>>,
    ) -> StoreResult<()>;

    /// Returns the index-metadata capability, when the store implements it.
    ///
    /// `None` means the capability is unavailable, not that metadata is
    /// empty.
    fn index_metadata_provider(&self) -> Option<&dyn IndexMetadataProvider> {
        None
    }
}

/// Configuration for the in-memory store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Buffered objects per `_type` partition before an implicit flush.
    pub page_size: usize,
}

impl StoreConfig {
    /// Creates a configuration with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Sets the partition page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

/// Totals tracked by the in-memory store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Entities accepted into the buffer.
    pub entities_accepted: u64,
    /// Entities rejected by validation.
    pub entities_rejected: u64,
    /// Relationships accepted into the buffer.
    pub relationships_accepted: u64,
    /// Relationships rejected by validation.
    pub relationships_rejected: u64,
}

/// Where a staged key currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Buffered,
    Flushed,
}

struct KeyEntry {
    object_type: String,
    location: Location,
}

struct PartitionMap<T> {
    by_type: HashMap<String, Arc<Mutex<Partition<T>>>>,
    order: Vec<String>,
}

impl<T: GraphObject> PartitionMap<T> {
    fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            order: Vec::new(),
        }
    }
}

/// One graph-object collection: per-`_type` partitions plus a
/// collection-wide key index.
///
/// Lock order is `key_index` → `partitions` → partition → `flushed`;
/// every path takes locks in that order and releases them before any
/// callback runs.
struct CollectionBuffer<T: GraphObject> {
    kind: CollectionKind,
    page_size: usize,
    cache_flushed: bool,
    key_index: Mutex<HashMap<String, KeyEntry>>,
    partitions: RwLock<PartitionMap<T>>,
    flushed: Mutex<HashMap<String, T>>,
    step_counts: Mutex<HashMap<(String, String), u64>>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl<T: GraphObject> CollectionBuffer<T> {
    fn new(kind: CollectionKind, page_size: usize, cache_flushed: bool) -> Self {
        Self {
            kind,
            page_size,
            cache_flushed,
            key_index: Mutex::new(HashMap::new()),
            partitions: RwLock::new(PartitionMap::new()),
            flushed: Mutex::new(HashMap::new()),
            step_counts: Mutex::new(HashMap::new()),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn partition(&self, object_type: &str) -> Arc<Mutex<Partition<T>>> {
        if let Some(partition) = self.partitions.read().by_type.get(object_type) {
            return Arc::clone(partition);
        }
        let mut map = self.partitions.write();
        if let Some(partition) = map.by_type.get(object_type) {
            return Arc::clone(partition);
        }
        let partition = Arc::new(Mutex::new(Partition::new()));
        map.by_type
            .insert(object_type.to_string(), Arc::clone(&partition));
        map.order.push(object_type.to_string());
        partition
    }

    /// Stages one object. Returns a drained page when the object's
    /// partition crossed the page-size threshold and a flush is allowed;
    /// without a flush sink the partition just keeps growing until the
    /// next explicit flush.
    fn stage(&self, step_id: &str, mut object: T, allow_flush: bool) -> StoreResult<Option<Vec<T>>> {
        if let Err(err) = object.validate() {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            warn!(step_id, error = %err, "rejected invalid graph object");
            return Ok(None);
        }
        object.normalize();

        let mut key_index = self.key_index.lock();
        let object_type = object.object_type().to_string();
        let key = object.key().to_string();

        let existing = key_index
            .get(&key)
            .map(|entry| (entry.object_type.clone(), entry.location));
        let incoming = match existing {
            Some((existing_type, _)) if existing_type != object_type => {
                return Err(StoreError::DuplicateKey {
                    key,
                    existing_type,
                    incoming_type: object_type,
                });
            }
            Some((_, Location::Flushed)) => {
                // Revive the flushed record so the merge keeps every
                // property the earlier page carried.
                if let Some(entry) = key_index.get_mut(&key) {
                    entry.location = Location::Buffered;
                }
                match self.flushed.lock().remove(&key) {
                    Some(mut flushed) => {
                        flushed.merge_duplicate(object);
                        flushed
                    }
                    None => object,
                }
            }
            Some(_) => object,
            None => {
                key_index.insert(
                    key,
                    KeyEntry {
                        object_type: object_type.clone(),
                        location: Location::Buffered,
                    },
                );
                object
            }
        };

        self.accepted.fetch_add(1, Ordering::SeqCst);
        *self
            .step_counts
            .lock()
            .entry((step_id.to_string(), object_type.clone()))
            .or_insert(0) += 1;

        let partition = self.partition(&object_type);
        let mut guard = partition.lock();
        guard.upsert(incoming);

        if allow_flush && guard.len() >= self.page_size {
            let page = guard.drain();
            drop(guard);
            self.record_flushed(&mut key_index, &page);
            return Ok(Some(page));
        }

        Ok(None)
    }

    fn record_flushed(&self, key_index: &mut HashMap<String, KeyEntry>, page: &[T]) {
        for object in page {
            if let Some(entry) = key_index.get_mut(object.key()) {
                entry.location = Location::Flushed;
            }
        }
        if self.cache_flushed {
            let mut flushed = self.flushed.lock();
            for object in page {
                flushed.insert(object.key().to_string(), object.clone());
            }
        }
    }

    fn add(
        &self,
        step_id: &str,
        objects: Vec<T>,
        mut on_flushed: Option<&mut (dyn FnMut(Vec<T>) -> StoreResult<()> + Send + '_)>,
    ) -> StoreResult<()> {
        let allow_flush = on_flushed.is_some();
        for object in objects {
            if let Some(page) = self.stage(step_id, object, allow_flush)? {
                if let Some(sink) = on_flushed.as_deref_mut() {
                    sink(page)?;
                }
            }
        }
        Ok(())
    }

    fn find(&self, key: &str) -> Option<T> {
        let key_index = self.key_index.lock();
        let entry = key_index.get(key)?;
        match entry.location {
            Location::Buffered => {
                let partition = self.partition(&entry.object_type);
                let guard = partition.lock();
                guard.get(key).cloned()
            }
            Location::Flushed => self.flushed.lock().get(key).cloned(),
        }
    }

    fn iterate(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&T) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let selected: Vec<Arc<Mutex<Partition<T>>>> = {
            let map = self.partitions.read();
            map.order
                .iter()
                .filter(|object_type| filter.matches(object_type))
                .filter_map(|object_type| map.by_type.get(object_type).map(Arc::clone))
                .collect()
        };

        for partition in selected {
            let snapshot = partition.lock().snapshot();
            for object in &snapshot {
                iteratee(object)?;
            }
        }
        Ok(())
    }

    /// Drains every partition, returning `(type, page)` pairs in partition
    /// creation order. No locks are held on return.
    fn drain_all(&self) -> Vec<(String, Vec<T>)> {
        let mut key_index = self.key_index.lock();
        let selected: Vec<(String, Arc<Mutex<Partition<T>>>)> = {
            let map = self.partitions.read();
            map.order
                .iter()
                .filter_map(|object_type| {
                    map.by_type
                        .get(object_type)
                        .map(|p| (object_type.clone(), Arc::clone(p)))
                })
                .collect()
        };

        let mut pages = Vec::new();
        for (object_type, partition) in selected {
            let page = {
                let mut guard = partition.lock();
                if guard.is_empty() {
                    continue;
                }
                guard.drain()
            };
            self.record_flushed(&mut key_index, &page);
            pages.push((object_type, page));
        }
        pages
    }

    fn index_metadata(&self, step_id: &str, object_type: &str) -> Option<IndexMetadata> {
        self.step_counts
            .lock()
            .get(&(step_id.to_string(), object_type.to_string()))
            .map(|&count| IndexMetadata {
                step_id: step_id.to_string(),
                object_type: object_type.to_string(),
                kind: self.kind,
                count,
            })
    }
}

/// The default, memory-backed graph-object store.
///
/// Duplicate `_key` handling is merge-on-matching-`_type`,
/// reject-on-conflicting-`_type`; flushed entities stay available to
/// [`GraphObjectStore::find_entity`] for the rest of the run.
pub struct InMemoryGraphObjectStore {
    entities: CollectionBuffer<Entity>,
    relationships: CollectionBuffer<Relationship>,
}

impl InMemoryGraphObjectStore {
    /// Creates a store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entities: CollectionBuffer::new(CollectionKind::Entities, config.page_size, true),
            relationships: CollectionBuffer::new(
                CollectionKind::Relationships,
                config.page_size,
                false,
            ),
        }
    }

    /// Returns accepted/rejected totals for the run summary.
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            entities_accepted: self.entities.accepted.load(Ordering::SeqCst),
            entities_rejected: self.entities.rejected.load(Ordering::SeqCst),
            relationships_accepted: self.relationships.accepted.load(Ordering::SeqCst),
            relationships_rejected: self.relationships.rejected.load(Ordering::SeqCst),
        }
    }
}

impl Default for InMemoryGraphObjectStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl GraphObjectStore for InMemoryGraphObjectStore {
    fn add_entities(
        &self,
        step_id: &str,
        entities: Vec<Entity>,
        on_flushed: Option<&mut EntityFlushSink<'_>>,
    ) -> StoreResult<()> {
        self.entities.add(step_id, entities, on_flushed)
    }

    fn add_relationships(
        &self,
        step_id: &str,
        relationships: Vec<Relationship>,
        on_flushed: Option<&mut RelationshipFlushSink<'_>>,
    ) -> StoreResult<()> {
        self.relationships.add(step_id, relationships, on_flushed)
    }

    fn find_entity(&self, key: &str) -> StoreResult<Option<Entity>> {
        Ok(self.entities.find(key))
    }

    fn iterate_entities(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Entity) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.entities.iterate(filter, iteratee)
    }

    fn iterate_relationships(
        &self,
        filter: &ObjectFilter,
        iteratee: &mut dyn FnMut(&Relationship) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.relationships.iterate(filter, iteratee)
    }

    fn flush(
        &self,
        mut on_entities_flushed: Option<&mut EntityFlushSink<'_>>,
        mut on_relationships_flushed: Option<&mut RelationshipFlushSink<'_>>,
    ) -> StoreResult<()> {
        for (_, page) in self.entities.drain_all() {
            if let Some(sink) = on_entities_flushed.as_deref_mut() {
                sink(page)?;
            }
        }
        for (_, page) in self.relationships.drain_all() {
            if let Some(sink) = on_relationships_flushed.as_deref_mut() {
                sink(page)?;
            }
        }
        Ok(())
    }

    fn index_metadata_provider(&self) -> Option<&dyn IndexMetadataProvider> {
        Some(self)
    }
}

impl IndexMetadataProvider for InMemoryGraphObjectStore {
    fn index_metadata(
        &self,
        step_id: &str,
        object_type: &str,
        kind: CollectionKind,
    ) -> Option<IndexMetadata> {
        match kind {
            CollectionKind::Entities => self.entities.index_metadata(step_id, object_type),
            CollectionKind::Relationships => {
                self.relationships.index_metadata(step_id, object_type)
            }
        }
    }
}

impl std::fmt::Debug for InMemoryGraphObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphObjectStore")
            .field("counts", &self.counts())
            .finish_non_exhaustive()
    }
}
