//! Index metadata for incremental re-indexing after partial flush.

/// Which graph-object collection a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// The entity collection.
    Entities,
    /// The relationship collection.
    Relationships,
}

/// Describes which objects of a `_type` came from a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// The step that produced the objects.
    pub step_id: String,
    /// The `_type` of the objects.
    pub object_type: String,
    /// Collection the objects belong to.
    pub kind: CollectionKind,
    /// Objects of this type accepted from this step so far.
    pub count: u64,
}

/// Optional store capability answering index-metadata lookups.
///
/// A store that does not expose this capability reports metadata as
/// unavailable; callers must not treat absence as an empty result.
pub trait IndexMetadataProvider: Send + Sync {
    /// Returns the descriptor for the given step/type/collection, if any
    /// objects were recorded for it.
    fn index_metadata(
        &self,
        step_id: &str,
        object_type: &str,
        kind: CollectionKind,
    ) -> Option<IndexMetadata>;
}
