//! # graphsync Store
//!
//! In-process buffer for graph objects produced by collection steps.
//!
//! This crate provides:
//! - The `GraphObjectStore` trait (add, lookup, typed iteration,
//!   flush-with-callback)
//! - `InMemoryGraphObjectStore`, the default implementation
//! - Per-`_type` partitions with collection-wide key uniqueness
//! - An optional index-metadata capability for incremental re-indexing
//!
//! ## Key Invariants
//!
//! - `_key` is unique per collection; entities and relationships have
//!   separate key spaces
//! - A duplicate add merges on matching `_type` and is rejected on a
//!   conflicting `_type`; distinguishing properties are never silently
//!   overwritten
//! - Flush hands out copy-then-clear snapshots; no store lock is held while
//!   a flush callback runs
//! - Iteration sees a snapshot taken at its start, in insertion order within
//!   a `_type` partition

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod metadata;
mod partition;
mod store;

pub use error::{StoreError, StoreResult};
pub use metadata::{CollectionKind, IndexMetadata, IndexMetadataProvider};
pub use store::{
    EntityFlushSink, GraphObject, GraphObjectStore, InMemoryGraphObjectStore, ObjectFilter,
    RelationshipFlushSink, StoreConfig, StoreCounts,
};
