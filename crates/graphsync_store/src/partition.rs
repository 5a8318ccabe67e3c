//! Per-`_type` partitions of buffered graph objects.

use crate::store::GraphObject;
use std::collections::HashMap;

/// Insertion-ordered buffer of one `_type`'s objects with keyed lookup.
pub(crate) struct Partition<T> {
    objects: Vec<T>,
    by_key: HashMap<String, usize>,
}

impl<T: GraphObject> Partition<T> {
    pub(crate) fn new() -> Self {
        Self {
            objects: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&T> {
        self.by_key.get(key).map(|&i| &self.objects[i])
    }

    /// Inserts an object, merging into the existing record when the key is
    /// already buffered.
    pub(crate) fn upsert(&mut self, incoming: T) {
        match self.by_key.get(incoming.key()) {
            Some(&i) => self.objects[i].merge_duplicate(incoming),
            None => {
                self.by_key
                    .insert(incoming.key().to_string(), self.objects.len());
                self.objects.push(incoming);
            }
        }
    }

    /// Takes the buffered page, leaving the partition empty.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.by_key.clear();
        std::mem::take(&mut self.objects)
    }

    /// Clones the buffered objects in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.objects.clone()
    }
}
