//! Relationship graph objects.

use crate::entity::normalize_classes;
use crate::error::{ModelError, ModelResult};
use crate::property::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A typed edge between two entity keys.
///
/// The endpoint keys are opaque foreign keys into the entity key space;
/// the store does not resolve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier within the relationship collection for one run.
    #[serde(rename = "_key")]
    pub key: String,

    /// Schema/kind tag, used for batching and indexing.
    #[serde(rename = "_type")]
    pub relationship_type: String,

    /// Taxonomy tags; always an ordered, de-duplicated sequence.
    #[serde(rename = "_class", default)]
    pub classes: Vec<String>,

    /// Key of the source entity.
    #[serde(rename = "_fromEntityKey")]
    pub from_entity_key: String,

    /// Key of the target entity.
    #[serde(rename = "_toEntityKey")]
    pub to_entity_key: String,

    /// Dynamic property bag.
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Relationship {
    /// Creates a new relationship between two entity keys.
    pub fn new(
        key: impl Into<String>,
        relationship_type: impl Into<String>,
        from_entity_key: impl Into<String>,
        to_entity_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            relationship_type: relationship_type.into(),
            classes: Vec::new(),
            from_entity_key: from_entity_key.into(),
            to_entity_key: to_entity_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a taxonomy class, keeping the sequence ordered and de-duplicated.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
        self
    }

    /// Sets a property in the bag.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Validates identity fields.
    pub fn validate(&self) -> ModelResult<()> {
        if self.key.is_empty() {
            return Err(ModelError::invalid("relationship is missing _key"));
        }
        if self.relationship_type.is_empty() {
            return Err(ModelError::invalid(format!(
                "relationship {:?} is missing _type",
                self.key
            )));
        }
        Ok(())
    }

    /// Normalizes the class sequence in place.
    pub fn normalize(&mut self) {
        self.classes = normalize_classes(std::mem::take(&mut self.classes));
    }

    /// Merges a same-key, same-type duplicate into this relationship.
    ///
    /// Incoming bag properties win; classes union in order.
    pub fn merge(&mut self, incoming: Relationship) {
        for class in incoming.classes {
            if !self.classes.contains(&class) {
                self.classes.push(class);
            }
        }
        for (name, value) in incoming.properties {
            self.properties.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_validate() {
        let relationship = Relationship::new("user:1|has|device:1", "user_has_device", "user:1", "device:1")
            .with_class("HAS")
            .with_property("active", true);

        relationship.validate().unwrap();
        assert_eq!(relationship.from_entity_key, "user:1");
        assert_eq!(relationship.to_entity_key, "device:1");
    }

    #[test]
    fn validate_rejects_missing_identity() {
        assert!(Relationship::new("", "user_has_device", "a", "b").validate().is_err());
        assert!(Relationship::new("k", "", "a", "b").validate().is_err());
    }

    #[test]
    fn wire_shape_uses_underscore_fields() {
        let relationship =
            Relationship::new("user:1|has|device:1", "user_has_device", "user:1", "device:1");

        let wire = serde_json::to_value(&relationship).unwrap();
        assert_eq!(wire["_key"], "user:1|has|device:1");
        assert_eq!(wire["_fromEntityKey"], "user:1");
        assert_eq!(wire["_toEntityKey"], "device:1");
    }

    #[test]
    fn merge_overwrites_properties() {
        let mut relationship =
            Relationship::new("k", "user_has_device", "a", "b").with_property("weight", 1.0);
        relationship.merge(
            Relationship::new("k", "user_has_device", "a", "b").with_property("weight", 2.0),
        );
        assert_eq!(
            relationship.properties.get("weight"),
            Some(&PropertyValue::from(2.0))
        );
    }
}
