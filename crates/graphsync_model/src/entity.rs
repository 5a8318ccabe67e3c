//! Entity graph objects and raw-data tracking.

use crate::error::{ModelError, ModelResult};
use crate::property::PropertyValue;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A node in the graph, staged locally before upload.
///
/// The identity fields (`_key`, `_type`, `_class`) are explicit struct
/// fields; everything else a collection step knows about the source resource
/// goes into the dynamic property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within the entity collection for one run.
    #[serde(rename = "_key")]
    pub key: String,

    /// Schema/kind tag, used for batching and indexing.
    #[serde(rename = "_type")]
    pub entity_type: String,

    /// Taxonomy tags; always an ordered, de-duplicated sequence.
    #[serde(rename = "_class", default, deserialize_with = "classes_from_wire")]
    pub classes: Vec<String>,

    /// Storage URIs recorded for raw data uploaded to temporary storage.
    #[serde(
        rename = "_rawDataTempUris",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub raw_data_temp_uris: Vec<String>,

    /// Source payloads used to build this entity.
    ///
    /// Raw data is never delivered to the synchronization job; the raw-data
    /// uploader moves each payload to temporary storage and records the
    /// resulting URI in `raw_data_temp_uris`.
    #[serde(rename = "_rawData", default, skip_serializing)]
    pub raw_data: Vec<RawData>,

    /// Dynamic property bag.
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// A source payload retained alongside an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    /// Identifies the payload when several data sources built one entity.
    ///
    /// Must be unique within the entity. `"default"` is acceptable when
    /// there is a single payload.
    pub name: String,

    /// The source content itself.
    #[serde(rename = "rawData")]
    pub raw_data: serde_json::Value,
}

impl Entity {
    /// Creates a new entity with the given key and type.
    pub fn new(key: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            entity_type: entity_type.into(),
            classes: Vec::new(),
            raw_data_temp_uris: Vec::new(),
            raw_data: Vec::new(),
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

    /// Attaches a raw-data payload.
    pub fn with_raw_data(mut self, name: impl Into<String>, payload: serde_json::Value) -> Self {
        self.raw_data.push(RawData {
            name: name.into(),
            raw_data: payload,
        });
        self
    }

    /// Validates identity fields and raw-data name uniqueness.
    pub fn validate(&self) -> ModelResult<()> {
        if self.key.is_empty() {
            return Err(ModelError::invalid("entity is missing _key"));
        }
        if self.entity_type.is_empty() {
            return Err(ModelError::invalid(format!(
                "entity {:?} is missing _type",
                self.key
            )));
        }
        for (i, raw) in self.raw_data.iter().enumerate() {
            if self.raw_data[..i].iter().any(|other| other.name == raw.name) {
                return Err(ModelError::DuplicateRawDataName {
                    entity_key: self.key.clone(),
                    name: raw.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Normalizes the class sequence in place.
    pub fn normalize(&mut self) {
        self.classes = normalize_classes(std::mem::take(&mut self.classes));
    }

    /// Merges a same-key, same-type duplicate into this entity.
    ///
    /// Bag properties from the incoming entity win, except `id`: identity
    /// values from both sides are unioned into a single de-duplicated value,
    /// so an entity known to several source systems keeps every identifier.
    /// Classes union in order; raw-data payloads with new names append.
    pub fn merge(&mut self, incoming: Entity) {
        let merged_ids = {
            let mut ids: Vec<String> = Vec::new();
            for side in [self.properties.get("id"), incoming.properties.get("id")] {
                if let Some(value) = side {
                    for id in value.string_values() {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                }
            }
            ids
        };

        for class in incoming.classes {
            if !self.classes.contains(&class) {
                self.classes.push(class);
            }
        }

        for (name, value) in incoming.properties {
            self.properties.insert(name, value);
        }

        match merged_ids.len() {
            0 => {}
            1 => {
                self.properties.insert(
                    "id".into(),
                    PropertyValue::String(merged_ids.into_iter().next().unwrap_or_default()),
                );
            }
            _ => {
                self.properties
                    .insert("id".into(), PropertyValue::StringArray(merged_ids));
            }
        }

        for raw in incoming.raw_data {
            if !self.raw_data.iter().any(|existing| existing.name == raw.name) {
                self.raw_data.push(raw);
            }
        }

        for uri in incoming.raw_data_temp_uris {
            if !self.raw_data_temp_uris.contains(&uri) {
                self.raw_data_temp_uris.push(uri);
            }
        }
    }
}

/// Returns an ordered, de-duplicated class sequence.
pub fn normalize_classes<I, S>(classes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut normalized: Vec<String> = Vec::new();
    for class in classes {
        let class = class.into();
        if !class.is_empty() && !normalized.contains(&class) {
            normalized.push(class);
        }
    }
    normalized
}

/// Accepts `_class` as either a single string or an array of strings.
fn classes_from_wire<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(class) => normalize_classes([class]),
        OneOrMany::Many(classes) => normalize_classes(classes),
    })
}
