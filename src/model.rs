use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A remote OAI-PMH endpoint plus its per-source configuration blob.
///
/// `config` is the raw JSON string attached to the source; it is parsed into
/// a [`HarvestConfig`](crate::config::HarvestConfig) at the start of each
/// stage. `id` doubles as the catalog package id of the source dataset, used
/// to resolve the owning organization at import time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSource {
    pub id: String,
    pub url: String,
    pub config: String,
}

/// One harvesting run against a [`HarvestSource`]. Created externally; the
/// pipeline only reads the source reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: String,
    pub source: HarvestSource,
}

/// Processing state of a [`HarvestObject`]. Failure states are terminal for
/// the current run; an external scheduler may rerun the failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectState {
    Created,
    Fetched,
    Imported,
    FetchFailed,
    ImportFailed,
}

/// The unit of work: one source record's processing state across fetch and
/// import. Created empty by the gather stage, `content` populated by fetch,
/// `package_id` set and the object marked current by import. Never deleted —
/// it is the durable audit trail of one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestObject {
    pub id: String,
    /// Protocol-level record identifier, stable across runs.
    pub guid: String,
    pub job: HarvestJob,
    /// Serialized [`ContentMap`], populated by the fetch stage.
    pub content: Option<String>,
    /// Catalog package reference, populated by the import stage.
    pub package_id: Option<String>,
    pub current: bool,
    pub state: ObjectState,
}

impl HarvestObject {
    pub fn new(id: impl Into<String>, guid: impl Into<String>, job: HarvestJob) -> Self {
        Self {
            id: id.into(),
            guid: guid.into(),
            job,
            content: None,
            package_id: None,
            current: false,
            state: ObjectState::Created,
        }
    }
}

/// A single field value in a [`ContentMap`]: either a scalar (derived keys
/// such as `metadata_modified`) or an ordered list of values (metadata
/// fields, `set_spec`). JSON round-trips scalars as strings and lists as
/// arrays, matching the serialized blob stored on the harvest object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// First non-missing value, if any. An empty scalar counts as missing.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) if !s.is_empty() => Some(s),
            FieldValue::Scalar(_) => None,
            FieldValue::List(values) => values.first().map(String::as_str),
        }
    }

    /// All values as a slice; a scalar behaves like a one-element list.
    pub fn as_slice(&self) -> &[String] {
        match self {
            FieldValue::Scalar(s) => std::slice::from_ref(s),
            FieldValue::List(values) => values,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty(),
            FieldValue::List(values) => values.is_empty(),
        }
    }
}

/// Flat field-name → values mapping decoded from one record, plus the keys
/// injected during fetch (`set_spec`, `metadata_modified`). Keys iterate in
/// sorted order so serialization is deterministic and fetch is
/// byte-idempotent for an unchanged remote record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentMap(pub BTreeMap<String, FieldValue>);

impl ContentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.0.insert(key.into(), value);
    }

    /// Appends one value to the list under `key`, creating it if absent.
    /// Pushing onto a scalar promotes it to a two-element list.
    pub fn push(&mut self, key: &str, value: String) {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| FieldValue::List(Vec::new()));
        match &mut *entry {
            FieldValue::List(values) => values.push(value),
            FieldValue::Scalar(existing) => {
                let first = std::mem::take(existing);
                *entry = FieldValue::List(vec![first, value]);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Values under `key`, or an empty slice when the key is absent.
    pub fn values(&self, key: &str) -> &[String] {
        self.get(key).map(FieldValue::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Target-schema package representation submitted to the catalog. Built
/// fresh per import from a [`ContentMap`]; keyed by a name derived
/// deterministically from the object's guid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageDict {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    pub resources: Vec<Resource>,
    pub tags: Vec<Tag>,
    pub extras: Vec<Extra>,
    /// Catalog group ids this package belongs to.
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// Arbitrary key/value carried on the package; `value` is `None` when the
/// source field was present but empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    pub key: String,
    pub value: Option<String>,
}

/// Catalog's view of a package, as returned by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub owner_org: Option<String>,
}

/// Catalog's view of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub title: String,
}

/// Group creation payload for find-or-create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDict {
    pub id: String,
    pub name: String,
    pub title: String,
}

/// Static capability descriptor exposed to the invoking scheduler.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HarvesterInfo {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_json_shapes() {
        let mut map = ContentMap::new();
        map.push("creator", "A".to_string());
        map.push("creator", "B".to_string());
        map.insert(
            "metadata_modified",
            FieldValue::Scalar("2021-05-01T00:00:00".to_string()),
        );

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains(r#""creator":["A","B"]"#));
        assert!(json.contains(r#""metadata_modified":"2021-05-01T00:00:00""#));

        let back: ContentMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn scalar_behaves_like_one_element_list() {
        let value = FieldValue::Scalar("x".to_string());
        assert_eq!(value.as_slice(), &["x".to_string()]);
        assert_eq!(value.first(), Some("x"));
        assert!(FieldValue::Scalar(String::new()).first().is_none());
        assert!(FieldValue::List(vec![]).is_empty());
    }

    #[test]
    fn content_map_serialization_is_deterministic() {
        let mut a = ContentMap::new();
        a.push("title", "T".to_string());
        a.push("creator", "A".to_string());

        let mut b = ContentMap::new();
        b.push("creator", "A".to_string());
        b.push("title", "T".to_string());

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
