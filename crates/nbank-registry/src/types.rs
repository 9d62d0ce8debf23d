//! Request and response types for the registry API.
//!
//! Response types keep unrecognized fields in `extra` so records can be
//! printed back in full; `deny_unknown_fields` is never used.

use std::collections::BTreeMap;

use nbank_core::location::LocationRecord;
use nbank_core::metadata::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};

/// A resource record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    /// Names of the archives holding copies.
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Request body for registering a resource.
///
/// Leaving `name` unset asks the registry to assign an identifier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub locations: Vec<String>,
    pub metadata: Metadata,
}

/// An archive record. `neurobank` archives are local directories; other
/// schemes are network stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub name: String,
    pub scheme: String,
    pub root: String,
}

/// A datatype record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub name: String,
    pub content_type: String,
}

/// Registry self-description. Keys vary between server versions.
pub type RegistryInfo = BTreeMap<String, serde_json::Value>;

/// One element of a bulk location response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceLocations {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<LocationRecord>,
}

/// Body of the bulk endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct BulkRequest<'a> {
    pub names: &'a [String],
}

/// Body of a metadata update.
#[derive(Debug, Serialize)]
pub(crate) struct MetadataPatch<'a> {
    pub metadata: &'a Metadata,
}

/// Filters for a resource search. Empty fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    /// Name or name fragment.
    pub name: Option<String>,
    pub dtype: Option<String>,
    pub sha1: Option<String>,
    /// Archive name.
    pub location: Option<String>,
    /// Metadata fields that must equal the given value.
    pub metadata: Metadata,
    /// Metadata fields that must not equal the given value.
    pub metadata_neq: Metadata,
}

impl ResourceQuery {
    /// Whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.params().is_empty()
    }

    /// Query-string pairs for this search.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (key, value) in [
            ("name", &self.name),
            ("dtype", &self.dtype),
            ("sha1", &self.sha1),
            ("location", &self.location),
        ] {
            if let Some(v) = value {
                out.push((key.to_string(), v.clone()));
            }
        }
        for (k, v) in &self.metadata {
            out.push((format!("metadata__{k}"), query_value(v)));
        }
        for (k, v) in &self.metadata_neq {
            out.push((format!("metadata__{k}__neq"), query_value(v)));
        }
        out
    }
}

fn query_value(v: &MetadataValue) -> String {
    match v {
        MetadataValue::Bool(true) => "True".into(),
        MetadataValue::Bool(false) => "False".into(),
        MetadataValue::Null => "None".into(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_keeps_unknown_fields() {
        let json = serde_json::json!({
            "name": "st11_1",
            "dtype": "vocalization-wav",
            "sha1": "abc",
            "locations": ["starlings"],
            "metadata": {"experimenter": "dmeliza", "trial": 3},
            "created_by": "dmeliza",
            "created_on": "2024-01-01T00:00:00Z"
        });
        let r: Resource = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(r.locations, vec!["starlings"]);
        assert_eq!(r.metadata["trial"], MetadataValue::Integer(3));
        assert_eq!(r.extra["created_by"], "dmeliza");
        assert_eq!(serde_json::to_value(&r).unwrap(), json);
    }

    #[test]
    fn new_resource_omits_absent_fields() {
        let req = NewResource {
            locations: vec!["starlings".into()],
            ..NewResource::default()
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"locations": ["starlings"], "metadata": {}})
        );
    }

    #[test]
    fn query_params_include_metadata_filters() {
        let mut q = ResourceQuery {
            dtype: Some("wav".into()),
            ..ResourceQuery::default()
        };
        assert!(!q.is_empty());
        q.metadata.insert("bird".into(), MetadataValue::String("C29".into()));
        q.metadata_neq.insert("bad".into(), MetadataValue::Bool(true));
        assert_eq!(
            q.params(),
            vec![
                ("dtype".to_string(), "wav".to_string()),
                ("metadata__bird".to_string(), "C29".to_string()),
                ("metadata__bad__neq".to_string(), "True".to_string()),
            ]
        );
        assert!(ResourceQuery::default().is_empty());
    }
}
