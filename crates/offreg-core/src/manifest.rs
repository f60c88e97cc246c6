//! `package.json` parsing.
//!
//! Only the fields the registry needs are typed; the full document is kept so
//! version metadata can expose everything the client reads (dependencies,
//! bin entries, engines, ...).

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

fn empty_is_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// The two shapes npm accepts for the `workspaces` field.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Workspaces {
    List(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

#[derive(Deserialize)]
struct ManifestFields {
    #[serde(default, deserialize_with = "empty_is_none")]
    name: Option<String>,
    #[serde(default, deserialize_with = "empty_is_none")]
    version: Option<String>,
    #[serde(default)]
    workspaces: Option<Workspaces>,
}

/// A parsed `package.json`.
#[derive(Clone, Debug, PartialEq)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub workspaces: Option<Workspaces>,
    document: Map<String, Value>,
}

impl PackageManifest {
    /// Parses a manifest from raw bytes.
    ///
    /// The document must be a JSON object; `name` and `version` are optional
    /// here and checked by the backends, since a workspace root may omit them.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let document = match value {
            Value::Object(map) => map,
            other => {
                return Err(serde::de::Error::invalid_type(
                    unexpected(&other),
                    &"a JSON object",
                ));
            }
        };

        let fields: ManifestFields = serde_json::from_value(Value::Object(document.clone()))?;

        Ok(Self {
            name: fields.name,
            version: fields.version,
            workspaces: fields.workspaces,
            document,
        })
    }

    /// Returns `(name, version)` when both are declared.
    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.name.as_deref()?, self.version.as_deref()?))
    }

    /// Glob patterns of the workspace members, `./` prefixes stripped.
    pub fn workspace_patterns(&self) -> Vec<String> {
        let patterns = match &self.workspaces {
            Some(Workspaces::List(list)) => list.as_slice(),
            Some(Workspaces::Object { packages }) => packages.as_slice(),
            None => &[],
        };

        patterns
            .iter()
            .map(|p| p.trim().trim_start_matches("./").trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    /// The complete manifest document.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }
}

fn unexpected(value: &Value) -> serde::de::Unexpected<'_> {
    use serde::de::Unexpected;

    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}
