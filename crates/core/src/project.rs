use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CoreError;
use crate::ids::ProjectId;

/// Fields a draft snapshot may never override: identity and the
/// server-reported version both belong to the server's copy.
const PROTECTED_FIELDS: &[&str] = &["id", "server_updated_at"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A project record as held in the local collection and returned by the server.
///
/// Business fields the engine has no opinion about round-trip through
/// `fields`. `updated_at` is stamped on every local mutation;
/// `server_updated_at` is only ever copied from a server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_updated_at: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items: Vec::new(),
            updated_at: None,
            server_updated_at: None,
            fields: Map::new(),
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.updated_at = Some(version.clone());
        self.server_updated_at = Some(version);
        self
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// The version the server reports for this record. Servers that omit
    /// `server_updated_at` are read through `updated_at`.
    pub fn server_version(&self) -> Option<&str> {
        self.server_updated_at
            .as_deref()
            .or(self.updated_at.as_deref())
    }

    /// Record the server-reported version in `server_updated_at`. Local
    /// edits restamp `updated_at`, so a record adopted from the server must
    /// carry its version there before the first edit.
    pub fn pin_server_version(&mut self) {
        if self.server_updated_at.is_none() {
            self.server_updated_at = self.updated_at.clone();
        }
    }

    /// The record as a JSON object, the shape stored in a draft overlay.
    pub fn to_snapshot(&self) -> Result<Map<String, Value>, CoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(CoreError::Serialization(format!(
                "project serialized to non-object: {other}"
            ))),
            Err(e) => Err(CoreError::Serialization(e.to_string())),
        }
    }

    /// Lay a partial snapshot over this record. Every top-level key present in
    /// the snapshot replaces this record's value, except the identity and
    /// server-version keys.
    pub fn overlaid_with(&self, snapshot: &Map<String, Value>) -> Result<Project, CoreError> {
        let mut merged = self.to_snapshot()?;
        for (key, value) in snapshot {
            if PROTECTED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
