//! Organisational hierarchy: a read-only lookup table loaded once at startup.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

/// Immutable organisational hierarchy (top-level JSON object).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrgHierarchy {
    nodes: Map<String, Value>,
}

impl OrgHierarchy {
    /// Wrap an already-parsed JSON object.
    pub fn new(nodes: Map<String, Value>) -> Self {
        Self { nodes }
    }

    /// Load the hierarchy from a JSON file.
    ///
    /// A missing or unparsable file is logged and yields an empty hierarchy;
    /// the service can run without it.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read hierarchy file");
                return Self::default();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&data) {
            Ok(nodes) => {
                info!(path = %path.display(), nodes = nodes.len(), "Hierarchy loaded");
                Self { nodes }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse hierarchy file");
                Self::default()
            }
        }
    }

    /// Look up a top-level node by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The full table as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone())
    }
}
