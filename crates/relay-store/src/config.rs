//! Store configuration.

use std::path::Path;

use relay_core::DEFAULT_ROUTE_NAME;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Tunables of a [`StoreData`](crate::StoreData). Absent keys in a JSON
/// config fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Route name of queries built for records without a route of their own.
    pub default_route_name: String,
    /// Force index of the first query payload pass.
    pub initial_force_index: i64,
    /// Whether non-optimistic writes are mirrored to an injected cache.
    pub write_through_cache: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            default_route_name: DEFAULT_ROUTE_NAME.to_string(),
            initial_force_index: 1,
            write_through_cache: true,
        }
    }
}

impl StoreConfig {
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::from)
    }
}
