//! Static connection settings and application configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{plan::reorder::Placement, runtime::handle::RuntimeConfig};

/// Rejected configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON did not parse.
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// A required connection field is blank.
    #[error("{field} must not be empty")]
    Empty {
        /// Name of the blank field.
        field: &'static str,
    },
    /// The journal queue cannot hold anything.
    #[error("persist_queue_bound must be at least 1")]
    ZeroQueueBound,
}

/// Where the todo collection lives. Compiled in, never user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backend project.
    pub project_id: String,
    /// Client key sent with every request.
    pub api_key: String,
    /// Backend address. `memory://` for local runs.
    pub endpoint: String,
    /// Collection holding the todo documents.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            project_id: "livetodo-local".to_string(),
            api_key: "local-development".to_string(),
            endpoint: "memory://".to_string(),
            collection: default_collection(),
        }
    }
}

impl ConnectionConfig {
    /// `project/collection`, used to tag journals.
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.project_id, self.collection)
    }
}

fn default_collection() -> String {
    "todos".to_string()
}

/// Everything needed to start the app.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend location.
    pub connection: ConnectionConfig,
    /// SQLite journal location. `None` keeps the collection in memory only.
    pub journal_path: Option<PathBuf>,
    /// Where new items land.
    pub placement: Placement,
    /// Journal batching and checkpoint tuning.
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Parses and validates a JSON config. Missing sections take defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required fields and bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let conn = &self.connection;
        for (field, value) in [
            ("project_id", &conn.project_id),
            ("api_key", &conn.api_key),
            ("endpoint", &conn.endpoint),
            ("collection", &conn.collection),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty { field });
            }
        }
        if self.runtime.persist_queue_bound == 0 {
            return Err(ConfigError::ZeroQueueBound);
        }
        Ok(())
    }
}
