//! Fixture configuration.
//!
//! Settings are fixed when the registry is sealed. They can be built in code
//! or deserialized from YAML/JSON:
//!
//! ```rust
//! use fixture_preload::config::{AutoIds, Config, DuplicatePolicy};
//! let config = Config::from_yaml_str(
//!     "auto_ids: { strategy: hashed }\nduplicates: overwrite\nreserved_tables: [audit_log]\n",
//! ).unwrap();
//! assert_eq!(config.duplicates, DuplicatePolicy::Overwrite);
//! assert!(matches!(config.auto_ids, AutoIds::Hashed { .. }));
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{FixtureError, Result};
use crate::record::RecordId;

/// Upper bound of hashed ids; keeps them inside a signed 32-bit column.
pub const DEFAULT_HASH_CEILING: u64 = (1 << 30) - 1;

fn default_start() -> u64 {
    1
}

fn default_ceiling() -> u64 {
    DEFAULT_HASH_CEILING
}

/// How automatic ids are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AutoIds {
    /// Per-table counter in declaration order, skipping explicit ids.
    Sequential {
        #[serde(default = "default_start")]
        start: u64,
    },
    /// Derived from a SHA-256 of the fixture name, independent of declaration order.
    Hashed {
        #[serde(default = "default_ceiling")]
        ceiling: u64,
    },
}

impl Default for AutoIds {
    fn default() -> Self {
        AutoIds::Sequential { start: 1 }
    }
}

/// What happens when one table declares the same fixture name twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Sealing fails with `DuplicateFixture`.
    #[default]
    Reject,
    /// The last declaration wins, ids included.
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub auto_ids: AutoIds,
    pub duplicates: DuplicatePolicy,
    /// Extra table names treated like the storage layer's own reserved tables.
    pub reserved_tables: Vec<String>,
    /// Tables truncated on every clean even though no fixture lives there.
    pub extra_tables: Vec<String>,
}

impl Config {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(source).map_err(FixtureError::config)?;
        config.validate()
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(source).map_err(FixtureError::config)?;
        config.validate()
    }

    pub fn with_auto_ids(mut self, auto_ids: AutoIds) -> Self {
        self.auto_ids = auto_ids;
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_reserved_table(mut self, table: impl Into<String>) -> Self {
        self.reserved_tables.push(table.into());
        self
    }

    pub fn with_extra_table(mut self, table: impl Into<String>) -> Self {
        self.extra_tables.push(table.into());
        self
    }

    pub fn validate(self) -> Result<Self> {
        match self.auto_ids {
            AutoIds::Sequential { start: 0 } => {
                Err(FixtureError::config("sequential ids must start at 1 or above"))
            }
            AutoIds::Hashed { ceiling: 0 } => {
                Err(FixtureError::config("hashed id ceiling must be positive"))
            }
            AutoIds::Sequential { start } if !RecordId::new(start).in_range() => {
                Err(FixtureError::config(format!("sequential start {} is out of range", start)))
            }
            AutoIds::Hashed { ceiling } if !RecordId::new(ceiling).in_range() => {
                Err(FixtureError::config(format!("hashed id ceiling {} is out of range", ceiling)))
            }
            _ => Ok(self),
        }
    }
}
