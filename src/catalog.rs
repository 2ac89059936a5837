use crate::config::Config;
use crate::declare::PreloadBlock;
use crate::errors::Result;
use crate::identifiers::IdentifierTable;
use crate::record::RecordId;
use crate::registry::PreloadRegistry;

/// A sealed registry: preload blocks, the identifier table and the
/// configuration they were sealed with. Read-only, `Send + Sync`; share it
/// between workers behind an `Arc`.
#[derive(Debug)]
pub struct Catalog {
    registry: PreloadRegistry,
    identifiers: IdentifierTable,
    config: Config,
}

impl Catalog {
    pub(crate) fn new(registry: PreloadRegistry, identifiers: IdentifierTable, config: Config) -> Self {
        Self {
            registry,
            identifiers,
            config,
        }
    }

    pub fn registry(&self) -> &PreloadRegistry {
        &self.registry
    }

    pub fn identifiers(&self) -> &IdentifierTable {
        &self.identifiers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn id_for(&self, table: &str, name: &str) -> Result<RecordId> {
        self.identifiers.id_for(table, name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.registry.table_names()
    }

    pub(crate) fn blocks(&self, table: &str) -> &[PreloadBlock] {
        self.registry.blocks(table).unwrap_or(&[])
    }

    /// Whether the table belongs to the storage layer or was configured as reserved.
    pub fn is_reserved(&self, table: &str, storage_reserved: &[String]) -> bool {
        storage_reserved.iter().any(|t| t == table)
            || self.config.reserved_tables.iter().any(|t| t == table)
    }

    /// Tables a clean truncates: registered tables that are not reserved, then
    /// the configured extra tables.
    pub fn managed_tables(&self, storage_reserved: &[String]) -> Vec<String> {
        let mut tables: Vec<String> = self
            .registry
            .table_names()
            .into_iter()
            .chain(self.config.extra_tables.iter().cloned())
            .filter(|t| !self.is_reserved(t, storage_reserved))
            .collect();
        let mut seen = std::collections::HashSet::new();
        tables.retain(|t| seen.insert(t.clone()));
        tables
    }
}
