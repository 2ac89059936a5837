//! Accessor generation.
//!
//! One [`Accessor`] per table that has preload blocks, collected into an
//! explicit table-to-accessor map. Table names the storage layer reserves for
//! itself (plus any configured as reserved) are left out without complaint,
//! even when a preload block was registered for them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::Catalog;
use crate::errors::Result;
use crate::record::FixtureRecord;
use crate::session::FixtureSession;

/// Looks up (building on first use) a named fixture of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    table: Arc<str>,
}

impl Accessor {
    fn new(table: &str) -> Self {
        Self {
            table: Arc::from(table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `users.fetch(&mut session, "john")`. Unknown names fail with `NotFound`.
    pub fn fetch(&self, session: &mut FixtureSession, name: &str) -> Result<FixtureRecord> {
        session.resolve(&self.table, name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Accessors {
    by_table: BTreeMap<String, Accessor>,
    excluded: Vec<String>,
}

impl Accessors {
    pub fn generate(catalog: &Catalog, storage_reserved: &[String]) -> Self {
        let mut accessors = Self::default();
        for table in catalog.table_names() {
            if catalog.is_reserved(&table, storage_reserved) {
                tracing::debug!(table = %table, "skipping accessor for reserved table");
                accessors.excluded.push(table);
                continue;
            }
            accessors.by_table.insert(table.clone(), Accessor::new(&table));
        }
        accessors
    }

    pub fn get(&self, table: &str) -> Option<&Accessor> {
        self.by_table.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.by_table.contains_key(table)
    }

    /// Tables with an accessor, sorted.
    pub fn tables(&self) -> Vec<&str> {
        self.by_table.keys().map(String::as_str).collect()
    }

    /// Registered tables that were left out because their name is reserved.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.excluded.iter().any(|t| t == table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Accessor)> {
        self.by_table.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.by_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_table.is_empty()
    }
}
