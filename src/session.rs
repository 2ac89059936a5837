//! One worker's view of the fixtures: its storage, its cache, its resolver
//! state. Build a session per worker; never share one between threads.

use std::sync::Arc;

use crate::accessor::{Accessor, Accessors};
use crate::cache::FixtureCache;
use crate::catalog::Catalog;
use crate::cleaner::{Cleaner, TestScope};
use crate::errors::{FixtureError, Result};
use crate::factory::FactoryEngine;
use crate::record::{FixtureRecord, RecordId};
use crate::resolver::{BuildContext, ScopeState};
use crate::storage::Storage;
use crate::value::Attributes;

pub struct FixtureSession {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) factories: Arc<dyn FactoryEngine>,
    pub(crate) storage: Box<dyn Storage>,
    pub(crate) cache: FixtureCache,
    pub(crate) scope: ScopeState,
    accessors: Accessors,
    cleaner: Cleaner,
}

impl FixtureSession {
    /// Creates a session and moves every managed table's sequence past the
    /// ids its fixtures will claim.
    ///
    /// # Errors
    /// Fails when the storage lacks one of the managed tables.
    pub fn new(
        catalog: Arc<Catalog>,
        factories: Arc<dyn FactoryEngine>,
        storage: Box<dyn Storage>,
    ) -> Result<Self> {
        let reserved = storage.reserved_tables();
        let accessors = Accessors::generate(&catalog, &reserved);
        let cleaner = Cleaner::for_catalog(&catalog, &reserved);
        let mut session = Self {
            catalog,
            factories,
            storage,
            cache: FixtureCache::new(),
            scope: ScopeState::default(),
            accessors,
            cleaner,
        };
        session.reserve_fixture_ids()?;
        tracing::debug!(
            accessors = session.accessors.len(),
            managed = session.cleaner.tables().len(),
            "opened fixture session"
        );
        Ok(session)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn Storage {
        self.storage.as_mut()
    }

    pub fn cache(&self) -> &FixtureCache {
        &self.cache
    }

    pub fn accessors(&self) -> &Accessors {
        &self.accessors
    }

    pub fn cleaner(&self) -> &Cleaner {
        &self.cleaner
    }

    /// The accessor of a table, `None` for unknown and reserved tables.
    pub fn accessor(&self, table: &str) -> Option<Accessor> {
        self.accessors.get(table).cloned()
    }

    /// Accessor call: `session.get("users", "john")`.
    ///
    /// # Errors
    /// `ReservedTable`, `UnknownTable`, or anything [`FixtureSession::resolve`] returns.
    pub fn get(&mut self, table: &str, name: &str) -> Result<FixtureRecord> {
        match self.accessor(table) {
            Some(accessor) => accessor.fetch(self, name),
            None if self.accessors.is_excluded(table) => Err(FixtureError::ReservedTable {
                table: table.to_string(),
            }),
            None => Err(FixtureError::UnknownTable {
                table: table.to_string(),
            }),
        }
    }

    pub fn id_for(&self, table: &str, name: &str) -> Result<RecordId> {
        self.catalog.id_for(table, name)
    }

    /// Number of records materialized in the current test.
    pub fn materialized(&self) -> usize {
        self.scope.materialized()
    }

    /// Creates and stores an ad hoc record; its id comes from the storage sequence.
    pub fn create(&mut self, factory: &str, overrides: Attributes) -> Result<FixtureRecord> {
        BuildContext::detached(self).create(factory, overrides)
    }

    /// Builds an ad hoc record without storing it.
    pub fn build(&mut self, factory: &str, overrides: Attributes) -> Result<FixtureRecord> {
        BuildContext::detached(self).build(factory, overrides)
    }

    /// Writes the record's attributes to storage, inserting it when it was
    /// never stored.
    pub fn save(&mut self, record: &FixtureRecord) -> Result<()> {
        if record.is_frozen() {
            return Err(FixtureError::FrozenMutation {
                table: record.table().to_string(),
                name: record.label(),
                attribute: "(save)".to_string(),
            });
        }
        match record.id() {
            Some(id) => self.storage.update(record.table(), id, record.to_row()),
            None => {
                let id = self.storage.insert(record.table(), None, record.to_row())?;
                record.assign_id(id);
                Ok(())
            }
        }
    }

    /// Deletes the record's row and freezes the in-memory record. The cache
    /// keeps handing out the same, now frozen, handle until the next clean.
    pub fn destroy(&mut self, record: &FixtureRecord) -> Result<()> {
        if record.is_frozen() {
            return Ok(());
        }
        if let Some(id) = record.id() {
            self.storage.delete(record.table(), id)?;
        }
        record.freeze();
        tracing::debug!(record = %record, "destroyed record");
        Ok(())
    }

    /// Re-reads the record's attributes from storage.
    pub fn reload(&mut self, record: &FixtureRecord) -> Result<()> {
        let Some(id) = record.id() else {
            return Err(FixtureError::build(
                record.table(),
                "can't reload a record that was never stored",
            ));
        };
        let row = self
            .storage
            .fetch(record.table(), id)?
            .ok_or_else(|| FixtureError::MissingRow {
                table: record.table().to_string(),
                id,
            })?;
        record.refresh_from_row(&row);
        Ok(())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        self.storage.count(table)
    }

    /// Truncates every managed table and forgets every record of this test.
    /// Safe to call any number of times.
    pub fn clean(&mut self) -> Result<()> {
        let result = self.cleaner.clean(self.storage.as_mut(), &mut self.cache);
        self.scope.reset();
        result?;
        self.reserve_fixture_ids()
    }

    /// Starts a test scope that cleans when it is dropped, including when the
    /// test panics.
    pub fn scope(&mut self) -> TestScope<'_> {
        TestScope::new(self)
    }

    fn reserve_fixture_ids(&mut self) -> Result<()> {
        for table in self.cleaner.tables() {
            if let Some(max) = self.catalog.identifiers().max_id(table) {
                self.storage.advance_sequence(table, max)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FixtureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureSession")
            .field("tables", &self.accessors.tables())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
