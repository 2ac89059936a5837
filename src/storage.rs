//! Storage boundary.
//!
//! The resolver and the cleaner only need a handful of row operations, so the
//! storage engine is consumed through the [`Storage`] trait. [`MemoryStorage`]
//! is a complete in-process implementation: explicit tables, a per-table
//! auto-increment sequence, and a pair of reserved bookkeeping tables that
//! accessors and truncation must never touch.

use std::collections::BTreeMap;

use crate::errors::{FixtureError, Result};
use crate::record::RecordId;
use crate::value::Attributes;

/// Tables every [`MemoryStorage`] carries for its own bookkeeping.
pub const RESERVED_TABLES: &[&str] = &["schema_migrations", "internal_metadata"];

pub trait Storage {
    /// Inserts a row. With `id: None` the table's sequence picks the id.
    fn insert(&mut self, table: &str, id: Option<RecordId>, row: Attributes) -> Result<RecordId>;

    /// Overwrites an existing row.
    fn update(&mut self, table: &str, id: RecordId, row: Attributes) -> Result<()>;

    /// Deletes a row, returning whether it existed.
    fn delete(&mut self, table: &str, id: RecordId) -> Result<bool>;

    fn fetch(&self, table: &str, id: RecordId) -> Result<Option<Attributes>>;

    fn count(&self, table: &str) -> Result<usize>;

    /// Removes every row from every listed table and resets their sequences.
    /// Either all tables are truncated or, on error, none is touched.
    fn truncate(&mut self, tables: &[&str]) -> Result<()>;

    /// Table names the storage layer owns.
    fn reserved_tables(&self) -> Vec<String>;

    /// Moves the table's sequence past `id` so that rows inserted without an
    /// explicit id never take an id a fixture is going to claim.
    fn advance_sequence(&mut self, _table: &str, _past: RecordId) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryTable {
    rows: BTreeMap<RecordId, Attributes>,
    next_id: RecordId,
    floor: RecordId,
}

impl MemoryTable {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: RecordId::new(1),
            floor: RecordId::new(1),
        }
    }

    // `next_id` past `RecordId::MAX` means the sequence is spent.
    fn allocate(&mut self, table: &str) -> Result<RecordId> {
        let exhausted = || FixtureError::IdsExhausted {
            table: table.to_string(),
        };
        let mut id = Some(self.next_id).filter(|id| id.in_range());
        while let Some(candidate) = id.filter(|id| self.rows.contains_key(id)) {
            id = candidate.checked_next();
        }
        let id = id.ok_or_else(exhausted)?;
        self.next_id = id.checked_next().unwrap_or(RecordId::new(u64::MAX));
        Ok(id)
    }
}

/// In-memory relational storage.
///
/// # Examples
///
/// ```rust
/// use fixture_preload::{attrs, MemoryStorage, Storage};
/// let mut db = MemoryStorage::with_tables(["users"]);
/// let id = db.insert("users", None, attrs! { "name" => "John" }).unwrap();
/// assert_eq!(id.get(), 1);
/// db.truncate(&["users"]).unwrap();
/// assert_eq!(db.count("users").unwrap(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: BTreeMap<String, MemoryTable>,
    reserved: Vec<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut storage = Self {
            tables: BTreeMap::new(),
            reserved: RESERVED_TABLES.iter().map(|t| t.to_string()).collect(),
        };
        for table in RESERVED_TABLES {
            storage.create_table(table);
        }
        // The schema version row survives every clean.
        if let Some(meta) = storage.tables.get_mut("schema_migrations") {
            meta.rows.insert(RecordId::new(1), crate::attrs! { "version" => "1" });
            meta.next_id = RecordId::new(2);
        }
        storage
    }

    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut storage = Self::new();
        for table in tables {
            storage.create_table(table.as_ref());
        }
        storage
    }

    /// Creates the table if it does not exist yet.
    pub fn create_table(&mut self, table: &str) {
        self.tables
            .entry(table.to_string())
            .or_insert_with(MemoryTable::new);
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Every row of a table, in id order.
    pub fn rows(&self, table: &str) -> Result<Vec<(RecordId, Attributes)>> {
        Ok(self
            .table(table)?
            .rows
            .iter()
            .map(|(id, row)| (*id, row.clone()))
            .collect())
    }

    fn table(&self, table: &str) -> Result<&MemoryTable> {
        self.tables.get(table).ok_or_else(|| FixtureError::NoSuchTable {
            table: table.to_string(),
        })
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| FixtureError::NoSuchTable {
                table: table.to_string(),
            })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn insert(&mut self, table: &str, id: Option<RecordId>, row: Attributes) -> Result<RecordId> {
        let mem = self.table_mut(table)?;
        let id = match id {
            Some(id) if !id.in_range() => {
                return Err(FixtureError::IdOutOfRange {
                    table: table.to_string(),
                    id,
                })
            }
            Some(id) if mem.rows.contains_key(&id) => {
                return Err(FixtureError::DuplicateKey {
                    table: table.to_string(),
                    id,
                })
            }
            Some(id) => {
                if id >= mem.next_id {
                    mem.next_id = id.checked_next().unwrap_or(RecordId::new(u64::MAX));
                }
                id
            }
            None => mem.allocate(table)?,
        };
        mem.rows.insert(id, row);
        Ok(id)
    }

    fn update(&mut self, table: &str, id: RecordId, row: Attributes) -> Result<()> {
        let mem = self.table_mut(table)?;
        match mem.rows.get_mut(&id) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(FixtureError::MissingRow {
                table: table.to_string(),
                id,
            }),
        }
    }

    fn delete(&mut self, table: &str, id: RecordId) -> Result<bool> {
        Ok(self.table_mut(table)?.rows.remove(&id).is_some())
    }

    fn fetch(&self, table: &str, id: RecordId) -> Result<Option<Attributes>> {
        Ok(self.table(table)?.rows.get(&id).cloned())
    }

    fn count(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.rows.len())
    }

    fn truncate(&mut self, tables: &[&str]) -> Result<()> {
        // Validate everything before touching anything.
        for table in tables {
            self.table(table)?;
        }
        for table in tables {
            let mem = self.table_mut(table)?;
            mem.rows.clear();
            mem.next_id = mem.floor;
        }
        Ok(())
    }

    fn reserved_tables(&self) -> Vec<String> {
        self.reserved.clone()
    }

    fn advance_sequence(&mut self, table: &str, past: RecordId) -> Result<()> {
        let mem = self.table_mut(table)?;
        if !past.in_range() {
            return Err(FixtureError::IdOutOfRange {
                table: table.to_string(),
                id: past,
            });
        }
        // Past the last id the sequence is spent; only explicit ids remain.
        let floor = past.checked_next().unwrap_or(RecordId::new(u64::MAX));
        if floor > mem.floor {
            mem.floor = floor;
        }
        if mem.next_id < mem.floor {
            mem.next_id = mem.floor;
        }
        Ok(())
    }
}
