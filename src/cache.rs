//! Per-test fixture cache.
//!
//! Maps `(table, name)` to the record materialized for it in the current test.
//! [`FixtureCache::clear`] is the only thing that runs at test boundaries; the
//! catalog is not reachable from here at all, so clearing can't touch it.
//!
//! One cache belongs to one session. Records are `Rc`-backed, so the cache is
//! `!Send` and can't be shared between workers by accident.

use std::collections::HashMap;
use std::fmt;

use crate::record::FixtureRecord;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureKey {
    pub table: String,
    pub name: String,
}

impl FixtureKey {
    pub fn new(table: &str, name: &str) -> Self {
        Self {
            table: table.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.table, self.name)
    }
}

#[derive(Debug, Default)]
pub struct FixtureCache {
    entries: HashMap<FixtureKey, FixtureRecord>,
}

impl FixtureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, name: &str) -> Option<FixtureRecord> {
        self.entries.get(&FixtureKey::new(table, name)).cloned()
    }

    pub fn put(&mut self, table: &str, name: &str, record: FixtureRecord) {
        self.entries.insert(FixtureKey::new(table, name), record);
    }

    pub fn contains(&self, table: &str, name: &str) -> bool {
        self.entries.contains_key(&FixtureKey::new(table, name))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached keys, sorted.
    pub fn keys(&self) -> Vec<FixtureKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
