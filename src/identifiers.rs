//! Record identifier table.
//!
//! Answers "what id will fixture X in table T have" without building
//! anything, which is what lets one fixture store another's foreign key before
//! either exists. Every id is decided when the catalog is sealed and the table
//! is immutable from then on.

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};

use crate::config::AutoIds;
use crate::declare::IdSpec;
use crate::errors::{FixtureError, Result};
use crate::record::RecordId;

#[derive(Debug, Clone, Default)]
struct TableIds {
    /// Declaration order.
    ordered: Vec<(String, RecordId)>,
    by_name: HashMap<String, RecordId>,
}

#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    tables: HashMap<String, TableIds>,
}

impl IdentifierTable {
    /// Assigns ids for one table. `declared` must already be free of duplicate names.
    pub(crate) fn assign(
        &mut self,
        table: &str,
        declared: &[(String, IdSpec)],
        strategy: AutoIds,
    ) -> Result<()> {
        let mut taken = BTreeSet::new();
        for (_, spec) in declared {
            if let IdSpec::Explicit(id) = spec {
                if !id.in_range() {
                    return Err(FixtureError::IdOutOfRange {
                        table: table.to_string(),
                        id: *id,
                    });
                }
                if !taken.insert(*id) {
                    return Err(FixtureError::DuplicateId {
                        table: table.to_string(),
                        id: *id,
                    });
                }
            }
        }

        let mut ids = TableIds::default();
        let mut counter = match strategy {
            AutoIds::Sequential { start } => Some(RecordId::new(start)).filter(|id| id.in_range()),
            AutoIds::Hashed { .. } => None,
        };
        for (name, spec) in declared {
            let id = match (spec, strategy) {
                (IdSpec::Explicit(id), _) => *id,
                (IdSpec::Auto, AutoIds::Sequential { .. }) => {
                    let id = next_free(&mut counter, &taken).ok_or_else(|| {
                        FixtureError::IdsExhausted {
                            table: table.to_string(),
                        }
                    })?;
                    taken.insert(id);
                    id
                }
                (IdSpec::Auto, AutoIds::Hashed { ceiling }) => {
                    let id = probe(hashed_id(name, ceiling), ceiling, &taken).ok_or_else(|| {
                        FixtureError::config(format!(
                            "table \"{}\" has more fixtures than the hashed id range holds",
                            table
                        ))
                    })?;
                    taken.insert(id);
                    id
                }
            };
            tracing::trace!(table, fixture = %name, id = %id, "assigned fixture id");
            ids.ordered.push((name.clone(), id));
            ids.by_name.insert(name.clone(), id);
        }
        self.tables.insert(table.to_string(), ids);
        Ok(())
    }

    /// The id fixture `name` of `table` has, whether or not it was built yet.
    pub fn id_for(&self, table: &str, name: &str) -> Result<RecordId> {
        self.tables
            .get(table)
            .and_then(|ids| ids.by_name.get(name))
            .copied()
            .ok_or_else(|| FixtureError::not_found(table, name))
    }

    pub fn contains(&self, table: &str, name: &str) -> bool {
        self.id_for(table, name).is_ok()
    }

    /// `(name, id)` pairs of a table in declaration order.
    pub fn ids_for_table(&self, table: &str) -> Vec<(String, RecordId)> {
        self.tables
            .get(table)
            .map(|ids| ids.ordered.clone())
            .unwrap_or_default()
    }

    /// Highest id any fixture of the table will claim.
    pub fn max_id(&self, table: &str) -> Option<RecordId> {
        self.tables
            .get(table)
            .and_then(|ids| ids.ordered.iter().map(|(_, id)| *id).max())
    }
}

/// Stable hash of a fixture name into `1..=ceiling`.
pub fn hashed_id(name: &str, ceiling: u64) -> RecordId {
    let digest = Sha256::digest(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    RecordId::new(u64::from_be_bytes(prefix) % ceiling + 1)
}

// Lowest free id at or after the counter; `None` once the range runs out.
fn next_free(counter: &mut Option<RecordId>, taken: &BTreeSet<RecordId>) -> Option<RecordId> {
    let mut candidate = (*counter)?;
    while taken.contains(&candidate) {
        candidate = candidate.checked_next()?;
    }
    *counter = candidate.checked_next();
    Some(candidate)
}

// Linear probing inside `1..=ceiling`; `None` when every slot is taken.
fn probe(start: RecordId, ceiling: u64, taken: &BTreeSet<RecordId>) -> Option<RecordId> {
    let mut candidate = start.get();
    for _ in 0..ceiling {
        if !taken.contains(&RecordId::new(candidate)) {
            return Some(RecordId::new(candidate));
        }
        candidate = if candidate >= ceiling { 1 } else { candidate + 1 };
    }
    None
}
