//! # Preload registry
//!
//! Stores, per table, the ordered preload blocks that declare that table's
//! fixtures. Registration is append-only; there is no removal.
//!
//! ## Usage Workflow
//! ```rust
//! use fixture_preload::{attrs, Config, PreloadRegistry};
//! // 1. Register blocks during the declaration phase
//! let mut registry = PreloadRegistry::new();
//! registry.register("users", |d| {
//!     d.define_with_id("ivan", 1, |ctx| ctx.create("user", attrs! {}));
//! });
//! // 2. Seal once, before the first test
//! let catalog = registry.seal(Config::default()).expect("declarations are consistent");
//! // 3. The catalog is read-only from here on
//! assert_eq!(catalog.id_for("users", "ivan").unwrap().get(), 1);
//! ```
//!
//! ## Registry Invariant
//! The registry is built once at process start and sealed into a
//! [`Catalog`](crate::Catalog), which is passed by reference (or `Arc`) to
//! every session. Sessions never write to it.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::{Config, DuplicatePolicy};
use crate::declare::{run_blocks, Declarations, FixtureDeclaration, IdSpec, PreloadBlock};
use crate::errors::{FixtureError, Result};
use crate::identifiers::IdentifierTable;

#[derive(Clone, Default)]
pub struct PreloadRegistry {
    /// First-registration order of tables.
    tables: Vec<(String, Vec<PreloadBlock>)>,
}

impl PreloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block to the table's list. Blocks of one table run in the
    /// order they were registered.
    pub fn register<F>(&mut self, table: &str, block: F) -> &mut Self
    where
        F: Fn(&mut Declarations) + Send + Sync + 'static,
    {
        self.register_block(table, Arc::new(block))
    }

    /// Appends an already shared block; lets callers keep a handle for
    /// identity checks against [`PreloadRegistry::preloaders`].
    pub fn register_block(&mut self, table: &str, block: PreloadBlock) -> &mut Self {
        match self.tables.iter_mut().find(|(name, _)| name == table) {
            Some((_, blocks)) => blocks.push(block),
            None => self.tables.push((table.to_string(), vec![block])),
        }
        tracing::debug!(table, "registered preload block");
        self
    }

    /// The full table-to-blocks mapping.
    pub fn tables(&self) -> &[(String, Vec<PreloadBlock>)] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.blocks(table).is_some()
    }

    pub fn blocks(&self, table: &str) -> Option<&[PreloadBlock]> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, blocks)| blocks.as_slice())
    }

    /// Every block of every table, tables in registration order.
    pub fn preloaders(&self) -> Vec<PreloadBlock> {
        self.tables
            .iter()
            .flat_map(|(_, blocks)| blocks.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Evaluates every block once, settles duplicates, assigns ids, and
    /// freezes the result into a [`Catalog`].
    ///
    /// # Errors
    /// - `DuplicateFixture` when a name repeats and the policy is `Reject`
    /// - `DuplicateId` when two fixtures of a table claim the same explicit id
    /// - `Config` for an invalid configuration
    pub fn seal(self, config: Config) -> Result<Catalog> {
        let config = config.validate()?;
        let mut identifiers = IdentifierTable::default();
        for (table, blocks) in &self.tables {
            let declared = settle_duplicates(table, run_blocks(table, blocks), config.duplicates)?;
            let specs: Vec<(String, IdSpec)> = declared
                .iter()
                .map(|d| (d.name.clone(), d.id))
                .collect();
            identifiers.assign(table, &specs, config.auto_ids)?;
        }
        tracing::info!(tables = self.tables.len(), "sealed fixture catalog");
        Ok(Catalog::new(self, identifiers, config))
    }
}

impl std::fmt::Debug for PreloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.tables.iter().map(|(name, blocks)| (name, blocks.len())))
            .finish()
    }
}

/// Applies the duplicate policy. With `Overwrite` the later declaration
/// replaces the earlier one and takes its place in declaration order.
pub(crate) fn settle_duplicates(
    table: &str,
    declared: Vec<FixtureDeclaration>,
    policy: DuplicatePolicy,
) -> Result<Vec<FixtureDeclaration>> {
    let mut settled: Vec<FixtureDeclaration> = Vec::with_capacity(declared.len());
    for declaration in declared {
        if let Some(pos) = settled.iter().position(|d| d.name == declaration.name) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(FixtureError::DuplicateFixture {
                        table: table.to_string(),
                        name: declaration.name,
                    })
                }
                DuplicatePolicy::Overwrite => {
                    tracing::debug!(table, fixture = %declaration.name, "overwriting fixture declaration");
                    settled.remove(pos);
                }
            }
        }
        settled.push(declaration);
    }
    Ok(settled)
}
