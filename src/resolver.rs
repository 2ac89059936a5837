//! # Fixture resolver
//!
//! Turns `(table, name)` into a record, building it at most once per test.
//!
//! 1. A cache hit returns the cached handle; nothing runs.
//! 2. The first miss on a table runs all of that table's preload blocks, in
//!    registration order, into a per-test map of deferred builders. Blocks
//!    never run twice in one test, even when a builder re-enters the table.
//! 3. The builder runs with a [`BuildContext`] bound to the fixture's id from
//!    the identifier table. Builders may resolve other fixtures; a fixture that
//!    is already on the resolution stack is a circular reference.
//! 4. The record is tagged with its fixture name, cached, and returned. A
//!    failing builder leaves nothing in the cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FixtureKey;
use crate::declare::{run_blocks, Builder};
use crate::errors::{FixtureError, Result};
use crate::factory::FactoryEngine;
use crate::record::{FixtureRecord, RecordId};
use crate::registry::settle_duplicates;
use crate::session::FixtureSession;
use crate::storage::Storage;
use crate::value::{Attributes, Value};

#[derive(Clone)]
pub(crate) struct PreparedFixture {
    id: RecordId,
    builder: Builder,
}

/// Resolver bookkeeping that lives exactly as long as one test.
#[derive(Default)]
pub(crate) struct ScopeState {
    prepared: HashMap<String, HashMap<String, PreparedFixture>>,
    stack: Vec<FixtureKey>,
    materialized: usize,
}

impl ScopeState {
    pub(crate) fn reset(&mut self) {
        self.prepared.clear();
        self.stack.clear();
        self.materialized = 0;
    }

    pub(crate) fn is_prepared(&self, table: &str) -> bool {
        self.prepared.contains_key(table)
    }

    pub(crate) fn materialized(&self) -> usize {
        self.materialized
    }
}

impl FixtureSession {
    /// Returns the record for `(table, name)`, building it on first use in
    /// this test.
    ///
    /// # Errors
    /// - `NotFound` when no block of `table` declares `name`
    /// - `CircularReference` when builders reference each other in a loop
    /// - whatever the builder or the factory engine returned, unchanged
    pub fn resolve(&mut self, table: &str, name: &str) -> Result<FixtureRecord> {
        if let Some(record) = self.cache.get(table, name) {
            tracing::trace!(table, fixture = name, "fixture cache hit");
            return Ok(record);
        }

        let key = FixtureKey::new(table, name);
        if self.scope.stack.contains(&key) {
            let chain = self
                .scope
                .stack
                .iter()
                .chain(std::iter::once(&key))
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(FixtureError::CircularReference { chain });
        }

        self.prepare_table(table)?;
        let fixture = self
            .scope
            .prepared
            .get(table)
            .and_then(|fixtures| fixtures.get(name))
            .cloned()
            .ok_or_else(|| FixtureError::not_found(table, name))?;

        tracing::debug!(table, fixture = name, id = %fixture.id, "resolving fixture");
        self.scope.stack.push(key.clone());
        let built = {
            let mut ctx = BuildContext::for_fixture(self, key, fixture.id);
            (fixture.builder)(&mut ctx)
        };
        self.scope.stack.pop();
        let record = built?;

        verify_built(table, name, fixture.id, &record)?;
        record.bind_fixture(name);
        self.cache.put(table, name, record.clone());
        self.scope.materialized += 1;
        tracing::debug!(table, fixture = name, id = %fixture.id, "materialized fixture");
        Ok(record)
    }

    fn prepare_table(&mut self, table: &str) -> Result<()> {
        if self.scope.is_prepared(table) {
            return Ok(());
        }
        let catalog = Arc::clone(&self.catalog);
        let declared = settle_duplicates(
            table,
            run_blocks(table, catalog.blocks(table)),
            catalog.config().duplicates,
        )?;
        let mut fixtures = HashMap::with_capacity(declared.len());
        for declaration in declared {
            let id = catalog
                .id_for(table, &declaration.name)
                .map_err(|_| FixtureError::DeclarationDrift {
                    table: table.to_string(),
                    name: declaration.name.clone(),
                })?;
            fixtures.insert(
                declaration.name,
                PreparedFixture {
                    id,
                    builder: declaration.builder,
                },
            );
        }
        tracing::trace!(table, fixtures = fixtures.len(), "ran preload blocks");
        self.scope.prepared.insert(table.to_string(), fixtures);
        Ok(())
    }
}

fn verify_built(table: &str, name: &str, id: RecordId, record: &FixtureRecord) -> Result<()> {
    let mismatch = |detail: String| FixtureError::BuilderMismatch {
        table: table.to_string(),
        name: name.to_string(),
        detail,
    };
    if record.table() != table {
        return Err(mismatch(format!("record belongs to \"{}\"", record.table())));
    }
    match record.id() {
        Some(actual) if actual == id => Ok(()),
        Some(actual) => Err(mismatch(format!("expected id {}, got {}", id, actual))),
        None => Err(mismatch("record was never persisted".to_string())),
    }
}

struct Target {
    key: FixtureKey,
    id: RecordId,
    claimed: bool,
}

/// What a fixture builder or a factory default sees while it runs.
///
/// Inside a fixture builder the first `create` of a record in the fixture's
/// own table is stored under the fixture's id; every other record gets an id
/// from the storage sequence.
pub struct BuildContext<'s> {
    session: &'s mut FixtureSession,
    target: Option<Target>,
}

impl<'s> BuildContext<'s> {
    fn for_fixture(session: &'s mut FixtureSession, key: FixtureKey, id: RecordId) -> Self {
        Self {
            session,
            target: Some(Target {
                key,
                id,
                claimed: false,
            }),
        }
    }

    pub(crate) fn detached(session: &'s mut FixtureSession) -> Self {
        Self {
            session,
            target: None,
        }
    }

    /// Table of the fixture being built.
    pub fn table(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.key.table.as_str())
    }

    /// Name of the fixture being built.
    pub fn name(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.key.name.as_str())
    }

    /// Id reserved for the fixture being built.
    pub fn id(&self) -> Option<RecordId> {
        self.target.as_ref().map(|t| t.id)
    }

    /// Resolves another fixture through the same test's cache.
    pub fn fixture(&mut self, table: &str, name: &str) -> Result<FixtureRecord> {
        self.session.resolve(table, name)
    }

    /// Id of any fixture, without building it.
    pub fn id_for(&self, table: &str, name: &str) -> Result<RecordId> {
        self.session.catalog.id_for(table, name)
    }

    /// Next value of a factory sequence.
    pub fn generate(&mut self, sequence: &str) -> Result<Value> {
        let engine = Arc::clone(&self.session.factories);
        engine.generate(sequence)
    }

    /// Builds a record through the factory engine and stores it.
    pub fn create(&mut self, factory: &str, overrides: Attributes) -> Result<FixtureRecord> {
        let engine: Arc<dyn FactoryEngine> = Arc::clone(&self.session.factories);
        let table = engine.table_for(factory)?;
        // Claimed before the defaults run, so a same-table record created by a
        // default can't take the fixture's id.
        let id = match self.target.as_mut() {
            Some(target) if !target.claimed && target.key.table == table => {
                target.claimed = true;
                Some(target.id)
            }
            _ => None,
        };
        let attributes = engine.attributes(factory, overrides, self)?;
        let row: Attributes = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_stored()))
            .collect();
        let id = self.session.storage.insert(&table, id, row)?;
        tracing::trace!(factory, table = %table, id = %id, "created record");
        Ok(FixtureRecord::persisted(table, id, attributes))
    }

    /// Builds a record through the factory engine without storing it.
    pub fn build(&mut self, factory: &str, overrides: Attributes) -> Result<FixtureRecord> {
        let engine: Arc<dyn FactoryEngine> = Arc::clone(&self.session.factories);
        let table = engine.table_for(factory)?;
        let attributes = engine.attributes(factory, overrides, self)?;
        Ok(FixtureRecord::new(table, attributes))
    }

    pub fn storage(&self) -> &dyn Storage {
        self.session.storage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::config::Config;
    use crate::factory::Factories;
    use crate::registry::PreloadRegistry;
    use crate::storage::MemoryStorage;

    fn session(registry: PreloadRegistry) -> FixtureSession {
        let mut factories = Factories::new();
        factories
            .define("user", "users", |f| {
                f.value("name", "John Doe");
            })
            .define("skill", "skills", |_| {});
        FixtureSession::new(
            Arc::new(registry.seal(Config::default()).unwrap()),
            Arc::new(factories),
            Box::new(MemoryStorage::with_tables(["users", "skills"])),
        )
        .unwrap()
    }

    #[test]
    fn blocks_run_once_per_scope() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static RUNS: AtomicUsize = AtomicUsize::new(0);

        let mut registry = PreloadRegistry::new();
        registry.register("users", |d| {
            RUNS.fetch_add(1, Ordering::SeqCst);
            d.define_auto("john", |ctx| ctx.create("user", attrs! {}))
                .define_auto("mary", |ctx| ctx.create("user", attrs! {}));
        });
        let mut s = session(registry);
        // sealing ran the block once
        let after_seal = RUNS.load(Ordering::SeqCst);
        s.resolve("users", "john").unwrap();
        s.resolve("users", "mary").unwrap();
        s.resolve("users", "john").unwrap();
        assert_eq!(RUNS.load(Ordering::SeqCst), after_seal + 1);
        assert_eq!(s.scope.materialized(), 2);

        s.clean().unwrap();
        s.resolve("users", "john").unwrap();
        assert_eq!(RUNS.load(Ordering::SeqCst), after_seal + 2);
    }

    #[test]
    fn circular_references_fail_without_caching() {
        let mut registry = PreloadRegistry::new();
        registry.register("users", |d| {
            d.define_auto("a", |ctx| {
                let b = ctx.fixture("users", "b")?;
                ctx.create("user", attrs! { "friend" => b })
            })
            .define_auto("b", |ctx| {
                let a = ctx.fixture("users", "a")?;
                ctx.create("user", attrs! { "friend" => a })
            });
        });
        let mut s = session(registry);
        let err = s.resolve("users", "a").unwrap_err();
        match err {
            FixtureError::CircularReference { chain } => {
                assert_eq!(chain, "users-a -> users-b -> users-a")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(s.cache.is_empty());
        assert!(s.scope.stack.is_empty());
    }

    #[test]
    fn builder_must_return_its_own_record() {
        let mut registry = PreloadRegistry::new();
        registry
            .register("users", |d| {
                d.define_auto("ghost", |ctx| ctx.build("user", attrs! {}))
                    .define_auto("stray", |ctx| ctx.create("skill", attrs! {}));
            });
        let mut s = session(registry);
        let err = s.resolve("users", "ghost").unwrap_err();
        assert!(err.to_string().contains("never persisted"));
        let err = s.resolve("users", "stray").unwrap_err();
        assert!(err.to_string().contains("belongs to \"skills\""));
        assert!(s.cache.is_empty());
    }

    #[test]
    fn only_the_first_same_table_create_takes_the_fixture_id() {
        let mut registry = PreloadRegistry::new();
        registry.register("users", |d| {
            d.define_with_id("ivan", 10, |ctx| {
                let first = ctx.create("user", attrs! {})?;
                let second = ctx.create("user", attrs! { "name" => "Other" })?;
                assert_ne!(second.id(), ctx.id());
                Ok(first)
            });
        });
        let mut s = session(registry);
        let ivan = s.resolve("users", "ivan").unwrap();
        assert_eq!(ivan.id(), Some(RecordId::new(10)));
        assert_eq!(s.storage().count("users").unwrap(), 2);
    }

    #[test]
    fn context_exposes_the_target() {
        let mut registry = PreloadRegistry::new();
        registry.register("users", |d| {
            d.define_with_id("ivan", 3, |ctx| {
                assert_eq!(ctx.table(), Some("users"));
                assert_eq!(ctx.name(), Some("ivan"));
                assert_eq!(ctx.id(), Some(RecordId::new(3)));
                assert_eq!(ctx.id_for("users", "ivan").unwrap(), RecordId::new(3));
                ctx.create("user", attrs! {})
            });
        });
        let mut s = session(registry);
        s.resolve("users", "ivan").unwrap();
    }

    #[test]
    fn same_table_default_does_not_take_the_fixture_id() {
        let mut registry = PreloadRegistry::new();
        registry.register("categories", |d| {
            d.define_with_id("child", 10, |ctx| ctx.create("child_category", attrs! {}));
        });
        let mut factories = Factories::new();
        factories
            .define("root_category", "categories", |f| {
                f.value("name", "Root");
            })
            .define("child_category", "categories", |f| {
                f.value("name", "Child")
                    .attr("parent", |ctx| ctx.create("root_category", attrs! {}).map(Value::from));
            });
        let mut s = FixtureSession::new(
            Arc::new(registry.seal(Config::default()).unwrap()),
            Arc::new(factories),
            Box::new(MemoryStorage::with_tables(["categories"])),
        )
        .unwrap();

        let child = s.resolve("categories", "child").unwrap();
        assert_eq!(child.id(), Some(RecordId::new(10)));
        let parent = child.get("parent").unwrap();
        let parent = parent.as_record().unwrap();
        assert_eq!(parent.id(), Some(RecordId::new(11)));
        assert_eq!(parent.get("name"), Some(Value::from("Root")));
        assert_eq!(s.storage().count("categories").unwrap(), 2);
    }

    #[test]
    fn names_missing_at_seal_are_drift() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static SEALED: AtomicBool = AtomicBool::new(false);

        let mut registry = PreloadRegistry::new();
        registry.register("users", |d| {
            d.define_auto("john", |ctx| ctx.create("user", attrs! {}));
            if SEALED.load(Ordering::SeqCst) {
                d.define_auto("late", |ctx| ctx.create("user", attrs! {}));
            }
        });
        let catalog = Arc::new(registry.seal(Config::default()).unwrap());
        SEALED.store(true, Ordering::SeqCst);
        let mut factories = Factories::new();
        factories.define("user", "users", |_| {});
        let mut s = FixtureSession::new(
            catalog,
            Arc::new(factories),
            Box::new(MemoryStorage::with_tables(["users"])),
        )
        .unwrap();

        let err = s.resolve("users", "john").unwrap_err();
        assert!(matches!(err, FixtureError::DeclarationDrift { ref name, .. } if name == "late"));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Declaration);
        assert!(s.cache.is_empty());
        assert!(!s.scope.is_prepared("users"));
        assert_eq!(s.storage().count("users").unwrap(), 0);
    }
}
