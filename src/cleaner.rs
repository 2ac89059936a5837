//! Cleanup between tests.
//!
//! A clean truncates every managed table in a single storage call and empties
//! the fixture cache. The catalog (registry and identifier table) is never
//! touched, so the next test resolves the same names to the same ids.

use std::ops::{Deref, DerefMut};

use crate::cache::FixtureCache;
use crate::catalog::Catalog;
use crate::errors::Result;
use crate::session::FixtureSession;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleaner {
    tables: Vec<String>,
}

impl Cleaner {
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }

    pub fn for_catalog(catalog: &Catalog, storage_reserved: &[String]) -> Self {
        Self::new(catalog.managed_tables(storage_reserved))
    }

    /// Tables truncated by [`Cleaner::clean`].
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Truncates the managed tables and clears the cache. The cache is
    /// cleared even when truncation fails.
    pub fn clean(&self, storage: &mut dyn Storage, cache: &mut FixtureCache) -> Result<()> {
        let tables: Vec<&str> = self.tables.iter().map(String::as_str).collect();
        let result = storage.truncate(&tables);
        let dropped = cache.len();
        cache.clear();
        match &result {
            Ok(()) => tracing::debug!(tables = tables.len(), dropped, "cleaned fixtures"),
            Err(e) => tracing::warn!(error = %e, "fixture truncation failed"),
        }
        result
    }
}

/// Guard over a session for the length of one test. Dropping it runs
/// [`FixtureSession::clean`], whether the test returned or panicked.
///
/// ```rust
/// # use std::sync::Arc;
/// # use fixture_preload::{attrs, Config, Factories, FixtureSession, MemoryStorage, PreloadRegistry};
/// # let mut registry = PreloadRegistry::new();
/// # registry.register("users", |d| { d.define_auto("john", |ctx| ctx.create("user", attrs! {})); });
/// # let mut factories = Factories::new();
/// # factories.define("user", "users", |_| {});
/// # let catalog = Arc::new(registry.seal(Config::default()).unwrap());
/// # let storage = Box::new(MemoryStorage::with_tables(["users"]));
/// let mut session = FixtureSession::new(catalog, Arc::new(factories), storage).unwrap();
/// {
///     let mut test = session.scope();
///     test.get("users", "john").unwrap();
///     assert_eq!(test.count("users").unwrap(), 1);
/// }
/// assert_eq!(session.count("users").unwrap(), 0);
/// ```
pub struct TestScope<'s> {
    session: &'s mut FixtureSession,
    finished: bool,
}

impl<'s> TestScope<'s> {
    pub(crate) fn new(session: &'s mut FixtureSession) -> Self {
        Self {
            session,
            finished: false,
        }
    }

    /// Cleans now and reports the outcome instead of logging it on drop.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.session.clean()
    }
}

impl Deref for TestScope<'_> {
    type Target = FixtureSession;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl DerefMut for TestScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl Drop for TestScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.session.clean() {
            tracing::error!(error = %e, "fixture clean failed at end of test scope");
        }
    }
}
