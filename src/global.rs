//! Process-wide registration.
//!
//! For suites that declare fixtures from many places (one module per table,
//! say), blocks can be registered into a process-wide registry and sealed once
//! before the first test. The sealed catalog is then handed to each worker's
//! session like any other `Arc<Catalog>`.
//!
//! Registration after sealing fails with `RegistrySealed`; the catalog never
//! changes once it exists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::{Lazy, OnceCell};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::declare::{Declarations, PreloadBlock};
use crate::errors::{FixtureError, Result};
use crate::registry::PreloadRegistry;

static PENDING: Lazy<Mutex<PreloadRegistry>> = Lazy::new(|| Mutex::new(PreloadRegistry::new()));
static CATALOG: OnceCell<Arc<Catalog>> = OnceCell::new();
// Set while `seal` evaluates blocks; registration is closed from then on.
static SEALING: AtomicBool = AtomicBool::new(false);

// A poisoned lock still holds a consistent registry.
fn pending() -> MutexGuard<'static, PreloadRegistry> {
    PENDING.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Entry point for declaration layers: appends a block for `table`.
pub fn register_preload<F>(table: &str, block: F) -> Result<()>
where
    F: Fn(&mut Declarations) + Send + Sync + 'static,
{
    register_preload_block(table, Arc::new(block))
}

pub fn register_preload_block(table: &str, block: PreloadBlock) -> Result<()> {
    let mut registry = pending();
    if CATALOG.get().is_some() || SEALING.load(Ordering::SeqCst) {
        return Err(FixtureError::RegistrySealed {
            table: table.to_string(),
        });
    }
    registry.register_block(table, block);
    Ok(())
}

/// Seals the process-wide registry. The first successful call wins; later
/// calls return the same catalog and ignore their `config`.
///
/// Blocks run without the registration lock held, so a block that tries to
/// register another one gets `RegistrySealed`. A failed seal reopens
/// registration.
pub fn seal(config: Config) -> Result<Arc<Catalog>> {
    if let Some(catalog) = CATALOG.get() {
        return Ok(Arc::clone(catalog));
    }
    let registry = {
        let guard = pending();
        SEALING.store(true, Ordering::SeqCst);
        guard.clone()
    };
    let sealed = CATALOG
        .get_or_try_init(|| registry.seal(config).map(Arc::new))
        .map(Arc::clone);
    if sealed.is_err() {
        SEALING.store(false, Ordering::SeqCst);
    }
    sealed
}

/// The sealed catalog, if [`seal`] has succeeded.
pub fn catalog() -> Option<Arc<Catalog>> {
    CATALOG.get().cloned()
}

pub fn is_sealed() -> bool {
    CATALOG.get().is_some()
}

/// Every registered block, for checking that registration happened.
pub fn all_preloaders() -> Vec<PreloadBlock> {
    match CATALOG.get() {
        Some(catalog) => catalog.registry().preloaders(),
        None => pending().preloaders(),
    }
}

/// Tables with at least one registered block.
pub fn registry_tables() -> Vec<String> {
    match CATALOG.get() {
        Some(catalog) => catalog.table_names(),
        None => pending().table_names(),
    }
}
