//! # fixture-preload
//!
//! Named, lazily built, per-test fixture records for storage-backed test
//! suites. Fixtures are declared once, sealed into a read-only [`Catalog`],
//! and resolved on demand by a [`FixtureSession`] that memoizes them for one
//! test and truncates storage afterwards.

pub use crate::accessor::{Accessor, Accessors};
pub use crate::cache::{FixtureCache, FixtureKey};
pub use crate::catalog::Catalog;
pub use crate::cleaner::{Cleaner, TestScope};
pub use crate::config::{AutoIds, Config, DuplicatePolicy};
pub use crate::declare::{Builder, Declarations, FixtureDeclaration, IdSpec, PreloadBlock};
pub use crate::errors::{ErrorKind, FixtureError};
pub use crate::factory::{FactoryDefinition, FactoryEngine, Factories};
pub use crate::identifiers::IdentifierTable;
pub use crate::record::{FixtureRecord, RecordId, RecordState};
pub use crate::registry::PreloadRegistry;
pub use crate::resolver::BuildContext;
pub use crate::session::FixtureSession;
pub use crate::storage::{MemoryStorage, Storage};
pub use crate::value::{Attributes, RecordRef, Value};

pub mod accessor;
pub mod cache;
pub mod catalog;
pub mod cleaner;
pub mod config;
pub mod declare;
pub mod errors;
pub mod factory;
pub mod global;
pub mod identifiers;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod value;

pub mod prelude {
    pub use crate::attrs;
    pub use crate::{
        BuildContext, Config, Declarations, Factories, FixtureError, FixtureRecord,
        FixtureSession, MemoryStorage, PreloadRegistry, RecordId, Storage, Value,
    };
}
