//! Fixture error handling.
//!
//! Every failure in the crate is a [`FixtureError`]. Errors are returned to the
//! caller as-is: nothing in the resolver, the cache or the cleaner catches,
//! retries or logs-and-swallows them. The enum derives `miette::Diagnostic`, so
//! a test harness can render any of them with `miette::Report` and get a code
//! and a help line for free.

use miette::Diagnostic;
use thiserror::Error;

use crate::record::RecordId;

/// Coarse classification of a [`FixtureError`], for matching in tests without
/// destructuring every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A `(table, name)` pair, table or factory that was never declared.
    NotFound,
    /// The factory engine failed to materialize a record.
    Build,
    /// A write against a destroyed (frozen) record.
    FrozenMutation,
    /// Inconsistent declarations: duplicates, cycles, drift.
    Declaration,
    /// The storage layer refused an operation.
    Storage,
    /// Invalid configuration or a late registration.
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Build => "Build",
            ErrorKind::FrozenMutation => "FrozenMutation",
            ErrorKind::Declaration => "Declaration",
            ErrorKind::Storage => "Storage",
            ErrorKind::Config => "Config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum FixtureError {
    // === Lookup ===
    /// Accessor or resolver called with a pair that no preload block declares.
    #[error("Couldn't find :{name} fixture for \"{table}\" table")]
    #[diagnostic(
        code(fixture::not_found),
        help("declare it with `define_auto` or `define_with_id` in a preload block for this table")
    )]
    NotFound { table: String, name: String },

    /// No preload block was registered for the table.
    #[error("no fixtures are registered for table \"{table}\"")]
    #[diagnostic(code(fixture::unknown_table))]
    UnknownTable { table: String },

    /// The table name is reserved by the storage layer; no accessor exists for it.
    #[error("table \"{table}\" is reserved by the storage layer")]
    #[diagnostic(
        code(fixture::reserved_table),
        help("reserved tables never get accessors and are never truncated")
    )]
    ReservedTable { table: String },

    // === Factory ===
    /// The factory engine rejected the attributes it was given.
    #[error("factory `{factory}` failed: {message}")]
    #[diagnostic(code(fixture::build))]
    Build { factory: String, message: String },

    #[error("no factory named `{factory}`")]
    #[diagnostic(code(fixture::unknown_factory))]
    UnknownFactory { factory: String },

    #[error("no sequence named `{sequence}`")]
    #[diagnostic(code(fixture::unknown_sequence))]
    UnknownSequence { sequence: String },

    // === Record state ===
    #[error("can't modify `{attribute}` on destroyed fixture {table}-{name}")]
    #[diagnostic(
        code(fixture::frozen),
        help("the record was destroyed earlier in this test; its attributes are read-only until the next clean")
    )]
    FrozenMutation {
        table: String,
        name: String,
        attribute: String,
    },

    // === Declarations ===
    #[error("fixture :{name} is declared more than once for \"{table}\"")]
    #[diagnostic(
        code(fixture::duplicate_fixture),
        help("rename one of them, or set `duplicates: overwrite` to let the last declaration win")
    )]
    DuplicateFixture { table: String, name: String },

    #[error("id {id} is claimed by more than one fixture in \"{table}\"")]
    #[diagnostic(code(fixture::duplicate_id))]
    DuplicateId { table: String, id: RecordId },

    #[error("id {id} in \"{table}\" is out of range")]
    #[diagnostic(
        code(fixture::id_out_of_range),
        help("record ids must be between 1 and 9223372036854775807")
    )]
    IdOutOfRange { table: String, id: RecordId },

    #[error("circular fixture reference: {chain}")]
    #[diagnostic(
        code(fixture::circular_reference),
        help("one of these builders has to stop referencing the other")
    )]
    CircularReference { chain: String },

    #[error("fixture :{name} for \"{table}\" was not declared when the catalog was sealed")]
    #[diagnostic(
        code(fixture::declaration_drift),
        help("preload blocks must declare the same fixtures every time they run")
    )]
    DeclarationDrift { table: String, name: String },

    #[error("builder for {table}-{name} returned the wrong record: {detail}")]
    #[diagnostic(
        code(fixture::builder_mismatch),
        help("a fixture builder must return the record created with its own id, via `ctx.create`")
    )]
    BuilderMismatch {
        table: String,
        name: String,
        detail: String,
    },

    #[error("can't register preload block for \"{table}\": the catalog is already sealed")]
    #[diagnostic(
        code(fixture::registry_sealed),
        help("register every preload block before the first test runs")
    )]
    RegistrySealed { table: String },

    // === Storage ===
    #[error("storage has no table \"{table}\"")]
    #[diagnostic(code(fixture::storage::no_such_table))]
    NoSuchTable { table: String },

    #[error("duplicate key {id} in \"{table}\"")]
    #[diagnostic(code(fixture::storage::duplicate_key))]
    DuplicateKey { table: String, id: RecordId },

    #[error("no row {id} in \"{table}\"")]
    #[diagnostic(code(fixture::storage::missing_row))]
    MissingRow { table: String, id: RecordId },

    #[error("\"{table}\" has no ids left to assign")]
    #[diagnostic(code(fixture::storage::ids_exhausted))]
    IdsExhausted { table: String },

    // === Configuration ===
    #[error("invalid fixture configuration: {message}")]
    #[diagnostic(code(fixture::config))]
    Config { message: String },
}

impl FixtureError {
    /// Returns the coarse classification for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FixtureError::NotFound { .. }
            | FixtureError::UnknownTable { .. }
            | FixtureError::ReservedTable { .. }
            | FixtureError::UnknownFactory { .. }
            | FixtureError::UnknownSequence { .. } => ErrorKind::NotFound,
            FixtureError::Build { .. } => ErrorKind::Build,
            FixtureError::FrozenMutation { .. } => ErrorKind::FrozenMutation,
            FixtureError::DuplicateFixture { .. }
            | FixtureError::DuplicateId { .. }
            | FixtureError::IdOutOfRange { .. }
            | FixtureError::CircularReference { .. }
            | FixtureError::DeclarationDrift { .. }
            | FixtureError::BuilderMismatch { .. } => ErrorKind::Declaration,
            FixtureError::NoSuchTable { .. }
            | FixtureError::DuplicateKey { .. }
            | FixtureError::MissingRow { .. }
            | FixtureError::IdsExhausted { .. } => ErrorKind::Storage,
            FixtureError::RegistrySealed { .. } | FixtureError::Config { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn not_found(table: &str, name: &str) -> Self {
        FixtureError::NotFound {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn build(factory: &str, message: impl Into<String>) -> Self {
        FixtureError::Build {
            factory: factory.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl std::fmt::Display) -> Self {
        FixtureError::Config {
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = FixtureError> = std::result::Result<T, E>;
