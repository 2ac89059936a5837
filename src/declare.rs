//! The declaration context handed to preload blocks.
//!
//! A preload block receives a [`Declarations`] and may call exactly two things
//! on it: [`Declarations::define_with_id`] and [`Declarations::define_auto`].
//! Neither runs the builder; they only record what the fixture is called,
//! how its id is chosen, and how to build it later.

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::record::{FixtureRecord, RecordId};
use crate::resolver::BuildContext;

/// Materializes one fixture. Called at most once per fixture per test.
pub type Builder = Arc<dyn Fn(&mut BuildContext<'_>) -> Result<FixtureRecord> + Send + Sync>;

/// A unit of declarations for one table.
pub type PreloadBlock = Arc<dyn Fn(&mut Declarations) + Send + Sync>;

/// How a fixture gets its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSpec {
    Explicit(RecordId),
    Auto,
}

#[derive(Clone)]
pub struct FixtureDeclaration {
    pub name: String,
    pub id: IdSpec,
    pub builder: Builder,
}

impl fmt::Debug for FixtureDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureDeclaration")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Collects the fixtures a table's preload blocks declare, in declaration order.
#[derive(Debug)]
pub struct Declarations {
    table: String,
    declared: Vec<FixtureDeclaration>,
}

impl Declarations {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            declared: Vec::new(),
        }
    }

    /// The table these declarations belong to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declares a fixture whose id is fixed for every test run.
    pub fn define_with_id<F>(&mut self, name: &str, id: u64, builder: F) -> &mut Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<FixtureRecord> + Send + Sync + 'static,
    {
        self.push(name, IdSpec::Explicit(RecordId::new(id)), Arc::new(builder))
    }

    /// Declares a fixture whose id is assigned by the identifier table.
    pub fn define_auto<F>(&mut self, name: &str, builder: F) -> &mut Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<FixtureRecord> + Send + Sync + 'static,
    {
        self.push(name, IdSpec::Auto, Arc::new(builder))
    }

    fn push(&mut self, name: &str, id: IdSpec, builder: Builder) -> &mut Self {
        self.declared.push(FixtureDeclaration {
            name: name.to_string(),
            id,
            builder,
        });
        self
    }

    pub(crate) fn into_declared(self) -> Vec<FixtureDeclaration> {
        self.declared
    }
}

/// Runs every block of a table, in order, into one declaration list.
pub(crate) fn run_blocks(table: &str, blocks: &[PreloadBlock]) -> Vec<FixtureDeclaration> {
    let mut declarations = Declarations::new(table);
    for block in blocks {
        block(&mut declarations);
    }
    declarations.into_declared()
}
