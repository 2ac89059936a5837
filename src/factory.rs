//! Factory engine boundary.
//!
//! The resolver never decides what a record's attributes are; it asks a
//! [`FactoryEngine`]. Any engine works as long as it can name the table a
//! factory writes to and produce a full attribute set from overrides.
//!
//! [`Factories`] is the small engine this crate ships: named factories bound
//! to a table, one default closure per attribute, sequences, and required
//! attributes. Default closures get the [`BuildContext`], so a default can be
//! another fixture:
//!
//! ```rust
//! use fixture_preload::{Factories, Value};
//! let mut factories = Factories::new();
//! factories
//!     .sequence("email", |n| Value::from(format!("john{}@doe.com", n)))
//!     .define("user", "users", |f| {
//!         f.value("name", "John Doe")
//!             .attr("email", |ctx| ctx.generate("email"))
//!             .required("email");
//!     })
//!     .define("skill", "skills", |f| {
//!         f.attr("user", |ctx| ctx.fixture("users", "john").map(Value::from));
//!     });
//! assert!(factories.contains("skill"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::{FixtureError, Result};
use crate::resolver::BuildContext;
use crate::value::{Attributes, Value};

/// Produces one attribute's default.
pub type AttributeFn = Arc<dyn Fn(&mut BuildContext<'_>) -> Result<Value> + Send + Sync>;

/// Produces the n-th value of a sequence, `n` starting at 1.
pub type SequenceFn = Arc<dyn Fn(u64) -> Value + Send + Sync>;

/// Attribute key owned by the identifier table, never by a factory.
pub const ID_ATTRIBUTE: &str = "id";

pub trait FactoryEngine: Send + Sync {
    /// Table the factory's records are stored in.
    fn table_for(&self, factory: &str) -> Result<String>;

    /// Full attribute set for a new record: every default not covered by
    /// `overrides`, plus the overrides themselves.
    fn attributes(
        &self,
        factory: &str,
        overrides: Attributes,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Attributes>;

    /// Next value of a named sequence.
    fn generate(&self, sequence: &str) -> Result<Value> {
        Err(FixtureError::UnknownSequence {
            sequence: sequence.to_string(),
        })
    }
}

#[derive(Clone, Default)]
pub struct FactoryDefinition {
    table: String,
    defaults: Vec<(String, AttributeFn)>,
    required: Vec<String>,
}

impl FactoryDefinition {
    /// Adds a computed default.
    pub fn attr<F>(&mut self, name: &str, default: F) -> &mut Self
    where
        F: Fn(&mut BuildContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.defaults.retain(|(existing, _)| existing != name);
        self.defaults.push((name.to_string(), Arc::new(default)));
        self
    }

    /// Adds a constant default. Records can't be constants since they belong
    /// to one test; use [`FactoryDefinition::attr`] with `ctx.fixture` instead.
    pub fn value<T>(&mut self, name: &str, value: T) -> &mut Self
    where
        T: Into<Value> + Clone + Send + Sync + 'static,
    {
        self.attr(name, move |_| Ok(value.clone().into()))
    }

    /// Marks an attribute that must end up non-nil.
    pub fn required(&mut self, name: &str) -> &mut Self {
        self.required.push(name.to_string());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

struct Sequence {
    next: AtomicU64,
    generate: SequenceFn,
}

#[derive(Default)]
pub struct Factories {
    definitions: HashMap<String, FactoryDefinition>,
    sequences: HashMap<String, Sequence>,
}

impl Factories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) a factory writing to `table`.
    pub fn define<F>(&mut self, factory: &str, table: &str, configure: F) -> &mut Self
    where
        F: FnOnce(&mut FactoryDefinition),
    {
        let mut definition = FactoryDefinition {
            table: table.to_string(),
            ..FactoryDefinition::default()
        };
        configure(&mut definition);
        self.definitions.insert(factory.to_string(), definition);
        self
    }

    pub fn sequence<F>(&mut self, name: &str, generate: F) -> &mut Self
    where
        F: Fn(u64) -> Value + Send + Sync + 'static,
    {
        self.sequences.insert(
            name.to_string(),
            Sequence {
                next: AtomicU64::new(1),
                generate: Arc::new(generate),
            },
        );
        self
    }

    pub fn contains(&self, factory: &str) -> bool {
        self.definitions.contains_key(factory)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.definitions.keys().cloned().collect();
        names.sort();
        names
    }

    fn definition(&self, factory: &str) -> Result<&FactoryDefinition> {
        self.definitions
            .get(factory)
            .ok_or_else(|| FixtureError::UnknownFactory {
                factory: factory.to_string(),
            })
    }
}

impl FactoryEngine for Factories {
    fn table_for(&self, factory: &str) -> Result<String> {
        Ok(self.definition(factory)?.table.clone())
    }

    fn attributes(
        &self,
        factory: &str,
        overrides: Attributes,
        ctx: &mut BuildContext<'_>,
    ) -> Result<Attributes> {
        let definition = self.definition(factory)?;
        if overrides.contains_key(ID_ATTRIBUTE) {
            return Err(FixtureError::build(
                factory,
                "`id` is assigned by the fixture declaration, not by attributes",
            ));
        }
        let mut attributes = Attributes::new();
        for (name, default) in &definition.defaults {
            if !overrides.contains_key(name) {
                attributes.insert(name.clone(), default(ctx)?);
            }
        }
        attributes = attributes.union(overrides);
        for name in &definition.required {
            if attributes.get(name).map_or(true, Value::is_nil) {
                return Err(FixtureError::build(
                    factory,
                    format!("{} can't be blank", name),
                ));
            }
        }
        Ok(attributes)
    }

    fn generate(&self, sequence: &str) -> Result<Value> {
        let seq = self
            .sequences
            .get(sequence)
            .ok_or_else(|| FixtureError::UnknownSequence {
                sequence: sequence.to_string(),
            })?;
        let n = seq.next.fetch_add(1, Ordering::Relaxed);
        Ok((seq.generate)(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_count_from_one() {
        let mut factories = Factories::new();
        factories.sequence("email", |n| Value::from(format!("john{}@doe.com", n)));
        assert_eq!(factories.generate("email").unwrap(), Value::from("john1@doe.com"));
        assert_eq!(factories.generate("email").unwrap(), Value::from("john2@doe.com"));
        assert!(matches!(
            factories.generate("phone"),
            Err(FixtureError::UnknownSequence { .. })
        ));
    }

    #[test]
    fn redefining_an_attribute_replaces_it() {
        let mut factories = Factories::new();
        factories.define("user", "users", |f| {
            f.value("name", "a").value("name", "b");
        });
        let definition = factories.definition("user").unwrap();
        assert_eq!(definition.defaults.len(), 1);
        assert_eq!(definition.table(), "users");
        assert_eq!(factories.table_for("user").unwrap(), "users");
        assert!(factories.table_for("admin").is_err());
        assert_eq!(factories.names(), ["user"]);
    }
}
