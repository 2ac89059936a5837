//! Materialized fixture records.
//!
//! A [`FixtureRecord`] is a cheap, clonable handle. Clones share one
//! allocation, and equality between handles is pointer identity: the resolver
//! guarantees that a `(table, name)` pair hands out the same allocation for the
//! whole test, so `==` answers "is this the same fixture" directly.
//!
//! Destroying a record flips its state tag to [`RecordState::Frozen`]. The
//! handle stays valid and readable; every write path checks the tag.

use serde::{Deserialize, Serialize, Serializer};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::errors::{FixtureError, Result};
use crate::value::{Attributes, RecordRef, Value};

/// Stable key of a row within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    /// Largest id a record can hold; ids must fit a signed 64-bit column.
    pub const MAX: RecordId = RecordId(i64::MAX as u64);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn in_range(self) -> bool {
        self <= Self::MAX
    }

    /// The following id, `None` past [`RecordId::MAX`].
    pub fn checked_next(self) -> Option<Self> {
        if self < Self::MAX {
            Some(Self(self.0 + 1))
        } else {
            None
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl TryFrom<RecordId> for Value {
    type Error = std::num::TryFromIntError;

    fn try_from(id: RecordId) -> std::result::Result<Self, Self::Error> {
        i64::try_from(id.0).map(Value::Int)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Active,
    /// Destroyed in storage; readable, not writable.
    Frozen,
}

struct RecordInner {
    table: String,
    fixture: RefCell<Option<String>>,
    id: Cell<Option<RecordId>>,
    attributes: RefCell<Attributes>,
    state: Cell<RecordState>,
}

#[derive(Clone)]
pub struct FixtureRecord(Rc<RecordInner>);

impl FixtureRecord {
    /// A record that has not been written to storage.
    pub fn new(table: impl Into<String>, attributes: Attributes) -> Self {
        Self(Rc::new(RecordInner {
            table: table.into(),
            fixture: RefCell::new(None),
            id: Cell::new(None),
            attributes: RefCell::new(attributes),
            state: Cell::new(RecordState::Active),
        }))
    }

    pub(crate) fn persisted(table: impl Into<String>, id: RecordId, attributes: Attributes) -> Self {
        let record = Self::new(table, attributes);
        record.0.id.set(Some(id));
        record
    }

    pub fn table(&self) -> &str {
        &self.0.table
    }

    /// The fixture name this record was resolved under, if any. Records built
    /// ad hoc through a factory have none.
    pub fn fixture_name(&self) -> Option<String> {
        self.0.fixture.borrow().clone()
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.id.get()
    }

    pub fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    pub fn state(&self) -> RecordState {
        self.0.state.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.state() == RecordState::Frozen
    }

    pub fn record_ref(&self) -> Option<RecordRef> {
        self.id().map(|id| RecordRef {
            table: self.table().to_string(),
            id,
        })
    }

    /// Reference equality.
    pub fn same_as(&self, other: &FixtureRecord) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Fixture name when there is one, `#id` otherwise.
    pub fn label(&self) -> String {
        match (self.fixture_name(), self.id()) {
            (Some(name), _) => name,
            (None, Some(id)) => format!("#{}", id),
            (None, None) => "(new)".to_string(),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.0.attributes.borrow().get(attribute).cloned()
    }

    /// Snapshot of all attributes.
    pub fn attributes(&self) -> Attributes {
        self.0.attributes.borrow().clone()
    }

    pub fn set(&self, attribute: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_writable(attribute)?;
        self.0
            .attributes
            .borrow_mut()
            .insert(attribute.to_string(), value.into());
        Ok(())
    }

    /// Adds one to an integer attribute; a missing or nil attribute counts as zero.
    pub fn increment(&self, attribute: &str) -> Result<i64> {
        self.ensure_writable(attribute)?;
        let current = match self.get(attribute) {
            None | Some(Value::Nil) => 0,
            Some(Value::Int(n)) => n,
            Some(other) => {
                return Err(FixtureError::build(
                    self.table(),
                    format!("can't increment `{}` holding {}", attribute, other.type_name()),
                ))
            }
        };
        let next = current + 1;
        self.0
            .attributes
            .borrow_mut()
            .insert(attribute.to_string(), Value::Int(next));
        Ok(next)
    }

    /// Row form of the attributes, with live associations detached.
    pub fn to_row(&self) -> Attributes {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_stored()))
            .collect()
    }

    /// JSON dump of the record, associations written as foreign keys.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "table": self.table(),
            "fixture": self.fixture_name(),
            "id": self.id(),
            "state": self.state(),
            "attributes": self.to_row(),
        })
    }

    fn ensure_writable(&self, attribute: &str) -> Result<()> {
        if self.is_frozen() {
            return Err(FixtureError::FrozenMutation {
                table: self.table().to_string(),
                name: self.label(),
                attribute: attribute.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn bind_fixture(&self, name: &str) {
        *self.0.fixture.borrow_mut() = Some(name.to_string());
    }

    pub(crate) fn assign_id(&self, id: RecordId) {
        self.0.id.set(Some(id));
    }

    pub(crate) fn freeze(&self) {
        self.0.state.set(RecordState::Frozen);
    }

    /// Replaces attributes from a stored row, keeping live associations whose
    /// foreign key did not change.
    pub(crate) fn refresh_from_row(&self, row: &Attributes) {
        let mut attributes = self.0.attributes.borrow_mut();
        let mut refreshed = Attributes::new();
        for (key, stored) in row.iter() {
            let value = match (attributes.get(key), stored) {
                (Some(live @ Value::Record(r)), Value::Ref(key_ref))
                    if r.record_ref().as_ref() == Some(key_ref) =>
                {
                    live.clone()
                }
                _ => stored.clone(),
            };
            refreshed.insert(key.clone(), value);
        }
        *attributes = refreshed;
    }
}

impl PartialEq for FixtureRecord {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for FixtureRecord {
    // Attributes may hold associations back to this record, so only the
    // identity is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureRecord")
            .field("table", &self.table())
            .field("fixture", &self.fixture_name())
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for FixtureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table(), self.label())
    }
}

impl Serialize for FixtureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.record_ref().serialize(serializer)
    }
}
