//! Per-entity mapping contract.
//!
//! # Responsibility
//! - Let each entity type register its column mapping explicitly, once, at
//!   compile time instead of by runtime introspection.
//! - Expose the id state that drives the insert-vs-update decision.
//!
//! # Invariants
//! - `to_row` yields a value for every write column of the entity's
//!   `TableMetadata` (plain columns and foreign key).
//! - `from_row` either builds a complete entity or fails; it never returns a
//!   partially mapped value.

use crate::sql::row::{MapResult, RowView};
use rusqlite::types::{FromSql, Value};
use std::fmt::Debug;

/// Column name to bind value pairs produced by `Entity::to_row`.
pub type ColumnValues = Vec<(&'static str, Value)>;

/// Mapping between one entity type and its table row.
pub trait Entity: Sized {
    /// Primary key type. Bound as a SQL value and read back from rows.
    type Id: Clone + Debug + PartialEq + Into<Value> + FromSql;

    /// Current id, `None` when the entity was never persisted.
    fn id(&self) -> Option<&Self::Id>;

    /// Returns the entity as persisted under `id`.
    fn with_id(self, id: Self::Id) -> Self;

    /// Whether `save` must insert rather than update.
    ///
    /// Generated-key entities keep the default (id absent means new).
    /// Natural-key entities always carry an id and override this.
    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Values for every write column, including the foreign key if any.
    fn to_row(&self) -> ColumnValues;

    /// Builds one entity from a result row.
    fn from_row(row: &RowView<'_>) -> MapResult<Self>;
}
