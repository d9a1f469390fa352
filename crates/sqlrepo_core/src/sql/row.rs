//! Result row value bag and entity mapping views.
//!
//! # Responsibility
//! - Hold one result row as column-name/value pairs, detached from the
//!   statement that produced it.
//! - Scope lookups to either the owning table or the joined association.
//!
//! # Invariants
//! - Column lookup is by exact name; a missing column is a mapping failure.
//! - A NULL foreign key maps to an absent association, never to a
//!   zero-valued entity.

use crate::model::entity::Entity;
use crate::model::metadata::TableMetadata;
use rusqlite::types::{FromSql, Value, ValueRef};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Result type for row mapping.
pub type MapResult<T> = Result<T, MappingError>;

/// Errors raised while turning rows into entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Row lacks an expected column.
    MissingColumn(String),
    /// Column value cannot be converted to the requested type.
    Conversion { column: String, message: String },
    /// Foreign key is set but the joined row is missing.
    DanglingReference { table: String, foreign_key: String },
    /// Association requested on a table that declares none.
    NoAssociation(String),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "result row has no column `{column}`"),
            Self::Conversion { column, message } => {
                write!(f, "cannot convert column `{column}`: {message}")
            }
            Self::DanglingReference { table, foreign_key } => write!(
                f,
                "foreign key `{foreign_key}` of table `{table}` references a missing row"
            ),
            Self::NoAssociation(table) => {
                write!(f, "table `{table}` declares no association")
            }
        }
    }
}

impl Error for MappingError {}

/// One result row: column names shared across the result set, owned values.
#[derive(Debug, Clone, PartialEq)]
pub struct RowData {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl RowData {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value of `column`, `None` when the row has no such column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
    }
}

/// Lookup scope over a row: owning table or its joined association.
pub struct RowView<'r> {
    row: &'r RowData,
    meta: &'r TableMetadata,
    prefix: Option<&'r str>,
}

impl<'r> RowView<'r> {
    /// View over the owning table's columns.
    pub fn new(row: &'r RowData, meta: &'r TableMetadata) -> Self {
        Self {
            row,
            meta,
            prefix: None,
        }
    }

    /// Metadata of the table this view reads.
    pub fn meta(&self) -> &TableMetadata {
        self.meta
    }

    /// Typed value of `column`.
    ///
    /// # Errors
    /// - `MissingColumn` when the row has no such column.
    /// - `Conversion` when the value does not fit `T`.
    pub fn get<T: FromSql>(&self, column: &str) -> MapResult<T> {
        let key = self.key(column);
        let value = self.raw(&key)?;
        T::column_result(ValueRef::from(value)).map_err(|err| MappingError::Conversion {
            column: key,
            message: err.to_string(),
        })
    }

    /// Typed value of the table's id column.
    pub fn id<T: FromSql>(&self) -> MapResult<T> {
        self.get(self.meta.id_column())
    }

    /// Maps the joined association, if the foreign key is set.
    ///
    /// The associated entity is built from its own aliased columns before the
    /// caller builds the outer entity around it.
    pub fn association<A: Entity>(&self) -> MapResult<Option<A>> {
        let association = self
            .meta
            .association()
            .ok_or_else(|| MappingError::NoAssociation(self.meta.table_name().to_string()))?;

        let foreign_key = self.key(association.foreign_key_column());
        if matches!(self.raw(&foreign_key)?, Value::Null) {
            return Ok(None);
        }

        let nested = RowView {
            row: self.row,
            meta: association.referenced(),
            prefix: Some(association.alias_prefix()),
        };
        let referenced_id = nested.key(nested.meta.id_column());
        if matches!(nested.raw(&referenced_id)?, Value::Null) {
            return Err(MappingError::DanglingReference {
                table: self.meta.table_name().to_string(),
                foreign_key,
            });
        }

        A::from_row(&nested).map(Some)
    }

    fn key(&self, column: &str) -> String {
        match self.prefix {
            Some(prefix) => format!("{prefix}.{column}"),
            None => column.to_string(),
        }
    }

    fn raw(&self, key: &str) -> MapResult<&'r Value> {
        self.row
            .value(key)
            .ok_or_else(|| MappingError::MissingColumn(key.to_string()))
    }
}

/// Maps every row or fails as a whole.
pub fn map_rows<E: Entity>(rows: &[RowData], meta: &TableMetadata) -> MapResult<Vec<E>> {
    rows.iter()
        .map(|row| E::from_row(&RowView::new(row, meta)))
        .collect()
}
