//! Static table mapping consumed by the SQL builder and row mapper.
//!
//! # Responsibility
//! - Describe one table: name, primary key, ordered writable columns.
//! - Describe at most one many-to-one association and the columns needed to
//!   hydrate the referenced entity.
//! - Map logical sort properties to physical columns.
//!
//! # Invariants
//! - `id_column` is never part of `columns`.
//! - Every identifier matches `^[A-Za-z_][A-Za-z0-9_]*$`, so identifiers can be
//!   quoted verbatim into SQL text.
//! - Metadata is immutable after construction.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
});

/// Result type for metadata construction.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Metadata construction errors. Raised once at startup, never per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// Table or column name is not a plain SQL identifier.
    InvalidIdentifier(String),
    /// The primary key column was also listed as a writable column.
    IdColumnInColumns { table: String, column: String },
    /// The same column was listed twice.
    DuplicateColumn { table: String, column: String },
    /// The entity already declares a many-to-one association.
    AssociationAlreadySet { table: String },
    /// A sort alias points at a column the table does not have.
    UnknownAliasTarget { table: String, column: String },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::IdColumnInColumns { table, column } => write!(
                f,
                "table `{table}` lists id column `{column}` as a writable column"
            ),
            Self::DuplicateColumn { table, column } => {
                write!(f, "table `{table}` lists column `{column}` more than once")
            }
            Self::AssociationAlreadySet { table } => {
                write!(f, "table `{table}` already declares an association")
            }
            Self::UnknownAliasTarget { table, column } => write!(
                f,
                "sort alias targets unknown column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for MetadataError {}

/// How primary keys of a table come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// Database assigns the key on insert.
    Generated,
    /// Caller supplies the key (natural key tables).
    Assigned,
}

/// Many-to-one reference from the owning table to another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    foreign_key_column: String,
    referenced: Arc<TableMetadata>,
}

impl Association {
    /// Column on the owning table that stores the referenced id.
    pub fn foreign_key_column(&self) -> &str {
        &self.foreign_key_column
    }

    /// Metadata of the referenced table.
    pub fn referenced(&self) -> &TableMetadata {
        &self.referenced
    }

    /// Result-set alias of one referenced column, e.g. `users.user_name`.
    ///
    /// Dots never appear in validated identifiers, so aliases cannot collide
    /// with base-table columns.
    pub fn alias(&self, column: &str) -> String {
        format!("{}.{column}", self.referenced.table_name)
    }

    /// Prefix shared by all aliased referenced columns.
    pub fn alias_prefix(&self) -> &str {
        &self.referenced.table_name
    }
}

/// Static description of one table mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    table_name: String,
    id_column: String,
    key_generation: KeyGeneration,
    columns: Vec<String>,
    association: Option<Association>,
    sort_aliases: Vec<(String, String)>,
}

impl TableMetadata {
    /// Creates metadata for a table whose keys are generated by the database.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for any name that is not a plain identifier.
    /// - `IdColumnInColumns` / `DuplicateColumn` for malformed column lists.
    pub fn new<I, S>(table_name: &str, id_column: &str, columns: I) -> MetadataResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table_name = validate_identifier(table_name)?;
        let id_column = validate_identifier(id_column)?;

        let mut seen = HashSet::new();
        let mut validated = Vec::new();
        for column in columns {
            let column = validate_identifier(&column.into())?;
            if column == id_column {
                return Err(MetadataError::IdColumnInColumns {
                    table: table_name,
                    column,
                });
            }
            if !seen.insert(column.clone()) {
                return Err(MetadataError::DuplicateColumn {
                    table: table_name,
                    column,
                });
            }
            validated.push(column);
        }

        Ok(Self {
            table_name,
            id_column,
            key_generation: KeyGeneration::Generated,
            columns: validated,
            association: None,
            sort_aliases: Vec::new(),
        })
    }

    /// Marks the table as using caller-assigned (natural) keys.
    pub fn with_assigned_keys(mut self) -> Self {
        self.key_generation = KeyGeneration::Assigned;
        self
    }

    /// Declares the single many-to-one association of this table.
    ///
    /// # Errors
    /// - `AssociationAlreadySet` when called twice.
    /// - `IdColumnInColumns` / `DuplicateColumn` when the foreign key clashes
    ///   with the id or a plain column.
    pub fn with_association(
        mut self,
        foreign_key_column: &str,
        referenced: Arc<TableMetadata>,
    ) -> MetadataResult<Self> {
        if self.association.is_some() {
            return Err(MetadataError::AssociationAlreadySet {
                table: self.table_name,
            });
        }
        let foreign_key_column = validate_identifier(foreign_key_column)?;
        if foreign_key_column == self.id_column {
            return Err(MetadataError::IdColumnInColumns {
                table: self.table_name,
                column: foreign_key_column,
            });
        }
        if self.columns.contains(&foreign_key_column) {
            return Err(MetadataError::DuplicateColumn {
                table: self.table_name,
                column: foreign_key_column,
            });
        }

        self.association = Some(Association {
            foreign_key_column,
            referenced,
        });
        Ok(self)
    }

    /// Registers a logical sort property name for an existing column.
    pub fn with_sort_alias(mut self, property: &str, column: &str) -> MetadataResult<Self> {
        let property = validate_identifier(property)?;
        let column = validate_identifier(column)?;
        if !self.has_column(&column) {
            return Err(MetadataError::UnknownAliasTarget {
                table: self.table_name,
                column,
            });
        }
        self.sort_aliases.push((property, column));
        Ok(self)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn key_generation(&self) -> KeyGeneration {
        self.key_generation
    }

    /// Writable columns in declaration order, excluding id and foreign key.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn association(&self) -> Option<&Association> {
        self.association.as_ref()
    }

    /// Columns written by insert/update: plain columns, then the foreign key.
    pub fn write_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if let Some(association) = &self.association {
            columns.push(association.foreign_key_column());
        }
        columns
    }

    /// Referenced columns needed to hydrate the nested entity, each paired
    /// with its `table.column` result alias. Referenced id first; empty when
    /// the table has no association.
    pub fn join_columns(&self) -> Vec<(&str, String)> {
        let Some(association) = &self.association else {
            return Vec::new();
        };
        let referenced = association.referenced();
        std::iter::once(referenced.id_column())
            .chain(referenced.columns().iter().map(String::as_str))
            .map(|column| (column, association.alias(column)))
            .collect()
    }

    /// Maps a logical sort property to its physical column.
    ///
    /// Aliases win; otherwise the id, plain columns and the foreign key match
    /// by exact name.
    pub fn resolve_sort_property(&self, property: &str) -> Option<&str> {
        if let Some((_, column)) = self.sort_aliases.iter().find(|(name, _)| name == property) {
            return Some(column.as_str());
        }
        std::iter::once(self.id_column.as_str())
            .chain(self.write_columns())
            .find(|column| *column == property)
    }

    fn has_column(&self, column: &str) -> bool {
        column == self.id_column || self.write_columns().contains(&column)
    }
}

fn validate_identifier(name: &str) -> MetadataResult<String> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(MetadataError::InvalidIdentifier(name.to_string()))
    }
}
