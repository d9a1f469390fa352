//! Parameterized SQL synthesis from table metadata.
//!
//! # Responsibility
//! - Turn one `QueryIntent` into SQL text plus ordered bind values.
//! - Own the select list, join clause and aliasing for associated tables.
//!
//! # Invariants
//! - Values are always bind parameters; only validated identifiers from
//!   `TableMetadata` are written into SQL text.
//! - Unfiltered reads always end with the primary key in `ORDER BY`, so
//!   pagination is stable for a fixed table state.
//! - Writes target the owning table only; join columns are read-side only.

use crate::model::metadata::TableMetadata;
use crate::model::paging::{PageRequest, Sort};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const BASE_ALIAS: &str = "e";
const JOIN_ALIAS: &str = "j";

/// Result type for SQL synthesis.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors raised before any SQL is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Sort property has no column in the table metadata.
    UnknownSortProperty { table: String, property: String },
    /// Entity row lacks a value for a write column.
    MissingColumnValue { table: String, column: String },
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSortProperty { table, property } => {
                write!(f, "unknown sort property `{property}` for table `{table}`")
            }
            Self::MissingColumnValue { table, column } => {
                write!(f, "no value supplied for column `{column}` of table `{table}`")
            }
        }
    }
}

impl Error for BuildError {}

/// Placeholder flavor of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `?1, ?2, ...`
    #[default]
    Sqlite,
    /// `$1, $2, ...`
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite => format!("?{index}"),
            Self::Postgres => format!("${index}"),
        }
    }
}

/// Offset/limit window for paged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u32,
}

impl From<&PageRequest> for PageWindow {
    fn from(request: &PageRequest) -> Self {
        Self {
            offset: request.offset(),
            limit: request.page_size(),
        }
    }
}

/// Closed set of query shapes understood by `SqlBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryIntent<'a> {
    FindById(Value),
    FindAllById(Vec<Value>),
    FindAll {
        sort: &'a Sort,
        window: Option<PageWindow>,
    },
    Exists(Value),
    Count,
    /// `id` is written explicitly when set, otherwise generated by the database.
    Insert {
        id: Option<Value>,
        values: &'a [(&'static str, Value)],
    },
    Update {
        id: Value,
        values: &'a [(&'static str, Value)],
    },
    DeleteById(Value),
    DeleteAll,
}

/// SQL text plus bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

struct Binds {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Binds {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            binds: self.values,
        }
    }
}

/// Immutable SQL generator for one table mapping.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    meta: Arc<TableMetadata>,
    dialect: Dialect,
    select_from: String,
    table: String,
    id: String,
}

impl SqlBuilder {
    pub fn new(meta: Arc<TableMetadata>, dialect: Dialect) -> Self {
        let select_from = select_from(&meta);
        let table = quote(meta.table_name());
        let id = quote(meta.id_column());
        Self {
            meta,
            dialect,
            select_from,
            table,
            id,
        }
    }

    pub fn meta(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Builds SQL and binds for one query intent.
    ///
    /// # Errors
    /// - `UnknownSortProperty` for sort keys without a column.
    /// - `MissingColumnValue` for writes lacking a column value.
    pub fn build(&self, intent: QueryIntent<'_>) -> BuildResult<SqlStatement> {
        let mut binds = Binds::new(self.dialect);
        let sql = match intent {
            QueryIntent::FindById(id) => {
                let placeholder = binds.push(id);
                format!(
                    "{} WHERE {BASE_ALIAS}.{} = {placeholder}",
                    self.select_from, self.id
                )
            }
            QueryIntent::FindAllById(ids) => {
                let filter = if ids.is_empty() {
                    "0 = 1".to_string()
                } else {
                    let placeholders: Vec<String> =
                        ids.into_iter().map(|id| binds.push(id)).collect();
                    format!("{BASE_ALIAS}.{} IN ({})", self.id, placeholders.join(", "))
                };
                format!(
                    "{} WHERE {filter} ORDER BY {BASE_ALIAS}.{} ASC",
                    self.select_from, self.id
                )
            }
            QueryIntent::FindAll { sort, window } => {
                let mut sql = format!("{} ORDER BY {}", self.select_from, self.order_by(sort)?);
                if let Some(window) = window {
                    let limit = binds.push(Value::Integer(i64::from(window.limit)));
                    let offset =
                        binds.push(Value::Integer(i64::try_from(window.offset).unwrap_or(i64::MAX)));
                    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
                }
                sql
            }
            QueryIntent::Exists(id) => {
                let placeholder = binds.push(id);
                format!(
                    "SELECT 1 FROM {} WHERE {} = {placeholder} LIMIT 1",
                    self.table, self.id
                )
            }
            QueryIntent::Count => format!("SELECT COUNT(*) FROM {}", self.table),
            QueryIntent::Insert { id, values } => {
                let mut columns = Vec::new();
                let mut placeholders = Vec::new();
                if let Some(id) = id {
                    columns.push(self.id.clone());
                    placeholders.push(binds.push(id));
                }
                for column in self.meta.write_columns() {
                    columns.push(quote(column));
                    placeholders.push(binds.push(self.value_for(column, values)?));
                }
                if columns.is_empty() {
                    format!(
                        "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                        self.table, self.id
                    )
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                        self.table,
                        columns.join(", "),
                        placeholders.join(", "),
                        self.id
                    )
                }
            }
            QueryIntent::Update { id, values } => {
                let mut assignments = Vec::new();
                for column in self.meta.write_columns() {
                    let placeholder = binds.push(self.value_for(column, values)?);
                    assignments.push(format!("{} = {placeholder}", quote(column)));
                }
                if assignments.is_empty() {
                    // Keeps the affected-row count meaningful for id-only tables.
                    assignments.push(format!("{} = {}", self.id, self.id));
                }
                let placeholder = binds.push(id);
                format!(
                    "UPDATE {} SET {} WHERE {} = {placeholder}",
                    self.table,
                    assignments.join(", "),
                    self.id
                )
            }
            QueryIntent::DeleteById(id) => {
                let placeholder = binds.push(id);
                format!("DELETE FROM {} WHERE {} = {placeholder}", self.table, self.id)
            }
            QueryIntent::DeleteAll => format!("DELETE FROM {}", self.table),
        };

        Ok(binds.finish(sql))
    }

    fn order_by(&self, sort: &Sort) -> BuildResult<String> {
        let mut terms = Vec::with_capacity(sort.orders().len() + 1);
        let mut has_id = false;
        for order in sort.orders() {
            let column = self
                .meta
                .resolve_sort_property(&order.property)
                .ok_or_else(|| BuildError::UnknownSortProperty {
                    table: self.meta.table_name().to_string(),
                    property: order.property.clone(),
                })?;
            has_id |= column == self.meta.id_column();
            terms.push(format!(
                "{BASE_ALIAS}.{} {}",
                quote(column),
                order.direction.as_sql()
            ));
        }
        if !has_id {
            terms.push(format!("{BASE_ALIAS}.{} ASC", self.id));
        }
        Ok(terms.join(", "))
    }

    fn value_for(&self, column: &str, values: &[(&'static str, Value)]) -> BuildResult<Value> {
        values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| BuildError::MissingColumnValue {
                table: self.meta.table_name().to_string(),
                column: column.to_string(),
            })
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn select_from(meta: &TableMetadata) -> String {
    let mut select_list: Vec<String> = std::iter::once(meta.id_column())
        .chain(meta.write_columns())
        .map(|column| format!("{BASE_ALIAS}.{} AS {}", quote(column), quote(column)))
        .collect();

    let mut from = format!("{} {BASE_ALIAS}", quote(meta.table_name()));
    if let Some(association) = meta.association() {
        let referenced = association.referenced();
        select_list.extend(
            meta.join_columns()
                .into_iter()
                .map(|(column, alias)| format!("{JOIN_ALIAS}.{} AS {}", quote(column), quote(&alias))),
        );
        from.push_str(&format!(
            " LEFT JOIN {} {JOIN_ALIAS} ON {BASE_ALIAS}.{} = {JOIN_ALIAS}.{}",
            quote(referenced.table_name()),
            quote(association.foreign_key_column()),
            quote(referenced.id_column())
        ));
    }

    format!("SELECT {} FROM {from}", select_list.join(", "))
}
