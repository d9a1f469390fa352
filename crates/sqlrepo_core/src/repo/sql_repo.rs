//! Generic metadata-driven repository and its SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and paging APIs for any `Entity` described by
//!   `TableMetadata`.
//! - Orchestrate SQL synthesis, pooled execution and row mapping.
//!
//! # Invariants
//! - Each operation borrows exactly one pooled connection and releases it
//!   before returning, on success and on error.
//! - SQL is fully built (including sort validation) before a connection is
//!   borrowed.
//! - `save` inserts when `Entity::is_new()` and updates by id otherwise; an
//!   update matching no row is `RepoError::StaleUpdate`.
//! - An insert whose key cannot be read back leaves no row behind.
//! - Deletes touch the owning table only.

use crate::db::exec;
use crate::db::{ConnectionPool, DbError, PooledConnection};
use crate::model::entity::Entity;
use crate::model::metadata::{KeyGeneration, TableMetadata};
use crate::model::paging::{Page, PageRequest, Sort};
use crate::sql::builder::{BuildError, Dialect, PageWindow, QueryIntent, SqlBuilder, SqlStatement};
use crate::sql::row::{map_rows, MappingError};
use log::{debug, error, warn};
use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error taxonomy. Nothing is retried.
#[derive(Debug)]
pub enum RepoError {
    /// Pool exhausted or closed.
    Connection(DbError),
    /// Uniqueness or foreign-key constraint rejected the write.
    ConstraintViolation(rusqlite::Error),
    /// Insert returned no usable key; the insert was rolled back.
    KeyGeneration { table: String },
    /// Sort property has no column; raised before any SQL runs.
    UnknownSortProperty { table: String, property: String },
    /// Entity row lacks a value for a write column.
    MissingColumnValue { table: String, column: String },
    /// Result row could not be mapped to an entity.
    Mapping(MappingError),
    /// Update by id matched zero rows.
    StaleUpdate { table: String, id: String },
    /// Operation needs an id the entity does not carry.
    MissingId { table: String },
    Db(DbError),
}

impl RepoError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_failure",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::KeyGeneration { .. } => "key_generation_failure",
            Self::UnknownSortProperty { .. } => "unknown_sort_property",
            Self::MissingColumnValue { .. } => "missing_column_value",
            Self::Mapping(_) => "mapping_failure",
            Self::StaleUpdate { .. } => "stale_update",
            Self::MissingId { .. } => "missing_id",
            Self::Db(_) => "db_error",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(err) => write!(f, "connection failure: {err}"),
            Self::ConstraintViolation(err) => write!(f, "write rejected: {err}"),
            Self::KeyGeneration { table } => {
                write!(f, "insert into `{table}` returned no generated key")
            }
            Self::UnknownSortProperty { table, property } => {
                write!(f, "unknown sort property `{property}` for table `{table}`")
            }
            Self::MissingColumnValue { table, column } => {
                write!(f, "no value supplied for column `{column}` of table `{table}`")
            }
            Self::Mapping(err) => write!(f, "{err}"),
            Self::StaleUpdate { table, id } => {
                write!(f, "update of `{table}` id {id} matched no row")
            }
            Self::MissingId { table } => write!(f, "entity of table `{table}` has no id"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) => Some(err),
            Self::ConstraintViolation(err) => Some(err),
            Self::Mapping(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::KeyGeneration { .. }
            | Self::UnknownSortProperty { .. }
            | Self::MissingColumnValue { .. }
            | Self::StaleUpdate { .. }
            | Self::MissingId { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => {
                if is_constraint_violation(&err) {
                    Self::ConstraintViolation(err)
                } else {
                    Self::Db(DbError::Sqlite(err))
                }
            }
            DbError::PoolExhausted { timeout_ms } => {
                Self::Connection(DbError::PoolExhausted { timeout_ms })
            }
            DbError::PoolClosed => Self::Connection(DbError::PoolClosed),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

impl From<BuildError> for RepoError {
    fn from(value: BuildError) -> Self {
        match value {
            BuildError::UnknownSortProperty { table, property } => {
                Self::UnknownSortProperty { table, property }
            }
            BuildError::MissingColumnValue { table, column } => {
                Self::MissingColumnValue { table, column }
            }
        }
    }
}

impl From<MappingError> for RepoError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _) if code.code == ErrorCode::ConstraintViolation
    )
}

/// CRUD and paging contract for one entity type.
pub trait Repository<E: Entity> {
    /// Entity with `id`, `None` when no row matches.
    fn find_one(&self, id: &E::Id) -> RepoResult<Option<E>>;
    /// Every entity in natural (primary key) order.
    fn find_all(&self) -> RepoResult<Vec<E>>;
    /// Every entity in `sort` order, ties broken by primary key.
    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>>;
    /// Entities whose id is listed; unknown ids are skipped.
    fn find_all_by_ids(&self, ids: &[E::Id]) -> RepoResult<Vec<E>>;
    /// One page of the sorted result set plus totals.
    fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>>;
    fn count(&self) -> RepoResult<u64>;
    fn exists(&self, id: &E::Id) -> RepoResult<bool>;
    /// Inserts or updates, returning the entity as persisted.
    fn save(&self, entity: E) -> RepoResult<E>;
    /// Saves every entity in one transaction; all or nothing.
    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<E>>;
    fn delete(&self, entity: &E) -> RepoResult<()>;
    fn delete_by_id(&self, id: &E::Id) -> RepoResult<()>;
    /// Removes every row of the owning table and returns how many.
    fn delete_all(&self) -> RepoResult<u64>;
}

/// SQLite-backed repository for entity type `E`.
pub struct SqliteRepository<E> {
    pool: ConnectionPool,
    builder: Arc<SqlBuilder>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteRepository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            builder: Arc::clone(&self.builder),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> SqliteRepository<E> {
    pub fn new(pool: ConnectionPool, meta: Arc<TableMetadata>) -> Self {
        Self::with_builder(pool, Arc::new(SqlBuilder::new(meta, Dialect::Sqlite)))
    }

    /// Shares one prebuilt `SqlBuilder` between repositories.
    pub fn with_builder(pool: ConnectionPool, builder: Arc<SqlBuilder>) -> Self {
        Self {
            pool,
            builder,
            _entity: PhantomData,
        }
    }

    pub fn meta(&self) -> &TableMetadata {
        self.builder.meta()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Borrows a connection, runs `work`, logs the outcome.
    ///
    /// The connection guard is dropped before this returns.
    fn run<T>(
        &self,
        op: &'static str,
        work: impl FnOnce(&mut PooledConnection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let started_at = Instant::now();
        let result = self
            .pool
            .get()
            .map_err(RepoError::from)
            .and_then(|mut conn| work(&mut conn));

        let table = self.meta().table_name();
        match &result {
            Ok(_) => debug!(
                "event=repo_op module=repo status=ok table={table} op={op} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(RepoError::StaleUpdate { .. }) => warn!(
                "event=repo_op module=repo status=error table={table} op={op} duration_ms={} error_code=stale_update",
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_op module=repo status=error table={table} op={op} duration_ms={} error_code={} error={err}",
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        result
    }

    fn query_entities(&self, op: &'static str, statement: SqlStatement) -> RepoResult<Vec<E>> {
        self.run(op, |conn| {
            let rows = exec::query(conn, &statement)?;
            Ok(map_rows(&rows, self.meta())?)
        })
    }

    fn save_on(&self, conn: &Connection, entity: E) -> RepoResult<E> {
        if entity.is_new() {
            self.insert_on(conn, entity)
        } else {
            self.update_on(conn, entity)
        }
    }

    fn insert_on(&self, conn: &Connection, entity: E) -> RepoResult<E> {
        let meta = self.meta();
        let id: Option<Value> = entity.id().cloned().map(Into::into);
        if id.is_none() && meta.key_generation() == KeyGeneration::Assigned {
            return Err(self.missing_id());
        }

        let values = entity.to_row();
        let statement = self.builder.build(QueryIntent::Insert {
            id,
            values: &values,
        })?;
        // A failed key read rolls the insert back with it.
        let id = exec::in_savepoint(conn, |conn| {
            let key = exec::insert_returning_key(conn, &statement)?;
            self.generated_id(key)
        })?;

        Ok(entity.with_id(id))
    }

    fn generated_id(&self, key: Option<Value>) -> RepoResult<E::Id> {
        let table = self.meta().table_name();
        let key = match key {
            Some(Value::Null) | None => {
                warn!("event=key_generation module=repo status=error table={table} error=no_key");
                return Err(RepoError::KeyGeneration {
                    table: table.to_string(),
                });
            }
            Some(key) => key,
        };
        E::Id::column_result(ValueRef::from(&key)).map_err(|err| {
            warn!("event=key_generation module=repo status=error table={table} error={err}");
            RepoError::KeyGeneration {
                table: table.to_string(),
            }
        })
    }

    fn update_on(&self, conn: &Connection, entity: E) -> RepoResult<E> {
        let id = entity.id().cloned().ok_or_else(|| self.missing_id())?;
        let values = entity.to_row();
        let statement = self.builder.build(QueryIntent::Update {
            id: id.clone().into(),
            values: &values,
        })?;

        if exec::execute(conn, &statement)? == 0 {
            return Err(RepoError::StaleUpdate {
                table: self.meta().table_name().to_string(),
                id: format!("{id:?}"),
            });
        }

        Ok(entity)
    }

    fn missing_id(&self) -> RepoError {
        RepoError::MissingId {
            table: self.meta().table_name().to_string(),
        }
    }
}

impl<E: Entity> Repository<E> for SqliteRepository<E> {
    fn find_one(&self, id: &E::Id) -> RepoResult<Option<E>> {
        let statement = self
            .builder
            .build(QueryIntent::FindById(id.clone().into()))?;
        let mut found = self.query_entities("find_one", statement)?;
        Ok(found.pop())
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        self.find_all_sorted(&Sort::unsorted())
    }

    fn find_all_sorted(&self, sort: &Sort) -> RepoResult<Vec<E>> {
        let statement = self.builder.build(QueryIntent::FindAll { sort, window: None })?;
        self.query_entities("find_all", statement)
    }

    fn find_all_by_ids(&self, ids: &[E::Id]) -> RepoResult<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let statement = self.builder.build(QueryIntent::FindAllById(
            ids.iter().cloned().map(Into::into).collect(),
        ))?;
        self.query_entities("find_all_by_ids", statement)
    }

    fn find_page(&self, request: &PageRequest) -> RepoResult<Page<E>> {
        let select = self.builder.build(QueryIntent::FindAll {
            sort: request.sort(),
            window: Some(PageWindow::from(request)),
        })?;
        let count = self.builder.build(QueryIntent::Count)?;

        self.run("find_page", |conn| {
            let total = exec::query_count(conn, &count)?;
            let rows = exec::query(conn, &select)?;
            let content = map_rows(&rows, self.meta())?;
            Ok(Page::new(content, request, total))
        })
    }

    fn count(&self) -> RepoResult<u64> {
        let statement = self.builder.build(QueryIntent::Count)?;
        self.run("count", |conn| Ok(exec::query_count(conn, &statement)?))
    }

    fn exists(&self, id: &E::Id) -> RepoResult<bool> {
        let statement = self.builder.build(QueryIntent::Exists(id.clone().into()))?;
        self.run("exists", |conn| Ok(exec::query_exists(conn, &statement)?))
    }

    fn save(&self, entity: E) -> RepoResult<E> {
        self.run("save", |conn| self.save_on(conn, entity))
    }

    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<E>> {
        self.run("save_all", |conn| {
            let tx = conn.transaction()?;
            let mut saved = Vec::with_capacity(entities.len());
            for entity in entities {
                saved.push(self.save_on(&tx, entity)?);
            }
            tx.commit()?;
            Ok(saved)
        })
    }

    fn delete(&self, entity: &E) -> RepoResult<()> {
        let id = entity.id().ok_or_else(|| self.missing_id())?;
        self.delete_by_id(id)
    }

    fn delete_by_id(&self, id: &E::Id) -> RepoResult<()> {
        let statement = self.builder.build(QueryIntent::DeleteById(id.clone().into()))?;
        self.run("delete", |conn| {
            if exec::execute(conn, &statement)? == 0 {
                debug!(
                    "event=repo_delete module=repo status=noop table={}",
                    self.meta().table_name()
                );
            }
            Ok(())
        })
    }

    fn delete_all(&self) -> RepoResult<u64> {
        let statement = self.builder.build(QueryIntent::DeleteAll)?;
        self.run("delete_all", |conn| {
            let removed = exec::execute(conn, &statement)?;
            Ok(removed as u64)
        })
    }
}
