//! Metadata-driven SQL repositories over SQLite.
//!
//! A `TableMetadata` describes one table (and at most one many-to-one
//! association); `SqliteRepository` turns it into parameterized CRUD, sorted
//! and paged reads, and joined association mapping.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sql;

pub use config::PoolConfig;
pub use db::{ConnectionPool, DatabaseTarget, DbError, PooledConnection};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{ColumnValues, Entity};
pub use model::metadata::{Association, KeyGeneration, MetadataError, TableMetadata};
pub use model::paging::{Direction, Order, Page, PageRequest, PagingError, Sort};
pub use repo::sql_repo::{RepoError, RepoResult, Repository, SqliteRepository};
pub use sql::builder::{BuildError, Dialect, PageWindow, QueryIntent, SqlBuilder, SqlStatement};
pub use sql::row::{MapResult, MappingError, RowData, RowView};
