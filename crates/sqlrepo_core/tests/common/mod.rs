#![allow(dead_code)]

use rusqlite::types::Value;
use sqlrepo_core::{
    ColumnValues, ConnectionPool, Entity, MapResult, PoolConfig, Repository, RowView,
    SqliteRepository, TableMetadata,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const SOME_USER: &str = "some_user";
/// 2013-01-19T00:00:00Z in epoch milliseconds.
pub const SOME_DATE: i64 = 1_358_553_600_000;
/// 2013-01-20T00:00:00Z in epoch milliseconds.
pub const SOME_TIMESTAMP: i64 = 1_358_640_000_000;

const SCHEMA: &str = "
CREATE TABLE users (
    user_name TEXT PRIMARY KEY,
    date_of_birth INTEGER NOT NULL,
    reputation INTEGER NOT NULL,
    enabled INTEGER NOT NULL
);
CREATE TABLE comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT REFERENCES users(user_name),
    contents TEXT NOT NULL,
    created_time INTEGER NOT NULL,
    favourite_count INTEGER NOT NULL
);";

/// Natural-key entity: the user name is the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_name: String,
    pub date_of_birth: i64,
    pub reputation: i32,
    pub enabled: bool,
    persisted: bool,
}

impl User {
    pub fn new(user_name: &str, date_of_birth: i64, reputation: i32, enabled: bool) -> Self {
        Self {
            user_name: user_name.to_string(),
            date_of_birth,
            reputation,
            enabled,
            persisted: false,
        }
    }
}

impl Entity for User {
    type Id = String;

    fn id(&self) -> Option<&String> {
        Some(&self.user_name)
    }

    fn with_id(self, id: String) -> Self {
        Self {
            user_name: id,
            persisted: true,
            ..self
        }
    }

    fn is_new(&self) -> bool {
        !self.persisted
    }

    fn to_row(&self) -> ColumnValues {
        vec![
            ("date_of_birth", Value::Integer(self.date_of_birth)),
            ("reputation", Value::Integer(i64::from(self.reputation))),
            ("enabled", Value::Integer(i64::from(self.enabled))),
        ]
    }

    fn from_row(row: &RowView<'_>) -> MapResult<Self> {
        Ok(Self {
            user_name: row.id()?,
            date_of_birth: row.get("date_of_birth")?,
            reputation: row.get("reputation")?,
            enabled: row.get("enabled")?,
            persisted: true,
        })
    }
}

/// Generated-key entity with an optional many-to-one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentWithUser {
    pub id: Option<i64>,
    pub user: Option<User>,
    pub contents: String,
    pub created_time: i64,
    pub favourite_count: i32,
}

impl CommentWithUser {
    pub fn new(user: &User, contents: &str, created_time: i64, favourite_count: i32) -> Self {
        Self {
            id: None,
            user: Some(user.clone()),
            contents: contents.to_string(),
            created_time,
            favourite_count,
        }
    }
}

impl Entity for CommentWithUser {
    type Id = i64;

    fn id(&self) -> Option<&i64> {
        self.id.as_ref()
    }

    fn with_id(self, id: i64) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    fn to_row(&self) -> ColumnValues {
        vec![
            ("contents", Value::Text(self.contents.clone())),
            ("created_time", Value::Integer(self.created_time)),
            ("favourite_count", Value::Integer(i64::from(self.favourite_count))),
            (
                "user_name",
                self.user
                    .as_ref()
                    .map_or(Value::Null, |user| Value::Text(user.user_name.clone())),
            ),
        ]
    }

    fn from_row(row: &RowView<'_>) -> MapResult<Self> {
        Ok(Self {
            id: Some(row.id()?),
            user: row.association()?,
            contents: row.get("contents")?,
            created_time: row.get("created_time")?,
            favourite_count: row.get("favourite_count")?,
        })
    }
}

pub fn users_meta() -> Arc<TableMetadata> {
    Arc::new(
        TableMetadata::new(
            "users",
            "user_name",
            ["date_of_birth", "reputation", "enabled"],
        )
        .unwrap()
        .with_assigned_keys(),
    )
}

pub fn comments_meta() -> Arc<TableMetadata> {
    Arc::new(
        TableMetadata::new(
            "comments",
            "id",
            ["contents", "created_time", "favourite_count"],
        )
        .unwrap()
        .with_association("user_name", users_meta())
        .unwrap()
        .with_sort_alias("favouriteCount", "favourite_count")
        .unwrap(),
    )
}

/// Supported storage backends for the shared suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    SharedMemory,
    File,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::SharedMemory, Backend::File];
}

/// Schema-initialized pool plus repositories and one pre-saved user.
pub struct Fixture {
    pub backend: Backend,
    pub pool: ConnectionPool,
    pub users: SqliteRepository<User>,
    pub comments: SqliteRepository<CommentWithUser>,
    pub some_user: User,
    _dir: Option<TempDir>,
}

impl Fixture {
    pub fn new(backend: Backend) -> Self {
        Self::with_config(backend, PoolConfig::in_memory())
    }

    pub fn with_config(backend: Backend, base: PoolConfig) -> Self {
        let (config, dir) = match backend {
            Backend::SharedMemory => (base, None),
            Backend::File => {
                let dir = tempfile::tempdir().unwrap();
                let config = PoolConfig {
                    path: Some(dir.path().join("repository.db")),
                    ..base
                };
                (config, Some(dir))
            }
        };

        let pool = ConnectionPool::open(&config).unwrap();
        pool.get().unwrap().execute_batch(SCHEMA).unwrap();

        let users = SqliteRepository::new(pool.clone(), users_meta());
        let comments = SqliteRepository::new(pool.clone(), comments_meta());
        let some_user = users
            .save(User::new(SOME_USER, SOME_DATE, -1, false))
            .unwrap();

        Self {
            backend,
            pool,
            users,
            comments,
            some_user,
            _dir: dir,
        }
    }

    pub fn save_comment(&self, user: &User, contents: &str, favourite_count: i32) -> CommentWithUser {
        self.comments
            .save(CommentWithUser::new(
                user,
                contents,
                SOME_TIMESTAMP,
                favourite_count,
            ))
            .unwrap()
    }
}

/// Runs `scenario` once against a fresh fixture per supported backend.
pub fn for_each_backend(scenario: impl Fn(&Fixture)) {
    for backend in Backend::ALL {
        let fixture = Fixture::new(backend);
        scenario(&fixture);
        fixture.pool.close();
    }
}
