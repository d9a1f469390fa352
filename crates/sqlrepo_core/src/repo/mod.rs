//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the entity-agnostic CRUD/paging contract.
//! - Isolate SQL execution details from callers.
//!
//! # Invariants
//! - Repository APIs return typed errors, never bare strings.
//! - Repositories hold no row cache; every read is a fresh query.

pub mod sql_repo;
