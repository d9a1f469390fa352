//! Table mapping, entity contract and paging value objects.
//!
//! # Invariants
//! - Metadata is built once at startup and shared immutably.
//! - Entities are values; repositories only read them or set their id.

pub mod entity;
pub mod metadata;
pub mod paging;
