//! SQL synthesis and result row mapping.

pub mod builder;
pub mod row;
