//! Resource records and the storage facade that owns their identifiers.

pub mod repository;
pub mod store;
pub mod types;
