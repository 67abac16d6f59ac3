//! `db` crate — pure persistence layer.
//!
//! Provides the [`Store`] trait the engine is written against, an in-memory
//! implementation, and a Postgres implementation built from a connection
//! pool, typed row structs, and repository functions for every table.
//! No business logic lives here.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use pool::{DbPool, PoolConfig};
pub use store::Store;
