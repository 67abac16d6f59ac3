//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types — pure SQL. Queries are checked at
//! runtime so the crate builds without a live database.

pub mod scenarios;
pub mod nodes;
pub mod connections;
pub mod executions;
pub mod events;
