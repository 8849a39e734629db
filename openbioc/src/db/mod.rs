//! Database layer for data persistence and access.
//!
//! SQLx over PostgreSQL, organised as repositories:
//!
//! ```text
//! API handlers -> db::handlers (repositories) -> db::models -> PostgreSQL
//! ```
//!
//! - [`handlers`]: repository implementations
//! - [`models`]: records matching the table schemas
//! - [`errors`]: database error classification
//!
//! Migrations live in `migrations/` and are embedded with [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
