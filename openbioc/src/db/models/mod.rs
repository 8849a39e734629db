//! Database record models matching table schemas.
//!
//! Models derive `sqlx::FromRow` for query results and are kept separate from the API models so
//! storage and wire representations can evolve independently. Create requests carry references
//! already resolved to ids.
//!
//! - [`users`]: user accounts and their profiles
//! - [`tools`]: tool edits, variables and dependency edges
//! - [`workflows`]: workflow edits and their graph documents

pub mod tools;
pub mod users;
pub mod workflows;
