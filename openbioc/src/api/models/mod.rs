//! API request and response models.
//!
//! These are kept separate from [`crate::db::models`] so the wire format can evolve without
//! touching storage. Everything here derives `utoipa::ToSchema`.

pub mod auth;
pub mod pagination;
pub mod stats;
pub mod tools;
pub mod users;
pub mod workflows;
