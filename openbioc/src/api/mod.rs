//! HTTP surface of the catalog.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: request and response bodies
//!
//! # API Structure
//!
//! - **Authentication** (`/authentication/*`): registration, email validation, login, logout and
//!   password resets
//! - **Profile** (`/api/v1/users/current/profile`): the logged-in user's public profile
//! - **Tools** (`/api/v1/tools/*`): tool search trees, details, dependency trees and new edits
//! - **Workflows** (`/api/v1/workflows/*`): workflow search trees, details and new edits
//! - **Stats** (`/api/v1/stats`): catalog counters
//!
//! Every endpoint is annotated with `utoipa`; the rendered reference lives at `/docs`.

pub mod handlers;
pub mod models;
