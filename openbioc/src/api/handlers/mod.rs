//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate the request, run it against the database repositories and the catalog core,
//! and serialize the result. Write endpoints take a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! extractor, which answers 401 without a valid session cookie.
//!
//! # Handler Modules
//!
//! - [`auth`]: registration, email validation, login, logout and password resets
//! - [`stats`]: catalog counters
//! - [`tools`]: tool search, details, dependency trees and new edits
//! - [`users`]: the current user's profile
//! - [`workflows`]: workflow search, details and new edits

pub mod auth;
pub mod stats;
pub mod tools;
pub mod users;
pub mod workflows;
