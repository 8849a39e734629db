//! Authentication for the catalog.
//!
//! Users sign up and log in with a username and password. A successful login issues a signed JWT
//! that the browser keeps in an HttpOnly session cookie; handlers that need a user take a
//! [`CurrentUser`](crate::api::models::users::CurrentUser) argument, which is extracted from that
//! cookie.
//!
//! Passwords and the one-time email validation and password reset tokens are all stored as Argon2
//! hashes. Hashing is CPU bound, so handlers run it on the blocking pool through
//! [`password::hash_blocking`] and [`password::verify_blocking`].
//!
//! # Modules
//!
//! - [`current_user`]: the `CurrentUser` extractor
//! - [`password`]: hashing, verification, token generation and password rules
//! - [`session`]: JWT session tokens and cookies
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use openbioc::api::models::users::CurrentUser;
//!
//! async fn protected_handler(current_user: CurrentUser) -> String {
//!     format!("Hello, {}!", current_user.username)
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod session;
