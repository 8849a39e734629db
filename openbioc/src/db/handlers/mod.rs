//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction) and
//! returns models from [`crate::db::models`]. Writes that touch several tables open their own
//! transaction on top of whatever connection they were given, which becomes a savepoint when the
//! caller is already inside one.
//!
//! - [`Users`]: accounts and profiles
//! - [`Tools`]: tool edits, variables and dependency graphs
//! - [`Workflows`]: workflow edits and their stamped graphs
//! - [`edits`]: edit number allocation shared by both catalogs
//!
//! ```ignore
//! use openbioc::db::handlers::{Repository, Tools};
//!
//! let mut conn = pool.acquire().await?;
//! let tool = Tools::new(&mut conn).create(&request).await?;
//! println!("created {}", tool.key());
//! ```

pub mod edits;
pub mod repository;
pub mod tools;
pub mod users;
pub mod workflows;

pub use repository::Repository;
pub use tools::Tools;
pub use users::Users;
pub use workflows::Workflows;

/// Case-insensitive substring pattern for `LIKE ... ESCAPE '\'`, with `%`, `_` and `\` in `term`
/// matched literally.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
