//! Edit allocation inside an open transaction.
//!
//! [`allocate_edit`] takes a transaction-scoped advisory lock on the scope before reading the
//! current maximum, so two writers in the same scope are serialized until the first one commits.
//! The unique `(name[, version], edit)` constraints back this up for writers that bypass the lock.

use sqlx::PgConnection;
use tracing::{instrument, trace};

use crate::{
    catalog::{EditScope, next_edit},
    db::errors::Result,
    types::Edit,
};

/// Unique constraint that guards tool edit numbers.
pub const TOOL_EDIT_CONSTRAINT: &str = "tools_name_version_edit_unique";
/// Unique constraint that guards workflow edit numbers.
pub const WORKFLOW_EDIT_CONSTRAINT: &str = "workflows_name_edit_unique";

/// Default number of attempts when an insert loses an edit number race.
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 3;

/// Lock `scope` for the rest of the transaction and return the next free edit in it.
///
/// Must be called on a connection inside a transaction; outside one the lock is released as soon
/// as the statement finishes.
#[instrument(skip(conn), fields(scope = %scope.lock_key()), err)]
pub async fn allocate_edit(conn: &mut PgConnection, scope: EditScope<'_>) -> Result<Edit> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(scope.lock_key())
        .execute(&mut *conn)
        .await?;

    let current: Option<Edit> = match scope {
        EditScope::Tool { name, version } => {
            sqlx::query_scalar("SELECT MAX(edit) FROM tools WHERE name = $1 AND version = $2")
                .bind(name)
                .bind(version)
                .fetch_one(&mut *conn)
                .await?
        }
        EditScope::Workflow { name } => {
            sqlx::query_scalar("SELECT MAX(edit) FROM workflows WHERE name = $1")
                .bind(name)
                .fetch_one(&mut *conn)
                .await?
        }
    };

    let edit = next_edit(current);
    trace!(edit, "Allocated edit");
    Ok(edit)
}
