//! Identifier aliases shared across the crate.
//!
//! Every stored entity is keyed by a UUID; the aliases only document intent at call sites. Edits
//! are the per-scope revision counters of tools and workflows and start at 1.

use uuid::Uuid;

pub type UserId = Uuid;
pub type ToolId = Uuid;
pub type WorkflowId = Uuid;
pub type VariableId = Uuid;

/// Revision number of a tool or workflow within its scope.
pub type Edit = i32;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
