//! Database models for tools, their variables and dependency edges.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    catalog::{ToolKey, Variable},
    types::{Edit, ToolId, UserId, VariableId},
};

/// Database request for creating a new tool edit.
///
/// References to other tools are already resolved to ids; the edit number is allocated by the
/// repository.
#[derive(Debug, Clone)]
pub struct ToolCreateDBRequest {
    pub name: String,
    pub version: String,
    pub website: String,
    pub description: String,
    pub installation_commands: String,
    pub validation_commands: String,
    pub forked_from: Option<ToolId>,
    pub changes: Option<String>,
    /// Direct dependencies, in the order they should be listed
    pub dependencies: Vec<ToolId>,
    pub variables: Vec<VariableCreateDBRequest>,
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCreateDBRequest {
    pub name: String,
    pub value: String,
    pub description: String,
}

/// A tool edit joined with its owner's username and the key of the edit it was forked from.
#[derive(Debug, Clone, FromRow)]
pub struct ToolDBResponse {
    pub id: ToolId,
    pub name: String,
    pub version: String,
    pub edit: Edit,
    pub website: String,
    pub description: String,
    pub installation_commands: String,
    pub validation_commands: String,
    pub forked_from_id: Option<ToolId>,
    pub forked_from_name: Option<String>,
    pub forked_from_version: Option<String>,
    pub forked_from_edit: Option<Edit>,
    pub changes: Option<String>,
    pub created_by: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl ToolDBResponse {
    pub fn key(&self) -> ToolKey {
        ToolKey::new(self.name.clone(), self.version.clone(), self.edit)
    }

    pub fn forked_from_key(&self) -> Option<ToolKey> {
        match (&self.forked_from_name, &self.forked_from_version, self.forked_from_edit) {
            (Some(name), Some(version), Some(edit)) => Some(ToolKey::new(name.clone(), version.clone(), edit)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ToolVariableDBResponse {
    pub id: VariableId,
    pub tool_id: ToolId,
    pub name: String,
    pub value: String,
    pub description: String,
    pub position: i32,
}

impl From<ToolVariableDBResponse> for Variable {
    fn from(row: ToolVariableDBResponse) -> Self {
        Variable {
            name: row.name,
            value: row.value,
            description: row.description,
        }
    }
}

/// Filter for searching tools. Name and version match case-insensitive substrings.
#[derive(Debug, Clone)]
pub struct ToolFilter {
    pub skip: i64,
    pub limit: i64,
    pub name: Option<String>,
    pub version: Option<String>,
    pub edit: Option<Edit>,
}

impl ToolFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            name: None,
            version: None,
            edit: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edit = Some(edit);
        self
    }
}
