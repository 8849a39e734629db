//! Database models for workflows.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, types::Json};

use crate::{
    catalog::{WorkflowGraph, WorkflowKey},
    types::{Edit, UserId, WorkflowId},
};

/// Database request for creating a new workflow edit.
///
/// The graph is still unstamped; the repository stamps it with the allocated edit and links the
/// tools it references.
#[derive(Debug, Clone)]
pub struct WorkflowCreateDBRequest {
    pub name: String,
    pub website: String,
    pub description: String,
    pub forked_from: Option<WorkflowId>,
    pub changes: Option<String>,
    pub graph: WorkflowGraph,
    pub created_by: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowDBResponse {
    pub id: WorkflowId,
    pub name: String,
    pub edit: Edit,
    pub website: String,
    pub description: String,
    pub graph: Json<Value>,
    pub forked_from_id: Option<WorkflowId>,
    pub forked_from_name: Option<String>,
    pub forked_from_edit: Option<Edit>,
    pub changes: Option<String>,
    pub created_by: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDBResponse {
    pub fn key(&self) -> WorkflowKey {
        WorkflowKey::new(self.name.clone(), self.edit)
    }

    pub fn forked_from_key(&self) -> Option<WorkflowKey> {
        match (&self.forked_from_name, self.forked_from_edit) {
            (Some(name), Some(edit)) => Some(WorkflowKey::new(name.clone(), edit)),
            _ => None,
        }
    }
}

/// Filter for searching workflows. Name matches a case-insensitive substring.
#[derive(Debug, Clone)]
pub struct WorkflowFilter {
    pub skip: i64,
    pub limit: i64,
    pub name: Option<String>,
    pub edit: Option<Edit>,
}

impl WorkflowFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            name: None,
            edit: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edit = Some(edit);
        self
    }
}
