//! API request/response models for workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    catalog::{ToolKey, WorkflowKey},
    db::models::workflows::WorkflowDBResponse,
    types::Edit,
};

/// Body of `POST /workflows`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowCreate {
    pub name: String,
    #[serde(default)]
    pub website: String,
    pub description: String,
    /// The edit this one is derived from. Requires `changes`.
    #[serde(default)]
    pub forked_from: Option<WorkflowKey>,
    #[serde(default)]
    pub changes: Option<String>,
    /// Editor graph document; its unversioned ids are stamped with the allocated edit
    #[schema(value_type = Object)]
    pub graph: Value,
}

#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListWorkflowsQuery {
    /// Case-insensitive substring of the workflow name
    pub name: Option<String>,
    /// Exact edit number
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub edit: Option<Edit>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDetails {
    pub name: String,
    pub edit: Edit,
    pub website: String,
    pub description: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub forked_from: Option<WorkflowKey>,
    pub changes: Option<String>,
    /// The stamped graph document as stored
    #[schema(value_type = Object)]
    pub graph: Value,
    /// Tool edits used by the graph
    pub tools: Vec<ToolKey>,
}

impl WorkflowDetails {
    pub fn new(workflow: WorkflowDBResponse, tools: Vec<ToolKey>) -> Self {
        let forked_from = workflow.forked_from_key();
        Self {
            name: workflow.name,
            edit: workflow.edit,
            website: workflow.website,
            description: workflow.description,
            username: workflow.username,
            created_at: workflow.created_at,
            forked_from,
            changes: workflow.changes,
            graph: workflow.graph.0,
            tools,
        }
    }
}
