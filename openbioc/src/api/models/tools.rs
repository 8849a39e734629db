//! API request/response models for tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use super::pagination::Pagination;
use crate::{
    catalog::{ToolKey, TreeNode, Variable},
    db::models::tools::{ToolDBResponse, VariableCreateDBRequest},
    types::Edit,
};

/// A configuration variable of a tool edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ToolVariable {
    pub name: String,
    pub value: String,
    pub description: String,
}

impl ToolVariable {
    /// Variables with any blank field are not stored.
    pub fn is_complete(&self) -> bool {
        ![&self.name, &self.value, &self.description].iter().any(|field| field.trim().is_empty())
    }
}

impl From<ToolVariable> for VariableCreateDBRequest {
    fn from(variable: ToolVariable) -> Self {
        Self {
            name: variable.name,
            value: variable.value,
            description: variable.description,
        }
    }
}

impl From<Variable> for ToolVariable {
    fn from(variable: Variable) -> Self {
        Self {
            name: variable.name,
            value: variable.value,
            description: variable.description,
        }
    }
}

/// Body of `POST /tools`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolCreate {
    pub name: String,
    pub version: String,
    pub website: String,
    pub description: String,
    #[serde(default)]
    pub installation_commands: String,
    #[serde(default)]
    pub validation_commands: String,
    /// The edit this one is derived from. Requires `changes`.
    #[serde(default)]
    pub forked_from: Option<ToolKey>,
    #[serde(default)]
    pub changes: Option<String>,
    /// Direct dependencies, in display order
    #[serde(default)]
    pub dependencies: Vec<ToolKey>,
    #[serde(default)]
    pub variables: Vec<ToolVariable>,
}

/// Query parameters of the tool search
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListToolsQuery {
    /// Case-insensitive substring of the tool name
    pub name: Option<String>,
    /// Case-insensitive substring of the tool version
    pub version: Option<String>,
    /// Exact edit number
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub edit: Option<Edit>,

    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

/// Search hits rendered as a provenance forest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    /// Total number of matches, ignoring pagination
    pub count: i64,
    pub tree: Vec<TreeNode>,
}

/// The edit allocated to a newly created tool or workflow
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedEdit {
    pub edit: Edit,
    pub created_at: DateTime<Utc>,
}

/// Everything the tool page shows about one edit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolDetails {
    pub name: String,
    pub version: String,
    pub edit: Edit,
    pub website: String,
    pub description: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub forked_from: Option<ToolKey>,
    pub changes: Option<String>,
    pub installation_commands: String,
    pub validation_commands: String,
    pub variables: Vec<ToolVariable>,
    /// Trees of every direct dependency, each rooted at that dependency
    pub dependencies_tree: Vec<TreeNode>,
    /// Same as `dependencies_tree` with variable leaves
    pub variables_tree: Vec<TreeNode>,
}

impl ToolDetails {
    pub fn new(tool: ToolDBResponse, variables: Vec<ToolVariable>, trees: ToolDependenciesResponse) -> Self {
        let forked_from = tool.forked_from_key();
        Self {
            name: tool.name,
            version: tool.version,
            edit: tool.edit,
            website: tool.website,
            description: tool.description,
            username: tool.username,
            created_at: tool.created_at,
            forked_from,
            changes: tool.changes,
            installation_commands: tool.installation_commands,
            validation_commands: tool.validation_commands,
            variables,
            dependencies_tree: trees.dependencies_tree,
            variables_tree: trees.variables_tree,
        }
    }
}

/// A tool's own dependency tree, rooted at the tool itself
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ToolDependenciesResponse {
    pub dependencies_tree: Vec<TreeNode>,
    pub variables_tree: Vec<TreeNode>,
}
