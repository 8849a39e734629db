//! Rendering of catalog records into flat parent/child lists for a tree widget.
//!
//! Node ids are JSON-encoded arrays whose last element is a context tag, so the same record shown
//! in two different trees on one page never gets the same id. The tags and the root marker are
//! configuration, see [`TreeConfig`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::dependencies::{DependencyGraph, DependencyPair, Variable};
use super::keys::{ToolKey, WorkflowKey};
use crate::types::Edit;

/// Context tags and markers used when building tree ids.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
    /// Tag for the tool search tree
    pub search_tool: String,
    /// Tag for tool dependency trees
    pub dependency_tool: String,
    /// Tag for variable leaves in dependency trees
    pub variables: String,
    /// Tag for the workflow search tree
    pub search_workflow: String,
    /// Parent value of top-level nodes
    pub root_marker: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            search_tool: "1".to_string(),
            dependency_tool: "2".to_string(),
            variables: "3".to_string(),
            search_workflow: "4".to_string(),
            root_marker: "#".to_string(),
        }
    }
}

impl TreeConfig {
    /// All four context tags, in declaration order.
    pub fn tags(&self) -> [&str; 4] {
        [
            self.search_tool.as_str(),
            self.dependency_tool.as_str(),
            self.variables.as_str(),
            self.search_workflow.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TreeNodeKind {
    Tool,
    Variable,
    Workflow,
}

/// Payload attached to search and variable nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum TreeNodeData {
    Variable {
        #[serde(rename = "type")]
        kind: TreeNodeKind,
        name: String,
        value: String,
        description: String,
    },
    Tool {
        name: String,
        version: String,
        edit: Edit,
    },
    Workflow {
        name: String,
        edit: Edit,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TreeNodeState {
    pub opened: bool,
}

/// One record of a rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TreeNode {
    pub text: String,
    pub id: String,
    pub parent: String,
    #[serde(rename = "type")]
    pub kind: TreeNodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<Edit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<TreeNodeData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TreeNodeState>,
}

/// A search hit together with the edit it was forked from, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEntry<K> {
    pub key: K,
    pub forked_from: Option<K>,
}

fn composite_id(parts: &[&str]) -> String {
    Value::Array(parts.iter().map(|p| Value::String((*p).to_string())).collect()).to_string()
}

pub fn tool_id(key: &ToolKey, tag: &str) -> String {
    composite_id(&[&key.name, &key.version, &key.edit.to_string(), tag])
}

pub fn workflow_id(key: &WorkflowKey, tag: &str) -> String {
    composite_id(&[&key.name, &key.edit.to_string(), tag])
}

pub fn variable_id(variable: &Variable, tag: &str) -> String {
    composite_id(&[&variable.name, &variable.value, &variable.description, tag])
}

pub struct TreeRenderer<'a> {
    config: &'a TreeConfig,
}

impl<'a> TreeRenderer<'a> {
    pub fn new(config: &'a TreeConfig) -> Self {
        Self { config }
    }

    /// Dependency tree using the configured dependency and variable tags.
    pub fn dependency_tree(&self, graph: &DependencyGraph, pairs: &[DependencyPair], include_variables: bool) -> Vec<TreeNode> {
        let variable_tag = include_variables.then_some(self.config.variables.as_str());
        self.render(graph, pairs, &self.config.dependency_tool, variable_tag)
    }

    /// Render flattened pairs with tool ids under `tool_tag`.
    ///
    /// When `variable_tag` is set every tool node is followed by one leaf per variable of that
    /// tool.
    pub fn render(&self, graph: &DependencyGraph, pairs: &[DependencyPair], tool_tag: &str, variable_tag: Option<&str>) -> Vec<TreeNode> {
        let mut nodes = Vec::with_capacity(pairs.len());

        for pair in pairs {
            let tool = graph.node(pair.dependency);
            let id = tool_id(&tool.key, tool_tag);
            let parent = match pair.dependant {
                Some(dependant) => tool_id(&graph.node(dependant).key, tool_tag),
                None => self.config.root_marker.clone(),
            };

            nodes.push(TreeNode {
                text: tool.key.to_string(),
                id: id.clone(),
                parent,
                kind: TreeNodeKind::Tool,
                name: Some(tool.key.name.clone()),
                version: Some(tool.key.version.clone()),
                edit: Some(tool.key.edit),
                data: None,
                state: None,
            });

            if let Some(variable_tag) = variable_tag {
                nodes.extend(tool.variables.iter().map(|variable| TreeNode {
                    text: format!("{}:{}", variable.name, variable.description),
                    id: variable_id(variable, variable_tag),
                    parent: id.clone(),
                    kind: TreeNodeKind::Variable,
                    name: None,
                    version: None,
                    edit: None,
                    data: Some(TreeNodeData::Variable {
                        kind: TreeNodeKind::Variable,
                        name: variable.name.clone(),
                        value: variable.value.clone(),
                        description: variable.description.clone(),
                    }),
                    state: None,
                }));
            }
        }

        nodes
    }

    /// Forest of tool search hits, each parented to the tool it was forked from.
    pub fn tool_search_tree(&self, entries: &[SearchEntry<ToolKey>]) -> Vec<TreeNode> {
        let tag = &self.config.search_tool;
        entries
            .iter()
            .map(|entry| TreeNode {
                text: entry.key.to_string(),
                id: tool_id(&entry.key, tag),
                parent: entry
                    .forked_from
                    .as_ref()
                    .map_or_else(|| self.config.root_marker.clone(), |source| tool_id(source, tag)),
                kind: TreeNodeKind::Tool,
                name: None,
                version: None,
                edit: None,
                data: Some(TreeNodeData::Tool {
                    name: entry.key.name.clone(),
                    version: entry.key.version.clone(),
                    edit: entry.key.edit,
                }),
                state: Some(TreeNodeState { opened: true }),
            })
            .collect()
    }

    /// Forest of workflow search hits, each parented to the workflow it was forked from.
    pub fn workflow_search_tree(&self, entries: &[SearchEntry<WorkflowKey>]) -> Vec<TreeNode> {
        let tag = &self.config.search_workflow;
        entries
            .iter()
            .map(|entry| TreeNode {
                text: entry.key.to_string(),
                id: workflow_id(&entry.key, tag),
                parent: entry
                    .forked_from
                    .as_ref()
                    .map_or_else(|| self.config.root_marker.clone(), |source| workflow_id(source, tag)),
                kind: TreeNodeKind::Workflow,
                name: None,
                version: None,
                edit: None,
                data: Some(TreeNodeData::Workflow {
                    name: entry.key.name.clone(),
                    edit: entry.key.edit,
                }),
                state: Some(TreeNodeState { opened: true }),
            })
            .collect()
    }
}
