//! Typed model of the workflow graph document submitted by the editor.
//!
//! The document is a cytoscape-style `{elements: {nodes, edges}}` object. Node payloads are
//! discriminated by `data.type`; each kind lists the fields the catalog reads or rewrites, and
//! anything else is carried along untouched in the `extra` maps so a stored document round-trips.

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Map, Value};
use serde_with::rust::double_option;

use super::errors::{CatalogError, Result};
use super::keys::ToolKey;
use crate::types::Edit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub elements: Elements,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub data: NodeData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub data: EdgeData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference from a node to the workflow edit it belongs to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BelongTo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_edit")]
    pub edit: Option<Edit>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeData {
    Workflow(WorkflowNode),
    Step(StepNode),
    Tool(ToolNode),
    Input(IoNode),
    Output(IoNode),
}

/// Fields any node kind may carry that can mention the edit placeholder.
///
/// Absent and `null` are kept apart so a stored document keeps exactly the keys it was sent with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeScripts {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub bash: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub steps: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub inputs: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub outputs: Option<Option<Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_edit")]
    pub edit: Option<Edit>,
    #[serde(default)]
    pub belongto: Option<BelongTo>,
    #[serde(flatten)]
    pub scripts: NodeScripts,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub name: Option<Option<String>>,
    #[serde(default)]
    pub belongto: Option<BelongTo>,
    #[serde(flatten)]
    pub scripts: NodeScripts,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A tool used by the workflow, referenced by its exact edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub version: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_edit")]
    pub edit: Option<Edit>,
    #[serde(default)]
    pub belongto: Option<BelongTo>,
    #[serde(flatten)]
    pub scripts: NodeScripts,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    pub name: Option<Option<String>>,
    #[serde(default)]
    pub belongto: Option<BelongTo>,
    #[serde(flatten)]
    pub scripts: NodeScripts,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Value of a field that may be absent or explicitly `null`.
pub fn present<T>(field: &Option<Option<T>>) -> Option<&T> {
    field.as_ref().and_then(Option::as_ref)
}

/// Per-kind callbacks over mutable node payloads.
pub trait NodeVisitor {
    fn visit_workflow(&mut self, _node: &mut WorkflowNode) {}
    fn visit_step(&mut self, _node: &mut StepNode) {}
    fn visit_tool(&mut self, _node: &mut ToolNode) {}
    fn visit_input(&mut self, _node: &mut IoNode) {}
    fn visit_output(&mut self, _node: &mut IoNode) {}
}

impl NodeData {
    pub fn accept<V: NodeVisitor + ?Sized>(&mut self, visitor: &mut V) {
        match self {
            NodeData::Workflow(node) => visitor.visit_workflow(node),
            NodeData::Step(node) => visitor.visit_step(node),
            NodeData::Tool(node) => visitor.visit_tool(node),
            NodeData::Input(node) => visitor.visit_input(node),
            NodeData::Output(node) => visitor.visit_output(node),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            NodeData::Workflow(node) => &node.id,
            NodeData::Step(node) => &node.id,
            NodeData::Tool(node) => &node.id,
            NodeData::Input(node) | NodeData::Output(node) => &node.id,
        }
    }
}

/// An edit counts as unset when it is missing, null, empty or zero.
pub fn is_unset(edit: Option<Edit>) -> bool {
    matches!(edit, None | Some(0))
}

impl WorkflowGraph {
    /// Parse a submitted document, rejecting anything that does not fit the node model.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| CatalogError::malformed(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.elements.nodes.is_empty() && self.elements.edges.is_empty()
    }

    /// Exact tool edits referenced by `tool` nodes, in document order without repeats.
    pub fn tool_references(&self) -> Result<Vec<ToolKey>> {
        let mut keys: Vec<ToolKey> = Vec::new();
        for node in &self.elements.nodes {
            let NodeData::Tool(tool) = &node.data else {
                continue;
            };
            let (Some(name), Some(version), Some(edit)) = (present(&tool.name), present(&tool.version), tool.edit) else {
                return Err(CatalogError::malformed(format!(
                    "tool node {} must carry name, version and edit",
                    tool.id
                )));
            };
            let key = ToolKey::new(name.clone(), version.clone(), edit);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Accepts the shapes editors send for an edit: number, numeric string, empty string or null.
fn deserialize_edit<'de, D>(deserializer: D) -> std::result::Result<Option<Edit>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| Edit::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid edit {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<Edit>().map(Some).map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("invalid edit {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_node_kinds() {
        let graph = WorkflowGraph::from_value(json!({
            "elements": {
                "nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "name": "wf", "edit": null, "belongto": null}},
                    {"data": {"id": "s__null", "type": "step", "bash": "echo", "steps": [], "belongto": {"name": "wf", "edit": null}}},
                    {"data": {"id": "t", "type": "tool", "name": "bwa", "version": "0.7", "edit": "2", "belongto": null}},
                    {"data": {"id": "i", "type": "input", "belongto": null}},
                    {"data": {"id": "o", "type": "output", "belongto": null}}
                ],
                "edges": []
            }
        }))
        .unwrap();

        let kinds: Vec<&str> = graph
            .elements
            .nodes
            .iter()
            .map(|n| match n.data {
                NodeData::Workflow(_) => "workflow",
                NodeData::Step(_) => "step",
                NodeData::Tool(_) => "tool",
                NodeData::Input(_) => "input",
                NodeData::Output(_) => "output",
            })
            .collect();
        assert_eq!(kinds, vec!["workflow", "step", "tool", "input", "output"]);

        match &graph.elements.nodes[2].data {
            NodeData::Tool(tool) => assert_eq!(tool.edit, Some(2)),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let input = json!({
            "elements": {
                "nodes": [
                    {"data": {"id": "wf__1", "type": "workflow", "name": "wf", "edit": 1, "belongto": null, "label": "WF"},
                     "position": {"x": 1.5, "y": 2.0}}
                ],
                "edges": [
                    {"data": {"id": "a..b", "source": "a", "target": "b", "weight": 3}}
                ]
            },
            "zoom": 1
        });

        let graph = WorkflowGraph::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&graph).unwrap(), input);
    }

    #[test]
    fn test_null_and_absent_keys_round_trip() {
        let input = json!({
            "elements": {
                "nodes": [
                    {"data": {"id": "wf__1", "type": "workflow", "name": null, "edit": 1, "belongto": null}},
                    {"data": {"id": "t", "type": "tool", "name": "bwa", "version": null, "edit": 1, "belongto": null}},
                    {"data": {"id": "s", "type": "step", "belongto": null, "bash": null, "inputs": []}},
                    {"data": {"id": "i", "type": "input", "belongto": null}}
                ],
                "edges": []
            }
        });

        let graph = WorkflowGraph::from_value(input.clone()).unwrap();
        assert_eq!(serde_json::to_value(&graph).unwrap(), input);
    }

    #[test]
    fn test_script_fields_parsed_on_every_kind() {
        let graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [
                {"data": {"id": "wf", "type": "workflow", "edit": 1, "inputs": ["input__reads__wf__1"]}},
                {"data": {"id": "i", "type": "input", "bash": "echo"}}
            ]}
        }))
        .unwrap();

        match &graph.elements.nodes[0].data {
            NodeData::Workflow(node) => {
                assert_eq!(present(&node.scripts.inputs), Some(&vec!["input__reads__wf__1".to_string()]));
                assert!(node.extra.is_empty());
            }
            other => panic!("unexpected node {other:?}"),
        }
        match &graph.elements.nodes[1].data {
            NodeData::Input(node) => assert_eq!(present(&node.scripts.bash).map(String::as_str), Some("echo")),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_tool_reference_with_null_version_is_malformed() {
        let graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [
                {"data": {"id": "t1", "type": "tool", "name": "bwa", "version": null, "edit": 1, "belongto": null}}
            ]}
        }))
        .unwrap();
        assert!(matches!(graph.tool_references(), Err(CatalogError::MalformedGraph { .. })));
    }

    #[test]
    fn test_unknown_node_kind_is_malformed() {
        let result = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [{"data": {"id": "x", "type": "widget"}}]}
        }));
        assert!(matches!(result, Err(CatalogError::MalformedGraph { .. })));
    }

    #[test]
    fn test_missing_elements_is_malformed() {
        assert!(matches!(
            WorkflowGraph::from_value(json!({"nodes": []})),
            Err(CatalogError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_unset_edits() {
        assert!(is_unset(None));
        assert!(is_unset(Some(0)));
        assert!(!is_unset(Some(1)));

        let graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [{"data": {"id": "w", "type": "workflow", "edit": ""}}]}
        }))
        .unwrap();
        match &graph.elements.nodes[0].data {
            NodeData::Workflow(node) => assert_eq!(node.edit, None),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_tool_references_deduplicated() {
        let graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [
                {"data": {"id": "t1", "type": "tool", "name": "bwa", "version": "0.7", "edit": 1, "belongto": null}},
                {"data": {"id": "t2", "type": "tool", "name": "bwa", "version": "0.7", "edit": 1, "belongto": null}},
                {"data": {"id": "t3", "type": "tool", "name": "samtools", "version": "1.9", "edit": 2, "belongto": null}}
            ]}
        }))
        .unwrap();

        assert_eq!(
            graph.tool_references().unwrap(),
            vec![ToolKey::new("bwa", "0.7", 1), ToolKey::new("samtools", "1.9", 2)]
        );
    }

    #[test]
    fn test_tool_reference_without_edit_is_malformed() {
        let graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [
                {"data": {"id": "t1", "type": "tool", "name": "bwa", "version": "0.7", "belongto": null}}
            ]}
        }))
        .unwrap();
        assert!(matches!(graph.tool_references(), Err(CatalogError::MalformedGraph { .. })));
    }
}
