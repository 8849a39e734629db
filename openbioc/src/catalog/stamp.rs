//! Stamping a freshly allocated edit number into a workflow graph document.
//!
//! The editor builds new workflows before an edit exists, so it writes the placeholder `__null`
//! wherever the edit belongs in ids and scripts, and leaves `belongto.edit` empty on the nodes it
//! created. Once the edit is allocated the document is rewritten in place. Edge ids that still
//! contain `_null` are rebuilt as `source..target`, the same rule the editor uses.

use super::errors::{CatalogError, Result};
use super::workflow_graph::{
    BelongTo, GraphEdge, IoNode, NodeData, NodeScripts, NodeVisitor, StepNode, ToolNode, WorkflowGraph, WorkflowNode,
    is_unset, present,
};
use crate::types::Edit;

pub const EDIT_PLACEHOLDER: &str = "__null";
const UNSTAMPED_EDGE_MARKER: &str = "_null";
const EDGE_ID_SEPARATOR: &str = "..";

/// Edge id for a `source -> target` edge.
pub fn edge_id(source: &str, target: &str) -> String {
    format!("{source}{EDGE_ID_SEPARATOR}{target}")
}

/// Rewrites one document for a given edit.
pub struct WorkflowVersionStamper {
    belongto: BelongTo,
    replacement: String,
}

impl WorkflowVersionStamper {
    fn new(name: Option<String>, edit: Edit) -> Self {
        Self {
            belongto: BelongTo {
                name,
                edit: Some(edit),
                ..Default::default()
            },
            replacement: format!("__{edit}"),
        }
    }

    fn substitute(&self, value: &mut String) {
        if value.contains(EDIT_PLACEHOLDER) {
            *value = value.replace(EDIT_PLACEHOLDER, &self.replacement);
        }
    }

    fn substitute_all(&self, values: &mut Option<Option<Vec<String>>>) {
        for value in values.iter_mut().flatten().flatten() {
            self.substitute(value);
        }
    }

    /// Id, script and re-parenting rewrites shared by every node kind.
    fn stamp_common(&self, id: &mut String, belongto: &mut Option<BelongTo>, scripts: &mut NodeScripts) {
        if let Some(current) = belongto
            && is_unset(current.edit)
        {
            *current = self.belongto.clone();
        }
        self.substitute(id);
        if let Some(Some(bash)) = scripts.bash.as_mut() {
            self.substitute(bash);
        }
        self.substitute_all(&mut scripts.steps);
        self.substitute_all(&mut scripts.inputs);
        self.substitute_all(&mut scripts.outputs);
    }

    fn stamp_edge(&self, edge: &mut GraphEdge) {
        let data = &mut edge.data;
        self.substitute(&mut data.source);
        self.substitute(&mut data.target);
        if data.id.contains(UNSTAMPED_EDGE_MARKER) {
            data.id = edge_id(&data.source, &data.target);
        }
    }
}

impl NodeVisitor for WorkflowVersionStamper {
    fn visit_workflow(&mut self, node: &mut WorkflowNode) {
        self.stamp_common(&mut node.id, &mut node.belongto, &mut node.scripts);
    }

    fn visit_step(&mut self, node: &mut StepNode) {
        self.stamp_common(&mut node.id, &mut node.belongto, &mut node.scripts);
    }

    fn visit_tool(&mut self, node: &mut ToolNode) {
        self.stamp_common(&mut node.id, &mut node.belongto, &mut node.scripts);
    }

    fn visit_input(&mut self, node: &mut IoNode) {
        self.stamp_common(&mut node.id, &mut node.belongto, &mut node.scripts);
    }

    fn visit_output(&mut self, node: &mut IoNode) {
        self.stamp_common(&mut node.id, &mut node.belongto, &mut node.scripts);
    }
}

/// Assign `edit` to the root workflow node being created and propagate it through the document.
///
/// The root is the single `workflow` node whose edit is unset. A document whose top-level
/// workflow node already carries `edit` is treated as stamped and left as it is. Returns the
/// `belongto` descriptor of the root.
pub fn stamp_edit(graph: &mut WorkflowGraph, edit: Edit) -> Result<BelongTo> {
    let name = set_root_edit(graph, edit)?;
    let mut stamper = WorkflowVersionStamper::new(name, edit);

    for node in &mut graph.elements.nodes {
        node.data.accept(&mut stamper);
    }
    for edge in &mut graph.elements.edges {
        stamper.stamp_edge(edge);
    }

    Ok(stamper.belongto)
}

fn set_root_edit(graph: &mut WorkflowGraph, edit: Edit) -> Result<Option<String>> {
    let mut unset: Vec<&mut WorkflowNode> = Vec::new();
    let mut stamped_roots = 0usize;
    let mut stamped_name = None;

    for node in &mut graph.elements.nodes {
        if let NodeData::Workflow(workflow) = &mut node.data {
            if is_unset(workflow.edit) {
                unset.push(workflow);
            } else if workflow.belongto.is_none() && workflow.edit == Some(edit) {
                stamped_roots += 1;
                stamped_name = present(&workflow.name).cloned();
            }
        }
    }

    match unset.as_mut_slice() {
        [root] => {
            root.edit = Some(edit);
            Ok(present(&root.name).cloned())
        }
        [] if stamped_roots == 1 => Ok(stamped_name),
        [] => Err(CatalogError::malformed("no workflow node without an edit")),
        many => Err(CatalogError::malformed(format!(
            "expected one workflow node without an edit, found {}",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn stamp(document: Value, edit: Edit) -> Result<Value> {
        let mut graph = WorkflowGraph::from_value(document)?;
        stamp_edit(&mut graph, edit)?;
        Ok(serde_json::to_value(&graph).unwrap())
    }

    fn example() -> Value {
        json!({
            "elements": {
                "nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "edit": null, "belongto": null}},
                    {"data": {"id": "step1__null", "type": "step", "belongto": {"edit": null}}}
                ],
                "edges": [
                    {"data": {"id": "wf__null_null..step1__null", "source": "wf__null", "target": "step1__null"}}
                ]
            }
        })
    }

    #[test]
    fn test_example_document() {
        let stamped = stamp(example(), 3).unwrap();

        let nodes = &stamped["elements"]["nodes"];
        assert_eq!(nodes[0]["data"]["id"], "wf__3");
        assert_eq!(nodes[0]["data"]["edit"], 3);
        assert_eq!(nodes[1]["data"]["id"], "step1__3");
        assert_eq!(nodes[1]["data"]["belongto"], json!({"name": null, "edit": 3}));

        let edge = &stamped["elements"]["edges"][0]["data"];
        assert_eq!(edge["id"], "wf__3..step1__3");
        assert_eq!(edge["source"], "wf__3");
        assert_eq!(edge["target"], "step1__3");
    }

    #[test]
    fn test_named_root_becomes_belongto() {
        let mut graph = WorkflowGraph::from_value(json!({
            "elements": {"nodes": [
                {"data": {"id": "rnaseq__null", "type": "workflow", "name": "rnaseq", "edit": null, "belongto": null}},
                {"data": {"id": "out__null", "type": "output", "belongto": {"name": "rnaseq", "edit": null}}}
            ]}
        }))
        .unwrap();

        let belongto = stamp_edit(&mut graph, 7).unwrap();
        assert_eq!(belongto.name.as_deref(), Some("rnaseq"));
        assert_eq!(belongto.edit, Some(7));

        match &graph.elements.nodes[1].data {
            NodeData::Output(node) => assert_eq!(node.belongto, Some(belongto)),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_step_fields_rewritten() {
        let stamped = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "name": "wf", "edit": null, "belongto": null}},
                    {"data": {
                        "id": "main__wf__null", "type": "step", "belongto": {"name": "wf", "edit": null},
                        "bash": "step__other__wf__null && echo $input__reads__wf__null",
                        "steps": ["step__other__wf__null", "step__lib__lib__2"],
                        "inputs": ["input__reads__wf__null"],
                        "outputs": ["output__bam__wf__null"]
                    }}
                ]}
            }),
            2,
        )
        .unwrap();

        let step = &stamped["elements"]["nodes"][1]["data"];
        assert_eq!(step["id"], "main__wf__2");
        assert_eq!(step["bash"], "step__other__wf__2 && echo $input__reads__wf__2");
        assert_eq!(step["steps"], json!(["step__other__wf__2", "step__lib__lib__2"]));
        assert_eq!(step["inputs"], json!(["input__reads__wf__2"]));
        assert_eq!(step["outputs"], json!(["output__bam__wf__2"]));
    }

    #[test]
    fn test_script_fields_rewritten_on_every_kind() {
        let stamped = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "name": "wf", "edit": null, "belongto": null,
                              "inputs": ["input__reads__wf__null"], "outputs": ["output__bam__wf__null"]}},
                    {"data": {"id": "input__reads__wf__null", "type": "input", "belongto": {"name": "wf", "edit": null},
                              "bash": "echo $input__reads__wf__null"}},
                    {"data": {"id": "output__bam__wf__null", "type": "output", "belongto": {"name": "wf", "edit": null},
                              "steps": ["step__main__wf__null"]}},
                    {"data": {"id": "t", "type": "tool", "name": "bwa", "version": "1", "edit": 1, "belongto": null,
                              "bash": "bwa mem $input__reads__wf__null"}}
                ]}
            }),
            2,
        )
        .unwrap();

        let nodes = &stamped["elements"]["nodes"];
        assert_eq!(nodes[0]["data"]["inputs"], json!(["input__reads__wf__2"]));
        assert_eq!(nodes[0]["data"]["outputs"], json!(["output__bam__wf__2"]));
        assert_eq!(nodes[1]["data"]["id"], "input__reads__wf__2");
        assert_eq!(nodes[1]["data"]["bash"], "echo $input__reads__wf__2");
        assert_eq!(nodes[2]["data"]["steps"], json!(["step__main__wf__2"]));
        assert_eq!(nodes[3]["data"]["bash"], "bwa mem $input__reads__wf__2");
    }

    #[test]
    fn test_null_script_fields_survive_stamping() {
        let stamped = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "name": null, "edit": null, "belongto": null, "bash": null}}
                ]}
            }),
            1,
        )
        .unwrap();

        let root = &stamped["elements"]["nodes"][0]["data"];
        assert_eq!(root["name"], Value::Null);
        assert_eq!(root["bash"], Value::Null);
        assert!(root.as_object().unwrap().contains_key("bash"));
    }

    #[test]
    fn test_imported_nodes_keep_their_owner() {
        let stamped = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "wf__null", "type": "workflow", "name": "wf", "edit": null, "belongto": null}},
                    {"data": {"id": "lib__4", "type": "workflow", "name": "lib", "edit": 4, "belongto": {"name": "wf", "edit": null}}},
                    {"data": {"id": "s__lib__4", "type": "step", "belongto": {"name": "lib", "edit": 4}}},
                    {"data": {"id": "t", "type": "tool", "name": "bwa", "version": "1", "edit": 1, "belongto": null}}
                ]}
            }),
            5,
        )
        .unwrap();

        let nodes = &stamped["elements"]["nodes"];
        // nested workflow is re-parented to the new root but keeps its own edit
        assert_eq!(nodes[1]["data"]["edit"], 4);
        assert_eq!(nodes[1]["data"]["belongto"], json!({"name": "wf", "edit": 5}));
        assert_eq!(nodes[2]["data"]["belongto"], json!({"name": "lib", "edit": 4}));
        assert_eq!(nodes[3]["data"]["belongto"], Value::Null);
    }

    #[test]
    fn test_stamping_twice_is_a_no_op() {
        let once = stamp(example(), 3).unwrap();
        let twice = stamp(once.clone(), 3).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_two_unset_roots_are_malformed() {
        let result = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "a__null", "type": "workflow", "edit": null, "belongto": null}},
                    {"data": {"id": "b__null", "type": "workflow", "edit": 0, "belongto": null}}
                ]}
            }),
            1,
        );
        assert!(matches!(result, Err(CatalogError::MalformedGraph { .. })));
    }

    #[test]
    fn test_missing_root_is_malformed() {
        let result = stamp(
            json!({
                "elements": {"nodes": [
                    {"data": {"id": "s__null", "type": "step", "belongto": {"edit": null}}}
                ]}
            }),
            1,
        );
        assert!(matches!(result, Err(CatalogError::MalformedGraph { .. })));
    }

    #[test]
    fn test_already_stamped_with_other_edit_is_malformed() {
        let once = stamp(example(), 3).unwrap();
        assert!(matches!(stamp(once, 4), Err(CatalogError::MalformedGraph { .. })));
    }

    #[test]
    fn test_stamped_edge_ids_left_alone() {
        let stamped = stamp(
            json!({
                "elements": {
                    "nodes": [{"data": {"id": "wf__null", "type": "workflow", "edit": null, "belongto": null}}],
                    "edges": [{"data": {"id": "x__1..y__1", "source": "x__1", "target": "y__1"}}]
                }
            }),
            9,
        )
        .unwrap();
        assert_eq!(stamped["elements"]["edges"][0]["data"]["id"], "x__1..y__1");
    }

    #[test]
    fn test_edge_id_format() {
        assert_eq!(edge_id("a__1", "b__1"), "a__1..b__1");
    }
}
