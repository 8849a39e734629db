//! Tool dependency graphs and their depth-first flattening.
//!
//! A [`DependencyGraph`] is an arena of tool nodes addressed by [`NodeId`]. Each node keeps its
//! direct dependencies in insertion order, which is also the order the UI expects siblings to
//! appear in. [`DependencyGraph::flatten`] walks the graph with an explicit stack and reports a
//! [`CatalogError::CyclicDependency`] instead of recursing forever when a tool is reached again
//! while it is still being expanded.

use std::collections::HashMap;

use super::errors::{CatalogError, Result};
use super::keys::ToolKey;

/// Index of a tool inside a [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A configuration variable owned by a tool edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct ToolNode {
    pub key: ToolKey,
    pub variables: Vec<Variable>,
    dependencies: Vec<NodeId>,
}

/// One step of a flattened dependency walk.
///
/// `dependant` is `None` only for the leading root entry emitted when the root is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyPair {
    pub dependant: Option<NodeId>,
    pub dependency: NodeId,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ToolNode>,
    by_key: HashMap<ToolKey, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, or return the existing node for the same key.
    pub fn insert(&mut self, key: ToolKey, variables: Vec<Variable>) -> NodeId {
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.by_key.insert(key.clone(), id);
        self.nodes.push(ToolNode {
            key,
            variables,
            dependencies: Vec::new(),
        });
        id
    }

    /// Record that `dependant` depends on `dependency`, after any dependencies added before.
    pub fn add_dependency(&mut self, dependant: NodeId, dependency: NodeId) {
        self.nodes[dependant.0].dependencies.push(dependency);
    }

    pub fn find(&self, key: &ToolKey) -> Option<NodeId> {
        self.by_key.get(key).copied()
    }

    pub fn node(&self, id: NodeId) -> &ToolNode {
        &self.nodes[id.0]
    }

    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].dependencies
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order depth-first enumeration of the dependency edges below `root`.
    ///
    /// With `include_root` the walk starts with `{None, root}`. Every edge `{tool, d}` is followed
    /// by the flattening of `d`, so a tool reachable along two paths shows up once per path.
    pub fn flatten(&self, root: NodeId, include_root: bool) -> Result<Vec<DependencyPair>> {
        let mut pairs = Vec::new();
        if include_root {
            pairs.push(DependencyPair {
                dependant: None,
                dependency: root,
            });
        }

        let mut on_path = vec![false; self.nodes.len()];
        on_path[root.0] = true;
        // (node, index of the next dependency to visit)
        let mut stack = vec![(root, 0usize)];

        while let Some(&(node, cursor)) = stack.last() {
            match self.nodes[node.0].dependencies.get(cursor).copied() {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    if on_path[child.0] {
                        return Err(CatalogError::CyclicDependency {
                            tool: self.nodes[child.0].key.to_string(),
                        });
                    }
                    pairs.push(DependencyPair {
                        dependant: Some(node),
                        dependency: child,
                    });
                    on_path[child.0] = true;
                    stack.push((child, 0));
                }
                None => {
                    on_path[node.0] = false;
                    stack.pop();
                }
            }
        }

        Ok(pairs)
    }
}
