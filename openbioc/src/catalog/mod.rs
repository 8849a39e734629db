//! Catalog core: dependency flattening, tree rendering, edit numbering and workflow stamping.
//!
//! Everything in this module is synchronous and storage-agnostic. The database layer loads
//! records into these types and the API layer serializes what comes out.

pub mod dependencies;
pub mod edits;
pub mod errors;
pub mod keys;
pub mod stamp;
pub mod tree;
pub mod workflow_graph;

pub use dependencies::{DependencyGraph, DependencyPair, NodeId, Variable};
pub use edits::{EditScope, next_edit};
pub use errors::CatalogError;
pub use keys::{ToolKey, WorkflowKey};
pub use stamp::stamp_edit;
pub use tree::{SearchEntry, TreeConfig, TreeNode, TreeRenderer};
pub use workflow_graph::WorkflowGraph;
