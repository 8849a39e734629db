//! Natural keys of catalog records.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::Edit;

/// A tool edit as users refer to it: `(name, version, edit)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct ToolKey {
    pub name: String,
    pub version: String,
    pub edit: Edit,
}

impl ToolKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>, edit: Edit) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            edit,
        }
    }
}

impl fmt::Display for ToolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.version, self.edit)
    }
}

/// A workflow edit as users refer to it: `(name, edit)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct WorkflowKey {
    pub name: String,
    pub edit: Edit,
}

impl WorkflowKey {
    pub fn new(name: impl Into<String>, edit: Edit) -> Self {
        Self { name: name.into(), edit }
    }
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.edit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_slash_joined() {
        assert_eq!(ToolKey::new("samtools", "1.9", 2).to_string(), "samtools/1.9/2");
        assert_eq!(WorkflowKey::new("rnaseq", 4).to_string(), "rnaseq/4");
    }
}
