use thiserror::Error;

/// Failures raised by the catalog core.
///
/// These are returned synchronously to the caller; nothing here retries or partially applies a
/// change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A referenced tool, workflow or dependency edit does not exist
    #[error("{resource} {key} not found")]
    NotFound { resource: &'static str, key: String },

    /// The workflow graph document does not have the expected shape
    #[error("Malformed workflow graph: {reason}")]
    MalformedGraph { reason: String },

    /// Two entries share a name where names must be unique
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    /// A tool was reached again while it was still being expanded
    #[error("Cyclic dependency detected: {tool} depends on itself")]
    CyclicDependency { tool: String },
}

impl CatalogError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CatalogError::MalformedGraph { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
