//! Edit numbering for versioned records.
//!
//! Tools are numbered per `(name, version)` and workflows per `name`. The pure rule lives here;
//! the database layer applies it under a transaction-scoped advisory lock on the scope, backed by
//! a unique constraint on the edit column.

use crate::types::Edit;

/// Scope within which edit numbers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope<'a> {
    Tool { name: &'a str, version: &'a str },
    Workflow { name: &'a str },
}

impl EditScope<'_> {
    /// Stable key used to serialize allocators of the same scope.
    pub fn lock_key(&self) -> String {
        match self {
            EditScope::Tool { name, version } => format!("tool:{}:{}:{}", name.len(), name, version),
            EditScope::Workflow { name } => format!("workflow:{name}"),
        }
    }
}

/// Next edit after the existing ones: 1 for an empty scope, otherwise one past the maximum.
pub fn next_edit<I>(existing: I) -> Edit
where
    I: IntoIterator<Item = Edit>,
{
    existing.into_iter().max().map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scope_starts_at_one() {
        assert_eq!(next_edit(Vec::new()), 1);
        assert_eq!(next_edit(None), 1);
    }

    #[test]
    fn test_gaps_are_not_filled() {
        assert_eq!(next_edit([1, 2, 4]), 5);
        assert_eq!(next_edit([3, 1]), 4);
        assert_eq!(next_edit(Some(7)), 8);
    }

    #[test]
    fn test_lock_keys_do_not_collide_across_scopes() {
        let a = EditScope::Tool { name: "a:b", version: "c" }.lock_key();
        let b = EditScope::Tool { name: "a", version: "b:c" }.lock_key();
        assert_ne!(a, b);
        assert_ne!(EditScope::Workflow { name: "x" }.lock_key(), EditScope::Tool { name: "x", version: "" }.lock_key());
    }
}
