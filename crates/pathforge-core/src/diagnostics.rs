//! Soft diagnostics: reported, never fatal.
//!
//! Each diagnostic is logged as a `tracing` warning when it is raised and also
//! kept in the output of the operation that raised it.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The record is grouped under an id that is not part of the input.
    MissingParent { id: String, group_id: String },
    /// An entity reference whose terminal class has no root type.
    UnresolvedReference { id: String, class: String },
    DuplicateId { id: String },
    /// Two roots share a terminal class; the later one wins.
    DuplicateRootClass { class: String, kept: String, dropped: String },
    /// Grouping chain that never reaches a root (e.g. `a` grouped under `b` under `a`).
    Unreachable { id: String },
    /// Include/exclude list names a field the node does not have.
    UnknownFilterField { node: String, field: String, at: String },
    /// Single-level wildcard used on a node without fields.
    EmptyWildcard { node: String, wildcard: String, at: String },
}

impl Diagnostic {
    /// Log as a warning and push onto `sink`.
    pub fn emit(self, sink: &mut Vec<Diagnostic>) {
        tracing::warn!("{self}");
        sink.push(self);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingParent { id, group_id } => {
                write!(f, "path '{id}' is grouped under nonexisting parent path '{group_id}'")
            }
            Diagnostic::UnresolvedReference { id, class } => write!(
                f,
                "path '{id}' is an entity reference, but no known path for target class '{class}'"
            ),
            Diagnostic::DuplicateId { id } => {
                write!(f, "path id '{id}' is defined more than once, keeping the last one")
            }
            Diagnostic::DuplicateRootClass {
                class,
                kept,
                dropped,
            } => write!(
                f,
                "root paths '{dropped}' and '{kept}' share class '{class}', using '{kept}'"
            ),
            Diagnostic::Unreachable { id } => {
                write!(f, "path '{id}' is grouped in a cycle that never reaches a root path")
            }
            Diagnostic::UnknownFilterField { node, field, at } => write!(
                f,
                "cloning '{node}': unknown field specified in include/exclude list at {at}: '{field}'"
            ),
            Diagnostic::EmptyWildcard { node, wildcard, at } => write!(
                f,
                "cloning '{node}': found '{wildcard}' at {at} even though there are no fields"
            ),
        }
    }
}
