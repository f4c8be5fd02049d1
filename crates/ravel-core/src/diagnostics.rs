//! Warnings and errors raised while resolving a document.

use crate::NodeId;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// A line/column range in the authored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub line_begin: u32,
    pub char_begin: u32,
    pub line_end: u32,
    pub char_end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SourceSpan>,
}

/// Ordered diagnostic log.
///
/// Declarations are re-run on every recomputation, so the same problem would otherwise be
/// reported again on each action; entries are deduplicated on `(severity, node, message)`.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    items: Vec<Diagnostic>,
    seen: FxHashSet<(Severity, Option<NodeId>, String)>,
    mirror_to_log: bool,
}

impl Diagnostics {
    pub(crate) fn new(mirror_to_log: bool) -> Self {
        Self {
            mirror_to_log,
            ..Default::default()
        }
    }

    pub(crate) fn push(
        &mut self,
        severity: Severity,
        message: String,
        node: Option<NodeId>,
        position: Option<SourceSpan>,
    ) {
        if !self.seen.insert((severity, node, message.clone())) {
            return;
        }
        if self.mirror_to_log {
            match severity {
                Severity::Warning => tracing::warn!(node = ?node, "{message}"),
                Severity::Error => tracing::error!(node = ?node, "{message}"),
            }
        }
        self.items.push(Diagnostic {
            severity,
            message,
            node,
            position,
        });
    }

    pub(crate) fn items(&self) -> &[Diagnostic] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_diagnostics_are_reported_once() {
        let mut diags = Diagnostics::new(false);
        diags.push(Severity::Warning, "missing".into(), Some(NodeId(1)), None);
        diags.push(Severity::Warning, "missing".into(), Some(NodeId(1)), None);
        diags.push(Severity::Warning, "missing".into(), Some(NodeId(2)), None);
        diags.push(Severity::Error, "missing".into(), Some(NodeId(1)), None);
        assert_eq!(diags.items().len(), 3);
    }
}
