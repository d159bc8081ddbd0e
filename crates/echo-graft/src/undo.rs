// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Undo journal and the transaction policy passed to a transformation.
use tracing::debug;

use crate::edit::GraphEdit;
use crate::graph::{Graph, GraphError};

/// Inverse edits of one undoable unit, oldest first.
#[derive(Debug, Clone, Default)]
pub struct UndoGroup {
    label: String,
    inverses: Vec<GraphEdit>,
}

impl UndoGroup {
    /// Label of the first transformation recorded into the group.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of recorded inverse edits.
    pub fn len(&self) -> usize {
        self.inverses.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.inverses.is_empty()
    }
}

/// Stack of undoable units.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    groups: Vec<UndoGroup>,
}

impl UndoStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of undoable units.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True when there is nothing to undo.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Recorded units, oldest first.
    pub fn groups(&self) -> &[UndoGroup] {
        &self.groups
    }

    /// Reverts the most recent unit; returns its label, or `None` when the
    /// stack is empty.
    ///
    /// The unit is consumed even if an inverse edit fails; the error reports
    /// the first edit that could not be reverted.
    pub fn undo(&mut self, graph: &mut Graph) -> Result<Option<String>, GraphError> {
        let Some(group) = self.groups.pop() else {
            return Ok(None);
        };
        debug!(label = %group.label, edits = group.inverses.len(), "undoing transformation");
        for inverse in group.inverses.into_iter().rev() {
            inverse.apply(graph)?;
        }
        Ok(Some(group.label))
    }

    fn open(&mut self, label: &str, merge_with_previous: bool) -> &mut Vec<GraphEdit> {
        if !merge_with_previous || self.groups.is_empty() {
            self.groups.push(UndoGroup {
                label: label.to_owned(),
                inverses: Vec::new(),
            });
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last].inverses
    }

    fn discard_empty_tail(&mut self) {
        if self.groups.last().is_some_and(UndoGroup::is_empty) {
            self.groups.pop();
        }
    }
}

/// Undo policy for one call to [`GraphTransformer::transform`](crate::GraphTransformer::transform).
///
/// Replaces ambient "start/stop undoable transformation" toggles: the caller
/// states the policy per call and owns the [`UndoStack`].
#[derive(Debug, Default)]
pub struct TransactionScope<'u> {
    journal: Option<&'u mut UndoStack>,
    merge_with_previous: bool,
}

impl<'u> TransactionScope<'u> {
    /// Edits are applied without journaling.
    pub fn none() -> Self {
        Self::default()
    }

    /// Edits form a new undoable unit.
    pub fn undoable(stack: &'u mut UndoStack) -> Self {
        Self {
            journal: Some(stack),
            merge_with_previous: false,
        }
    }

    /// Edits join the previous undoable unit (or start one on an empty stack).
    pub fn merged(stack: &'u mut UndoStack) -> Self {
        Self {
            journal: Some(stack),
            merge_with_previous: true,
        }
    }

    /// True when edits are journaled.
    pub fn is_undoable(&self) -> bool {
        self.journal.is_some()
    }

    /// True when edits join the previous unit.
    pub fn merges_with_previous(&self) -> bool {
        self.merge_with_previous
    }

    pub(crate) fn begin(&mut self, label: &str) -> Option<&mut Vec<GraphEdit>> {
        let merge = self.merge_with_previous;
        self.journal.as_deref_mut().map(|stack| stack.open(label, merge))
    }

    pub(crate) fn finish(&mut self) {
        if let Some(stack) = self.journal.as_deref_mut() {
            stack.discard_empty_tail();
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::edit::Editor;
    use crate::record::NodeSpec;

    fn add_one(graph: &mut Graph, scope: &mut TransactionScope<'_>, name: &str) {
        let root = graph.root();
        let journal = scope.begin(name);
        let mut ed = Editor::new(graph, journal);
        ed.add_node(root, NodeSpec::atomic(name, "T")).unwrap();
    }

    #[test]
    fn merged_scopes_undo_together() {
        let mut g = Graph::new("top");
        let mut stack = UndoStack::new();
        add_one(&mut g, &mut TransactionScope::undoable(&mut stack), "a");
        add_one(&mut g, &mut TransactionScope::merged(&mut stack), "b");
        add_one(&mut g, &mut TransactionScope::undoable(&mut stack), "c");
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.undo(&mut g).unwrap().as_deref(), Some("c"));
        assert_eq!(g.node_ids().count(), 3);
        assert_eq!(stack.undo(&mut g).unwrap().as_deref(), Some("a"));
        assert_eq!(g.node_ids().count(), 1);
        assert_eq!(stack.undo(&mut g).unwrap(), None);
    }

    #[test]
    fn unjournaled_scope_records_nothing() {
        let mut g = Graph::new("top");
        let mut scope = TransactionScope::none();
        add_one(&mut g, &mut scope, "a");
        assert!(!scope.is_undoable());
        assert_eq!(g.node_ids().count(), 2);
    }
}
