// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Atomic structural edits and the journaling editor.
//!
//! Every host mutation performed by the replacement engine goes through an
//! [`Editor`]. Each edit is validated by the graph before it lands, so a
//! failing edit never leaves a half-linked relation behind. When a journal is
//! attached, the inverse of every applied edit is recorded so the whole
//! sequence can later be reverted as one unit (see [`crate::UndoStack`]).
use crate::graph::{Graph, GraphError, LinkSlot, Removed};
use crate::ident::{ElementId, NodeId, PortId, RelationId};
use crate::record::{Attributes, Link, Location, NodeSpec, PortSpec};
use crate::value::Value;

/// One canonical structural edit.
#[derive(Debug, Clone)]
pub enum GraphEdit {
    /// Create a node in a container.
    AddNode {
        /// Target container.
        container: NodeId,
        /// Node description.
        spec: NodeSpec,
    },
    /// Create a port on a node.
    AddPort {
        /// Owner.
        node: NodeId,
        /// Port description.
        spec: PortSpec,
    },
    /// Create an unlinked relation.
    AddRelation {
        /// Target container.
        container: NodeId,
        /// Requested name.
        name: String,
        /// Initial attributes.
        attributes: Attributes,
        /// Initial routing vertex.
        vertex: Option<Location>,
    },
    /// Link an endpoint to a relation, optionally at recorded slots.
    Link {
        /// Relation.
        relation: RelationId,
        /// Endpoint.
        link: Link,
        /// Slot positions to reinstate; `None` appends.
        slot: Option<LinkSlot>,
    },
    /// Unlink an endpoint from a relation.
    Unlink {
        /// Relation.
        relation: RelationId,
        /// Endpoint.
        link: Link,
    },
    /// Write or clear an attribute.
    SetAttribute {
        /// Target element.
        element: ElementId,
        /// Attribute name.
        name: String,
        /// New value; `None` clears.
        value: Option<Value>,
    },
    /// Set or clear a relation's routing vertex.
    SetVertex {
        /// Relation.
        relation: RelationId,
        /// New vertex.
        vertex: Option<Location>,
    },
    /// Remove an element and everything it owns.
    Remove {
        /// Element to remove.
        element: ElementId,
    },
    /// Reinstate a previously removed subtree.
    Restore(Box<Removed>),
}

impl GraphEdit {
    /// Applies the edit and returns its inverse.
    pub fn apply(self, graph: &mut Graph) -> Result<Self, GraphError> {
        Ok(match self {
            Self::AddNode { container, spec } => Self::Remove {
                element: graph.add_node(container, spec)?.into(),
            },
            Self::AddPort { node, spec } => Self::Remove {
                element: graph.add_port(node, spec)?.into(),
            },
            Self::AddRelation {
                container,
                name,
                attributes,
                vertex,
            } => Self::Remove {
                element: graph
                    .add_relation_with(container, &name, attributes, vertex)?
                    .into(),
            },
            Self::Link {
                relation,
                link,
                slot,
            } => {
                graph.link_at(relation, link, slot)?;
                Self::Unlink { relation, link }
            }
            Self::Unlink { relation, link } => {
                let slot = graph.unlink(relation, link)?;
                Self::Link {
                    relation,
                    link,
                    slot: Some(slot),
                }
            }
            Self::SetAttribute {
                element,
                name,
                value,
            } => {
                let previous = graph.set_attribute(element, &name, value)?;
                Self::SetAttribute {
                    element,
                    name,
                    value: previous,
                }
            }
            Self::SetVertex { relation, vertex } => Self::SetVertex {
                relation,
                vertex: graph.set_vertex(relation, vertex)?,
            },
            Self::Remove { element } => Self::Restore(Box::new(graph.remove(element)?)),
            Self::Restore(removed) => Self::Remove {
                element: graph.restore(*removed)?,
            },
        })
    }
}

/// Mutable view of a graph that optionally journals inverse edits.
#[derive(Debug)]
pub struct Editor<'g> {
    graph: &'g mut Graph,
    journal: Option<&'g mut Vec<GraphEdit>>,
    applied: usize,
}

impl<'g> Editor<'g> {
    /// Editor that records inverses into `journal` when one is given.
    pub fn new(graph: &'g mut Graph, journal: Option<&'g mut Vec<GraphEdit>>) -> Self {
        Self {
            graph,
            journal,
            applied: 0,
        }
    }

    /// Editor without a journal.
    pub fn detached(graph: &'g mut Graph) -> Self {
        Self::new(graph, None)
    }

    /// Read access to the edited graph.
    pub fn graph(&self) -> &Graph {
        &*self.graph
    }

    /// Number of edits applied through this editor.
    pub fn applied(&self) -> usize {
        self.applied
    }

    fn record(&mut self, inverse: GraphEdit) {
        self.applied += 1;
        if let Some(journal) = self.journal.as_deref_mut() {
            journal.push(inverse);
        }
    }

    /// Applies an arbitrary edit.
    pub fn apply(&mut self, edit: GraphEdit) -> Result<(), GraphError> {
        let inverse = edit.apply(self.graph)?;
        self.record(inverse);
        Ok(())
    }

    /// Registers a type lineage, nearest first.
    ///
    /// Type declarations are schema, not structure; they are not journaled.
    pub fn declare_lineage(&mut self, lineage: &[String]) {
        for pair in lineage.windows(2) {
            self.graph.types_mut().declare(&pair[0], Some(&pair[1]));
        }
        if let Some(first) = lineage.first() {
            self.graph.types_mut().intern(first);
        }
    }

    /// Creates a node.
    pub fn add_node(&mut self, container: NodeId, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let id = self.graph.add_node(container, spec)?;
        self.record(GraphEdit::Remove { element: id.into() });
        Ok(id)
    }

    /// Creates a port.
    pub fn add_port(&mut self, node: NodeId, spec: PortSpec) -> Result<PortId, GraphError> {
        let id = self.graph.add_port(node, spec)?;
        self.record(GraphEdit::Remove { element: id.into() });
        Ok(id)
    }

    /// Creates a relation.
    pub fn add_relation(
        &mut self,
        container: NodeId,
        name: &str,
        attributes: Attributes,
        vertex: Option<Location>,
    ) -> Result<RelationId, GraphError> {
        let id = self
            .graph
            .add_relation_with(container, name, attributes, vertex)?;
        self.record(GraphEdit::Remove { element: id.into() });
        Ok(id)
    }

    /// Links an endpoint.
    pub fn link(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        self.graph.link(relation, link)?;
        self.record(GraphEdit::Unlink { relation, link });
        Ok(())
    }

    /// Unlinks an endpoint.
    pub fn unlink(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        let slot = self.graph.unlink(relation, link)?;
        self.record(GraphEdit::Link {
            relation,
            link,
            slot: Some(slot),
        });
        Ok(())
    }

    /// Writes or clears an attribute.
    pub fn set_attribute(
        &mut self,
        element: ElementId,
        name: &str,
        value: Option<Value>,
    ) -> Result<(), GraphError> {
        let previous = self.graph.set_attribute(element, name, value)?;
        self.record(GraphEdit::SetAttribute {
            element,
            name: name.to_owned(),
            value: previous,
        });
        Ok(())
    }

    /// Sets or clears a routing vertex.
    pub fn set_vertex(
        &mut self,
        relation: RelationId,
        vertex: Option<Location>,
    ) -> Result<(), GraphError> {
        let previous = self.graph.set_vertex(relation, vertex)?;
        self.record(GraphEdit::SetVertex {
            relation,
            vertex: previous,
        });
        Ok(())
    }

    /// Removes an element and its subtree; returns every removed element id.
    pub fn remove(&mut self, element: ElementId) -> Result<Vec<ElementId>, GraphError> {
        let removed = self.graph.remove(element)?;
        let elements = removed.elements();
        self.record(GraphEdit::Restore(Box::new(removed)));
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn journal_inverses_revert_in_reverse_order() {
        let mut g = Graph::new("top");
        let root = g.root();
        let mut journal = Vec::new();
        {
            let mut ed = Editor::new(&mut g, Some(&mut journal));
            let a = ed.add_node(root, NodeSpec::atomic("a", "T")).unwrap();
            let p = ed.add_port(a, PortSpec::output("out")).unwrap();
            let r = ed.add_relation(root, "r", Attributes::new(), None).unwrap();
            ed.link(r, Link::Port(p)).unwrap();
            ed.set_attribute(a.into(), "value", Some(Value::Int(1))).unwrap();
            ed.remove(r.into()).unwrap();
            assert_eq!(ed.applied(), 6);
        }
        assert_eq!(g.node_ids().count(), 2);
        for inverse in journal.into_iter().rev() {
            inverse.apply(&mut g).unwrap();
        }
        assert_eq!(g.node_ids().count(), 1);
        assert_eq!(g.relation_ids().count(), 0);
        assert_eq!(g.port_ids().count(), 0);
    }

    #[test]
    fn failing_edit_records_nothing() {
        let mut g = Graph::new("top");
        let mut journal = Vec::new();
        let mut ed = Editor::new(&mut g, Some(&mut journal));
        let err = ed.remove(ElementId::Node(NodeId(42))).unwrap_err();
        assert_eq!(err, GraphError::Missing(ElementId::Node(NodeId(42))));
        assert_eq!(ed.applied(), 0);
        drop(ed);
        assert!(journal.is_empty());
    }
}
