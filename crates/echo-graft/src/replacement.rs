// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replacement graphs: what a matched region becomes.
use std::collections::BTreeMap;

use crate::edit::Editor;
use crate::error::TransformationError;
use crate::fragment::{Depth, Fragment, FragmentError};
use crate::graph::{Graph, GraphError};
use crate::ident::{ElementId, NodeId, PortId, RelationId};
use crate::ingredient::IngredientList;
use crate::operation::Operation;
use crate::pattern::{Pattern, COMPOSITE_MATCHER};
use crate::record::{Link, NodeSpec, PortSpec};

/// Right-hand side of a transformation rule.
///
/// Structurally parallel to a [`Pattern`]. An element carrying a pattern
/// object stands for that pattern element (and through the match, for its
/// host element); elements without one are created by the transformation.
/// The root always stands for the pattern root.
/// Pattern elements no replacement element refers to are deleted unless the
/// pattern marks them preserved. Ports of a node correspond to the ports of
/// the node's pattern object by name unless they carry their own pattern
/// object.
#[derive(Debug, Clone)]
pub struct Replacement {
    graph: Graph,
    pattern_objects: BTreeMap<ElementId, ElementId>,
    operations: BTreeMap<ElementId, IngredientList<Operation>>,
    relation_hiding: Option<bool>,
}

impl Replacement {
    /// Empty replacement whose root stands for the pattern root.
    pub fn new(name: &str) -> Self {
        Self {
            graph: Graph::with_root(NodeSpec::composite(name, COMPOSITE_MATCHER)),
            pattern_objects: BTreeMap::new(),
            operations: BTreeMap::new(),
            relation_hiding: None,
        }
    }

    /// Copy of `pattern` in which every element refers back to its original.
    ///
    /// Used as-is it yields the identity rule; callers usually edit the copy.
    pub fn mirror(pattern: &Pattern) -> Result<Self, FragmentError> {
        let source = pattern.graph();
        let proot = source.root();
        let root_name = source.name(proot.into()).unwrap_or_default().to_owned();
        let mut out = Self::new(&root_name);
        let rroot = out.graph.root();
        let mut map: BTreeMap<ElementId, ElementId> = BTreeMap::new();
        map.insert(proot.into(), rroot.into());
        {
            let mut editor = Editor::detached(&mut out.graph);
            for p in source.ports(proot) {
                let (frag, order) = Fragment::capture(source, (*p).into(), Depth::Deep)?;
                let created = frag.instantiate(&mut editor, rroot)?;
                map.extend(order.into_iter().zip(created));
            }
            for n in source.child_nodes(proot) {
                let (frag, order) = Fragment::capture(source, (*n).into(), Depth::Deep)?;
                let created = frag.instantiate(&mut editor, rroot)?;
                map.extend(order.into_iter().zip(created));
            }
            for r in source.relations_in(proot) {
                let rec = source.try_relation(*r)?;
                let id = editor.add_relation(rroot, &rec.name, rec.attributes.clone(), rec.vertex)?;
                map.insert((*r).into(), id.into());
            }
            for r in source.relations_in(proot) {
                let rid = map.get(&ElementId::Relation(*r)).and_then(|e| e.as_relation());
                let Some(rid) = rid else { continue };
                for link in &source.try_relation(*r)?.links {
                    let target = match link {
                        Link::Port(p) => map
                            .get(&ElementId::Port(*p))
                            .and_then(|e| e.as_port())
                            .map(Link::Port),
                        Link::Relation(o) => map
                            .get(&ElementId::Relation(*o))
                            .and_then(|e| e.as_relation())
                            .map(Link::Relation),
                    };
                    if let Some(target) = target {
                        if !editor.graph().is_linked(rid, target) {
                            editor.link(rid, target)?;
                        }
                    }
                }
            }
        }
        out.pattern_objects = map.into_iter().map(|(p, r)| (r, p)).collect();
        Ok(out)
    }

    /// Replacement graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Replacement root.
    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    /// Adds a node, optionally standing for a pattern node.
    pub fn add_node(
        &mut self,
        container: NodeId,
        spec: NodeSpec,
        pattern_object: Option<NodeId>,
    ) -> Result<NodeId, GraphError> {
        let id = self.graph.add_node(container, spec)?;
        self.set_pattern_object(id.into(), pattern_object.map(ElementId::Node));
        Ok(id)
    }

    /// Adds a port, optionally standing for a pattern port.
    pub fn add_port(
        &mut self,
        node: NodeId,
        spec: PortSpec,
        pattern_object: Option<PortId>,
    ) -> Result<PortId, GraphError> {
        let id = self.graph.add_port(node, spec)?;
        self.set_pattern_object(id.into(), pattern_object.map(ElementId::Port));
        Ok(id)
    }

    /// Adds a relation, optionally standing for a pattern relation.
    pub fn add_relation(
        &mut self,
        container: NodeId,
        name: &str,
        pattern_object: Option<RelationId>,
    ) -> Result<RelationId, GraphError> {
        let id = self.graph.add_relation(container, name)?;
        self.set_pattern_object(id.into(), pattern_object.map(ElementId::Relation));
        Ok(id)
    }

    /// Links an endpoint to a replacement relation.
    pub fn link(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        self.graph.link(relation, link)
    }

    /// Unlinks an endpoint from a replacement relation.
    pub fn unlink(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        self.graph.unlink(relation, link).map(|_| ())
    }

    /// Removes an element (and its subtree) together with its metadata.
    pub fn remove(&mut self, element: ElementId) -> Result<(), GraphError> {
        let removed = self.graph.remove(element)?;
        for e in removed.elements() {
            self.pattern_objects.remove(&e);
            self.operations.remove(&e);
        }
        Ok(())
    }

    /// Replacement element standing for `pattern` (mirror lookup).
    pub fn element_for(&self, pattern: ElementId) -> Option<ElementId> {
        self.pattern_objects
            .iter()
            .find(|(_, p)| **p == pattern)
            .map(|(r, _)| *r)
    }

    /// Pattern element `element` stands for.
    pub fn pattern_object(&self, element: ElementId) -> Option<ElementId> {
        self.pattern_objects.get(&element).copied()
    }

    /// Sets or clears the pattern object of `element`.
    pub fn set_pattern_object(&mut self, element: ElementId, pattern: Option<ElementId>) {
        match pattern {
            Some(p) => {
                self.pattern_objects.insert(element, p);
            }
            None => {
                self.pattern_objects.remove(&element);
            }
        }
    }

    /// Every (replacement element, pattern element) pair, in id order.
    pub fn pattern_objects(&self) -> impl Iterator<Item = (ElementId, ElementId)> + '_ {
        self.pattern_objects.iter().map(|(r, p)| (*r, *p))
    }

    /// Operations attached to `element`.
    pub fn operations(&self, element: ElementId) -> Option<&IngredientList<Operation>> {
        self.operations.get(&element)
    }

    /// Every element carrying operations, in id order.
    pub fn operation_entries(
        &self,
    ) -> impl Iterator<Item = (ElementId, &IngredientList<Operation>)> + '_ {
        self.operations.iter().map(|(e, list)| (*e, list))
    }

    /// Replaces the operations of `element`.
    pub fn set_operations(
        &mut self,
        element: ElementId,
        operations: IngredientList<Operation>,
    ) -> Result<(), TransformationError> {
        if !self.graph.contains(element) {
            return Err(TransformationError::unresolved(
                element,
                "element is not part of the replacement",
            ));
        }
        for op in &operations {
            op.validate().map_err(|e| match e {
                TransformationError::Operation { element: None, message } => {
                    TransformationError::operation(element, message)
                }
                other => other,
            })?;
        }
        if operations.is_empty() {
            self.operations.remove(&element);
        } else {
            self.operations.insert(element, operations);
        }
        Ok(())
    }

    /// Appends an operation to `element`; returns its index.
    pub fn add_operation(
        &mut self,
        element: ElementId,
        operation: Operation,
    ) -> Result<usize, TransformationError> {
        let mut list = self.operations.get(&element).cloned().unwrap_or_default();
        let index = list.push(operation);
        self.set_operations(element, list)?;
        Ok(index)
    }

    /// Relation-hiding override; `None` defers to the transformer config.
    pub fn relation_hiding(&self) -> Option<bool> {
        self.relation_hiding
    }

    /// Sets the relation-hiding override.
    pub fn set_relation_hiding(&mut self, hiding: Option<bool>) {
        self.relation_hiding = hiding;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::record::NodeKind;
    use crate::snapshot::structure_digest;

    #[test]
    fn mirror_refers_back_to_every_pattern_element() {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let a = p.add_matcher(root, "A", NodeKind::Atomic).unwrap();
        let c = p.add_matcher(root, "C", NodeKind::Composite).unwrap();
        let pa = p.add_port(a, PortSpec::output("out")).unwrap();
        let pc = p.add_port(c, PortSpec::input("in")).unwrap();
        let r = p.add_relation(root, "r").unwrap();
        p.link(r, Link::Port(pa)).unwrap();
        p.link(r, Link::Port(pc)).unwrap();
        p.add_matcher(c, "X", NodeKind::Atomic).unwrap();

        let rep = Replacement::mirror(&p).unwrap();
        for e in [a.into(), c.into(), pa.into(), pc.into(), r.into(), root.into()] {
            let mirrored = rep.element_for(e).unwrap();
            assert_eq!(rep.pattern_object(mirrored), Some(e));
        }
        assert_eq!(rep.pattern_objects().count(), 7);
        assert_eq!(structure_digest(rep.graph(), rep.root()), structure_digest(p.graph(), root));
    }

    #[test]
    fn removing_elements_drops_their_metadata() {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let a = p.add_matcher(root, "A", NodeKind::Atomic).unwrap();
        let mut rep = Replacement::mirror(&p).unwrap();
        let ra = rep.element_for(a.into()).unwrap();
        rep.add_operation(ra, Operation::set_attribute("x", "1")).unwrap();
        assert!(rep.add_operation(ra, Operation::remove_attribute(" ")).is_err());
        rep.remove(ra).unwrap();
        assert!(rep.operations(ra).is_none());
        assert!(rep.element_for(a.into()).is_none());
    }
}
