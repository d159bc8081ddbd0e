// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arena-backed hierarchical hypergraph shared by patterns, replacements and
//! host models.
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::ident::{make_type_id, ElementId, NodeId, PortId, RelationId, TypeId};
use crate::record::{
    Attributes, Link, Location, NodeKind, NodeRecord, NodeSpec, PortRecord, PortSpec,
    RelationRecord,
};
use crate::value::Value;

/// Type label assigned to a graph root created by [`Graph::new`].
pub const ROOT_TYPE: &str = "Composite";

/// Errors returned by structural graph edits.
///
/// Every edit validates before mutating, so an error leaves the graph as it
/// was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The element does not exist (never allocated or already removed).
    #[error("{0} not found")]
    Missing(ElementId),
    /// The node cannot hold children.
    #[error("{0:?} is not a container")]
    NotContainer(NodeId),
    /// The graph root cannot be removed.
    #[error("cannot remove the graph root")]
    RemoveRoot,
    /// The link would violate containment or duplicate an existing link.
    #[error("cannot link {link:?} to {relation:?}: {reason}")]
    InvalidLink {
        /// Relation being linked.
        relation: RelationId,
        /// Requested endpoint.
        link: Link,
        /// Violated rule.
        reason: &'static str,
    },
    /// The endpoint is not linked to the relation.
    #[error("{link:?} is not linked to {relation:?}")]
    NotLinked {
        /// Relation being unlinked.
        relation: RelationId,
        /// Requested endpoint.
        link: Link,
    },
    /// Restore target slot already holds a live element.
    #[error("cannot restore {0}: slot is occupied")]
    SlotOccupied(ElementId),
}

impl GraphError {
    /// Element the error refers to, if any.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::Missing(e) | Self::SlotOccupied(e) => Some(*e),
            Self::NotContainer(n) => Some(ElementId::Node(*n)),
            Self::InvalidLink { relation, .. } | Self::NotLinked { relation, .. } => {
                Some(ElementId::Relation(*relation))
            }
            Self::RemoveRoot => None,
        }
    }
}

/// Type labels and their single-parent subclass chain.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    labels: BTreeMap<TypeId, String>,
    parents: BTreeMap<TypeId, TypeId>,
}

impl TypeRegistry {
    /// Registers `label` (if new) and returns its id.
    pub fn intern(&mut self, label: &str) -> TypeId {
        let id = make_type_id(label);
        self.labels.entry(id).or_insert_with(|| label.to_owned());
        id
    }

    /// Registers `label` as a subclass of `parent`.
    ///
    /// A parent link that would close a cycle is ignored.
    pub fn declare(&mut self, label: &str, parent: Option<&str>) -> TypeId {
        let id = self.intern(label);
        if let Some(parent) = parent {
            let parent_id = self.intern(parent);
            if !self.is_subtype(parent_id, id) {
                self.parents.insert(id, parent_id);
            }
        }
        id
    }

    /// Label registered for `ty`.
    pub fn label(&self, ty: TypeId) -> Option<&str> {
        self.labels.get(&ty).map(String::as_str)
    }

    /// Immediate supertype of `ty`.
    pub fn parent(&self, ty: TypeId) -> Option<TypeId> {
        self.parents.get(&ty).copied()
    }

    /// `ty` followed by its ancestors, nearest first.
    pub fn lineage(&self, ty: TypeId) -> Vec<TypeId> {
        let mut out = vec![ty];
        let mut cur = ty;
        while let Some(parent) = self.parent(cur) {
            if out.contains(&parent) {
                break;
            }
            out.push(parent);
            cur = parent;
        }
        out
    }

    /// Labels of [`lineage`](Self::lineage), nearest first.
    pub fn lineage_labels(&self, ty: TypeId) -> Vec<String> {
        self.lineage(ty)
            .into_iter()
            .filter_map(|t| self.label(t).map(str::to_owned))
            .collect()
    }

    /// True when `ty` equals `ancestor` or inherits from it.
    pub fn is_subtype(&self, ty: TypeId, ancestor: TypeId) -> bool {
        self.lineage(ty).contains(&ancestor)
    }
}

/// Slot positions captured when a link is removed, so the inverse edit can
/// reinstate it in the same channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSlot {
    /// Index in the relation's link list.
    pub relation_index: usize,
    /// Index in the peer's list (port relations, or the other relation's links).
    pub peer_index: usize,
}

/// Everything [`Graph::remove`] took out of the arena.
///
/// Passing it to [`Graph::restore`] reverts the removal exactly, provided no
/// later edit is still in effect (undo order).
#[derive(Debug, Clone)]
pub struct Removed {
    element: ElementId,
    position: usize,
    nodes: Vec<(NodeId, NodeRecord)>,
    ports: Vec<(PortId, PortRecord)>,
    relations: Vec<(RelationId, RelationRecord)>,
    relation_links: Vec<(RelationId, Vec<Link>)>,
    port_relations: Vec<(PortId, Vec<RelationId>)>,
}

impl Removed {
    /// Root of the removed subtree.
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Every element taken out, root first.
    pub fn elements(&self) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = self.nodes.iter().map(|(id, _)| (*id).into()).collect();
        out.extend(self.ports.iter().map(|(id, _)| ElementId::Port(*id)));
        out.extend(self.relations.iter().map(|(id, _)| ElementId::Relation(*id)));
        if let Some(pos) = out.iter().position(|e| *e == self.element) {
            out[..=pos].rotate_right(1);
        }
        out
    }
}

/// Hierarchical attributed hypergraph.
///
/// Nodes own ports and (when they are containers) child nodes and relations.
/// Relations link ports of sibling nodes, ports of their own container (inside
/// links) and other relations in the same container. Element ids are arena
/// indices that are never reused.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Option<NodeRecord>>,
    ports: Vec<Option<PortRecord>>,
    relations: Vec<Option<RelationRecord>>,
    root: NodeId,
    types: TypeRegistry,
}

impl Graph {
    /// Creates a graph whose root is an opaque composite named `root_name`.
    pub fn new(root_name: &str) -> Self {
        Self::with_root(NodeSpec::composite(root_name, ROOT_TYPE).opaque(true))
    }

    /// Creates a graph whose root is described by `spec`.
    pub fn with_root(spec: NodeSpec) -> Self {
        let mut types = TypeRegistry::default();
        let ty = types.intern(&spec.ty);
        let root = NodeRecord {
            name: spec.name,
            ty,
            kind: if spec.kind.is_container() {
                spec.kind
            } else {
                NodeKind::Composite
            },
            opaque: spec.opaque,
            container: None,
            attributes: spec.attributes,
            location: spec.location,
            ports: Vec::new(),
            nodes: Vec::new(),
            relations: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            ports: Vec::new(),
            relations: Vec::new(),
            root: NodeId(0),
            types,
        }
    }

    /// Root container.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Type registry of this graph.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Declares a type label and optional supertype.
    pub fn declare_type(&mut self, label: &str, parent: Option<&str>) -> TypeId {
        self.types.declare(label, parent)
    }

    pub(crate) fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    // ── lookups ────────────────────────────────────────────────────────

    /// Node record, if live.
    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Port record, if live.
    pub fn port(&self, id: PortId) -> Option<&PortRecord> {
        self.ports.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Relation record, if live.
    pub fn relation(&self, id: RelationId) -> Option<&RelationRecord> {
        self.relations.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&NodeRecord, GraphError> {
        self.node(id).ok_or(GraphError::Missing(id.into()))
    }

    pub(crate) fn try_port(&self, id: PortId) -> Result<&PortRecord, GraphError> {
        self.port(id).ok_or(GraphError::Missing(id.into()))
    }

    pub(crate) fn try_relation(&self, id: RelationId) -> Result<&RelationRecord, GraphError> {
        self.relation(id).ok_or(GraphError::Missing(id.into()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeRecord, GraphError> {
        self.nodes
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::Missing(id.into()))
    }

    fn port_mut(&mut self, id: PortId) -> Result<&mut PortRecord, GraphError> {
        self.ports
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::Missing(id.into()))
    }

    fn relation_mut(&mut self, id: RelationId) -> Result<&mut RelationRecord, GraphError> {
        self.relations
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GraphError::Missing(id.into()))
    }

    /// True when the element is live.
    pub fn contains(&self, element: ElementId) -> bool {
        match element {
            ElementId::Node(id) => self.node(id).is_some(),
            ElementId::Port(id) => self.port(id).is_some(),
            ElementId::Relation(id) => self.relation(id).is_some(),
        }
    }

    /// Name of a live element.
    pub fn name(&self, element: ElementId) -> Option<&str> {
        match element {
            ElementId::Node(id) => self.node(id).map(|n| n.name.as_str()),
            ElementId::Port(id) => self.port(id).map(|p| p.name.as_str()),
            ElementId::Relation(id) => self.relation(id).map(|r| r.name.as_str()),
        }
    }

    /// Container of a node or relation, owner of a port.
    pub fn container_of(&self, element: ElementId) -> Option<NodeId> {
        match element {
            ElementId::Node(id) => self.node(id).and_then(|n| n.container),
            ElementId::Port(id) => self.port(id).map(|p| p.owner),
            ElementId::Relation(id) => self.relation(id).map(|r| r.container),
        }
    }

    /// Type of a node.
    pub fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.node(node).map(|n| n.ty)
    }

    /// Type label of a node.
    pub fn type_label(&self, node: NodeId) -> Option<&str> {
        self.type_of(node).and_then(|ty| self.types.label(ty))
    }

    /// Attribute table of a live element.
    pub fn attributes(&self, element: ElementId) -> Option<&Attributes> {
        match element {
            ElementId::Node(id) => self.node(id).map(|n| &n.attributes),
            ElementId::Port(id) => self.port(id).map(|p| &p.attributes),
            ElementId::Relation(id) => self.relation(id).map(|r| &r.attributes),
        }
    }

    /// Single attribute value.
    pub fn attribute(&self, element: ElementId, name: &str) -> Option<&Value> {
        self.attributes(element).and_then(|a| a.get(name))
    }

    /// Ports of a node (empty when the node is missing).
    pub fn ports(&self, node: NodeId) -> &[PortId] {
        self.node(node).map_or(&[], |n| n.ports.as_slice())
    }

    /// Child nodes of a container in insertion order.
    pub fn child_nodes(&self, container: NodeId) -> &[NodeId] {
        self.node(container).map_or(&[], |n| n.nodes.as_slice())
    }

    /// Relations contained in a container in insertion order.
    pub fn relations_in(&self, container: NodeId) -> &[RelationId] {
        self.node(container).map_or(&[], |n| n.relations.as_slice())
    }

    /// Ports, then child nodes, then relations of `container`.
    pub fn children(&self, container: NodeId) -> Vec<ElementId> {
        let Some(node) = self.node(container) else {
            return Vec::new();
        };
        node.ports
            .iter()
            .map(|p| ElementId::Port(*p))
            .chain(node.nodes.iter().map(|n| ElementId::Node(*n)))
            .chain(node.relations.iter().map(|r| ElementId::Relation(*r)))
            .collect()
    }

    /// Linked endpoints of a relation, or linked relations of a port.
    pub fn linked_endpoints(&self, element: ElementId) -> Vec<ElementId> {
        match element {
            ElementId::Relation(id) => self.relation(id).map_or_else(Vec::new, |r| {
                r.links
                    .iter()
                    .map(|l| match l {
                        Link::Port(p) => ElementId::Port(*p),
                        Link::Relation(o) => ElementId::Relation(*o),
                    })
                    .collect()
            }),
            ElementId::Port(id) => self.port(id).map_or_else(Vec::new, |p| {
                p.relations.iter().map(|r| ElementId::Relation(*r)).collect()
            }),
            ElementId::Node(_) => Vec::new(),
        }
    }

    /// Relations linked to `port` from outside its owner.
    pub fn outside_relations(&self, port: PortId) -> Vec<RelationId> {
        let Some(p) = self.port(port) else {
            return Vec::new();
        };
        let owner = p.owner;
        p.relations
            .iter()
            .copied()
            .filter(|r| self.relation(*r).is_some_and(|rec| rec.container != owner))
            .collect()
    }

    /// Relations linked to `port` from inside its owner.
    pub fn inside_relations(&self, port: PortId) -> Vec<RelationId> {
        let Some(p) = self.port(port) else {
            return Vec::new();
        };
        let owner = p.owner;
        p.relations
            .iter()
            .copied()
            .filter(|r| self.relation(*r).is_some_and(|rec| rec.container == owner))
            .collect()
    }

    /// True when `relation` lists `link`.
    pub fn is_linked(&self, relation: RelationId, link: Link) -> bool {
        self.relation(relation).is_some_and(|r| r.links.contains(&link))
    }

    /// Child node of `container` named `name`.
    pub fn entity_by_name(&self, container: NodeId, name: &str) -> Option<NodeId> {
        self.child_nodes(container)
            .iter()
            .copied()
            .find(|n| self.node(*n).is_some_and(|rec| rec.name == name))
    }

    /// Port of `node` named `name`.
    pub fn port_by_name(&self, node: NodeId, name: &str) -> Option<PortId> {
        self.ports(node)
            .iter()
            .copied()
            .find(|p| self.port(*p).is_some_and(|rec| rec.name == name))
    }

    /// Relation of `container` named `name`.
    pub fn relation_by_name(&self, container: NodeId, name: &str) -> Option<RelationId> {
        self.relations_in(container)
            .iter()
            .copied()
            .find(|r| self.relation(*r).is_some_and(|rec| rec.name == name))
    }

    /// `base`, or `base2`, `base3`, … whichever is free among the nodes and
    /// relations of `container`.
    pub fn unique_name(&self, container: NodeId, base: &str) -> String {
        let taken = |name: &str| {
            self.entity_by_name(container, name).is_some()
                || self.relation_by_name(container, name).is_some()
        };
        uniquify(base, taken)
    }

    fn unique_port_name(&self, node: NodeId, base: &str) -> String {
        uniquify(base, |name| self.port_by_name(node, name).is_some())
    }

    /// Node ids of the subtree rooted at `node`, pre-order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let Some(rec) = self.node(n) else { continue };
            out.push(n);
            stack.extend(rec.nodes.iter().rev().copied());
        }
        out
    }

    /// True when `ancestor` contains `node` (directly or transitively).
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.node(n).and_then(|rec| rec.container);
        }
        false
    }

    /// Live node ids in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        live_ids(&self.nodes).map(NodeId)
    }

    /// Live port ids in arena order.
    pub fn port_ids(&self) -> impl Iterator<Item = PortId> + '_ {
        live_ids(&self.ports).map(PortId)
    }

    /// Live relation ids in arena order.
    pub fn relation_ids(&self) -> impl Iterator<Item = RelationId> + '_ {
        live_ids(&self.relations).map(RelationId)
    }

    // ── edits ──────────────────────────────────────────────────────────

    /// Creates a node in `container`; the name is made unique.
    pub fn add_node(&mut self, container: NodeId, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let parent = self.try_node(container)?;
        if !parent.kind.is_container() {
            return Err(GraphError::NotContainer(container));
        }
        let name = self.unique_name(container, &spec.name);
        let ty = self.types.intern(&spec.ty);
        let id = NodeId(next_index(&self.nodes));
        self.nodes.push(Some(NodeRecord {
            name,
            ty,
            kind: spec.kind,
            opaque: spec.opaque,
            container: Some(container),
            attributes: spec.attributes,
            location: spec.location,
            ports: Vec::new(),
            nodes: Vec::new(),
            relations: Vec::new(),
        }));
        self.node_mut(container)?.nodes.push(id);
        Ok(id)
    }

    /// Creates a port on `node`; the name is made unique among its ports.
    pub fn add_port(&mut self, node: NodeId, spec: PortSpec) -> Result<PortId, GraphError> {
        self.try_node(node)?;
        let name = self.unique_port_name(node, &spec.name);
        let id = PortId(next_index(&self.ports));
        self.ports.push(Some(PortRecord {
            name,
            owner: node,
            input: spec.input,
            output: spec.output,
            multiport: spec.multiport,
            attributes: spec.attributes,
            relations: Vec::new(),
        }));
        self.node_mut(node)?.ports.push(id);
        Ok(id)
    }

    /// Creates an unlinked relation in `container`.
    pub fn add_relation(
        &mut self,
        container: NodeId,
        name: &str,
    ) -> Result<RelationId, GraphError> {
        self.add_relation_with(container, name, Attributes::new(), None)
    }

    /// Creates an unlinked relation with attributes and an optional vertex.
    pub fn add_relation_with(
        &mut self,
        container: NodeId,
        name: &str,
        attributes: Attributes,
        vertex: Option<Location>,
    ) -> Result<RelationId, GraphError> {
        let parent = self.try_node(container)?;
        if !parent.kind.is_container() {
            return Err(GraphError::NotContainer(container));
        }
        let name = self.unique_name(container, name);
        let id = RelationId(next_index(&self.relations));
        self.relations.push(Some(RelationRecord {
            name,
            container,
            attributes,
            vertex,
            links: Vec::new(),
        }));
        self.node_mut(container)?.relations.push(id);
        Ok(id)
    }

    /// Checks that `link` may be added to `relation`.
    pub fn check_link(&self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        let rel = self.try_relation(relation)?;
        let invalid = |reason| GraphError::InvalidLink {
            relation,
            link,
            reason,
        };
        match link {
            Link::Port(p) => {
                let port = self.try_port(p)?;
                let owner_container = self.try_node(port.owner)?.container;
                if port.owner != rel.container && owner_container != Some(rel.container) {
                    return Err(invalid("port is not adjacent to the relation's container"));
                }
            }
            Link::Relation(other) => {
                if other == relation {
                    return Err(invalid("a relation cannot link to itself"));
                }
                if self.try_relation(other)?.container != rel.container {
                    return Err(invalid("relations live in different containers"));
                }
            }
        }
        if rel.links.contains(&link) {
            return Err(invalid("already linked"));
        }
        Ok(())
    }

    /// Appends `link` to `relation` (and the reverse entry on the peer).
    pub fn link(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        self.link_at(relation, link, None)
    }

    /// Like [`link`](Self::link) but reinstates recorded slot positions.
    pub fn link_at(
        &mut self,
        relation: RelationId,
        link: Link,
        slot: Option<LinkSlot>,
    ) -> Result<(), GraphError> {
        self.check_link(relation, link)?;
        let rel = self.relation_mut(relation)?;
        let at = slot.map_or(rel.links.len(), |s| s.relation_index.min(rel.links.len()));
        rel.links.insert(at, link);
        match link {
            Link::Port(p) => {
                let port = self.port_mut(p)?;
                let len = port.relations.len();
                let at = slot.map_or(len, |s| s.peer_index.min(len));
                port.relations.insert(at, relation);
            }
            Link::Relation(other) => {
                let peer = self.relation_mut(other)?;
                let at = slot.map_or(peer.links.len(), |s| s.peer_index.min(peer.links.len()));
                peer.links.insert(at, Link::Relation(relation));
            }
        }
        Ok(())
    }

    /// Removes `link` from `relation`, returning the slots it occupied.
    pub fn unlink(&mut self, relation: RelationId, link: Link) -> Result<LinkSlot, GraphError> {
        let rel = self.try_relation(relation)?;
        let relation_index = rel
            .links
            .iter()
            .position(|l| *l == link)
            .ok_or(GraphError::NotLinked { relation, link })?;
        let peer_index = match link {
            Link::Port(p) => self.try_port(p)?.relations.iter().position(|r| *r == relation),
            Link::Relation(other) => self
                .try_relation(other)?
                .links
                .iter()
                .position(|l| *l == Link::Relation(relation)),
        }
        .ok_or(GraphError::NotLinked { relation, link })?;
        self.relation_mut(relation)?.links.remove(relation_index);
        match link {
            Link::Port(p) => {
                self.port_mut(p)?.relations.remove(peer_index);
            }
            Link::Relation(other) => {
                self.relation_mut(other)?.links.remove(peer_index);
            }
        }
        Ok(LinkSlot {
            relation_index,
            peer_index,
        })
    }

    /// Writes (`Some`) or clears (`None`) an attribute, returning the previous
    /// value.
    pub fn set_attribute(
        &mut self,
        element: ElementId,
        name: &str,
        value: Option<Value>,
    ) -> Result<Option<Value>, GraphError> {
        let attrs = match element {
            ElementId::Node(id) => &mut self.node_mut(id)?.attributes,
            ElementId::Port(id) => &mut self.port_mut(id)?.attributes,
            ElementId::Relation(id) => &mut self.relation_mut(id)?.attributes,
        };
        Ok(match value {
            Some(v) => attrs.insert(name.to_owned(), v),
            None => attrs.remove(name),
        })
    }

    /// Sets or clears a relation's routing vertex, returning the previous one.
    pub fn set_vertex(
        &mut self,
        relation: RelationId,
        vertex: Option<Location>,
    ) -> Result<Option<Location>, GraphError> {
        Ok(std::mem::replace(&mut self.relation_mut(relation)?.vertex, vertex))
    }

    /// Sets or clears a node's location, returning the previous one.
    pub fn set_location(
        &mut self,
        node: NodeId,
        location: Option<Location>,
    ) -> Result<Option<Location>, GraphError> {
        Ok(std::mem::replace(&mut self.node_mut(node)?.location, location))
    }

    /// Rewrites a port's direction and multiport flags in place.
    pub fn set_port_flags(
        &mut self,
        port: PortId,
        input: bool,
        output: bool,
        multiport: bool,
    ) -> Result<(), GraphError> {
        let rec = self.port_mut(port)?;
        rec.input = input;
        rec.output = output;
        rec.multiport = multiport;
        Ok(())
    }

    /// Removes an element together with everything it owns.
    ///
    /// Removing a node removes its ports, descendants and contained relations
    /// and detaches its ports from outside relations. Removing a port detaches
    /// it; removing a relation detaches its endpoints.
    pub fn remove(&mut self, element: ElementId) -> Result<Removed, GraphError> {
        let mut node_set = BTreeSet::new();
        let mut port_set = BTreeSet::new();
        let mut rel_set = BTreeSet::new();
        let (parent, position) = match element {
            ElementId::Node(id) => {
                if id == self.root {
                    return Err(GraphError::RemoveRoot);
                }
                let parent = self.try_node(id)?.container.ok_or(GraphError::RemoveRoot)?;
                for n in self.descendants(id) {
                    let rec = self.try_node(n)?;
                    port_set.extend(rec.ports.iter().copied());
                    rel_set.extend(rec.relations.iter().copied());
                    node_set.insert(n);
                }
                let pos = self.child_nodes(parent).iter().position(|n| *n == id);
                (parent, pos)
            }
            ElementId::Port(id) => {
                let owner = self.try_port(id)?.owner;
                port_set.insert(id);
                (owner, self.ports(owner).iter().position(|p| *p == id))
            }
            ElementId::Relation(id) => {
                let container = self.try_relation(id)?.container;
                rel_set.insert(id);
                (container, self.relations_in(container).iter().position(|r| *r == id))
            }
        };
        let position = position.ok_or(GraphError::Missing(element))?;

        // Survivors whose link lists mention removed elements.
        let mut touched_relations = BTreeSet::new();
        for p in &port_set {
            touched_relations.extend(
                self.try_port(*p)?
                    .relations
                    .iter()
                    .filter(|r| !rel_set.contains(*r))
                    .copied(),
            );
        }
        let mut touched_ports = BTreeSet::new();
        for r in &rel_set {
            for link in &self.try_relation(*r)?.links {
                match link {
                    Link::Port(p) if !port_set.contains(p) => {
                        touched_ports.insert(*p);
                    }
                    Link::Relation(o) if !rel_set.contains(o) => {
                        touched_relations.insert(*o);
                    }
                    _ => {}
                }
            }
        }
        let relation_links = touched_relations
            .iter()
            .map(|r| Ok((*r, self.try_relation(*r)?.links.clone())))
            .collect::<Result<Vec<_>, GraphError>>()?;
        let port_relations = touched_ports
            .iter()
            .map(|p| Ok((*p, self.try_port(*p)?.relations.clone())))
            .collect::<Result<Vec<_>, GraphError>>()?;

        // Mutation starts here; every id below was validated above.
        for r in &touched_relations {
            self.relation_mut(*r)?.links.retain(|l| match l {
                Link::Port(p) => !port_set.contains(p),
                Link::Relation(o) => !rel_set.contains(o),
            });
        }
        for p in &touched_ports {
            self.port_mut(*p)?.relations.retain(|r| !rel_set.contains(r));
        }
        match element {
            ElementId::Node(_) => {
                self.node_mut(parent)?.nodes.remove(position);
            }
            ElementId::Port(_) => {
                self.node_mut(parent)?.ports.remove(position);
            }
            ElementId::Relation(_) => {
                self.node_mut(parent)?.relations.remove(position);
            }
        }
        let mut removed = Removed {
            element,
            position,
            nodes: Vec::new(),
            ports: Vec::new(),
            relations: Vec::new(),
            relation_links,
            port_relations,
        };
        for n in node_set {
            if let Some(rec) = self.nodes.get_mut(n.0 as usize).and_then(Option::take) {
                removed.nodes.push((n, rec));
            }
        }
        for p in port_set {
            if let Some(rec) = self.ports.get_mut(p.0 as usize).and_then(Option::take) {
                removed.ports.push((p, rec));
            }
        }
        for r in rel_set {
            if let Some(rec) = self.relations.get_mut(r.0 as usize).and_then(Option::take) {
                removed.relations.push((r, rec));
            }
        }
        Ok(removed)
    }

    /// Reinstates a [`Removed`] subtree at its former position.
    pub fn restore(&mut self, removed: Removed) -> Result<ElementId, GraphError> {
        for (id, _) in &removed.nodes {
            if self.node(*id).is_some() {
                return Err(GraphError::SlotOccupied((*id).into()));
            }
        }
        for (id, _) in &removed.ports {
            if self.port(*id).is_some() {
                return Err(GraphError::SlotOccupied((*id).into()));
            }
        }
        for (id, _) in &removed.relations {
            if self.relation(*id).is_some() {
                return Err(GraphError::SlotOccupied((*id).into()));
            }
        }
        let parent = match removed.element {
            ElementId::Node(id) => removed
                .nodes
                .iter()
                .find(|(n, _)| *n == id)
                .and_then(|(_, rec)| rec.container),
            ElementId::Port(id) => removed
                .ports
                .iter()
                .find(|(p, _)| *p == id)
                .map(|(_, rec)| rec.owner),
            ElementId::Relation(id) => removed
                .relations
                .iter()
                .find(|(r, _)| *r == id)
                .map(|(_, rec)| rec.container),
        }
        .ok_or(GraphError::Missing(removed.element))?;
        self.try_node(parent)?;
        for (r, _) in &removed.relation_links {
            self.try_relation(*r)?;
        }
        for (p, _) in &removed.port_relations {
            self.try_port(*p)?;
        }

        let Removed {
            element,
            position,
            nodes,
            ports,
            relations,
            relation_links,
            port_relations,
        } = removed;
        for (id, rec) in nodes {
            put_slot(&mut self.nodes, id.0, rec);
        }
        for (id, rec) in ports {
            put_slot(&mut self.ports, id.0, rec);
        }
        for (id, rec) in relations {
            put_slot(&mut self.relations, id.0, rec);
        }
        for (r, links) in relation_links {
            self.relation_mut(r)?.links = links;
        }
        for (p, rels) in port_relations {
            self.port_mut(p)?.relations = rels;
        }
        let parent_rec = self.node_mut(parent)?;
        match element {
            ElementId::Node(id) => {
                let at = position.min(parent_rec.nodes.len());
                parent_rec.nodes.insert(at, id);
            }
            ElementId::Port(id) => {
                let at = position.min(parent_rec.ports.len());
                parent_rec.ports.insert(at, id);
            }
            ElementId::Relation(id) => {
                let at = position.min(parent_rec.relations.len());
                parent_rec.relations.insert(at, id);
            }
        }
        Ok(element)
    }
}

fn uniquify(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_owned();
    }
    (2u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_owned())
}

fn live_ids<T>(slots: &[Option<T>]) -> impl Iterator<Item = u32> + '_ {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_some())
        .filter_map(|(i, _)| u32::try_from(i).ok())
}

fn next_index<T>(slots: &[Option<T>]) -> u32 {
    u32::try_from(slots.len()).unwrap_or(u32::MAX)
}

fn put_slot<T>(slots: &mut Vec<Option<T>>, index: u32, value: T) {
    let i = index as usize;
    if slots.len() <= i {
        slots.resize_with(i + 1, || None);
    }
    slots[i] = Some(value);
}
