// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Graph record types: nodes, ports and relations.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ident::{NodeId, PortId, RelationId, TypeId};
use crate::value::Value;

/// Ordered attribute table attached to every element.
pub type Attributes = BTreeMap<String, Value>;

/// Planar coordinate used for layout hints (node locations, relation vertices).
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Location {
    /// Creates a location.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Structural role of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Leaf entity; may own ports but no children.
    Atomic,
    /// Container of nodes and relations.
    Composite,
    /// Container whose nodes are states and whose relations are transitions.
    StateMachine,
}

impl NodeKind {
    /// True when nodes of this kind may contain children.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Composite | Self::StateMachine)
    }
}

/// Materialised record for a single node.
///
/// Invariants
/// - `container` is `None` only for the graph root.
/// - `ports`, `nodes` and `relations` list owned children in insertion order.
/// - Atomic nodes have empty `nodes` and `relations`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Name, unique among the container's nodes.
    pub name: String,
    /// Type identifier; label and lineage live in the graph's type registry.
    pub ty: TypeId,
    /// Structural role.
    pub kind: NodeKind,
    /// Opaque containers keep their boundary when container ignoring is on.
    pub opaque: bool,
    /// Owning container.
    pub container: Option<NodeId>,
    /// Attribute table.
    pub attributes: Attributes,
    /// Layout hint used when routing vertices are placed.
    pub location: Option<Location>,
    /// Owned ports.
    pub ports: Vec<PortId>,
    /// Child nodes.
    pub nodes: Vec<NodeId>,
    /// Contained relations.
    pub relations: Vec<RelationId>,
}

/// Materialised record for a port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortRecord {
    /// Name, unique among the owner's ports.
    pub name: String,
    /// Owning node.
    pub owner: NodeId,
    /// Accepts inbound connections.
    pub input: bool,
    /// Emits outbound connections.
    pub output: bool,
    /// Accepts several channels.
    pub multiport: bool,
    /// Attribute table.
    pub attributes: Attributes,
    /// Linked relations in link order (channel order for multiports).
    pub relations: Vec<RelationId>,
}

/// Endpoint of a relation link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Link {
    /// A port of a child node, or of the relation's container (inside link).
    Port(PortId),
    /// Another relation in the same container (relation chaining).
    Relation(RelationId),
}

/// Materialised record for an n-ary relation.
///
/// Relation-to-relation links are recorded on both relations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Name, unique among the container's relations.
    pub name: String,
    /// Containing composite.
    pub container: NodeId,
    /// Attribute table (`width` for buses, `guard` for transitions).
    pub attributes: Attributes,
    /// Explicit routing vertex, if any.
    pub vertex: Option<Location>,
    /// Linked endpoints in link order.
    pub links: Vec<Link>,
}

/// Caller-facing description of a node to create.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Requested name; made unique in the container when it collides.
    pub name: String,
    /// Type label; registered on demand.
    pub ty: String,
    /// Structural role.
    pub kind: NodeKind,
    /// See [`NodeRecord::opaque`].
    pub opaque: bool,
    /// Initial attributes.
    pub attributes: Attributes,
    /// Initial location.
    pub location: Option<Location>,
}

impl NodeSpec {
    /// Atomic node of type `ty`.
    pub fn atomic(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            kind: NodeKind::Atomic,
            opaque: true,
            attributes: Attributes::new(),
            location: None,
        }
    }

    /// Transparent composite node of type `ty`.
    pub fn composite(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Composite,
            opaque: false,
            ..Self::atomic(name, ty)
        }
    }

    /// State-machine node of type `ty`.
    pub fn state_machine(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::StateMachine,
            ..Self::atomic(name, ty)
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the location.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.location = Some(Location::new(x, y));
        self
    }

    /// Marks a composite as opaque (it keeps its boundary when container
    /// ignoring is enabled).
    pub fn opaque(mut self, opaque: bool) -> Self {
        self.opaque = opaque;
        self
    }
}

/// Caller-facing description of a port to create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name.
    pub name: String,
    /// Input flag.
    pub input: bool,
    /// Output flag.
    pub output: bool,
    /// Multiport flag.
    pub multiport: bool,
    /// Initial attributes.
    pub attributes: Attributes,
}

impl PortSpec {
    /// Input port.
    pub fn input(name: impl Into<String>) -> Self {
        Self::new(name, true, false)
    }

    /// Output port.
    pub fn output(name: impl Into<String>) -> Self {
        Self::new(name, false, true)
    }

    /// Port with explicit direction flags.
    pub fn new(name: impl Into<String>, input: bool, output: bool) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            multiport: false,
            attributes: Attributes::new(),
        }
    }

    /// Sets the multiport flag.
    pub fn multiport(mut self, multiport: bool) -> Self {
        self.multiport = multiport;
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}
