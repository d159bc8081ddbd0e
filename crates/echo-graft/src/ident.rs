// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Canonical 256-bit hash used for type labels and structural digests.
pub type Hash = [u8; 32];

/// Arena index of a node inside one [`Graph`](crate::Graph).
///
/// Indices are never reused within a graph, so an id that was removed and
/// later restored (undo) refers to the same logical element.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Arena index of a port inside one graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// Arena index of a relation (hyperedge) inside one graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct RelationId(pub u32);

/// Any addressable graph element.
///
/// Pattern, replacement and host graphs each own their own arena, so an
/// `ElementId` is only meaningful together with the graph it came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ElementId {
    /// A node (entity, composite or state machine).
    Node(NodeId),
    /// A port owned by a node.
    Port(PortId),
    /// A relation contained in a composite node.
    Relation(RelationId),
}

impl ElementId {
    /// Returns the node id if this element is a node.
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the port id if this element is a port.
    pub fn as_port(self) -> Option<PortId> {
        match self {
            Self::Port(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the relation id if this element is a relation.
    pub fn as_relation(self) -> Option<RelationId> {
        match self {
            Self::Relation(id) => Some(id),
            _ => None,
        }
    }

    /// Short lowercase name of the element kind, used in error messages.
    pub fn kind_name(self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::Port(_) => "port",
            Self::Relation(_) => "relation",
        }
    }
}

impl From<NodeId> for ElementId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PortId> for ElementId {
    fn from(id: PortId) -> Self {
        Self::Port(id)
    }
}

impl From<RelationId> for ElementId {
    fn from(id: RelationId) -> Self {
        Self::Relation(id)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(NodeId(n)) => write!(f, "node#{n}"),
            Self::Port(PortId(n)) => write!(f, "port#{n}"),
            Self::Relation(RelationId(n)) => write!(f, "relation#{n}"),
        }
    }
}

/// Strongly typed identifier for the logical kind of a node.
///
/// `TypeId` values are produced by [`make_type_id`] which hashes a label; the
/// owning graph's [`TypeRegistry`](crate::TypeRegistry) keeps the label and
/// the subclass chain.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TypeId(pub Hash);

/// Produces a stable type identifier derived from a label using BLAKE3.
pub fn make_type_id(label: &str) -> TypeId {
    let mut hasher = Hasher::new();
    hasher.update(b"type:");
    hasher.update(label.as_bytes());
    TypeId(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ids_are_stable_and_distinct() {
        assert_eq!(make_type_id("Ramp"), make_type_id("Ramp"));
        assert_ne!(make_type_id("Ramp"), make_type_id("Display"));
    }

    #[test]
    fn element_id_accessors_match_variant() {
        let e = ElementId::from(PortId(3));
        assert_eq!(e.as_port(), Some(PortId(3)));
        assert_eq!(e.as_node(), None);
        assert_eq!(e.to_string(), "port#3");
    }
}
