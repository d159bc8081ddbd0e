// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Structural digests and element censuses.
//!
//! Digest contract
//! - [`structure_digest`] is a BLAKE3 digest of a subtree's shape: node kinds,
//!   type labels, attributes, port names and flags, child digests and relation
//!   topology. It ignores arena ids, the subtree root's own name, layout hints
//!   (locations, vertices) and relation names, so a copy of a subtree
//!   produced by export/import or by a rewrite that preserves everything
//!   hashes identically to the original.
//! - Child nodes are sorted by name (names are unique per container);
//!   relations are sorted by their canonical endpoint descriptors.
//! - Strings are length-prefixed with an 8-byte little-endian length.
use blake3::Hasher;

use crate::graph::Graph;
use crate::ident::{Hash, NodeId, RelationId};
use crate::record::{Attributes, Link};
use crate::value::Value;

/// Element counts of a whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphCensus {
    /// Live nodes, root included.
    pub nodes: usize,
    /// Live ports.
    pub ports: usize,
    /// Live relations.
    pub relations: usize,
    /// Relation links (relation-to-relation links counted once).
    pub links: usize,
}

impl GraphCensus {
    /// Counts every live element of `graph`.
    pub fn of(graph: &Graph) -> Self {
        let mut links = 0;
        let mut chained = 0;
        for r in graph.relation_ids() {
            if let Some(rec) = graph.relation(r) {
                for link in &rec.links {
                    match link {
                        Link::Port(_) => links += 1,
                        Link::Relation(_) => chained += 1,
                    }
                }
            }
        }
        Self {
            nodes: graph.node_ids().count(),
            ports: graph.port_ids().count(),
            relations: graph.relation_ids().count(),
            links: links + chained / 2,
        }
    }
}

/// Relations with fewer than two links anywhere in `graph`.
pub fn dangling_relations(graph: &Graph) -> Vec<RelationId> {
    graph
        .relation_ids()
        .filter(|r| graph.relation(*r).is_some_and(|rec| rec.links.len() < 2))
        .collect()
}

/// Shape digest of the subtree rooted at `node`.
pub fn structure_digest(graph: &Graph, node: NodeId) -> Hash {
    digest_node(graph, node, false)
}

fn digest_node(graph: &Graph, node: NodeId, include_name: bool) -> Hash {
    let mut hasher = Hasher::new();
    let Some(rec) = graph.node(node) else {
        return hasher.finalize().into();
    };
    if include_name {
        put_str(&mut hasher, &rec.name);
    }
    put_str(&mut hasher, graph.types().label(rec.ty).unwrap_or_default());
    hasher.update(&[rec.kind as u8, u8::from(rec.opaque)]);
    put_attributes(&mut hasher, &rec.attributes);

    hasher.update(&(rec.ports.len() as u64).to_le_bytes());
    for p in &rec.ports {
        if let Some(port) = graph.port(*p) {
            put_str(&mut hasher, &port.name);
            hasher.update(&[
                u8::from(port.input),
                u8::from(port.output),
                u8::from(port.multiport),
            ]);
            put_attributes(&mut hasher, &port.attributes);
        }
    }

    let mut children: Vec<(&str, Hash)> = rec
        .nodes
        .iter()
        .filter_map(|c| {
            graph
                .node(*c)
                .map(|child| (child.name.as_str(), digest_node(graph, *c, true)))
        })
        .collect();
    children.sort_unstable();
    hasher.update(&(children.len() as u64).to_le_bytes());
    for (_, h) in children {
        hasher.update(&h);
    }

    let mut relations: Vec<String> = rec
        .relations
        .iter()
        .map(|r| describe_relation(graph, node, *r))
        .collect();
    relations.sort_unstable();
    hasher.update(&(relations.len() as u64).to_le_bytes());
    for r in relations {
        put_str(&mut hasher, &r);
    }
    hasher.finalize().into()
}

fn describe_relation(graph: &Graph, container: NodeId, relation: RelationId) -> String {
    let Some(rec) = graph.relation(relation) else {
        return String::new();
    };
    let mut ends: Vec<String> = rec
        .links
        .iter()
        .map(|link| match link {
            Link::Port(p) => graph.port(*p).map_or_else(String::new, |port| {
                let owner = if port.owner == container {
                    "^"
                } else {
                    graph.name(port.owner.into()).unwrap_or_default()
                };
                format!("{owner}.{}", port.name)
            }),
            Link::Relation(_) => "~".to_owned(),
        })
        .collect();
    ends.sort_unstable();
    let attrs: Vec<String> = rec
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    format!("[{}]{{{}}}", ends.join(","), attrs.join(","))
}

fn put_str(hasher: &mut Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn put_attributes(hasher: &mut Hasher, attrs: &Attributes) {
    hasher.update(&(attrs.len() as u64).to_le_bytes());
    for (k, v) in attrs {
        put_str(hasher, k);
        match v {
            Value::Bool(b) => {
                hasher.update(&[0, u8::from(*b)]);
            }
            Value::Int(n) => {
                hasher.update(&[1]);
                hasher.update(&n.to_le_bytes());
            }
            Value::Str(s) => {
                hasher.update(&[2]);
                put_str(hasher, s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::record::{NodeSpec, PortSpec};

    #[test]
    fn digest_tracks_topology_not_ids() {
        let build = |extra_first: bool| {
            let mut g = Graph::new("top");
            let root = g.root();
            if extra_first {
                let junk = g.add_node(root, NodeSpec::atomic("junk", "T")).unwrap();
                g.remove(junk.into()).unwrap();
            }
            let a = g.add_node(root, NodeSpec::atomic("a", "T")).unwrap();
            let b = g.add_node(root, NodeSpec::atomic("b", "T")).unwrap();
            let pa = g.add_port(a, PortSpec::output("o")).unwrap();
            let pb = g.add_port(b, PortSpec::input("i")).unwrap();
            let r = g.add_relation(root, "r").unwrap();
            g.link(r, Link::Port(pa)).unwrap();
            g.link(r, Link::Port(pb)).unwrap();
            g
        };
        let g1 = build(false);
        let g2 = build(true);
        assert_eq!(structure_digest(&g1, g1.root()), structure_digest(&g2, g2.root()));

        let mut g3 = build(false);
        let r = g3.relations_in(g3.root())[0];
        let first = g3.relation(r).unwrap().links[0];
        g3.unlink(r, first).unwrap();
        assert_ne!(structure_digest(&g1, g1.root()), structure_digest(&g3, g3.root()));
        assert_eq!(dangling_relations(&g3), vec![r]);
        assert_eq!(GraphCensus::of(&g3).links, 1);
    }
}
