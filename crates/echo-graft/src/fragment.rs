// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Portable graph fragments: capture, instantiate, export and import.
//!
//! A fragment is a self-contained tree of plain records. Links between
//! elements inside the fragment are stored as indices; links that leave the
//! fragment are not captured. The exported form is hex-encoded canonical CBOR.
use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::edit::Editor;
use crate::graph::{Graph, GraphError};
use crate::ident::{ElementId, NodeId, PortId, RelationId};
use crate::record::{Attributes, Link, Location, NodeKind, NodeSpec, PortSpec};

/// Errors raised while encoding, decoding or instantiating fragments.
#[derive(Debug, Error)]
pub enum FragmentError {
    /// CBOR serialisation failed.
    #[error("fragment encode failed: {0}")]
    Encode(String),
    /// CBOR deserialisation failed.
    #[error("fragment decode failed: {0}")]
    Decode(String),
    /// Exported text is not valid hex.
    #[error("fragment is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// An index link points outside the fragment.
    #[error("fragment link references missing element: {0}")]
    BadReference(String),
    /// The target graph rejected an edit.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl FragmentError {
    /// Element the error refers to, if any.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::Graph(e) => e.element(),
            _ => None,
        }
    }
}

/// How much of a node to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Node, ports, child nodes and contained relations, recursively.
    Deep,
    /// Node and ports only; children are handled by the caller.
    Shallow,
}

/// Captured port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortFragment {
    name: String,
    input: bool,
    output: bool,
    multiport: bool,
    attributes: Attributes,
}

/// Endpoint of a captured relation link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LinkRef {
    /// Port of the enclosing node, by index.
    Boundary(usize),
    /// Port of a child node, by (child index, port index).
    Child(usize, usize),
    /// Sibling relation, by index.
    Relation(usize),
}

/// Captured relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationFragment {
    name: String,
    attributes: Attributes,
    vertex: Option<Location>,
    links: Vec<LinkRef>,
}

/// Captured node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFragment {
    name: String,
    lineage: Vec<String>,
    kind: NodeKind,
    opaque: bool,
    attributes: Attributes,
    location: Option<Location>,
    ports: Vec<PortFragment>,
    nodes: Vec<NodeFragment>,
    relations: Vec<RelationFragment>,
}

/// Root of a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fragment {
    /// A node subtree.
    Node(NodeFragment),
    /// A lone port.
    Port(PortFragment),
    /// A lone, unlinked relation.
    Relation(RelationFragment),
}

impl Fragment {
    /// Captures `element` from `graph`.
    ///
    /// Returns the fragment and the ids of every captured element in the
    /// order [`instantiate`](Self::instantiate) creates their copies.
    pub fn capture(
        graph: &Graph,
        element: ElementId,
        depth: Depth,
    ) -> Result<(Self, Vec<ElementId>), GraphError> {
        let mut order = Vec::new();
        let fragment = match element {
            ElementId::Node(id) => Self::Node(capture_node(graph, id, depth, &mut order)?),
            ElementId::Port(id) => {
                order.push(id.into());
                Self::Port(capture_port(graph, id)?)
            }
            ElementId::Relation(id) => {
                order.push(id.into());
                let rel = graph.try_relation(id)?;
                Self::Relation(RelationFragment {
                    name: rel.name.clone(),
                    attributes: rel.attributes.clone(),
                    vertex: rel.vertex,
                    links: Vec::new(),
                })
            }
        };
        Ok((fragment, order))
    }

    /// Name of the fragment root.
    pub fn name(&self) -> &str {
        match self {
            Self::Node(n) => &n.name,
            Self::Port(p) => &p.name,
            Self::Relation(r) => &r.name,
        }
    }

    /// Instantiates the fragment under `container` (the owner node for a port
    /// fragment) and returns the new ids in capture order.
    pub fn instantiate(
        &self,
        editor: &mut Editor<'_>,
        container: NodeId,
    ) -> Result<Vec<ElementId>, FragmentError> {
        let mut created = Vec::new();
        match self {
            Self::Node(node) => {
                instantiate_node(editor, container, node, &mut created)?;
            }
            Self::Port(port) => {
                let id = editor.add_port(container, port.spec())?;
                created.push(id.into());
            }
            Self::Relation(rel) => {
                let id =
                    editor.add_relation(container, &rel.name, rel.attributes.clone(), rel.vertex)?;
                created.push(id.into());
            }
        }
        Ok(created)
    }

    /// Canonical CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FragmentError> {
        let mut bytes = Vec::new();
        into_writer(self, &mut bytes).map_err(|e| FragmentError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes canonical CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FragmentError> {
        from_reader(bytes).map_err(|e| FragmentError::Decode(e.to_string()))
    }
}

impl PortFragment {
    fn spec(&self) -> PortSpec {
        PortSpec {
            name: self.name.clone(),
            input: self.input,
            output: self.output,
            multiport: self.multiport,
            attributes: self.attributes.clone(),
        }
    }
}

fn capture_port(graph: &Graph, id: PortId) -> Result<PortFragment, GraphError> {
    let p = graph.try_port(id)?;
    Ok(PortFragment {
        name: p.name.clone(),
        input: p.input,
        output: p.output,
        multiport: p.multiport,
        attributes: p.attributes.clone(),
    })
}

fn capture_node(
    graph: &Graph,
    id: NodeId,
    depth: Depth,
    order: &mut Vec<ElementId>,
) -> Result<NodeFragment, GraphError> {
    let rec = graph.try_node(id)?;
    order.push(id.into());
    let mut ports = Vec::with_capacity(rec.ports.len());
    for p in &rec.ports {
        order.push((*p).into());
        ports.push(capture_port(graph, *p)?);
    }
    let mut nodes = Vec::new();
    let mut relations = Vec::new();
    if depth == Depth::Deep {
        for child in &rec.nodes {
            nodes.push(capture_node(graph, *child, depth, order)?);
        }
        for r in &rec.relations {
            order.push((*r).into());
            relations.push(capture_relation(graph, id, *r)?);
        }
    }
    Ok(NodeFragment {
        name: rec.name.clone(),
        lineage: graph.types().lineage_labels(rec.ty),
        kind: rec.kind,
        opaque: rec.opaque,
        attributes: rec.attributes.clone(),
        location: rec.location,
        ports,
        nodes,
        relations,
    })
}

fn capture_relation(
    graph: &Graph,
    container: NodeId,
    id: RelationId,
) -> Result<RelationFragment, GraphError> {
    let parent = graph.try_node(container)?;
    let rel = graph.try_relation(id)?;
    let mut links = Vec::with_capacity(rel.links.len());
    for link in &rel.links {
        let captured = match link {
            Link::Port(p) => {
                let owner = graph.try_port(*p)?.owner;
                if owner == container {
                    parent.ports.iter().position(|x| x == p).map(LinkRef::Boundary)
                } else {
                    parent.nodes.iter().position(|n| *n == owner).and_then(|ci| {
                        graph
                            .ports(owner)
                            .iter()
                            .position(|x| x == p)
                            .map(|pi| LinkRef::Child(ci, pi))
                    })
                }
            }
            Link::Relation(o) => parent
                .relations
                .iter()
                .position(|x| x == o)
                .map(LinkRef::Relation),
        };
        if let Some(l) = captured {
            links.push(l);
        }
    }
    Ok(RelationFragment {
        name: rel.name.clone(),
        attributes: rel.attributes.clone(),
        vertex: rel.vertex,
        links,
    })
}

fn instantiate_node(
    editor: &mut Editor<'_>,
    container: NodeId,
    frag: &NodeFragment,
    created: &mut Vec<ElementId>,
) -> Result<NodeId, FragmentError> {
    editor.declare_lineage(&frag.lineage);
    let spec = NodeSpec {
        name: frag.name.clone(),
        ty: frag.lineage.first().cloned().unwrap_or_default(),
        kind: frag.kind,
        opaque: frag.opaque,
        attributes: frag.attributes.clone(),
        location: frag.location,
    };
    let id = editor.add_node(container, spec)?;
    created.push(id.into());
    let mut ports = Vec::with_capacity(frag.ports.len());
    for p in &frag.ports {
        let pid = editor.add_port(id, p.spec())?;
        created.push(pid.into());
        ports.push(pid);
    }
    let mut children = Vec::with_capacity(frag.nodes.len());
    for child in &frag.nodes {
        children.push(instantiate_node(editor, id, child, created)?);
    }
    let mut relations = Vec::with_capacity(frag.relations.len());
    for rel in &frag.relations {
        let rid = editor.add_relation(id, &rel.name, rel.attributes.clone(), rel.vertex)?;
        created.push(rid.into());
        relations.push(rid);
    }
    for (rel, rid) in frag.relations.iter().zip(&relations) {
        for link in &rel.links {
            let target = match *link {
                LinkRef::Boundary(pi) => ports.get(pi).map(|p| Link::Port(*p)),
                LinkRef::Child(ci, pi) => children
                    .get(ci)
                    .and_then(|c| editor.graph().ports(*c).get(pi).copied())
                    .map(Link::Port),
                LinkRef::Relation(ri) => relations.get(ri).map(|r| Link::Relation(*r)),
            }
            .ok_or_else(|| FragmentError::BadReference(format!("{link:?} in `{}`", rel.name)))?;
            if !editor.graph().is_linked(*rid, target) {
                editor.link(*rid, target)?;
            }
        }
    }
    Ok(id)
}

/// Serialises `element` (deep) into an opaque string.
pub fn export_fragment(graph: &Graph, element: ElementId) -> Result<String, FragmentError> {
    let (fragment, _) = Fragment::capture(graph, element, Depth::Deep)?;
    Ok(hex::encode(fragment.to_bytes()?))
}

/// Instantiates an exported fragment under `container` and returns the
/// created elements, fragment root first.
pub fn import_fragment(
    graph: &mut Graph,
    container: NodeId,
    serialized: &str,
) -> Result<Vec<ElementId>, FragmentError> {
    let bytes = hex::decode(serialized.trim())?;
    let fragment = Fragment::from_bytes(&bytes)?;
    fragment.instantiate(&mut Editor::detached(graph), container)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::snapshot::structure_digest;

    #[test]
    fn deep_export_import_is_isomorphic() {
        let mut g = Graph::new("top");
        let root = g.root();
        let c = g.add_node(root, NodeSpec::composite("box", "Box")).unwrap();
        let inp = g.add_port(c, PortSpec::input("in")).unwrap();
        let a = g.add_node(c, NodeSpec::atomic("a", "Gain").with_attribute("k", 2)).unwrap();
        let ain = g.add_port(a, PortSpec::input("in")).unwrap();
        let r = g.add_relation(c, "r").unwrap();
        g.link(r, Link::Port(inp)).unwrap();
        g.link(r, Link::Port(ain)).unwrap();

        let text = export_fragment(&g, c.into()).unwrap();
        let created = import_fragment(&mut g, root, &text).unwrap();
        let copy = created[0].as_node().unwrap();
        assert_eq!(g.name(copy.into()), Some("box2"));
        assert_eq!(created.len(), 5);
        assert_eq!(structure_digest(&g, c), structure_digest(&g, copy));
    }

    #[test]
    fn shallow_capture_skips_children() {
        let mut g = Graph::new("top");
        let root = g.root();
        let c = g.add_node(root, NodeSpec::composite("box", "Box")).unwrap();
        g.add_port(c, PortSpec::output("out")).unwrap();
        g.add_node(c, NodeSpec::atomic("a", "Gain")).unwrap();
        let (frag, order) = Fragment::capture(&g, c.into(), Depth::Shallow).unwrap();
        assert_eq!(order.len(), 2);
        assert!(matches!(&frag, Fragment::Node(n) if n.nodes.is_empty() && n.ports.len() == 1));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut g = Graph::new("top");
        let root = g.root();
        assert!(matches!(import_fragment(&mut g, root, "zz"), Err(FragmentError::Hex(_))));
        assert!(matches!(
            import_fragment(&mut g, root, "00ff"),
            Err(FragmentError::Decode(_))
        ));
    }
}
