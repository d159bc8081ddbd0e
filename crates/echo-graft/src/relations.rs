// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Relation clean-up after a rewrite.
//!
//! Passes, in order:
//! - relations with fewer than two links are removed anywhere in the graph,
//!   repeatedly, since removing one can strand a relation linked to it;
//! - with hiding on, linked relations in a touched container are merged into
//!   one. A pair is left alone when a port on either side is linked to more
//!   than one relation, because merging would reorder its channels;
//! - with routing vertices on, relations in a touched container with more
//!   than two links and no vertex get one at the mean location of their
//!   endpoints;
//! - with hiding on, two-link relations in a touched container drop their
//!   vertex.
use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::edit::Editor;
use crate::graph::{Graph, GraphError};
use crate::ident::{ElementId, NodeId, RelationId};
use crate::record::{Link, Location};
use crate::transform::TransformReport;

/// Which optional passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TidyPolicy {
    pub(crate) hiding: bool,
    pub(crate) routing_vertices: bool,
}

pub(crate) fn tidy(
    editor: &mut Editor<'_>,
    touched: &BTreeSet<NodeId>,
    policy: TidyPolicy,
    report: &mut TransformReport,
) -> Result<(), GraphError> {
    report.dangling_removed += remove_dangling(editor)?;
    let live: Vec<NodeId> = touched
        .iter()
        .copied()
        .filter(|c| editor.graph().node(*c).is_some())
        .collect();
    if policy.hiding {
        for container in &live {
            report.relations_merged += merge_chains(editor, *container)?;
        }
        report.dangling_removed += remove_dangling(editor)?;
    }
    if policy.routing_vertices {
        for container in &live {
            report.vertices_added += add_vertices(editor, *container)?;
        }
    }
    if policy.hiding {
        for container in &live {
            clear_vertices(editor, *container)?;
        }
    }
    Ok(())
}

/// Removes every relation with fewer than two links, to a fixpoint.
pub(crate) fn remove_dangling(editor: &mut Editor<'_>) -> Result<usize, GraphError> {
    let mut removed = 0;
    loop {
        let dangling: Vec<RelationId> = {
            let graph = editor.graph();
            graph
                .relation_ids()
                .filter(|r| graph.relation(*r).is_some_and(|rec| rec.links.len() < 2))
                .collect()
        };
        if dangling.is_empty() {
            return Ok(removed);
        }
        for relation in dangling {
            if editor.graph().relation(relation).is_some() {
                debug!(relation = %ElementId::Relation(relation), "removing dangling relation");
                editor.remove(relation.into())?;
                removed += 1;
            }
        }
    }
}

fn fans_out(graph: &Graph, relation: RelationId) -> bool {
    graph.relation(relation).is_some_and(|rec| {
        rec.links.iter().any(|l| match l {
            Link::Port(p) => graph.port(*p).is_some_and(|port| port.relations.len() > 1),
            Link::Relation(_) => false,
        })
    })
}

fn merge_chains(editor: &mut Editor<'_>, container: NodeId) -> Result<usize, GraphError> {
    let mut merged = 0;
    let mut skipped: BTreeSet<(RelationId, RelationId)> = BTreeSet::new();
    loop {
        let pair = {
            let graph = editor.graph();
            graph.relations_in(container).iter().find_map(|r| {
                graph.relation(*r)?.links.iter().find_map(|l| match l {
                    Link::Relation(o) if !skipped.contains(&(*r, *o)) => Some((*r, *o)),
                    _ => None,
                })
            })
        };
        let Some((keep, absorb)) = pair else {
            return Ok(merged);
        };
        let graph = editor.graph();
        if fans_out(graph, keep) || fans_out(graph, absorb) {
            warn!(
                relation = %ElementId::Relation(keep),
                other = %ElementId::Relation(absorb),
                "leaving relations unmerged: a port has several relations"
            );
            skipped.insert((keep, absorb));
            skipped.insert((absorb, keep));
            continue;
        }
        let links: Vec<Link> = graph
            .relation(absorb)
            .map(|rec| rec.links.clone())
            .unwrap_or_default();
        editor.unlink(keep, Link::Relation(absorb))?;
        for link in links {
            if link == Link::Relation(keep) {
                continue;
            }
            editor.unlink(absorb, link)?;
            if !editor.graph().is_linked(keep, link) {
                editor.link(keep, link)?;
            }
        }
        editor.remove(absorb.into())?;
        merged += 1;
    }
}

/// Location a link contributes to a routing vertex.
fn endpoint_location(graph: &Graph, link: Link) -> Option<Location> {
    match link {
        Link::Port(p) => graph
            .port(p)
            .and_then(|port| graph.node(port.owner))
            .and_then(|n| n.location),
        Link::Relation(r) => graph.relation(r).and_then(|rec| rec.vertex),
    }
}

fn add_vertices(editor: &mut Editor<'_>, container: NodeId) -> Result<usize, GraphError> {
    let pending: Vec<(RelationId, Location)> = {
        let graph = editor.graph();
        graph
            .relations_in(container)
            .iter()
            .filter_map(|r| {
                let rec = graph.relation(*r)?;
                if rec.links.len() <= 2 || rec.vertex.is_some() {
                    return None;
                }
                let points: Vec<Location> = rec
                    .links
                    .iter()
                    .filter_map(|l| endpoint_location(graph, *l))
                    .collect();
                #[allow(clippy::cast_precision_loss)]
                let count = points.len().max(1) as f64;
                let x = points.iter().map(|p| p.x).sum::<f64>() / count;
                let y = points.iter().map(|p| p.y).sum::<f64>() / count;
                Some((*r, Location { x, y }))
            })
            .collect()
    };
    let added = pending.len();
    for (relation, vertex) in pending {
        editor.set_vertex(relation, Some(vertex))?;
    }
    Ok(added)
}

fn clear_vertices(editor: &mut Editor<'_>, container: NodeId) -> Result<(), GraphError> {
    let pending: Vec<RelationId> = {
        let graph = editor.graph();
        graph
            .relations_in(container)
            .iter()
            .copied()
            .filter(|r| {
                graph
                    .relation(*r)
                    .is_some_and(|rec| rec.links.len() == 2 && rec.vertex.is_some())
            })
            .collect()
    };
    for relation in pending {
        editor.set_vertex(relation, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::record::{NodeSpec, PortSpec};

    fn policy() -> TidyPolicy {
        TidyPolicy {
            hiding: true,
            routing_vertices: true,
        }
    }

    #[test]
    fn chains_merge_and_fan_in_gets_a_vertex() {
        let mut g = Graph::new("top");
        let root = g.root();
        let mut outs = Vec::new();
        for (i, x) in [0.0, 10.0, 20.0].into_iter().enumerate() {
            let n = g.add_node(root, NodeSpec::atomic(format!("n{i}"), "T").at(x, 3.0)).unwrap();
            outs.push(g.add_port(n, PortSpec::output("p")).unwrap());
        }
        let r1 = g.add_relation(root, "r").unwrap();
        let r2 = g.add_relation(root, "r").unwrap();
        g.link(r1, Link::Port(outs[0])).unwrap();
        g.link(r1, Link::Relation(r2)).unwrap();
        g.link(r2, Link::Port(outs[1])).unwrap();
        g.link(r2, Link::Port(outs[2])).unwrap();

        let mut report = TransformReport::default();
        let touched = BTreeSet::from([root]);
        tidy(&mut Editor::detached(&mut g), &touched, policy(), &mut report).unwrap();
        assert_eq!(report.relations_merged, 1);
        assert_eq!(report.vertices_added, 1);
        let rec = g.relation(r1).unwrap();
        assert_eq!(rec.links.len(), 3);
        assert_eq!(rec.vertex, Some(Location { x: 10.0, y: 3.0 }));
        assert!(g.relation(r2).is_none());
    }

    #[test]
    fn dangling_removal_cascades() {
        let mut g = Graph::new("top");
        let root = g.root();
        let n = g.add_node(root, NodeSpec::atomic("n", "T")).unwrap();
        let p = g.add_port(n, PortSpec::output("p")).unwrap();
        let r1 = g.add_relation(root, "r").unwrap();
        let r2 = g.add_relation(root, "r").unwrap();
        g.link(r1, Link::Port(p)).unwrap();
        g.link(r1, Link::Relation(r2)).unwrap();
        g.add_relation(root, "lonely").unwrap();
        let removed = remove_dangling(&mut Editor::detached(&mut g)).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(g.relation_ids().count(), 0);
    }

    #[test]
    fn fanned_out_ports_block_merging() {
        let mut g = Graph::new("top");
        let root = g.root();
        let a = g.add_node(root, NodeSpec::atomic("a", "T")).unwrap();
        let b = g.add_node(root, NodeSpec::atomic("b", "T")).unwrap();
        let pa = g.add_port(a, PortSpec::output("p").multiport(true)).unwrap();
        let pb = g.add_port(b, PortSpec::input("p")).unwrap();
        let r1 = g.add_relation(root, "r").unwrap();
        let r2 = g.add_relation(root, "r").unwrap();
        let r3 = g.add_relation(root, "r").unwrap();
        g.link(r1, Link::Port(pa)).unwrap();
        g.link(r3, Link::Port(pa)).unwrap();
        g.link(r3, Link::Port(pb)).unwrap();
        g.link(r1, Link::Relation(r2)).unwrap();
        g.link(r2, Link::Port(pb)).unwrap();
        let merged = merge_chains(&mut Editor::detached(&mut g), root).unwrap();
        assert_eq!(merged, 0);
        assert!(g.relation(r2).is_some());
    }
}
