// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
use std::collections::BTreeSet;

use echo_graft::{ElementId, Graph, GraphMatcher, Link, NodeId, PortRecord};
use proptest::prelude::*;
mod common;
use common::{attribute_pattern, connect, const_host, edge_pattern, stage};

fn matcher() -> GraphMatcher {
    GraphMatcher::default()
}

fn edge_host(nodes: usize, edges: &BTreeSet<(usize, usize)>) -> (Graph, Vec<NodeId>) {
    let mut g = Graph::new("host");
    let root = g.root();
    let stages: Vec<_> = (0..nodes)
        .map(|i| stage(&mut g, root, &format!("s{i}"), "Stage"))
        .collect();
    for (from, to) in edges {
        connect(&mut g, root, &[stages[*from].2, stages[*to].1]);
    }
    let ids = stages.iter().map(|s| s.0).collect();
    (g, ids)
}

/// Every ordered pair of distinct `Stage` nodes, paired with each relation
/// joining an output-only port of the first to an input-only port of the
/// second. Found by walking the host, not the generated edge list.
fn brute_force_edges(host: &Graph, ids: &[NodeId]) -> Vec<(usize, usize)> {
    let ports = |n: NodeId, want: fn(&PortRecord) -> bool| {
        host.ports(n)
            .iter()
            .copied()
            .filter(move |p| host.port(*p).is_some_and(want))
            .collect::<Vec<_>>()
    };
    let stages: Vec<(usize, NodeId)> = ids
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, n)| host.type_label(*n) == Some("Stage"))
        .collect();
    let mut out = Vec::new();
    for (i, a) in &stages {
        for (j, b) in &stages {
            if i == j {
                continue;
            }
            for pa in ports(*a, |p| p.output && !p.input) {
                for pb in ports(*b, |p| p.input && !p.output) {
                    let relations = host.port(pa).map(|p| p.relations.clone()).unwrap_or_default();
                    for r in relations {
                        if host.is_linked(r, Link::Port(pb)) {
                            out.push((*i, *j));
                        }
                    }
                }
            }
        }
    }
    out
}

fn edges_strategy() -> impl Strategy<Value = (usize, BTreeSet<(usize, usize)>)> {
    (1usize..=6).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::btree_set((0..n, 0..n), 0..=n * n / 2),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn edge_matches_agree_with_exhaustive_enumeration((n, edges) in edges_strategy()) {
        let (host, ids) = edge_host(n, &edges);
        let (pattern, a, b, _) = edge_pattern("Stage", "Stage");
        let results = matcher().match_all(&pattern, &host).expect("match");

        let found: BTreeSet<(usize, usize)> = results
            .iter()
            .map(|m| {
                let index = |p: NodeId| {
                    m.get(p.into())
                        .and_then(ElementId::as_node)
                        .and_then(|h| ids.iter().position(|id| *id == h))
                        .expect("bound to a stage")
                };
                (index(a), index(b))
            })
            .collect();
        let oracle = brute_force_edges(&host, &ids);
        prop_assert_eq!(results.len(), oracle.len());
        prop_assert_eq!(found, oracle.into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn attribute_matches_are_exactly_the_equal_values(
        values in prop::collection::vec(0i64..4, 0..8),
        wanted in 0i64..4,
    ) {
        let (host, ids) = const_host(&values);
        let (pattern, m) = attribute_pattern("value", &wanted.to_string());
        let found: Vec<ElementId> = matcher()
            .match_all(&pattern, &host)
            .expect("match")
            .iter()
            .filter_map(|r| r.get(m.into()))
            .collect();
        let expected: Vec<ElementId> = ids
            .iter()
            .zip(&values)
            .filter(|(_, v)| **v == wanted)
            .map(|(id, _)| ElementId::Node(*id))
            .collect();
        prop_assert_eq!(found, expected);
    }
}
