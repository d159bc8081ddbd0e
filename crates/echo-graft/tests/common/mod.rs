// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]
use echo_graft::{
    Criterion, Graph, Link, NodeId, NodeKind, NodeSpec, Pattern, PortCriterion, PortId, PortSpec,
    RelationId,
};

/// Flat host whose atomic `Const` nodes carry the given `value` attributes.
pub fn const_host(values: &[i64]) -> (Graph, Vec<NodeId>) {
    let mut g = Graph::new("host");
    let root = g.root();
    let ids = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            g.add_node(root, NodeSpec::atomic(format!("c{i}"), "Const").with_attribute("value", *v))
                .expect("add const")
        })
        .collect();
    (g, ids)
}

/// Atomic node with one input port `in` and one output port `out`.
pub fn stage(g: &mut Graph, container: NodeId, name: &str, ty: &str) -> (NodeId, PortId, PortId) {
    let n = g.add_node(container, NodeSpec::atomic(name, ty)).expect("add stage");
    let i = g.add_port(n, PortSpec::input("in")).expect("add in");
    let o = g.add_port(n, PortSpec::output("out")).expect("add out");
    (n, i, o)
}

/// Relation in `container` linking the given endpoints.
pub fn connect(g: &mut Graph, container: NodeId, ends: &[PortId]) -> RelationId {
    let r = g.add_relation(container, "relation").expect("add relation");
    for p in ends {
        g.link(r, Link::Port(*p)).expect("link");
    }
    r
}

/// Host with a `Ramp` feeding a `Display`; `reversed` flips the direction.
pub fn ramp_display_host(reversed: bool) -> Graph {
    let mut g = Graph::new("host");
    let root = g.root();
    let ramp = g.add_node(root, NodeSpec::atomic("ramp", "Ramp")).expect("ramp");
    let display = g.add_node(root, NodeSpec::atomic("display", "Display")).expect("display");
    let (from, to) = if reversed {
        (
            g.add_port(display, PortSpec::output("output")).expect("port"),
            g.add_port(ramp, PortSpec::input("input")).expect("port"),
        )
    } else {
        (
            g.add_port(ramp, PortSpec::output("output")).expect("port"),
            g.add_port(display, PortSpec::input("input")).expect("port"),
        )
    };
    connect(&mut g, root, &[from, to]);
    g
}

/// Two matchers joined by one relation: `A` (typed `source`, one output
/// port) feeds `B` (typed `sink`, one input port).
pub fn edge_pattern(source: &str, sink: &str) -> (Pattern, NodeId, NodeId, RelationId) {
    let mut p = Pattern::new("lhs");
    let root = p.root();
    let a = p.add_matcher(root, "A", NodeKind::Atomic).expect("A");
    let b = p.add_matcher(root, "B", NodeKind::Atomic).expect("B");
    p.add_criterion(a.into(), Criterion::subclass(source)).expect("A type");
    p.add_criterion(a.into(), Criterion::port(PortCriterion::new().input(false).output(true)))
        .expect("A port");
    p.add_criterion(b.into(), Criterion::subclass(sink)).expect("B type");
    p.add_criterion(b.into(), Criterion::port(PortCriterion::new().input(true).output(false)))
        .expect("B port");
    let pa = p.port_of(a, 1).expect("A port id");
    let pb = p.port_of(b, 1).expect("B port id");
    let r = p.add_relation(root, "r").expect("relation");
    p.link(r, Link::Port(pa)).expect("link A");
    p.link(r, Link::Port(pb)).expect("link B");
    (p, a, b, r)
}

/// Single atomic matcher with an attribute criterion.
pub fn attribute_pattern(name: &str, value: &str) -> (Pattern, NodeId) {
    let mut p = Pattern::new("lhs");
    let root = p.root();
    let m = p.add_matcher(root, "M", NodeKind::Atomic).expect("M");
    p.add_criterion(m.into(), Criterion::attribute(name, value)).expect("criterion");
    (p, m)
}
