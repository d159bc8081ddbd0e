// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
use echo_graft::{
    export_fragment, import_fragment, structure_digest, ElementId, FragmentError, Graph,
    GraphCensus, NodeSpec, PortSpec,
};
mod common;
use common::{connect, stage};

fn boxed_pair() -> (Graph, echo_graft::NodeId) {
    let mut g = Graph::new("source");
    let root = g.root();
    let c = g
        .add_node(root, NodeSpec::composite("filter", "Box").at(4.0, 2.0))
        .expect("box");
    let c_in = g.add_port(c, PortSpec::input("in")).expect("in");
    let c_out = g.add_port(c, PortSpec::output("out").with_attribute("width", 2)).expect("out");
    let (_, a_in, a_out) = stage(&mut g, c, "a", "Gain");
    let (_, b_in, b_out) = stage(&mut g, c, "b", "Gain");
    connect(&mut g, c, &[c_in, a_in]);
    connect(&mut g, c, &[a_out, b_in]);
    connect(&mut g, c, &[b_out, c_out]);
    (g, c)
}

#[test]
fn exported_subtrees_import_into_another_graph() {
    let (source, c) = boxed_pair();
    let text = export_fragment(&source, c.into()).expect("export");

    let mut target = Graph::new("target");
    let root = target.root();
    let created = import_fragment(&mut target, root, &text).expect("import");
    let copy = created.first().and_then(|e| e.as_node()).expect("root first");

    assert_eq!(target.name(copy.into()), Some("filter"));
    assert_eq!(structure_digest(&target, copy), structure_digest(&source, c));
    let census = GraphCensus::of(&target);
    assert_eq!(census.nodes, 4);
    assert_eq!(census.ports, 6);
    assert_eq!(census.relations, 3);
    assert_eq!(census.links, 6);
    assert_eq!(created.len(), 3 + 6 + 3);
}

#[test]
fn importing_twice_uniquifies_the_root_name() {
    let (mut g, c) = boxed_pair();
    let root = g.root();
    let text = export_fragment(&g, c.into()).expect("export");
    import_fragment(&mut g, root, &text).expect("first");
    import_fragment(&mut g, root, &text).expect("second");
    let names: Vec<&str> = g
        .child_nodes(root)
        .iter()
        .filter_map(|n| g.name(ElementId::Node(*n)))
        .collect();
    assert_eq!(names, vec!["filter", "filter2", "filter3"]);
}

#[test]
fn corrupt_text_is_rejected() {
    let mut g = Graph::new("target");
    let root = g.root();
    assert!(matches!(import_fragment(&mut g, root, "zz"), Err(FragmentError::Hex(_))));
    assert!(matches!(import_fragment(&mut g, root, "ff00"), Err(FragmentError::Decode(_))));
    assert_eq!(GraphCensus::of(&g).nodes, 1);
}
