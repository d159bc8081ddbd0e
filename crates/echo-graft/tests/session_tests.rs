// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
use echo_graft::{
    structure_digest, ElementId, GraftConfig, Graph, GraphCensus, MatchError, NodeKind, NodeSpec,
    Operation, Pattern, PortSpec, Replacement, SessionError, TransformSession, TransformationRule,
    Value,
};
mod common;
use common::{attribute_pattern, connect, const_host, stage};

fn fingerprint(g: &Graph) -> (GraphCensus, echo_graft::Hash) {
    (GraphCensus::of(g), structure_digest(g, g.root()))
}

fn nested_host() -> Graph {
    let mut host = Graph::new("host");
    let root = host.root();
    let (_, _, src_out) = stage(&mut host, root, "src", "Source");
    let c = host.add_node(root, NodeSpec::composite("C", "Box")).expect("C");
    let c_in = host.add_port(c, PortSpec::input("in")).expect("in");
    let c_out = host.add_port(c, PortSpec::output("out")).expect("out");
    let (_, a_in, a_out) = stage(&mut host, c, "a", "Gain");
    let (_, dst_in, _) = stage(&mut host, root, "dst", "Sink");
    connect(&mut host, root, &[src_out, c_in]);
    connect(&mut host, c, &[c_in, a_in]);
    connect(&mut host, c, &[a_out, c_out]);
    connect(&mut host, root, &[c_out, dst_in]);
    host
}

#[test]
fn undo_reverts_a_whole_batch() {
    let mut session = TransformSession::new(nested_host(), GraftConfig::default());
    let before = fingerprint(session.host());

    let mut pattern = Pattern::new("lhs");
    let proot = pattern.root();
    pattern.add_matcher(proot, "C", NodeKind::Composite).expect("C");
    let mut rule = TransformationRule::new("dissolve", pattern, Replacement::new("rhs"));

    let report = session.apply_all(&mut rule).expect("apply");
    assert_eq!(report.applied, 1);
    assert_ne!(fingerprint(session.host()), before);
    assert_eq!(session.undo_stack().len(), 1);

    assert_eq!(session.undo().expect("undo").as_deref(), Some("dissolve"));
    assert_eq!(fingerprint(session.host()), before);
    assert!(session.undo().expect("empty stack").is_none());
}

#[test]
fn each_batch_is_its_own_undo_unit() {
    let (host, ids) = const_host(&[1, 2]);
    let mut session = TransformSession::new(host, GraftConfig::default());
    let (pattern, m) = attribute_pattern("value", "$v");
    let mut replacement = Replacement::mirror(&pattern).expect("mirror");
    let rm = replacement.element_for(m.into()).expect("rm");
    replacement
        .add_operation(rm, Operation::set_attribute("value", "$v + 1"))
        .expect("operation");
    let mut rule = TransformationRule::new("bump", pattern, replacement);

    session.apply_all(&mut rule).expect("first");
    session.apply_all(&mut rule).expect("second");
    let value =
        |s: &TransformSession, i: usize| s.host().attribute(ids[i].into(), "value").cloned();
    assert_eq!(value(&session, 0), Some(Value::Int(3)));
    assert_eq!(session.undo_stack().len(), 2);

    session.undo().expect("undo");
    assert_eq!(
        (value(&session, 0), value(&session, 1)),
        (Some(Value::Int(2)), Some(Value::Int(3)))
    );
}

#[test]
fn first_match_only_rewrites_once() {
    let (host, ids) = const_host(&[5, 5]);
    let mut session = TransformSession::new(host, GraftConfig::default());
    let (pattern, m) = attribute_pattern("value", "5");
    let mut rule = TransformationRule::new("drop", pattern, Replacement::new("rhs"));

    let found = session.find_first(&rule).expect("find").expect("a match");
    assert_eq!(found.get(m.into()), Some(ElementId::Node(ids[0])));
    let report = session.apply_first(&mut rule).expect("apply").expect("applied");
    assert_eq!(report.removed, 1);
    assert!(session.host().node(ids[0]).is_none());
    assert!(session.host().node(ids[1]).is_some());

    session.apply_first(&mut rule).expect("apply");
    assert!(session.apply_first(&mut rule).expect("apply").is_none());
    assert_eq!(session.apply_all(&mut rule).expect("apply all").applied, 0);
    assert_eq!(session.undo_stack().len(), 2);
}

#[test]
fn step_budget_comes_from_the_configuration() {
    let config = GraftConfig::from_json(r#"{ "matching": { "max_steps": 2 } }"#).expect("config");
    let (host, _) = const_host(&[1, 2, 3, 4, 5]);
    let session = TransformSession::new(host, config);
    let (pattern, _) = attribute_pattern("value", "5");
    let rule = TransformationRule::identity("lookup", pattern).expect("mirror");
    let err = session.find_all(&rule).expect_err("budget");
    assert!(matches!(
        err,
        SessionError::Match(MatchError::StepLimitExceeded { limit: 2 })
    ));
}
