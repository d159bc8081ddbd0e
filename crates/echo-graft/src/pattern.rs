// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pattern graphs: matcher nodes decorated with criteria.
use std::collections::{BTreeMap, BTreeSet};

use crate::criterion::{port_criterion_ids, Criterion};
use crate::error::MatchError;
use crate::graph::{Graph, GraphError};
use crate::ident::{ElementId, NodeId, PortId, RelationId};
use crate::ingredient::IngredientList;
use crate::record::{Link, NodeKind, NodeSpec, PortSpec};
use crate::value::Value;
use crate::variables::{Iteration, Variables};

/// Type label of atomic matcher nodes.
pub const ATOMIC_MATCHER: &str = "AtomicMatcher";
/// Type label of composite matcher nodes.
pub const COMPOSITE_MATCHER: &str = "CompositeMatcher";
/// Type label of state-machine matcher nodes.
pub const STATE_MACHINE_MATCHER: &str = "StateMachineMatcher";

/// Left-hand side of a transformation rule.
///
/// The pattern graph's root stands for the host container being searched.
/// Matcher nodes, their ports and relations are ordinary graph elements; the
/// pattern keeps the matching metadata in side tables keyed by element id:
/// criteria, preserved and created flags, the origin of every port a
/// criterion materialised, and the declared variables.
///
/// Invariants
/// - Every criterion list passed validation and only holds criteria that
///   apply to its element's kind.
/// - For each matcher node, the materialised ports are exactly one per port
///   criterion, named by [`port_criterion_ids`].
#[derive(Debug, Clone)]
pub struct Pattern {
    graph: Graph,
    criteria: BTreeMap<ElementId, IngredientList<Criterion>>,
    preserved: BTreeSet<ElementId>,
    created: BTreeSet<ElementId>,
    origins: BTreeMap<PortId, (NodeId, usize)>,
    variables: Variables,
    ignore_containers: bool,
}

impl Pattern {
    /// Empty pattern whose root is named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            graph: Graph::with_root(NodeSpec::composite(name, COMPOSITE_MATCHER)),
            criteria: BTreeMap::new(),
            preserved: BTreeSet::new(),
            created: BTreeSet::new(),
            origins: BTreeMap::new(),
            variables: Variables::new(),
            ignore_containers: false,
        }
    }

    /// Pattern graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Pattern root.
    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    /// Adds a matcher node of the given kind to `container`.
    pub fn add_matcher(
        &mut self,
        container: NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId, GraphError> {
        let spec = match kind {
            NodeKind::Atomic => NodeSpec::atomic(name, ATOMIC_MATCHER),
            NodeKind::Composite => NodeSpec::composite(name, COMPOSITE_MATCHER),
            NodeKind::StateMachine => NodeSpec::state_machine(name, STATE_MACHINE_MATCHER),
        };
        self.graph.add_node(container, spec)
    }

    /// Adds a plain node, typically one later marked created.
    pub fn add_node(&mut self, container: NodeId, spec: NodeSpec) -> Result<NodeId, GraphError> {
        self.graph.add_node(container, spec)
    }

    /// Adds an explicit port to a matcher node.
    ///
    /// Explicit ports match host ports with the same name and direction.
    pub fn add_port(&mut self, node: NodeId, spec: PortSpec) -> Result<PortId, GraphError> {
        self.graph.add_port(node, spec)
    }

    /// Adds a relation to `container`.
    pub fn add_relation(
        &mut self,
        container: NodeId,
        name: &str,
    ) -> Result<RelationId, GraphError> {
        self.graph.add_relation(container, name)
    }

    /// Links an endpoint to a pattern relation.
    pub fn link(&mut self, relation: RelationId, link: Link) -> Result<(), GraphError> {
        self.graph.link(relation, link)
    }

    /// Removes an element and forgets its metadata.
    pub fn remove(&mut self, element: ElementId) -> Result<(), GraphError> {
        let removed = self.graph.remove(element)?;
        for e in removed.elements() {
            self.criteria.remove(&e);
            self.preserved.remove(&e);
            self.created.remove(&e);
            if let ElementId::Port(p) = e {
                self.origins.remove(&p);
            }
        }
        Ok(())
    }

    /// Criteria attached to `element`.
    pub fn criteria(&self, element: ElementId) -> Option<&IngredientList<Criterion>> {
        self.criteria.get(&element)
    }

    /// Every element carrying criteria, in id order.
    pub fn criteria_entries(
        &self,
    ) -> impl Iterator<Item = (ElementId, &IngredientList<Criterion>)> + '_ {
        self.criteria.iter().map(|(e, list)| (*e, list))
    }

    /// Criterion at `index` on `element`.
    pub fn criterion(&self, element: ElementId, index: i64) -> Result<&Criterion, MatchError> {
        match self.criteria.get(&element) {
            Some(list) => list.get(index).map_err(|e| e.with_element(element)),
            None => Err(MatchError::InvalidIngredientIndex {
                element: Some(element),
                index,
                len: 0,
            }),
        }
    }

    /// Replaces the criteria of `element`.
    ///
    /// Criteria are validated first; on success the ports of a matcher node
    /// are brought in line with its port criteria: missing ports are
    /// created, existing ones updated in place, explicit ports with a
    /// colliding name replaced and stale materialised ports removed.
    pub fn set_criteria(
        &mut self,
        element: ElementId,
        criteria: IngredientList<Criterion>,
    ) -> Result<(), MatchError> {
        if !self.graph.contains(element) {
            return Err(MatchError::engine(element, "element is not part of the pattern"));
        }
        for (index, criterion) in criteria.iter().enumerate() {
            if !criterion.applies_to(element) {
                return Err(MatchError::malformed(
                    element,
                    format!(
                        "{} cannot be attached to a {}",
                        IngredientList::<Criterion>::label(index),
                        element.kind_name()
                    ),
                ));
            }
            criterion.validate().map_err(|e| e.with_element(element))?;
        }
        if criteria.is_empty() {
            self.criteria.remove(&element);
        } else {
            self.criteria.insert(element, criteria);
        }
        if let ElementId::Node(node) = element {
            self.materialize_ports(node)?;
        }
        Ok(())
    }

    /// Appends a criterion to `element`; returns its index.
    pub fn add_criterion(
        &mut self,
        element: ElementId,
        criterion: Criterion,
    ) -> Result<usize, MatchError> {
        let mut list = self.criteria.get(&element).cloned().unwrap_or_default();
        let index = list.push(criterion);
        self.set_criteria(element, list)?;
        Ok(index)
    }

    fn materialize_ports(&mut self, node: NodeId) -> Result<(), MatchError> {
        let failed =
            |e: GraphError| MatchError::engine(e.element().or(Some(node.into())), e.to_string());
        let wanted = self
            .criteria
            .get(&ElementId::Node(node))
            .map(|list| {
                port_criterion_ids(list.as_slice())
                    .into_iter()
                    .filter_map(|(index, id)| {
                        list.as_slice()
                            .get(index)
                            .and_then(Criterion::as_port)
                            .map(|pc| (index, pc.port_spec(&id)))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let mut kept = BTreeSet::new();
        for (index, spec) in wanted {
            let existing = self.graph.port_by_name(node, &spec.name);
            let port = match existing {
                Some(p) if self.origins.contains_key(&p) => {
                    self.graph
                        .set_port_flags(p, spec.input, spec.output, spec.multiport)
                        .map_err(failed)?;
                    p
                }
                Some(p) => {
                    self.remove(p.into()).map_err(failed)?;
                    self.graph.add_port(node, spec).map_err(failed)?
                }
                None => self.graph.add_port(node, spec).map_err(failed)?,
            };
            self.origins.insert(port, (node, index));
            kept.insert(port);
        }
        let stale: Vec<PortId> = self
            .origins
            .iter()
            .filter(|(p, (owner, _))| *owner == node && !kept.contains(*p))
            .map(|(p, _)| *p)
            .collect();
        for p in stale {
            self.remove(p.into()).map_err(failed)?;
        }
        Ok(())
    }

    /// Node and criterion index that materialised `port`.
    pub fn port_origin(&self, port: PortId) -> Option<(NodeId, usize)> {
        self.origins.get(&port).copied()
    }

    /// Port materialised by the criterion at `index` on `node`.
    pub fn port_of(&self, node: NodeId, index: i64) -> Result<PortId, MatchError> {
        let element = ElementId::Node(node);
        let criterion = self.criterion(element, index)?;
        if criterion.as_port().is_none() {
            return Err(MatchError::malformed(
                element,
                format!("criterion{} is not a port criterion", index + 1),
            ));
        }
        self.origins
            .iter()
            .find(|(_, (owner, i))| *owner == node && i64::try_from(*i).is_ok_and(|i| i == index))
            .map(|(p, _)| *p)
            .ok_or_else(|| MatchError::engine(element, "port criterion has no materialised port"))
    }

    /// Marks `element` as preserved (kept even when absent from the replacement).
    pub fn set_preserved(&mut self, element: ElementId, preserved: bool) {
        if preserved {
            self.preserved.insert(element);
        } else {
            self.preserved.remove(&element);
        }
    }

    /// True when `element` is marked preserved.
    pub fn is_preserved(&self, element: ElementId) -> bool {
        self.preserved.contains(&element)
    }

    /// Marks `element` as created: it is instantiated in the host instead of
    /// matched.
    pub fn set_created(&mut self, element: ElementId, created: bool) {
        if created {
            self.created.insert(element);
        } else {
            self.created.remove(&element);
        }
    }

    /// True when `element` or one of its containers is marked created.
    pub fn is_created(&self, element: ElementId) -> bool {
        let mut cur = Some(element);
        while let Some(e) = cur {
            if self.created.contains(&e) {
                return true;
            }
            cur = self.graph.container_of(e).map(ElementId::Node);
        }
        false
    }

    /// Elements explicitly marked created, in id order.
    pub fn created_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.created.iter().copied()
    }

    /// Declared variables.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Mutable access to the declared variables.
    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    /// Declares a variable with an optional fixed value.
    pub fn declare_variable(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.variables.declare(name, value);
    }

    /// Declares an iterative variable.
    pub fn declare_iterative(&mut self, name: impl Into<String>, iteration: Iteration) {
        self.variables.declare_iterative(name, iteration);
    }

    /// When set, non-opaque host composites are transparent during matching.
    pub fn ignore_containers(&self) -> bool {
        self.ignore_containers
    }

    /// Sets the container-ignoring policy.
    pub fn set_ignore_containers(&mut self, ignore: bool) {
        self.ignore_containers = ignore;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::criterion::PortCriterion;

    #[test]
    fn port_criteria_materialise_and_retire_ports() {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let a = p.add_matcher(root, "A", NodeKind::Atomic).unwrap();
        let explicit = p.add_port(a, PortSpec::input("io")).unwrap();
        let list: IngredientList<Criterion> = vec![
            Criterion::subclass("Ramp"),
            Criterion::port(PortCriterion::new().output(true)),
            Criterion::port(PortCriterion::new().input(true).matcher_name("io")),
        ]
        .into();
        p.set_criteria(a.into(), list).unwrap();

        let names: Vec<&str> = p
            .graph()
            .ports(a)
            .iter()
            .map(|x| p.graph().port(*x).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["criterion2", "io"]);
        assert!(p.graph().port(explicit).is_none());
        let out = p.port_of(a, 1).unwrap();
        assert_eq!(p.port_origin(out), Some((a, 1)));
        assert!(p.graph().port(out).unwrap().output);
        assert!(matches!(p.port_of(a, 0), Err(MatchError::MalformedCriterion { .. })));
        assert!(matches!(p.port_of(a, -1), Err(MatchError::InvalidIngredientIndex { .. })));

        let list: IngredientList<Criterion> = vec![
            Criterion::subclass("Ramp"),
            Criterion::port(PortCriterion::new().output(false)),
        ]
        .into();
        p.set_criteria(a.into(), list).unwrap();
        assert_eq!(p.graph().ports(a).len(), 1);
        assert_eq!(p.graph().ports(a)[0], out);
        assert!(!p.graph().port(out).unwrap().output);
    }

    #[test]
    fn criteria_must_fit_the_element_kind() {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let r = p.add_relation(root, "r").unwrap();
        let err = p.add_criterion(r.into(), Criterion::subclass("T")).unwrap_err();
        assert_eq!(err.element(), Some(ElementId::Relation(r)));
        p.add_criterion(r.into(), Criterion::guard("x > 1")).unwrap();
    }

    #[test]
    fn created_flag_covers_descendants() {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let c = p.add_matcher(root, "C", NodeKind::Composite).unwrap();
        let inner = p.add_matcher(c, "X", NodeKind::Atomic).unwrap();
        p.set_created(c.into(), true);
        assert!(p.is_created(inner.into()));
        assert!(!p.is_created(root.into()));
    }
}
