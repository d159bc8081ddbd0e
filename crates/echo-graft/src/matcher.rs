// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Backtracking subgraph matcher.
//!
//! Search contract
//! - A pattern is compiled once per call into a plan: an ordered list of
//!   steps, each binding one pattern element. Nodes are planned container by
//!   container (a container before its children); inside a container,
//!   connected nodes come first in breadth-first order from the earliest
//!   child, isolated ones last. Each node is followed by its ports; a
//!   relation is planned as soon as every endpoint owner is.
//! - Candidates are enumerated in host insertion order, so results arrive in
//!   a deterministic order and the first result is stable for a given host.
//! - A candidate is bound only when it satisfies every criterion of the
//!   pattern element, is of a compatible kind and is not bound already
//!   (results are injective). `$var` criteria bind variables; backtracking
//!   unwinds bindings in reverse insertion order.
//! - A pattern relation binds a host relation linked to the first endpoint's
//!   host port whose net (relations chained through relation links, and
//!   through the boundary ports of transparent composites when containers are
//!   ignored) reaches every other endpoint.
//! - Matching never mutates the host.
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument, trace};

use crate::config::MatchConfig;
use crate::criterion::{Check, Verdict};
use crate::error::MatchError;
use crate::expr::{DefaultEvaluator, Evaluator};
use crate::graph::Graph;
use crate::ident::{ElementId, NodeId, PortId, RelationId};
use crate::match_result::MatchResult;
use crate::pattern::Pattern;
use crate::record::{Link, NodeKind};
use crate::variables::{Iteration, IterationMode};

/// Receives every match as it is found.
///
/// Returning `true` stops the enumeration.
pub trait MatchCallback {
    /// Called once per match with the engine's current result.
    fn found_match(&mut self, result: &MatchResult) -> bool;
}

impl<F> MatchCallback for F
where
    F: FnMut(&MatchResult) -> bool,
{
    fn found_match(&mut self, result: &MatchResult) -> bool {
        self(result)
    }
}

/// Callback that clones every match, optionally stopping after `limit`.
#[derive(Debug, Clone, Default)]
pub struct CollectMatches {
    /// Matches in discovery order.
    pub results: Vec<MatchResult>,
    /// Stop once this many matches were collected.
    pub limit: Option<usize>,
}

impl CollectMatches {
    /// Collects every match.
    pub fn all() -> Self {
        Self::default()
    }

    /// Collects the first `limit` matches.
    pub fn first(limit: usize) -> Self {
        Self {
            results: Vec::new(),
            limit: Some(limit),
        }
    }
}

impl MatchCallback for CollectMatches {
    fn found_match(&mut self, result: &MatchResult) -> bool {
        self.results.push(result.clone());
        self.limit.is_some_and(|limit| self.results.len() >= limit)
    }
}

struct Counting<'c> {
    inner: &'c mut dyn MatchCallback,
    found: bool,
}

impl MatchCallback for Counting<'_> {
    fn found_match(&mut self, result: &MatchResult) -> bool {
        self.found = true;
        self.inner.found_match(result)
    }
}

/// Enumerates matches of a [`Pattern`] in a host [`Graph`].
#[derive(Debug, Clone, Default)]
pub struct GraphMatcher<E = DefaultEvaluator> {
    config: MatchConfig,
    evaluator: E,
}

impl GraphMatcher {
    /// Matcher with the default evaluator.
    pub fn new(config: MatchConfig) -> Self {
        Self::with_evaluator(config, DefaultEvaluator)
    }
}

impl<E: Evaluator> GraphMatcher<E> {
    /// Matcher with a caller-supplied expression evaluator.
    pub fn with_evaluator(config: MatchConfig, evaluator: E) -> Self {
        Self { config, evaluator }
    }

    /// Active configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Expression evaluator.
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Enumerates matches of `pattern` among the contents of `container`,
    /// handing each to `callback`.
    ///
    /// Returns `true` when the callback stopped the enumeration.
    #[instrument(skip_all, fields(container = ?container))]
    pub fn find_matches(
        &self,
        pattern: &Pattern,
        host: &Graph,
        container: NodeId,
        callback: &mut dyn MatchCallback,
    ) -> Result<bool, MatchError> {
        let plan = Plan::compile(pattern, &self.evaluator)?;
        self.search(&plan, pattern, host, container, MatchResult::new(), callback)
    }

    /// Every match under the host root, in discovery order.
    pub fn match_all(
        &self,
        pattern: &Pattern,
        host: &Graph,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let mut sink = CollectMatches::all();
        self.find_matches(pattern, host, host.root(), &mut sink)?;
        Ok(sink.results)
    }

    /// First match under the host root.
    pub fn match_first(
        &self,
        pattern: &Pattern,
        host: &Graph,
    ) -> Result<Option<MatchResult>, MatchError> {
        let mut sink = CollectMatches::first(1);
        self.find_matches(pattern, host, host.root(), &mut sink)?;
        Ok(sink.results.pop())
    }

    /// Like [`find_matches`](Self::find_matches), but first assigns the
    /// pattern's iterative variables.
    ///
    /// Every combination of values is tried, the first declared variable
    /// varying slowest. Each value is recorded in the match parameters
    /// before the search, and each variable's [`IterationMode`] decides
    /// whether it advances after a value that did or did not produce a match.
    #[instrument(skip_all, fields(container = ?container))]
    pub fn iterate(
        &self,
        pattern: &Pattern,
        host: &Graph,
        container: NodeId,
        callback: &mut dyn MatchCallback,
    ) -> Result<bool, MatchError> {
        let plan = Plan::compile(pattern, &self.evaluator)?;
        let vars: Vec<(String, Iteration)> = pattern
            .variables()
            .iterative()
            .map(|(name, it)| (name.to_owned(), it.clone()))
            .collect();
        let mut seed = MatchResult::new();
        let level = Level {
            plan: &plan,
            pattern,
            host,
            container,
            vars: &vars,
        };
        let (stopped, _) = self.iterate_level(&level, 0, &mut seed, callback)?;
        Ok(stopped)
    }

    fn iterate_level(
        &self,
        level: &Level<'_>,
        depth: usize,
        seed: &mut MatchResult,
        callback: &mut dyn MatchCallback,
    ) -> Result<(bool, bool), MatchError> {
        let Some((name, iteration)) = level.vars.get(depth) else {
            let mut counting = Counting {
                inner: callback,
                found: false,
            };
            let stopped = self.search(
                level.plan,
                level.pattern,
                level.host,
                level.container,
                seed.clone(),
                &mut counting,
            )?;
            return Ok((stopped, counting.found));
        };
        let mut any = false;
        for value in &iteration.values {
            let mark = seed.parameter_values().len();
            seed.bind_parameter(name.clone(), value.clone());
            trace!(variable = %name, value = %value, "iteration value");
            let outcome = self.iterate_level(level, depth + 1, seed, callback);
            seed.parameters_mut().truncate(mark);
            let (stopped, found) = outcome?;
            any |= found;
            if stopped {
                return Ok((true, any));
            }
            match iteration.mode {
                IterationMode::StopWhenMatch if found => break,
                IterationMode::StopWhenNotMatch if !found => break,
                _ => {}
            }
        }
        Ok((false, any))
    }

    fn search(
        &self,
        plan: &Plan,
        pattern: &Pattern,
        host: &Graph,
        container: NodeId,
        mut seed: MatchResult,
        callback: &mut dyn MatchCallback,
    ) -> Result<bool, MatchError> {
        if !host.node(container).is_some_and(|n| n.kind.is_container()) {
            return Err(MatchError::engine(
                ElementId::Node(container),
                "host container is missing or cannot hold children",
            ));
        }
        seed.put(pattern.root().into(), container.into());
        let mut search = Search {
            pattern,
            host,
            plan,
            evaluator: &self.evaluator,
            config: &self.config,
            container,
            result: seed,
            callback,
            steps: 0,
            cache: FxHashMap::default(),
        };
        search.run(0)
    }
}

struct Level<'a> {
    plan: &'a Plan,
    pattern: &'a Pattern,
    host: &'a Graph,
    container: NodeId,
    vars: &'a [(String, Iteration)],
}

#[derive(Debug, Default)]
struct ElementChecks {
    fixed: Vec<Check>,
    dynamic: Vec<Check>,
}

#[derive(Debug)]
enum PortRule {
    /// Port materialised by a criterion.
    Criterion(Check),
    /// Explicit pattern port.
    Explicit { name: String, input: bool, output: bool },
}

#[derive(Debug)]
enum Step {
    Node {
        node: NodeId,
        container: NodeId,
        kind: NodeKind,
    },
    Port {
        port: PortId,
        owner: NodeId,
        rule: PortRule,
    },
    Relation {
        relation: RelationId,
        container: NodeId,
        /// Port endpoints; `true` marks an inside link to the container.
        ports: Vec<(PortId, bool)>,
        /// Linked pattern relations planned earlier.
        peers: Vec<RelationId>,
    },
}

#[derive(Debug, Default)]
struct Plan {
    steps: Vec<Step>,
    checks: FxHashMap<ElementId, ElementChecks>,
}

impl Plan {
    fn compile(pattern: &Pattern, evaluator: &dyn Evaluator) -> Result<Self, MatchError> {
        let graph = pattern.graph();
        let mut plan = Self::default();
        let mut port_checks: FxHashMap<(NodeId, usize), Check> = FxHashMap::default();
        for (element, list) in pattern.criteria_entries() {
            if pattern.is_created(element) {
                continue;
            }
            let entry = plan.checks.entry(element).or_default();
            for (index, criterion) in list.iter().enumerate() {
                let check = criterion.compile(evaluator).map_err(|e| e.with_element(element))?;
                match (&check, element) {
                    (Check::Port { .. }, ElementId::Node(node)) => {
                        port_checks.insert((node, index), check);
                    }
                    _ if check.is_static() => entry.fixed.push(check),
                    _ => entry.dynamic.push(check),
                }
            }
        }

        let mut builder = PlanBuilder {
            pattern,
            placed: FxHashSet::default(),
            placed_relations: FxHashSet::default(),
            pending: Vec::new(),
            port_checks,
        };
        let root = graph.root();
        builder.enqueue_relations(root);
        builder.place(&mut plan, root, None)?;
        builder.walk(&mut plan, root)?;
        Ok(plan)
    }
}

struct PlanBuilder<'a> {
    pattern: &'a Pattern,
    placed: FxHashSet<NodeId>,
    placed_relations: FxHashSet<RelationId>,
    pending: Vec<RelationId>,
    port_checks: FxHashMap<(NodeId, usize), Check>,
}

impl PlanBuilder<'_> {
    fn walk(&mut self, plan: &mut Plan, container: NodeId) -> Result<(), MatchError> {
        let order = self.order_children(container);
        for node in &order {
            self.place(plan, *node, Some(container))?;
        }
        for node in order {
            if self.pattern.graph().node(node).is_some_and(|n| n.kind.is_container()) {
                self.enqueue_relations(node);
                self.walk(plan, node)?;
            }
        }
        Ok(())
    }

    fn enqueue_relations(&mut self, container: NodeId) {
        let pattern = self.pattern;
        self.pending.extend(
            pattern
                .graph()
                .relations_in(container)
                .iter()
                .copied()
                .filter(|r| !pattern.is_created((*r).into())),
        );
    }

    /// Plans `node` (unless it is the root), its ports and every relation
    /// that became ready.
    fn place(
        &mut self,
        plan: &mut Plan,
        node: NodeId,
        container: Option<NodeId>,
    ) -> Result<(), MatchError> {
        let pattern = self.pattern;
        let graph = pattern.graph();
        let rec = graph
            .node(node)
            .ok_or_else(|| MatchError::engine(ElementId::Node(node), "pattern node vanished"))?;
        if let Some(container) = container {
            plan.steps.push(Step::Node {
                node,
                container,
                kind: rec.kind,
            });
        }
        for port in &rec.ports {
            if pattern.is_created((*port).into()) {
                continue;
            }
            let rule = match pattern.port_origin(*port) {
                Some((owner, index)) => self
                    .port_checks
                    .remove(&(owner, index))
                    .map(PortRule::Criterion)
                    .ok_or_else(|| {
                        MatchError::engine(
                            ElementId::Port(*port),
                            "port criterion was not compiled",
                        )
                    })?,
                None => {
                    let p = graph.port(*port).ok_or_else(|| {
                        MatchError::engine(ElementId::Port(*port), "pattern port vanished")
                    })?;
                    PortRule::Explicit {
                        name: p.name.clone(),
                        input: p.input,
                        output: p.output,
                    }
                }
            };
            plan.steps.push(Step::Port {
                port: *port,
                owner: node,
                rule,
            });
        }
        self.placed.insert(node);
        self.flush_relations(plan);
        Ok(())
    }

    fn flush_relations(&mut self, plan: &mut Plan) {
        let pattern = self.pattern;
        let graph = pattern.graph();
        let mut waiting = Vec::new();
        for relation in std::mem::take(&mut self.pending) {
            let Some(rec) = graph.relation(relation) else { continue };
            let mut ports = Vec::new();
            let mut peers = Vec::new();
            let mut ready = self.placed.contains(&rec.container);
            let mut created = false;
            for link in &rec.links {
                match link {
                    Link::Port(p) => {
                        let owner = graph.port(*p).map(|x| x.owner);
                        created |= pattern.is_created((*p).into());
                        ready &= owner.is_some_and(|o| self.placed.contains(&o));
                        ports.push((*p, owner == Some(rec.container)));
                    }
                    Link::Relation(o) => {
                        if self.placed_relations.contains(o) {
                            peers.push(*o);
                        }
                    }
                }
            }
            if created {
                continue;
            }
            if ready {
                self.placed_relations.insert(relation);
                plan.steps.push(Step::Relation {
                    relation,
                    container: rec.container,
                    ports,
                    peers,
                });
            } else {
                waiting.push(relation);
            }
        }
        self.pending = waiting;
    }

    /// Children of `container` in search order: breadth-first over the
    /// relation adjacency from the earliest connected child, isolated
    /// children last.
    fn order_children(&self, container: NodeId) -> Vec<NodeId> {
        let pattern = self.pattern;
        let graph = pattern.graph();
        let children: Vec<NodeId> = graph
            .child_nodes(container)
            .iter()
            .copied()
            .filter(|n| !pattern.is_created((*n).into()))
            .collect();
        let position: FxHashMap<NodeId, usize> =
            children.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); children.len()];
        for relation in graph.relations_in(container) {
            let Some(rec) = graph.relation(*relation) else { continue };
            let owners: Vec<usize> = rec
                .links
                .iter()
                .filter_map(|l| match l {
                    Link::Port(p) => graph.port(*p).and_then(|x| position.get(&x.owner).copied()),
                    Link::Relation(_) => None,
                })
                .collect();
            for a in &owners {
                for b in &owners {
                    if a != b && !adjacent[*a].contains(b) {
                        adjacent[*a].push(*b);
                    }
                }
            }
        }
        for list in &mut adjacent {
            list.sort_unstable();
        }

        let mut seen = vec![false; children.len()];
        let mut order = Vec::with_capacity(children.len());
        for start in 0..children.len() {
            if seen[start] || adjacent[start].is_empty() {
                continue;
            }
            seen[start] = true;
            let mut queue = std::collections::VecDeque::from([start]);
            while let Some(i) = queue.pop_front() {
                order.push(children[i]);
                for j in &adjacent[i] {
                    if !seen[*j] {
                        seen[*j] = true;
                        queue.push_back(*j);
                    }
                }
            }
        }
        order.extend(
            children
                .iter()
                .enumerate()
                .filter(|(i, _)| !seen[*i])
                .map(|(_, n)| *n),
        );
        order
    }
}

struct Search<'a> {
    pattern: &'a Pattern,
    host: &'a Graph,
    plan: &'a Plan,
    evaluator: &'a dyn Evaluator,
    config: &'a MatchConfig,
    container: NodeId,
    result: MatchResult,
    callback: &'a mut dyn MatchCallback,
    steps: u64,
    cache: FxHashMap<(ElementId, ElementId), bool>,
}

impl Search<'_> {
    fn run(&mut self, depth: usize) -> Result<bool, MatchError> {
        let plan = self.plan;
        let Some(step) = plan.steps.get(depth) else {
            debug!(bindings = self.result.len(), "match found");
            return Ok(self.callback.found_match(&self.result));
        };
        let (element, candidates) = match step {
            Step::Node { node, container, .. } => {
                let host_container = self.host_node(*container)?;
                let mut out = Vec::new();
                self.node_candidates(host_container, &mut out);
                (ElementId::Node(*node), out.into_iter().map(ElementId::Node).collect::<Vec<_>>())
            }
            Step::Port { port, owner, .. } => {
                let host_owner = self.host_node(*owner)?;
                (
                    ElementId::Port(*port),
                    self.host.ports(host_owner).iter().map(|p| ElementId::Port(*p)).collect(),
                )
            }
            Step::Relation { relation, .. } => {
                (ElementId::Relation(*relation), self.relation_candidates(step)?)
            }
        };
        for candidate in candidates {
            self.tick()?;
            if !self.structurally_compatible(step, candidate) {
                trace!(pattern = %element, host = %candidate, "structure rejected");
                continue;
            }
            let Some(mark) = self.try_bind(element, candidate)? else {
                trace!(pattern = %element, host = %candidate, "criteria rejected");
                continue;
            };
            if self.run(depth + 1)? {
                return Ok(true);
            }
            self.result.remove(element);
            self.result.parameters_mut().truncate(mark);
        }
        Ok(false)
    }

    fn tick(&mut self) -> Result<(), MatchError> {
        self.steps += 1;
        match self.config.max_steps {
            Some(limit) if self.steps > limit => Err(MatchError::StepLimitExceeded { limit }),
            _ => Ok(()),
        }
    }

    fn host_node(&self, pattern_node: NodeId) -> Result<NodeId, MatchError> {
        self.result
            .get(pattern_node.into())
            .and_then(ElementId::as_node)
            .ok_or_else(|| {
                MatchError::engine(ElementId::Node(pattern_node), "container is not bound")
            })
    }

    fn transparent(&self, node: NodeId) -> bool {
        self.pattern.ignore_containers()
            && node != self.container
            && self
                .host
                .node(node)
                .is_some_and(|n| n.kind.is_container() && !n.opaque)
    }

    fn node_candidates(&self, container: NodeId, out: &mut Vec<NodeId>) {
        for child in self.host.child_nodes(container) {
            if self.transparent(*child) {
                self.node_candidates(*child, out);
            } else {
                out.push(*child);
            }
        }
    }

    fn relation_candidates(&self, step: &Step) -> Result<Vec<ElementId>, MatchError> {
        let Step::Relation { container, ports, .. } = step else {
            return Ok(Vec::new());
        };
        let relations = match ports.first() {
            None => self.host.relations_in(self.host_node(*container)?).to_vec(),
            Some((port, inside)) => {
                let host_port = self
                    .result
                    .get((*port).into())
                    .and_then(ElementId::as_port)
                    .ok_or_else(|| {
                        MatchError::engine(ElementId::Port(*port), "endpoint is not bound")
                    })?;
                if *inside {
                    self.host.inside_relations(host_port)
                } else {
                    self.host.outside_relations(host_port)
                }
            }
        };
        Ok(relations.into_iter().map(ElementId::Relation).collect())
    }

    /// Kind, port rule and connectivity checks that need no criteria.
    fn structurally_compatible(&self, step: &Step, candidate: ElementId) -> bool {
        match step {
            Step::Node { kind, .. } => {
                let host_kind = candidate.as_node().and_then(|n| self.host.node(n)).map(|n| n.kind);
                let Some(host_kind) = host_kind else {
                    return false;
                };
                match kind {
                    NodeKind::Atomic => true,
                    NodeKind::Composite | NodeKind::StateMachine => *kind == host_kind,
                }
            }
            Step::Port { rule, .. } => {
                let Some(port) = candidate.as_port().and_then(|p| self.host.port(p)) else {
                    return false;
                };
                match rule {
                    PortRule::Criterion(Check::Port { criterion, name }) => {
                        criterion.accepts(port, name.as_ref())
                    }
                    PortRule::Criterion(_) => false,
                    PortRule::Explicit { name, input, output } => {
                        port.name == *name && port.input == *input && port.output == *output
                    }
                }
            }
            Step::Relation { ports, peers, .. } => {
                let Some(relation) = candidate.as_relation() else {
                    return false;
                };
                let (net_ports, net_relations) = self.net(relation);
                ports.iter().all(|(p, _)| {
                    self.result
                        .get((*p).into())
                        .and_then(ElementId::as_port)
                        .is_some_and(|hp| net_ports.contains(&hp))
                }) && peers.iter().all(|r| {
                    self.result
                        .get((*r).into())
                        .and_then(ElementId::as_relation)
                        .is_some_and(|hr| hr != relation && net_relations.contains(&hr))
                })
            }
        }
    }

    /// Ports and relations reachable from `start` through relation links and
    /// transparent boundary ports.
    fn net(&self, start: RelationId) -> (FxHashSet<PortId>, FxHashSet<RelationId>) {
        let mut ports = FxHashSet::default();
        let mut relations = FxHashSet::default();
        let mut queue = vec![start];
        relations.insert(start);
        while let Some(r) = queue.pop() {
            let Some(rec) = self.host.relation(r) else { continue };
            for link in &rec.links {
                match link {
                    Link::Port(p) => {
                        if !ports.insert(*p) {
                            continue;
                        }
                        let Some(port) = self.host.port(*p) else { continue };
                        if self.transparent(port.owner) {
                            for next in &port.relations {
                                if relations.insert(*next) {
                                    queue.push(*next);
                                }
                            }
                        }
                    }
                    Link::Relation(o) => {
                        if relations.insert(*o) {
                            queue.push(*o);
                        }
                    }
                }
            }
        }
        (ports, relations)
    }

    /// Evaluates the criteria of `element` against `candidate` and binds it.
    ///
    /// Returns the parameter mark to truncate to on backtrack, or `None` when
    /// the candidate is rejected.
    fn try_bind(
        &mut self,
        element: ElementId,
        candidate: ElementId,
    ) -> Result<Option<usize>, MatchError> {
        if self.result.is_host_bound(candidate) {
            return Ok(None);
        }
        let mark = self.result.parameter_values().len();
        let plan = self.plan;
        if let Some(checks) = plan.checks.get(&element) {
            if !self.fixed_verdict(element, candidate, &checks.fixed)? {
                return Ok(None);
            }
            for check in &checks.dynamic {
                let verdict = {
                    let result = &self.result;
                    let variables = self.pattern.variables();
                    let scope = |name: &str| {
                        result.parameter(name).or_else(|| variables.value(name)).cloned()
                    };
                    check
                        .evaluate(self.host, candidate, &scope, self.evaluator)
                        .map_err(|source| MatchError::Evaluation {
                            element: Some(element),
                            source,
                        })?
                };
                match verdict {
                    Verdict::Accept => {}
                    Verdict::Bind(name, value) => self.result.bind_parameter(name, value),
                    Verdict::Reject => {
                        self.result.parameters_mut().truncate(mark);
                        return Ok(None);
                    }
                }
            }
        }
        self.result.put(element, candidate);
        Ok(Some(mark))
    }

    fn fixed_verdict(
        &mut self,
        element: ElementId,
        candidate: ElementId,
        checks: &[Check],
    ) -> Result<bool, MatchError> {
        if checks.is_empty() {
            return Ok(true);
        }
        if self.config.predicate_cache {
            if let Some(v) = self.cache.get(&(element, candidate)) {
                return Ok(*v);
            }
        }
        let scope = crate::expr::EmptyScope;
        let mut ok = true;
        for check in checks {
            let verdict = check
                .evaluate(self.host, candidate, &scope, self.evaluator)
                .map_err(|source| MatchError::Evaluation {
                    element: Some(element),
                    source,
                })?;
            if verdict == Verdict::Reject {
                ok = false;
                break;
            }
        }
        if self.config.predicate_cache {
            self.cache.insert((element, candidate), ok);
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::criterion::{Criterion, PortCriterion};
    use crate::record::{NodeSpec, PortSpec};
    use crate::value::Value;

    fn chain(len: usize) -> Graph {
        let mut g = Graph::new("top");
        let root = g.root();
        let mut prev = None;
        for i in 0..len {
            let n = g.add_node(root, NodeSpec::atomic(format!("n{i}"), "Stage")).unwrap();
            let inp = g.add_port(n, PortSpec::input("in")).unwrap();
            let out = g.add_port(n, PortSpec::output("out")).unwrap();
            if let Some(p) = prev {
                let r = g.add_relation(root, "r").unwrap();
                g.link(r, Link::Port(p)).unwrap();
                g.link(r, Link::Port(inp)).unwrap();
            }
            prev = Some(out);
        }
        g
    }

    fn edge_pattern() -> Pattern {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let a = p.add_matcher(root, "A", NodeKind::Atomic).unwrap();
        let b = p.add_matcher(root, "B", NodeKind::Atomic).unwrap();
        p.add_criterion(a.into(), Criterion::port(PortCriterion::new().named("out").output(true)))
            .unwrap();
        p.add_criterion(b.into(), Criterion::port(PortCriterion::new().named("in").input(true)))
            .unwrap();
        let r = p.add_relation(root, "r").unwrap();
        let pa = p.port_of(a, 0).unwrap();
        let pb = p.port_of(b, 0).unwrap();
        p.link(r, Link::Port(pa)).unwrap();
        p.link(r, Link::Port(pb)).unwrap();
        p
    }

    #[test]
    fn edges_of_a_chain_are_found_in_order() {
        let host = chain(4);
        let matcher = GraphMatcher::new(MatchConfig::default());
        let pattern = edge_pattern();
        let a = pattern.graph().entity_by_name(pattern.root(), "A").unwrap();
        let results = matcher.match_all(&pattern, &host).unwrap();
        assert_eq!(results.len(), 3);
        let names: Vec<&str> = results
            .iter()
            .map(|m| {
                let a = m.get(a.into()).unwrap();
                host.name(a).unwrap()
            })
            .collect();
        assert_eq!(names, vec!["n0", "n1", "n2"]);
    }

    #[test]
    fn step_limit_aborts_the_search() {
        let host = chain(6);
        let matcher = GraphMatcher::new(MatchConfig {
            max_steps: Some(3),
            predicate_cache: false,
        });
        let err = matcher.match_all(&edge_pattern(), &host).unwrap_err();
        assert_eq!(err, MatchError::StepLimitExceeded { limit: 3 });
    }

    #[test]
    fn bound_variables_must_agree() {
        let mut host = Graph::new("top");
        let root = host.root();
        for (name, v) in [("a", 1), ("b", 2), ("c", 1)] {
            host.add_node(root, NodeSpec::atomic(name, "T").with_attribute("v", v)).unwrap();
        }
        let mut p = Pattern::new("lhs");
        let proot = p.root();
        for name in ["X", "Y"] {
            let m = p.add_matcher(proot, name, NodeKind::Atomic).unwrap();
            p.add_criterion(m.into(), Criterion::attribute("v", "$v")).unwrap();
        }
        let results = GraphMatcher::new(MatchConfig::default()).match_all(&p, &host).unwrap();
        assert_eq!(results.len(), 2);
        for m in &results {
            assert_eq!(m.parameter("v"), Some(&Value::Int(1)));
        }
    }

    #[test]
    fn iteration_modes_stop_early() {
        let mut host = Graph::new("top");
        let root = host.root();
        for v in [1, 2, 3] {
            host.add_node(root, NodeSpec::atomic(format!("n{v}"), "T").with_attribute("v", v))
                .unwrap();
        }
        let mut p = Pattern::new("lhs");
        let proot = p.root();
        let m = p.add_matcher(proot, "X", NodeKind::Atomic).unwrap();
        p.add_criterion(m.into(), Criterion::attribute("v", "$k")).unwrap();
        let values = [Value::Int(7), Value::Int(2), Value::Int(3)];
        let run = |mode| {
            let mut p = p.clone();
            p.declare_iterative("k", Iteration::new(values.clone(), mode));
            let mut sink = CollectMatches::all();
            GraphMatcher::new(MatchConfig::default()).iterate(&p, &host, root, &mut sink).unwrap();
            sink.results.len()
        };
        assert_eq!(run(IterationMode::AllValues), 2);
        assert_eq!(run(IterationMode::StopWhenMatch), 1);
        assert_eq!(run(IterationMode::StopWhenNotMatch), 0);
    }
}
