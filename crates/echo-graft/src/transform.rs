// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replacement engine: rewrites matched regions of a host graph.
//!
//! Each match is applied to the live graph left by the previous one, in
//! phases:
//!
//! 1. save the pattern variables and load the match parameters into them;
//! 2. instantiate pattern elements marked created;
//! 3. copy replacement elements that have no host counterpart, moving
//!    matched nodes whose container changed;
//! 4. run operations;
//! 5. unlink host links the replacement no longer has;
//! 6. remove matched elements the replacement dropped (containers shallowly);
//! 7. link host elements the way the replacement links them;
//! 8. restore the pattern variables.
//!
//! After the batch, dangling relations are removed and relations in the
//! touched containers are merged and routed. Every edit goes through one
//! [`Editor`], so an undoable [`TransactionScope`] can revert the whole batch.
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::TransformConfig;
use crate::edit::Editor;
use crate::error::TransformationError;
use crate::expr::{DefaultEvaluator, Evaluator};
use crate::fragment::{Depth, Fragment};
use crate::graph::{Graph, GraphError};
use crate::ident::{ElementId, NodeId, RelationId};
use crate::match_result::MatchResult;
use crate::operation::{Change, OperationContext};
use crate::pattern::Pattern;
use crate::record::{Attributes, Link};
use crate::relations::{tidy, TidyPolicy};
use crate::replacement::Replacement;
use crate::rule::TransformationRule;
use crate::undo::TransactionScope;
use crate::value::Value;

/// Attribute carrying the channel width of a relation.
pub const WIDTH_ATTRIBUTE: &str = "width";

/// Counters describing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformReport {
    /// Matches applied.
    pub applied: usize,
    /// Matches skipped because a bound host element no longer exists.
    pub skipped: usize,
    /// Host elements created.
    pub created: usize,
    /// Matched host elements removed.
    pub removed: usize,
    /// Relations removed for having fewer than two links.
    pub dangling_removed: usize,
    /// Relations merged into a linked relation.
    pub relations_merged: usize,
    /// Routing vertices placed.
    pub vertices_added: usize,
    /// Graph edits applied in total.
    pub edits: usize,
}

/// Applies [`TransformationRule`]s to a host graph.
#[derive(Debug, Clone, Default)]
pub struct GraphTransformer<E = DefaultEvaluator> {
    config: TransformConfig,
    evaluator: E,
}

impl GraphTransformer {
    /// Transformer with the default evaluator.
    pub fn new(config: TransformConfig) -> Self {
        Self::with_evaluator(config, DefaultEvaluator)
    }
}

impl<E: Evaluator> GraphTransformer<E> {
    /// Transformer with a caller-supplied evaluator for operation expressions.
    pub fn with_evaluator(config: TransformConfig, evaluator: E) -> Self {
        Self { config, evaluator }
    }

    /// Active configuration.
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Applies `rule` once per match, in order, against the live host.
    ///
    /// A match whose bound host elements were removed by an earlier match of
    /// the batch is skipped. The first error aborts the batch; edits applied
    /// so far stay unless `scope` is undoable, in which case they form one
    /// undo unit with the rest.
    #[instrument(skip_all, fields(rule = %rule.name(), matches = matches.len()))]
    pub fn transform(
        &self,
        rule: &mut TransformationRule,
        host: &mut Graph,
        matches: &[MatchResult],
        scope: &mut TransactionScope<'_>,
    ) -> Result<TransformReport, TransformationError> {
        let label = rule.name().to_owned();
        let journal = scope.begin(&label);
        let mut editor = Editor::new(host, journal);
        let outcome = self.run_batch(rule, &mut editor, matches);
        let edits = editor.applied();
        drop(editor);
        scope.finish();
        let mut report = outcome?;
        report.edits = edits;
        info!(
            applied = report.applied,
            skipped = report.skipped,
            created = report.created,
            removed = report.removed,
            dangling_removed = report.dangling_removed,
            relations_merged = report.relations_merged,
            vertices_added = report.vertices_added,
            edits = report.edits,
            "transformation complete"
        );
        Ok(report)
    }

    fn run_batch(
        &self,
        rule: &mut TransformationRule,
        editor: &mut Editor<'_>,
        matches: &[MatchResult],
    ) -> Result<TransformReport, TransformationError> {
        let mut report = TransformReport::default();
        let mut touched = BTreeSet::new();
        let hiding = rule
            .replacement()
            .relation_hiding()
            .unwrap_or(self.config.relation_hiding);
        for matched in matches {
            let proot = rule.pattern().root();
            let Some(container) = matched.get(proot.into()).and_then(ElementId::as_node) else {
                return Err(TransformationError::MissingPatternRoot);
            };
            if let Some((_, stale)) = matched
                .pairs()
                .into_iter()
                .find(|(_, h)| !editor.graph().contains(*h))
            {
                warn!(host = %stale, "skipping match bound to a removed element");
                report.skipped += 1;
                continue;
            }

            let snapshot = rule.pattern().variables().snapshot();
            for (name, value) in matched.parameter_values().iter() {
                rule.pattern_mut().variables_mut().set(name, Some(value.clone()));
            }
            let outcome = {
                let mut application = Application {
                    pattern: rule.pattern(),
                    replacement: rule.replacement(),
                    evaluator: &self.evaluator,
                    editor: &mut *editor,
                    matched: matched.clone(),
                    r2h: BTreeMap::new(),
                    moves: BTreeMap::new(),
                    touched: &mut touched,
                    report: &mut report,
                };
                application.touched.insert(container);
                application.run(container)
            };
            rule.pattern_mut().variables_mut().restore(snapshot);
            outcome?;
            report.applied += 1;
        }
        tidy(
            editor,
            &touched,
            TidyPolicy {
                hiding,
                routing_vertices: self.config.routing_vertices,
            },
            &mut report,
        )?;
        Ok(report)
    }
}

/// Captured subtree of a matched host node that must change container.
struct Move {
    host: NodeId,
    fragment: Fragment,
    order: Vec<ElementId>,
}

/// State of one match being applied.
struct Application<'a, 'g> {
    pattern: &'a Pattern,
    replacement: &'a Replacement,
    evaluator: &'a dyn Evaluator,
    editor: &'a mut Editor<'g>,
    /// Working copy of the match; re-pointed when host elements are copied.
    matched: MatchResult,
    /// Replacement element to host element, for elements created or moved.
    r2h: BTreeMap<ElementId, ElementId>,
    moves: BTreeMap<NodeId, Move>,
    touched: &'a mut BTreeSet<NodeId>,
    report: &'a mut TransformReport,
}

impl Application<'_, '_> {
    fn run(&mut self, container: NodeId) -> Result<(), TransformationError> {
        self.plan_moves()?;
        self.create_pattern_elements()?;
        let rroot = self.replacement.root();
        self.r2h.insert(rroot.into(), container.into());
        self.add_ports(rroot, container)?;
        self.add_objects(rroot, container)?;
        self.run_operations()?;
        self.remove_links()?;
        self.remove_objects()?;
        self.add_connections()?;
        for (_, host) in self.matched.pairs() {
            if let Some(c) = self.editor.graph().container_of(host) {
                self.touched.insert(c);
            }
        }
        debug!(bindings = self.matched.len(), "match applied");
        Ok(())
    }

    /// Host counterpart of a replacement element.
    ///
    /// Explicit copies come first, then the match of the element's pattern
    /// object; a port without either resolves by name on its owner's
    /// counterpart.
    fn host_of(&self, element: ElementId) -> Option<ElementId> {
        let graph = self.editor.graph();
        if let Some(h) = self.r2h.get(&element).copied().filter(|h| graph.contains(*h)) {
            return Some(h);
        }
        if let Some(h) = self
            .pattern_of(element)
            .and_then(|p| self.matched.get(p))
            .filter(|h| graph.contains(*h))
        {
            return Some(h);
        }
        let port = self.replacement.graph().port(element.as_port()?)?;
        let owner = self.host_of(port.owner.into())?.as_node()?;
        graph.port_by_name(owner, &port.name).map(ElementId::Port)
    }

    /// Pattern element a replacement element stands for. The replacement
    /// root stands for the pattern root whether or not it says so.
    fn pattern_of(&self, element: ElementId) -> Option<ElementId> {
        if element == ElementId::Node(self.replacement.root()) {
            return Some(self.pattern.root().into());
        }
        self.replacement.pattern_object(element)
    }

    /// Replacement counterpart of a pattern element.
    fn counterpart(&self, pattern_element: ElementId) -> Option<ElementId> {
        if pattern_element == ElementId::Node(self.pattern.root()) {
            return Some(self.replacement.root().into());
        }
        if let Some(r) = self.replacement.element_for(pattern_element) {
            return Some(r);
        }
        let port = self.pattern.graph().port(pattern_element.as_port()?)?;
        let owner = self.counterpart(port.owner.into())?.as_node()?;
        self.replacement
            .graph()
            .port_by_name(owner, &port.name)
            .map(ElementId::Port)
    }

    fn is_preserved(&self, pattern_element: ElementId) -> bool {
        self.pattern.is_preserved(pattern_element)
            || pattern_element
                .as_port()
                .and_then(|p| self.pattern.graph().port(p))
                .is_some_and(|p| self.pattern.is_preserved(p.owner.into()))
    }

    fn repoint(&mut self, moved: &BTreeMap<ElementId, ElementId>) {
        for (old, new) in moved {
            if let Some(p) = self.matched.get_key(*old) {
                self.matched.put(p, *new);
            }
        }
        for host in self.r2h.values_mut() {
            if let Some(new) = moved.get(host) {
                *host = *new;
            }
        }
    }

    /// Captures matched nodes whose replacement container stands for a
    /// different pattern container, before any edit lands.
    fn plan_moves(&mut self) -> Result<(), GraphError> {
        let replacement = self.replacement;
        let rgraph = replacement.graph();
        for rn in rgraph.node_ids() {
            let Some(rc) = rgraph.container_of(rn.into()) else { continue };
            let Some(pn) = replacement.pattern_object(rn.into()) else { continue };
            let pattern_container = self.pattern.graph().container_of(pn).map(ElementId::Node);
            if pattern_container == self.pattern_of(rc.into()) {
                continue;
            }
            let Some(host) = self.matched.get(pn).and_then(ElementId::as_node) else { continue };
            let (fragment, order) =
                Fragment::capture(self.editor.graph(), host.into(), Depth::Deep)?;
            self.moves.insert(rn, Move { host, fragment, order });
        }
        Ok(())
    }

    fn create_pattern_elements(&mut self) -> Result<(), TransformationError> {
        let pattern = self.pattern;
        let graph = pattern.graph();
        let tops: Vec<ElementId> = pattern
            .created_elements()
            .filter(|e| {
                graph
                    .container_of(*e)
                    .is_none_or(|c| !pattern.is_created(c.into()))
            })
            .collect();
        for element in tops {
            if self.matched.get(element).is_some() || !graph.contains(element) {
                continue;
            }
            let container = self.mapped_ancestor(element).ok_or_else(|| {
                TransformationError::unresolved(element, "no matched ancestor to create it in")
            })?;
            let (fragment, order) = Fragment::capture(graph, element, Depth::Deep)?;
            let created = fragment.instantiate(self.editor, container)?;
            trace!(pattern = %element, count = created.len(), "created pattern element");
            self.report.created += created.len();
            self.touched.insert(container);
            for (p, h) in order.into_iter().zip(created) {
                self.matched.put(p, h);
            }
        }
        Ok(())
    }

    fn mapped_ancestor(&self, element: ElementId) -> Option<NodeId> {
        let graph = self.pattern.graph();
        let mut current = graph.container_of(element);
        while let Some(c) = current {
            if let Some(h) = self.matched.get(c.into()).and_then(ElementId::as_node) {
                return Some(h);
            }
            current = graph.container_of(c.into());
        }
        None
    }

    /// Creates the replacement ports of `node` the host node lacks.
    fn add_ports(&mut self, node: NodeId, host: NodeId) -> Result<(), TransformationError> {
        let replacement = self.replacement;
        let rgraph = replacement.graph();
        for port in rgraph.ports(node) {
            if let Some(h) = self.host_of((*port).into()) {
                self.r2h.insert((*port).into(), h);
                continue;
            }
            let (fragment, _) = Fragment::capture(rgraph, (*port).into(), Depth::Shallow)?;
            let created = fragment.instantiate(self.editor, host)?;
            self.report.created += created.len();
            if let Some(h) = created.first() {
                self.r2h.insert((*port).into(), *h);
            }
        }
        Ok(())
    }

    /// Copies the contents of replacement container `rc` into host container
    /// `hc`, reusing elements that already have a host counterpart.
    fn add_objects(&mut self, rc: NodeId, hc: NodeId) -> Result<(), TransformationError> {
        let replacement = self.replacement;
        let rgraph = replacement.graph();
        for child in rgraph.child_nodes(rc) {
            let host = if let Some(mv) = self.moves.remove(child) {
                self.move_node(mv, hc)?
            } else if let Some(h) = self.host_of((*child).into()).and_then(ElementId::as_node) {
                h
            } else {
                let (fragment, order) = Fragment::capture(rgraph, (*child).into(), Depth::Shallow)?;
                let created = fragment.instantiate(self.editor, hc)?;
                self.report.created += created.len();
                self.touched.insert(hc);
                self.r2h.extend(order.into_iter().zip(created.iter().copied()));
                created
                    .first()
                    .and_then(|e| e.as_node())
                    .ok_or_else(|| {
                        TransformationError::unresolved(
                            ElementId::Node(*child),
                            "node was not created",
                        )
                    })?
            };
            self.r2h.insert((*child).into(), host.into());
            self.add_ports(*child, host)?;
            self.add_objects(*child, host)?;
        }
        for relation in rgraph.relations_in(rc) {
            let graph = self.editor.graph();
            let reusable = self
                .host_of((*relation).into())
                .filter(|h| graph.container_of(*h) == Some(hc));
            if let Some(h) = reusable {
                self.r2h.insert((*relation).into(), h);
                continue;
            }
            let (fragment, _) = Fragment::capture(rgraph, (*relation).into(), Depth::Shallow)?;
            let created = fragment.instantiate(self.editor, hc)?;
            self.report.created += created.len();
            self.touched.insert(hc);
            if let Some(h) = created.first() {
                self.r2h.insert((*relation).into(), *h);
            }
        }
        Ok(())
    }

    fn move_node(&mut self, mv: Move, container: NodeId) -> Result<NodeId, TransformationError> {
        let created = mv.fragment.instantiate(self.editor, container)?;
        let moved: BTreeMap<ElementId, ElementId> =
            mv.order.into_iter().zip(created.iter().copied()).collect();
        if let Some(old) = self.editor.graph().container_of(mv.host.into()) {
            self.touched.insert(old);
        }
        self.touched.insert(container);
        self.repoint(&moved);
        if self.editor.graph().contains(mv.host.into()) {
            self.editor.remove(mv.host.into())?;
        }
        trace!(host = %ElementId::Node(mv.host), "moved matched node");
        created
            .first()
            .and_then(|e| e.as_node())
            .ok_or_else(|| {
                TransformationError::unresolved(ElementId::Node(mv.host), "node was not moved")
            })
    }

    fn run_operations(&mut self) -> Result<(), TransformationError> {
        let replacement = self.replacement;
        for (element, operations) in replacement.operation_entries() {
            let host = self.host_of(element).ok_or_else(|| {
                TransformationError::unresolved(element, "operation target has no host counterpart")
            })?;
            for operation in operations {
                let change = {
                    let ctx = OperationContext {
                        pattern: self.pattern,
                        replacement,
                        match_result: &self.matched,
                        host: self.editor.graph(),
                        pattern_element: self.pattern_of(element),
                        replacement_element: element,
                        host_element: host,
                    };
                    operation.describe_change(&ctx, self.evaluator)?
                };
                if let Some(change) = change {
                    trace!(?change, "applying operation");
                    self.apply_change(change)?;
                }
            }
        }
        Ok(())
    }

    fn apply_change(&mut self, change: Change) -> Result<(), GraphError> {
        match change {
            Change::SetAttribute { element, name, value } => {
                self.editor.set_attribute(element, &name, Some(value))
            }
            Change::RemoveAttribute { element, name } => {
                self.editor.set_attribute(element, &name, None)
            }
            Change::RemoveElement(element) => {
                if let Some(c) = self.editor.graph().container_of(element) {
                    self.touched.insert(c);
                    self.editor.remove(element)?;
                }
                Ok(())
            }
        }
    }

    fn remove_links(&mut self) -> Result<(), TransformationError> {
        let pattern = self.pattern;
        for pr in pattern.graph().relation_ids() {
            if pattern.is_created(pr.into()) {
                continue;
            }
            let Some(hr) = self.matched.get(pr.into()).and_then(ElementId::as_relation) else {
                continue;
            };
            let Some(rr) = self.counterpart(pr.into()).and_then(ElementId::as_relation) else {
                continue;
            };
            let links = self
                .editor
                .graph()
                .relation(hr)
                .map(|r| r.links.clone())
                .unwrap_or_default();
            for link in links {
                let Some(pe) = self.matched.get_key(link_element(link)) else { continue };
                let counterpart = self.counterpart(pe);
                let kept = counterpart
                    .and_then(element_link)
                    .is_some_and(|rl| self.replacement.graph().is_linked(rr, rl));
                if kept || (counterpart.is_none() && self.is_preserved(pe)) {
                    continue;
                }
                if self.editor.graph().is_linked(hr, link) {
                    trace!(relation = %ElementId::Relation(hr), "unlinking dropped link");
                    self.editor.unlink(hr, link)?;
                }
            }
        }
        Ok(())
    }

    fn remove_objects(&mut self) -> Result<(), TransformationError> {
        let pattern = self.pattern;
        let root: ElementId = pattern.root().into();
        let mut nodes = Vec::new();
        let mut relations = Vec::new();
        let mut ports = Vec::new();
        for (p, h) in self.matched.pairs() {
            if p == root
                || !pattern.graph().contains(p)
                || pattern.is_created(p)
                || self.is_preserved(p)
                || self.counterpart(p).is_some()
            {
                continue;
            }
            match h {
                ElementId::Node(n) => nodes.push(n),
                ElementId::Port(_) => ports.push(h),
                ElementId::Relation(_) => relations.push(h),
            }
        }
        let graph = self.editor.graph();
        nodes.sort_by_key(|n| Reverse(depth(graph, *n)));
        for node in nodes {
            let graph = self.editor.graph();
            let Some(rec) = graph.node(node) else { continue };
            if rec.kind.is_container() && !(rec.nodes.is_empty() && rec.relations.is_empty()) {
                self.remove_shallow(node)?;
            } else {
                if let Some(c) = rec.container {
                    self.touched.insert(c);
                }
                self.editor.remove(node.into())?;
            }
            self.report.removed += 1;
        }
        for element in relations.into_iter().chain(ports) {
            if let Some(c) = self.editor.graph().container_of(element) {
                self.touched.insert(c);
                self.editor.remove(element)?;
                self.report.removed += 1;
            }
        }
        Ok(())
    }

    /// Removes `container` after hoisting its contents into its parent.
    ///
    /// Relations reaching a boundary port of the container (from either
    /// side) are grouped when they share a port; each group becomes one
    /// pass-through relation in the parent carrying the widest member's
    /// width.
    fn remove_shallow(&mut self, container: NodeId) -> Result<(), TransformationError> {
        let graph = self.editor.graph();
        let rec = graph.try_node(container)?;
        let parent = rec.container.ok_or(GraphError::RemoveRoot)?;
        let children = rec.nodes.clone();
        let inner = rec.relations.clone();
        let boundary = rec.ports.clone();

        let mut groups: Vec<BTreeSet<RelationId>> = Vec::new();
        for port in &boundary {
            let mut group: BTreeSet<RelationId> = graph
                .port(*port)
                .map(|p| p.relations.iter().copied().collect())
                .unwrap_or_default();
            if group.is_empty() {
                continue;
            }
            let (joined, rest): (Vec<_>, Vec<_>) =
                groups.into_iter().partition(|g| !g.is_disjoint(&group));
            for g in joined {
                group.extend(g);
            }
            groups = rest;
            groups.push(group);
        }
        let grouped: BTreeSet<RelationId> = groups.iter().flatten().copied().collect();

        let mut moved: BTreeMap<ElementId, ElementId> = BTreeMap::new();
        for child in children {
            let (fragment, order) =
                Fragment::capture(self.editor.graph(), child.into(), Depth::Deep)?;
            let created = fragment.instantiate(self.editor, parent)?;
            moved.extend(order.into_iter().zip(created));
        }
        let internal: Vec<RelationId> =
            inner.into_iter().filter(|r| !grouped.contains(r)).collect();
        for relation in &internal {
            let (fragment, _) =
                Fragment::capture(self.editor.graph(), (*relation).into(), Depth::Shallow)?;
            if let Some(id) = fragment.instantiate(self.editor, parent)?.first() {
                moved.insert((*relation).into(), *id);
            }
        }
        for relation in &internal {
            let target = moved.get(&ElementId::Relation(*relation)).and_then(|e| e.as_relation());
            let Some(target) = target else { continue };
            let links = self.editor.graph().try_relation(*relation)?.links.clone();
            for link in links {
                let mapped = moved.get(&link_element(link)).copied().and_then(element_link);
                let Some(mapped) = mapped else { continue };
                if !self.editor.graph().is_linked(target, mapped) {
                    self.editor.link(target, mapped)?;
                }
            }
        }

        for group in &groups {
            let graph = self.editor.graph();
            let width = group
                .iter()
                .filter_map(|r| {
                    graph.attribute((*r).into(), WIDTH_ATTRIBUTE).and_then(Value::as_int)
                })
                .max();
            let mut targets = Vec::new();
            for member in group {
                for link in &graph.try_relation(*member)?.links {
                    let target = match *link {
                        Link::Port(p) if graph.port(p).is_some_and(|x| x.owner == container) => {
                            None
                        }
                        Link::Relation(o) if group.contains(&o) => None,
                        other => Some(
                            moved
                                .get(&link_element(other))
                                .copied()
                                .and_then(element_link)
                                .unwrap_or(other),
                        ),
                    };
                    if let Some(t) = target {
                        if !targets.contains(&t) {
                            targets.push(t);
                        }
                    }
                }
            }
            let outside: Vec<RelationId> = group
                .iter()
                .copied()
                .filter(|r| graph.relation(*r).is_some_and(|x| x.container == parent))
                .collect();
            let mut attributes = Attributes::new();
            if let Some(w) = width {
                attributes.insert(WIDTH_ATTRIBUTE.to_owned(), Value::Int(w));
            }
            for r in outside {
                self.editor.remove(r.into())?;
            }
            let pass = self.editor.add_relation(parent, "relation", attributes, None)?;
            for t in targets {
                if self.editor.graph().check_link(pass, t).is_ok() {
                    self.editor.link(pass, t)?;
                }
            }
            trace!(relation = %ElementId::Relation(pass), "pass-through relation");
        }

        self.repoint(&moved);
        self.editor.remove(container.into())?;
        self.touched.insert(parent);
        debug!(
            container = %ElementId::Node(container),
            hoisted = moved.len(),
            "removed container shallowly"
        );
        Ok(())
    }

    fn add_connections(&mut self) -> Result<(), TransformationError> {
        let replacement = self.replacement;
        let rgraph = replacement.graph();
        for rr in rgraph.relation_ids() {
            let Some(rec) = rgraph.relation(rr) else { continue };
            let hr = self
                .host_of(rr.into())
                .and_then(ElementId::as_relation)
                .ok_or_else(|| {
                    TransformationError::unresolved(
                        ElementId::Relation(rr),
                        "relation has no host counterpart",
                    )
                })?;
            for link in &rec.links {
                let endpoint = link_element(*link);
                let target = self
                    .host_of(endpoint)
                    .and_then(element_link)
                    .ok_or_else(|| {
                        TransformationError::unresolved(
                            endpoint,
                            "linked element has no host counterpart",
                        )
                    })?;
                if !self.editor.graph().is_linked(hr, target) {
                    self.editor.link(hr, target)?;
                    if let Some(c) = self.editor.graph().container_of(hr.into()) {
                        self.touched.insert(c);
                    }
                }
            }
        }
        Ok(())
    }
}

fn link_element(link: Link) -> ElementId {
    match link {
        Link::Port(p) => p.into(),
        Link::Relation(r) => r.into(),
    }
}

fn element_link(element: ElementId) -> Option<Link> {
    match element {
        ElementId::Port(p) => Some(Link::Port(p)),
        ElementId::Relation(r) => Some(Link::Relation(r)),
        ElementId::Node(_) => None,
    }
}

fn depth(graph: &Graph, node: NodeId) -> usize {
    let mut depth = 0;
    let mut current = graph.container_of(node.into());
    while let Some(c) = current {
        depth += 1;
        current = graph.container_of(c.into());
    }
    depth
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::MatchConfig;
    use crate::criterion::Criterion;
    use crate::matcher::GraphMatcher;
    use crate::operation::Operation;
    use crate::record::{NodeKind, NodeSpec};
    use crate::undo::UndoStack;

    fn host() -> Graph {
        let mut g = Graph::new("top");
        let root = g.root();
        for (name, v) in [("a", 3), ("b", 5)] {
            g.add_node(root, NodeSpec::atomic(name, "Const").with_attribute("value", v)).unwrap();
        }
        g
    }

    fn rule() -> TransformationRule {
        let mut p = Pattern::new("lhs");
        let root = p.root();
        let m = p.add_matcher(root, "M", NodeKind::Atomic).unwrap();
        p.add_criterion(m.into(), Criterion::attribute("value", "$v")).unwrap();
        let mut rule = TransformationRule::identity("bump", p).unwrap();
        let rm = rule.replacement().element_for(m.into()).unwrap();
        rule.replacement_mut()
            .add_operation(rm, Operation::set_attribute("value", "$v + 1"))
            .unwrap();
        rule
    }

    #[test]
    fn operations_see_match_parameters() {
        let mut g = host();
        let mut rule = rule();
        let matches = GraphMatcher::new(MatchConfig::default())
            .match_all(rule.pattern(), &g)
            .unwrap();
        assert_eq!(matches.len(), 2);
        let report = GraphTransformer::new(TransformConfig::default())
            .transform(&mut rule, &mut g, &matches, &mut TransactionScope::none())
            .unwrap();
        assert_eq!(report.applied, 2);
        let values: Vec<Value> = g
            .child_nodes(g.root())
            .iter()
            .map(|n| g.attribute((*n).into(), "value").unwrap().clone())
            .collect();
        assert_eq!(values, vec![Value::Int(4), Value::Int(6)]);
        assert!(rule.pattern().variables().is_empty());
    }

    #[test]
    fn undoable_scope_reverts_the_batch() {
        let mut g = host();
        let before = crate::snapshot::structure_digest(&g, g.root());
        let mut rule = rule();
        let matches = GraphMatcher::new(MatchConfig::default())
            .match_all(rule.pattern(), &g)
            .unwrap();
        let mut stack = UndoStack::new();
        GraphTransformer::new(TransformConfig::default())
            .transform(&mut rule, &mut g, &matches, &mut TransactionScope::undoable(&mut stack))
            .unwrap();
        assert_eq!(stack.len(), 1);
        assert_ne!(crate::snapshot::structure_digest(&g, g.root()), before);
        assert_eq!(stack.undo(&mut g).unwrap().as_deref(), Some("bump"));
        assert_eq!(crate::snapshot::structure_digest(&g, g.root()), before);
    }

    #[test]
    fn missing_root_binding_is_rejected() {
        let mut g = host();
        let mut rule = rule();
        let err = GraphTransformer::new(TransformConfig::default())
            .transform(&mut rule, &mut g, &[MatchResult::new()], &mut TransactionScope::none())
            .unwrap_err();
        assert!(matches!(err, TransformationError::MissingPatternRoot));
    }
}
