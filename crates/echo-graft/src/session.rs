// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Match-then-replace orchestration over one owned host graph.
use tracing::{debug, info, instrument};

use crate::config::GraftConfig;
use crate::error::SessionError;
use crate::expr::{DefaultEvaluator, Evaluator};
use crate::graph::Graph;
use crate::match_result::MatchResult;
use crate::matcher::{CollectMatches, GraphMatcher};
use crate::rule::TransformationRule;
use crate::transform::{GraphTransformer, TransformReport};
use crate::undo::{TransactionScope, UndoStack};

/// Owns a host graph and its undo history.
///
/// Every mutation goes through `&mut self`, so a match enumeration can never
/// interleave with a rewrite of the same host. Each applied batch becomes one
/// undo unit labelled with the rule name.
#[derive(Debug)]
pub struct TransformSession<E = DefaultEvaluator> {
    host: Graph,
    undo: UndoStack,
    config: GraftConfig,
    matcher: GraphMatcher<E>,
    transformer: GraphTransformer<E>,
}

impl TransformSession {
    /// Session over `host` with the default evaluator.
    pub fn new(host: Graph, config: GraftConfig) -> Self {
        Self::with_evaluator(host, config, DefaultEvaluator)
    }
}

impl<E: Evaluator + Clone> TransformSession<E> {
    /// Session whose criteria and operations use `evaluator`.
    pub fn with_evaluator(host: Graph, config: GraftConfig, evaluator: E) -> Self {
        Self {
            host,
            undo: UndoStack::new(),
            config,
            matcher: GraphMatcher::with_evaluator(config.matching, evaluator.clone()),
            transformer: GraphTransformer::with_evaluator(config.transform, evaluator),
        }
    }

    /// Current host graph.
    pub fn host(&self) -> &Graph {
        &self.host
    }

    /// Gives the host graph back, dropping the undo history.
    pub fn into_host(self) -> Graph {
        self.host
    }

    /// Active configuration.
    pub fn config(&self) -> &GraftConfig {
        &self.config
    }

    /// Undo history, oldest unit first.
    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// Every match of the rule's pattern under the host root.
    ///
    /// Iterative pattern variables are expanded.
    #[instrument(skip_all, fields(rule = %rule.name()))]
    pub fn find_all(&self, rule: &TransformationRule) -> Result<Vec<MatchResult>, SessionError> {
        self.collect(rule, CollectMatches::all())
    }

    /// First match of the rule's pattern, if any.
    pub fn find_first(
        &self,
        rule: &TransformationRule,
    ) -> Result<Option<MatchResult>, SessionError> {
        Ok(self.collect(rule, CollectMatches::first(1))?.pop())
    }

    fn collect(
        &self,
        rule: &TransformationRule,
        mut sink: CollectMatches,
    ) -> Result<Vec<MatchResult>, SessionError> {
        self.matcher
            .iterate(rule.pattern(), &self.host, self.host.root(), &mut sink)?;
        debug!(matches = sink.results.len(), "matches collected");
        Ok(sink.results)
    }

    /// Rewrites the first match; `None` when nothing matches.
    pub fn apply_first(
        &mut self,
        rule: &mut TransformationRule,
    ) -> Result<Option<TransformReport>, SessionError> {
        let Some(found) = self.find_first(rule)? else {
            return Ok(None);
        };
        self.apply(rule, &[found]).map(Some)
    }

    /// Rewrites every match found before the first edit, in discovery order.
    ///
    /// Matches invalidated by an earlier rewrite of the batch are skipped.
    pub fn apply_all(
        &mut self,
        rule: &mut TransformationRule,
    ) -> Result<TransformReport, SessionError> {
        let matches = self.find_all(rule)?;
        if matches.is_empty() {
            return Ok(TransformReport::default());
        }
        self.apply(rule, &matches)
    }

    /// Rewrites the given matches as one undo unit.
    #[instrument(skip_all, fields(rule = %rule.name(), matches = matches.len()))]
    pub fn apply(
        &mut self,
        rule: &mut TransformationRule,
        matches: &[MatchResult],
    ) -> Result<TransformReport, SessionError> {
        let mut scope = TransactionScope::undoable(&mut self.undo);
        Ok(self.transformer.transform(rule, &mut self.host, matches, &mut scope)?)
    }

    /// Reverts the most recent unit; returns its label.
    pub fn undo(&mut self) -> Result<Option<String>, SessionError> {
        let label = self.undo.undo(&mut self.host)?;
        if let Some(label) = &label {
            info!(label = %label, "undone");
        }
        Ok(label)
    }
}
