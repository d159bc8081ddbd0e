// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Criteria: predicates narrowing which host elements a matcher accepts.
//!
//! A criterion is used in two phases. When it is attached to a pattern
//! element it may shape the matcher (a port criterion materialises a port on
//! its owning matcher node, see [`Pattern::set_criteria`](crate::Pattern::set_criteria)).
//! When a match starts, it is compiled once into a [`Check`], the pure
//! predicate evaluated in the search loop.
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::expr::{free_variable, referenced_variables, EmptyScope, EvalError, Evaluator, Scope};
use crate::graph::Graph;
use crate::ident::ElementId;
use crate::ingredient::Ingredient;
use crate::record::PortRecord;
use crate::record::PortSpec;
use crate::value::Value;

/// Attribute holding a port's data type.
pub const PORT_TYPE_ATTRIBUTE: &str = "type";
/// Attribute holding a transition's guard expression.
pub const GUARD_ATTRIBUTE: &str = "guard";

/// Predicate over one host element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// The host node's type is `superclass` or inherits from it.
    Subclass {
        /// Required type label.
        superclass: String,
    },
    /// The host element's attribute `name` equals the value of `value`.
    ///
    /// A value that is exactly `$var` binds `var` when it is not yet bound.
    Attribute {
        /// Attribute name.
        name: String,
        /// Expected value expression.
        value: String,
    },
    /// The host node owns a port satisfying the criterion.
    Port(PortCriterion),
    /// The host transition's guard equals `guard`.
    Guard {
        /// Expected guard expression.
        guard: String,
    },
}

impl Ingredient for Criterion {
    const LABEL_PREFIX: &'static str = "criterion";
}

/// Port existence, direction, arity, name and type requirements.
///
/// Every field is optional; `None` leaves that aspect unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortCriterion {
    /// Regular expression the whole host port name must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Required value of the host port's `type` attribute (when it has one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_type: Option<String>,
    /// Required input flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<bool>,
    /// Required output flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<bool>,
    /// Required multiport flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiport: Option<bool>,
    /// Name of the materialised matcher port; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher_name: Option<String>,
}

impl PortCriterion {
    /// Unconstrained port criterion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the host port name to match `pattern` in full.
    pub fn named(mut self, pattern: impl Into<String>) -> Self {
        self.name = Some(pattern.into());
        self
    }

    /// Requires the host port type.
    pub fn typed(mut self, port_type: impl Into<String>) -> Self {
        self.port_type = Some(port_type.into());
        self
    }

    /// Requires the input flag.
    pub fn input(mut self, input: bool) -> Self {
        self.input = Some(input);
        self
    }

    /// Requires the output flag.
    pub fn output(mut self, output: bool) -> Self {
        self.output = Some(output);
        self
    }

    /// Requires the multiport flag.
    pub fn multiport(mut self, multiport: bool) -> Self {
        self.multiport = Some(multiport);
        self
    }

    /// Names the materialised matcher port.
    pub fn matcher_name(mut self, name: impl Into<String>) -> Self {
        self.matcher_name = Some(name.into());
        self
    }

    /// Shape of the matcher port this criterion materialises.
    ///
    /// An unconstrained multiport flag yields a multiport so that the matcher
    /// port may carry any number of pattern relations.
    pub fn port_spec(&self, id: &str) -> PortSpec {
        PortSpec::new(id, self.input.unwrap_or(false), self.output.unwrap_or(false))
            .multiport(self.multiport.unwrap_or(true))
    }

    /// Compiles the name pattern, anchored at both ends.
    pub fn name_regex(&self) -> Result<Option<Regex>, MatchError> {
        self.name
            .as_deref()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| MatchError::malformed(None, format!("port name pattern: {e}")))
            })
            .transpose()
    }

    /// True when `port` satisfies every enabled requirement.
    pub fn accepts(&self, port: &PortRecord, name: Option<&Regex>) -> bool {
        if self.input.is_some_and(|v| v != port.input)
            || self.output.is_some_and(|v| v != port.output)
            || self.multiport.is_some_and(|v| v != port.multiport)
        {
            return false;
        }
        if name.is_some_and(|re| !re.is_match(&port.name)) {
            return false;
        }
        match (&self.port_type, port.attributes.get(PORT_TYPE_ATTRIBUTE)) {
            (Some(expected), Some(actual)) => actual.matches(&Value::Str(expected.clone())),
            _ => true,
        }
    }
}

impl Criterion {
    /// Type criterion.
    pub fn subclass(superclass: impl Into<String>) -> Self {
        Self::Subclass {
            superclass: superclass.into(),
        }
    }

    /// Attribute criterion.
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Guard criterion.
    pub fn guard(guard: impl Into<String>) -> Self {
        Self::Guard {
            guard: guard.into(),
        }
    }

    /// Port criterion.
    pub fn port(criterion: PortCriterion) -> Self {
        Self::Port(criterion)
    }

    /// The port criterion, if this is one.
    pub fn as_port(&self) -> Option<&PortCriterion> {
        match self {
            Self::Port(p) => Some(p),
            _ => None,
        }
    }

    /// True when the criterion may be attached to `element`.
    pub fn applies_to(&self, element: ElementId) -> bool {
        match self {
            Self::Subclass { .. } | Self::Port(_) => matches!(element, ElementId::Node(_)),
            Self::Attribute { .. } => true,
            Self::Guard { .. } => matches!(element, ElementId::Relation(_)),
        }
    }

    /// Variables the criterion reads or binds.
    pub fn variables(&self) -> Vec<String> {
        match self {
            Self::Attribute { value, .. } => referenced_variables(value),
            Self::Guard { guard } => referenced_variables(guard),
            Self::Subclass { .. } | Self::Port(_) => Vec::new(),
        }
    }

    /// Structural validation run when the criterion is attached.
    pub fn validate(&self) -> Result<(), MatchError> {
        match self {
            Self::Subclass { superclass } if superclass.trim().is_empty() => {
                Err(MatchError::malformed(None, "subclass criterion has an empty type"))
            }
            Self::Attribute { name, .. } if name.trim().is_empty() => Err(MatchError::malformed(
                None,
                "attribute criterion has an empty attribute name",
            )),
            Self::Port(p) => {
                if p.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(MatchError::malformed(
                        None,
                        "port criterion has an empty port name",
                    ));
                }
                if p.matcher_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(MatchError::malformed(
                        None,
                        "port criterion has an empty matcher port name",
                    ));
                }
                p.name_regex().map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Compiles the criterion into its search-loop form.
    pub(crate) fn compile(&self, evaluator: &dyn Evaluator) -> Result<Check, MatchError> {
        self.validate()?;
        let expected = |expression: &str| {
            Expected::compile(expression, evaluator).map_err(|e| MatchError::Evaluation {
                element: None,
                source: e,
            })
        };
        Ok(match self {
            Self::Subclass { superclass } => Check::Subclass(superclass.clone()),
            Self::Attribute { name, value } => Check::Attribute {
                name: name.clone(),
                expected: expected(value).map_err(malformed_expression)?,
            },
            Self::Port(p) => Check::Port {
                name: p.name_regex()?,
                criterion: p.clone(),
            },
            Self::Guard { guard } => Check::Guard {
                text: normalize(guard),
                expected: expected(guard).map_err(malformed_expression)?,
            },
        })
    }
}

fn malformed_expression(err: MatchError) -> MatchError {
    match err {
        MatchError::Evaluation {
            element,
            source: source @ EvalError::Parse { .. },
        } => MatchError::MalformedCriterion {
            element,
            message: source.to_string(),
        },
        other => other,
    }
}

/// Generated matcher port names for the port criteria in `criteria`.
///
/// A criterion's port is named by its `matcher_name`, or `criterion<n>` with
/// `n` its one-based position. A name already taken by an earlier port
/// criterion gets `2`, `3`, ... appended.
pub fn port_criterion_ids(criteria: &[Criterion]) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    for (index, criterion) in criteria.iter().enumerate() {
        let Some(port) = criterion.as_port() else {
            continue;
        };
        let base = port
            .matcher_name
            .clone()
            .unwrap_or_else(|| format!("{}{}", Criterion::LABEL_PREFIX, index + 1));
        let taken = |name: &str| out.iter().any(|(_, n)| n == name);
        let id = if taken(&base) {
            (2u32..)
                .map(|n| format!("{base}{n}"))
                .find(|candidate| !taken(candidate))
                .unwrap_or(base)
        } else {
            base
        };
        out.push((index, id));
    }
    out
}

/// Right-hand side of an attribute or guard comparison.
#[derive(Debug, Clone)]
pub(crate) enum Expected {
    /// `$var`: compare with the bound value, or bind it.
    Bind(String),
    /// Expression that reads variables; evaluated per candidate.
    Expr(String),
    /// Variable-free expression, evaluated once.
    Constant(Value),
}

impl Expected {
    fn compile(expression: &str, evaluator: &dyn Evaluator) -> Result<Self, EvalError> {
        if let Some(var) = free_variable(expression) {
            return Ok(Self::Bind(var.to_owned()));
        }
        evaluator.validate(expression)?;
        if referenced_variables(expression).is_empty() {
            Ok(Self::Constant(evaluator.evaluate(expression, &EmptyScope)?))
        } else {
            Ok(Self::Expr(expression.to_owned()))
        }
    }

    fn verdict(
        &self,
        actual: &Value,
        scope: &dyn Scope,
        evaluator: &dyn Evaluator,
    ) -> Result<Verdict, EvalError> {
        Ok(match self {
            Self::Constant(v) => Verdict::from(v.matches(actual)),
            Self::Bind(var) => match scope.lookup(var) {
                Some(bound) => Verdict::from(bound.matches(actual)),
                None => Verdict::Bind(var.clone(), actual.clone()),
            },
            Self::Expr(expression) => {
                Verdict::from(evaluator.evaluate(expression, scope)?.matches(actual))
            }
        })
    }
}

/// Outcome of one check against one host element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Reject,
    Accept,
    /// Accept and bind the variable to the value.
    Bind(String, Value),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Accept
        } else {
            Self::Reject
        }
    }
}

/// Compiled criterion.
#[derive(Debug, Clone)]
pub(crate) enum Check {
    Subclass(String),
    Attribute { name: String, expected: Expected },
    Port { criterion: PortCriterion, name: Option<Regex> },
    Guard { text: String, expected: Expected },
}

impl Check {
    /// True when the verdict depends only on the host element.
    pub(crate) fn is_static(&self) -> bool {
        match self {
            Self::Subclass(_) | Self::Port { .. } => true,
            Self::Attribute { expected, .. } | Self::Guard { expected, .. } => {
                matches!(expected, Expected::Constant(_))
            }
        }
    }

    /// Evaluates the check against `element` of `host`.
    ///
    /// Port checks are evaluated against ports by the matcher and accept any
    /// other element.
    pub(crate) fn evaluate(
        &self,
        host: &Graph,
        element: ElementId,
        scope: &dyn Scope,
        evaluator: &dyn Evaluator,
    ) -> Result<Verdict, EvalError> {
        match self {
            Self::Subclass(superclass) => Ok(Verdict::from(element.as_node().is_some_and(|n| {
                host.type_of(n).is_some_and(|ty| {
                    host.types()
                        .lineage(ty)
                        .into_iter()
                        .any(|t| host.types().label(t) == Some(superclass.as_str()))
                })
            }))),
            Self::Attribute { name, expected } => match host.attribute(element, name) {
                Some(actual) => expected.verdict(actual, scope, evaluator),
                None => Ok(Verdict::Reject),
            },
            Self::Port { criterion, name } => Ok(Verdict::from(
                element
                    .as_port()
                    .and_then(|p| host.port(p))
                    .is_none_or(|port| criterion.accepts(port, name.as_ref())),
            )),
            Self::Guard { text, expected } => match host.attribute(element, GUARD_ATTRIBUTE) {
                Some(Value::Str(actual)) if normalize(actual) == *text => Ok(Verdict::Accept),
                Some(actual) => expected.verdict(actual, scope, evaluator),
                None => Ok(Verdict::Reject),
            },
        }
    }
}

fn normalize(expression: &str) -> String {
    expression.split_whitespace().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::expr::DefaultEvaluator;
    use crate::record::NodeSpec;

    fn host() -> (Graph, ElementId) {
        let mut g = Graph::new("top");
        let root = g.root();
        g.declare_type("Source", None);
        g.declare_type("Ramp", Some("Source"));
        let n = g
            .add_node(root, NodeSpec::atomic("ramp", "Ramp").with_attribute("value", "5"))
            .unwrap();
        (g, n.into())
    }

    #[test]
    fn subclass_follows_lineage() {
        let (g, n) = host();
        let ev = DefaultEvaluator;
        let check = Criterion::subclass("Source").compile(&ev).unwrap();
        assert!(check.is_static());
        assert_eq!(check.evaluate(&g, n, &EmptyScope, &ev).unwrap(), Verdict::Accept);
        let check = Criterion::subclass("Sink").compile(&ev).unwrap();
        assert_eq!(check.evaluate(&g, n, &EmptyScope, &ev).unwrap(), Verdict::Reject);
    }

    #[test]
    fn attribute_binds_free_variable() {
        let (g, n) = host();
        let ev = DefaultEvaluator;
        let check = Criterion::attribute("value", "$v").compile(&ev).unwrap();
        assert!(!check.is_static());
        assert_eq!(
            check.evaluate(&g, n, &EmptyScope, &ev).unwrap(),
            Verdict::Bind("v".into(), Value::from("5"))
        );
        let bound = |name: &str| (name == "v").then_some(Value::Int(4));
        assert_eq!(check.evaluate(&g, n, &bound, &ev).unwrap(), Verdict::Reject);
        let check = Criterion::attribute("value", "$v + 1").compile(&ev).unwrap();
        assert_eq!(check.evaluate(&g, n, &bound, &ev).unwrap(), Verdict::Accept);
    }

    #[test]
    fn malformed_criteria_are_reported() {
        let ev = DefaultEvaluator;
        let bad = [
            Criterion::port(PortCriterion::new().named("")),
            Criterion::port(PortCriterion::new().named("in(")),
            Criterion::attribute("", "1"),
            Criterion::attribute("value", "(1 +"),
        ];
        for c in bad {
            assert!(matches!(c.compile(&ev), Err(MatchError::MalformedCriterion { .. })), "{c:?}");
        }
    }

    #[test]
    fn port_ids_are_uniquified() {
        let criteria = vec![
            Criterion::port(PortCriterion::new().matcher_name("io")),
            Criterion::subclass("A"),
            Criterion::port(PortCriterion::new().matcher_name("io")),
            Criterion::port(PortCriterion::new()),
        ];
        let ids: Vec<String> = port_criterion_ids(&criteria).into_iter().map(|(_, n)| n).collect();
        assert_eq!(ids, vec!["io", "io2", "criterion4"]);
    }

    #[test]
    fn port_criterion_checks_flags_name_and_type() {
        let mut g = Graph::new("top");
        let root = g.root();
        let n = g.add_node(root, NodeSpec::atomic("n", "T")).unwrap();
        let p = g
            .add_port(n, PortSpec::input("in1").with_attribute(PORT_TYPE_ATTRIBUTE, "int"))
            .unwrap();
        let port = g.port(p).unwrap();
        let crit = PortCriterion::new().named("in[0-9]").input(true).typed("int");
        let re = crit.name_regex().unwrap();
        assert!(crit.accepts(port, re.as_ref()));
        let re = PortCriterion::new().named("in").name_regex().unwrap();
        assert!(!crit.accepts(port, re.as_ref()));
        assert!(!PortCriterion::new().output(true).accepts(port, None));
        assert!(!PortCriterion::new().typed("string").accepts(port, None));
        let spec = PortCriterion::new().input(true).port_spec("criterion1");
        assert!(spec.input && !spec.output && spec.multiport);
    }
}
