// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operations: post-match actions attached to replacement elements.
use serde::{Deserialize, Serialize};

use crate::error::TransformationError;
use crate::expr::Evaluator;
use crate::graph::Graph;
use crate::ident::ElementId;
use crate::ingredient::Ingredient;
use crate::match_result::MatchResult;
use crate::pattern::Pattern;
use crate::replacement::Replacement;
use crate::value::Value;

/// Action producing one structural change once the host element is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Writes attribute `name` with the value of expression `value`.
    ///
    /// The expression sees match bindings, pattern variables and the host
    /// element's own attributes, in that order.
    SetAttribute {
        /// Attribute name.
        name: String,
        /// Value expression.
        value: String,
    },
    /// Copies an attribute from the host element matched by pattern element
    /// `from`.
    CopyAttribute {
        /// Pattern element whose host counterpart is read.
        from: ElementId,
        /// Attribute read.
        from_attribute: String,
        /// Attribute written on the target.
        to_attribute: String,
    },
    /// Removes attribute `name`.
    RemoveAttribute {
        /// Attribute name.
        name: String,
    },
    /// Deletes a port of the host node.
    ///
    /// `name` names a pattern port (its matched host port is deleted) or, when
    /// the pattern has no such port, a host port directly.
    RemovePort {
        /// Port name.
        name: String,
    },
    /// Deletes a child node or relation of the host container, with its
    /// subtree.
    RemoveChild {
        /// Child name.
        name: String,
    },
}

impl Ingredient for Operation {
    const LABEL_PREFIX: &'static str = "operation";
}

/// Structural change described by an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Write an attribute.
    SetAttribute {
        /// Host element.
        element: ElementId,
        /// Attribute name.
        name: String,
        /// New value.
        value: Value,
    },
    /// Clear an attribute.
    RemoveAttribute {
        /// Host element.
        element: ElementId,
        /// Attribute name.
        name: String,
    },
    /// Delete a host element and its subtree.
    RemoveElement(ElementId),
}

/// Everything an operation may consult.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    /// Rule pattern.
    pub pattern: &'a Pattern,
    /// Rule replacement.
    pub replacement: &'a Replacement,
    /// Working match result.
    pub match_result: &'a MatchResult,
    /// Host graph in its current state.
    pub host: &'a Graph,
    /// Pattern counterpart of the replacement element, if any.
    pub pattern_element: Option<ElementId>,
    /// Replacement element carrying the operation.
    pub replacement_element: ElementId,
    /// Host element the change targets.
    pub host_element: ElementId,
}

impl Operation {
    /// Attribute write.
    pub fn set_attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetAttribute {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Attribute removal.
    pub fn remove_attribute(name: impl Into<String>) -> Self {
        Self::RemoveAttribute { name: name.into() }
    }

    /// Checks names are non-empty.
    pub fn validate(&self) -> Result<(), TransformationError> {
        let empty = match self {
            Self::SetAttribute { name, .. }
            | Self::RemoveAttribute { name }
            | Self::RemovePort { name }
            | Self::RemoveChild { name } => name.trim().is_empty(),
            Self::CopyAttribute {
                from_attribute,
                to_attribute,
                ..
            } => from_attribute.trim().is_empty() || to_attribute.trim().is_empty(),
        };
        if empty {
            return Err(TransformationError::operation(
                None,
                "operation names an empty attribute or element",
            ));
        }
        Ok(())
    }

    /// Resolves the change this operation makes in `ctx`, or `None` when it
    /// does not apply.
    pub fn describe_change(
        &self,
        ctx: &OperationContext<'_>,
        evaluator: &dyn Evaluator,
    ) -> Result<Option<Change>, TransformationError> {
        let target = ctx.host_element;
        match self {
            Self::SetAttribute { name, value } => {
                let scope = |var: &str| {
                    ctx.match_result
                        .parameter(var)
                        .or_else(|| ctx.pattern.variables().value(var))
                        .or_else(|| ctx.host.attribute(target, var))
                        .cloned()
                };
                let value = evaluator.evaluate(value, &scope).map_err(|source| {
                    TransformationError::Evaluation {
                        element: Some(ctx.replacement_element),
                        source,
                    }
                })?;
                Ok(Some(Change::SetAttribute {
                    element: target,
                    name: name.clone(),
                    value,
                }))
            }
            Self::CopyAttribute {
                from,
                from_attribute,
                to_attribute,
            } => {
                let source = ctx.match_result.get(*from).ok_or_else(|| {
                    TransformationError::unresolved(*from, "copy source is not matched")
                })?;
                Ok(ctx
                    .host
                    .attribute(source, from_attribute)
                    .map(|value| Change::SetAttribute {
                        element: target,
                        name: to_attribute.clone(),
                        value: value.clone(),
                    }))
            }
            Self::RemoveAttribute { name } => Ok(ctx
                .host
                .attribute(target, name)
                .map(|_| Change::RemoveAttribute {
                    element: target,
                    name: name.clone(),
                })),
            Self::RemovePort { name } => {
                let Some(host_node) = target.as_node() else {
                    return Err(TransformationError::operation(
                        ctx.replacement_element,
                        "ports can only be removed from nodes",
                    ));
                };
                let matched = ctx
                    .pattern_element
                    .and_then(ElementId::as_node)
                    .and_then(|pn| ctx.pattern.graph().port_by_name(pn, name))
                    .and_then(|pp| ctx.match_result.get(pp.into()))
                    .filter(|hp| ctx.host.container_of(*hp) == Some(host_node));
                Ok(matched
                    .or_else(|| ctx.host.port_by_name(host_node, name).map(ElementId::Port))
                    .map(Change::RemoveElement))
            }
            Self::RemoveChild { name } => {
                let Some(host_node) = target.as_node() else {
                    return Err(TransformationError::operation(
                        ctx.replacement_element,
                        "children can only be removed from containers",
                    ));
                };
                Ok(ctx
                    .host
                    .entity_by_name(host_node, name)
                    .map(ElementId::Node)
                    .or_else(|| ctx.host.relation_by_name(host_node, name).map(ElementId::Relation))
                    .map(Change::RemoveElement))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::expr::DefaultEvaluator;
    use crate::record::{NodeKind, NodeSpec, PortSpec};

    struct Fixture {
        pattern: Pattern,
        replacement: Replacement,
        host: Graph,
        result: MatchResult,
        matcher: ElementId,
        target: ElementId,
    }

    fn fixture() -> Fixture {
        let mut pattern = Pattern::new("lhs");
        let proot = pattern.root();
        let m = pattern.add_matcher(proot, "A", NodeKind::Atomic).unwrap();
        pattern.add_port(m, PortSpec::output("p")).unwrap();
        let replacement = Replacement::mirror(&pattern).unwrap();

        let mut host = Graph::new("top");
        let root = host.root();
        let n = host
            .add_node(root, NodeSpec::atomic("ramp", "Ramp").with_attribute("step", 2))
            .unwrap();
        let hp = host.add_port(n, PortSpec::output("output")).unwrap();
        host.add_port(n, PortSpec::input("trigger")).unwrap();

        let mut result = MatchResult::new();
        result.put(proot.into(), root.into());
        result.put(m.into(), n.into());
        result.put(pattern.graph().ports(m)[0].into(), hp.into());
        result.bind_parameter("k", Value::Int(3));
        Fixture {
            pattern,
            replacement,
            host,
            result,
            matcher: m.into(),
            target: n.into(),
        }
    }

    fn describe(f: &Fixture, op: &Operation) -> Result<Option<Change>, TransformationError> {
        let ctx = OperationContext {
            pattern: &f.pattern,
            replacement: &f.replacement,
            match_result: &f.result,
            host: &f.host,
            pattern_element: Some(f.matcher),
            replacement_element: f.matcher,
            host_element: f.target,
        };
        op.describe_change(&ctx, &DefaultEvaluator)
    }

    #[test]
    fn set_attribute_sees_bindings_and_host_attributes() {
        let f = fixture();
        let change = describe(&f, &Operation::set_attribute("step", "$k + $step")).unwrap();
        assert_eq!(
            change,
            Some(Change::SetAttribute {
                element: f.target,
                name: "step".into(),
                value: Value::Int(5),
            })
        );
        let err = describe(&f, &Operation::set_attribute("x", "$missing")).unwrap_err();
        assert!(matches!(err, TransformationError::Evaluation { .. }));
    }

    #[test]
    fn remove_port_prefers_the_matched_pattern_port() {
        let f = fixture();
        let hp = f.host.port_by_name(f.target.as_node().unwrap(), "output").unwrap();
        let change = describe(&f, &Operation::RemovePort { name: "p".into() }).unwrap();
        assert_eq!(change, Some(Change::RemoveElement(hp.into())));
        let trigger = f.host.port_by_name(f.target.as_node().unwrap(), "trigger").unwrap();
        let change = describe(&f, &Operation::RemovePort { name: "trigger".into() }).unwrap();
        assert_eq!(change, Some(Change::RemoveElement(trigger.into())));
        assert_eq!(describe(&f, &Operation::RemovePort { name: "nope".into() }).unwrap(), None);
    }

    #[test]
    fn inapplicable_operations_are_no_ops() {
        let f = fixture();
        assert_eq!(describe(&f, &Operation::remove_attribute("absent")).unwrap(), None);
        let copy = Operation::CopyAttribute {
            from: f.matcher,
            from_attribute: "absent".into(),
            to_attribute: "x".into(),
        };
        assert_eq!(describe(&f, &copy).unwrap(), None);
        assert!(Operation::set_attribute("", "1").validate().is_err());
    }
}
