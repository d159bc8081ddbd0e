// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Caller-visible error taxonomy for matching and transformation.
use thiserror::Error;

use crate::expr::EvalError;
use crate::fragment::FragmentError;
use crate::graph::GraphError;
use crate::ident::ElementId;

/// Errors raised while compiling a pattern or enumerating matches.
///
/// Matching is read-only: any of these aborts the current match call but
/// leaves the host graph and the engine usable for the next call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A criterion (or its structural encoding) cannot be parsed.
    #[error("malformed criterion{}: {message}", at(.element.as_ref()))]
    MalformedCriterion {
        /// Pattern element carrying the criterion.
        element: Option<ElementId>,
        /// Diagnostic.
        message: String,
    },
    /// An index into an ingredient list is negative or out of range.
    #[error("invalid ingredient index {index} (list has {len} entries){}", at(.element.as_ref()))]
    InvalidIngredientIndex {
        /// Pattern element owning the list.
        element: Option<ElementId>,
        /// Requested index.
        index: i64,
        /// List length.
        len: usize,
    },
    /// The search hit an internal inconsistency.
    #[error("match engine failure{}: {message}", at(.element.as_ref()))]
    Engine {
        /// Element involved, if known.
        element: Option<ElementId>,
        /// Diagnostic.
        message: String,
    },
    /// The configured step budget was exhausted.
    #[error("match search exceeded {limit} steps")]
    StepLimitExceeded {
        /// Configured limit.
        limit: u64,
    },
    /// A criterion expression failed to evaluate.
    #[error("criterion evaluation failed{}: {source}", at(.element.as_ref()))]
    Evaluation {
        /// Pattern element carrying the criterion.
        element: Option<ElementId>,
        /// Evaluator diagnostic.
        source: EvalError,
    },
}

impl MatchError {
    /// Originating element, if any.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::MalformedCriterion { element, .. }
            | Self::InvalidIngredientIndex { element, .. }
            | Self::Engine { element, .. }
            | Self::Evaluation { element, .. } => *element,
            Self::StepLimitExceeded { .. } => None,
        }
    }

    pub(crate) fn malformed(
        element: impl Into<Option<ElementId>>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedCriterion {
            element: element.into(),
            message: message.into(),
        }
    }

    pub(crate) fn engine(
        element: impl Into<Option<ElementId>>,
        message: impl Into<String>,
    ) -> Self {
        Self::Engine {
            element: element.into(),
            message: message.into(),
        }
    }

    pub(crate) fn with_element(self, element: ElementId) -> Self {
        match self {
            Self::MalformedCriterion { element: None, message } => Self::MalformedCriterion {
                element: Some(element),
                message,
            },
            Self::InvalidIngredientIndex {
                element: None,
                index,
                len,
            } => Self::InvalidIngredientIndex {
                element: Some(element),
                index,
                len,
            },
            Self::Engine { element: None, message } => Self::Engine {
                element: Some(element),
                message,
            },
            Self::Evaluation { element: None, source } => Self::Evaluation {
                element: Some(element),
                source,
            },
            other => other,
        }
    }
}

/// Errors raised by the replacement engine.
///
/// A transformation error aborts the remaining phases and the rest of the
/// batch. Edits already applied stay in place unless the caller journaled
/// them through an undoable [`TransactionScope`](crate::TransactionScope).
#[derive(Debug, Error)]
pub enum TransformationError {
    /// The match result does not bind the pattern root.
    #[error("match result is invalid because it does not include the pattern")]
    MissingPatternRoot,
    /// A required correspondence could not be resolved.
    #[error("cannot resolve{}: {message}", at(.element.as_ref()))]
    Unresolved {
        /// Element whose counterpart is missing.
        element: Option<ElementId>,
        /// Diagnostic.
        message: String,
    },
    /// An operation could not describe its change.
    #[error("operation failed{}: {message}", at(.element.as_ref()))]
    Operation {
        /// Replacement element carrying the operation.
        element: Option<ElementId>,
        /// Diagnostic.
        message: String,
    },
    /// An operation expression failed to evaluate.
    #[error("operation evaluation failed{}: {source}", at(.element.as_ref()))]
    Evaluation {
        /// Replacement element carrying the operation.
        element: Option<ElementId>,
        /// Evaluator diagnostic.
        source: EvalError,
    },
    /// A structural edit was rejected by the host graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Copying a fragment failed.
    #[error(transparent)]
    Fragment(#[from] FragmentError),
}

impl TransformationError {
    /// Originating element, if any.
    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::MissingPatternRoot => None,
            Self::Unresolved { element, .. }
            | Self::Operation { element, .. }
            | Self::Evaluation { element, .. } => *element,
            Self::Graph(e) => e.element(),
            Self::Fragment(e) => e.element(),
        }
    }

    pub(crate) fn unresolved(
        element: impl Into<Option<ElementId>>,
        message: impl Into<String>,
    ) -> Self {
        Self::Unresolved {
            element: element.into(),
            message: message.into(),
        }
    }

    pub(crate) fn operation(
        element: impl Into<Option<ElementId>>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            element: element.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by [`TransformSession`](crate::TransformSession).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Matching failed.
    #[error(transparent)]
    Match(#[from] MatchError),
    /// Rewriting failed.
    #[error(transparent)]
    Transform(#[from] TransformationError),
    /// Undo could not revert the host.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn at(element: Option<&ElementId>) -> String {
    element.map_or_else(String::new, |e| format!(" on {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::NodeId;

    #[test]
    fn messages_name_the_element() {
        let err = MatchError::malformed(ElementId::Node(NodeId(3)), "empty port name");
        assert_eq!(err.to_string(), "malformed criterion on node#3: empty port name");
        assert_eq!(err.element(), Some(ElementId::Node(NodeId(3))));
        let err = TransformationError::MissingPatternRoot;
        assert_eq!(
            err.to_string(),
            "match result is invalid because it does not include the pattern"
        );
        assert_eq!(err.element(), None);
    }
}
