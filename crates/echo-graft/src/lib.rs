// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! echo-graft: pattern matching and in-place replacement over attributed,
//! hierarchical hypergraphs.
//!
//! A [`Pattern`] is matched against a host [`Graph`] by the backtracking
//! [`GraphMatcher`], producing injective [`MatchResult`]s. A
//! [`TransformationRule`] pairs the pattern with a [`Replacement`];
//! [`GraphTransformer`] rewrites the host once per match, journaling edits
//! into an [`UndoStack`] when the caller asks for an undoable
//! [`TransactionScope`]. [`TransformSession`] bundles the three.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod ident;
mod value;
mod record;
mod graph;
mod edit;
mod undo;
mod fragment;
mod snapshot;
mod expr;
mod two_way;
mod error;
mod ingredient;
mod criterion;
mod variables;
mod pattern;
mod match_result;
mod operation;
mod replacement;
mod rule;
mod config;
mod matcher;
mod relations;
mod transform;
mod session;

// Re-exports for stable public API
pub use ident::{make_type_id, ElementId, Hash, NodeId, PortId, RelationId, TypeId};
pub use value::Value;
pub use record::{
    Attributes, Link, Location, NodeKind, NodeRecord, NodeSpec, PortRecord, PortSpec,
    RelationRecord,
};
pub use graph::{Graph, GraphError, LinkSlot, Removed, TypeRegistry, ROOT_TYPE};
pub use edit::{Editor, GraphEdit};
pub use undo::{TransactionScope, UndoGroup, UndoStack};
pub use fragment::{
    export_fragment, import_fragment, Depth, Fragment, FragmentError, NodeFragment,
    PortFragment, RelationFragment,
};
pub use snapshot::{dangling_relations, structure_digest, GraphCensus};
pub use expr::{
    free_variable, referenced_variables, DefaultEvaluator, EmptyScope, EvalError, Evaluator,
    Scope,
};
pub use two_way::{SequentialMap, TwoWayMap};
pub use error::{MatchError, SessionError, TransformationError};
pub use ingredient::{Ingredient, IngredientList};
pub use criterion::{
    port_criterion_ids, Criterion, PortCriterion, GUARD_ATTRIBUTE, PORT_TYPE_ATTRIBUTE,
};
pub use variables::{Iteration, IterationMode, Variable, VariableSnapshot, Variables};
pub use pattern::{Pattern, ATOMIC_MATCHER, COMPOSITE_MATCHER, STATE_MACHINE_MATCHER};
pub use match_result::MatchResult;
pub use operation::{Change, Operation, OperationContext};
pub use replacement::Replacement;
pub use rule::TransformationRule;
pub use config::{ConfigError, GraftConfig, MatchConfig, TransformConfig};
pub use matcher::{CollectMatches, GraphMatcher, MatchCallback};
pub use transform::{GraphTransformer, TransformReport, WIDTH_ATTRIBUTE};
pub use session::TransformSession;
