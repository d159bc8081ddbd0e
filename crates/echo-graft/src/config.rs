// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine configuration, loadable from JSON.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or saving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON text is malformed or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Match engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Upper bound on candidate bindings tried per search; `None` is unbounded.
    pub max_steps: Option<u64>,
    /// Memoise verdicts of variable-free criteria per (pattern, host) pair.
    pub predicate_cache: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            predicate_cache: true,
        }
    }
}

/// Replacement engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Collapse relation chains after a rewrite unless the replacement
    /// overrides it.
    pub relation_hiding: bool,
    /// Place a routing vertex on relations with more than two links.
    pub routing_vertices: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            relation_hiding: true,
            routing_vertices: true,
        }
    }
}

/// Whole-engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraftConfig {
    /// Matching section.
    pub matching: MatchConfig,
    /// Transformation section.
    pub transform: TransformConfig,
}

impl GraftConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
