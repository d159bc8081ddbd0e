// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transformation rules: a pattern paired with its replacement.
use crate::fragment::FragmentError;
use crate::pattern::Pattern;
use crate::replacement::Replacement;

/// Named rewrite rule.
#[derive(Debug, Clone)]
pub struct TransformationRule {
    name: String,
    pattern: Pattern,
    replacement: Replacement,
}

impl TransformationRule {
    /// Pairs a pattern with its replacement.
    pub fn new(name: impl Into<String>, pattern: Pattern, replacement: Replacement) -> Self {
        Self {
            name: name.into(),
            pattern,
            replacement,
        }
    }

    /// Rule whose replacement mirrors the pattern: applying it preserves
    /// every matched element.
    pub fn identity(name: impl Into<String>, pattern: Pattern) -> Result<Self, FragmentError> {
        let replacement = Replacement::mirror(&pattern)?;
        Ok(Self::new(name, pattern, replacement))
    }

    /// Rule name, used as the undo label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Left-hand side.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Mutable left-hand side.
    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }

    /// Right-hand side.
    pub fn replacement(&self) -> &Replacement {
        &self.replacement
    }

    /// Mutable right-hand side.
    pub fn replacement_mut(&mut self) -> &mut Replacement {
        &mut self.replacement
    }
}
