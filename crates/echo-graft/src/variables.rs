// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pattern variables ("value iterators").
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// When an iterative variable stops advancing to its next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationMode {
    /// Try every value.
    #[default]
    AllValues,
    /// Stop after the first value that produced a match.
    StopWhenMatch,
    /// Stop after the first value that produced no match.
    StopWhenNotMatch,
}

/// Value sequence of an iterative variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    /// Values tried in order.
    pub values: Vec<Value>,
    /// Stop policy.
    pub mode: IterationMode,
}

impl Iteration {
    /// Iteration over `values` with `mode`.
    pub fn new(values: impl IntoIterator<Item = Value>, mode: IterationMode) -> Self {
        Self {
            values: values.into_iter().collect(),
            mode,
        }
    }
}

/// One declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Name referenced as `$name` in criteria and operations.
    pub name: String,
    /// Current value; `None` leaves the variable free for binding.
    pub value: Option<Value>,
    /// Value sequence, for iterative variables.
    pub iteration: Option<Iteration>,
}

/// Current values of every variable, in declaration order.
pub type VariableSnapshot = Vec<Option<Value>>;

/// Declared variables of a pattern, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    entries: Vec<Variable>,
}

impl Variables {
    /// No variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares (or redeclares) `name` with an optional fixed value.
    pub fn declare(&mut self, name: impl Into<String>, value: Option<Value>) {
        self.upsert(Variable {
            name: name.into(),
            value,
            iteration: None,
        });
    }

    /// Declares an iterative variable; it starts free.
    pub fn declare_iterative(&mut self, name: impl Into<String>, iteration: Iteration) {
        self.upsert(Variable {
            name: name.into(),
            value: None,
            iteration: Some(iteration),
        });
    }

    fn upsert(&mut self, var: Variable) {
        match self.entries.iter_mut().find(|v| v.name == var.name) {
            Some(slot) => *slot = var,
            None => self.entries.push(var),
        }
    }

    /// Declared variable `name`.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.entries.iter().find(|v| v.name == name)
    }

    /// Current value of `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|v| v.value.as_ref())
    }

    /// Sets the current value of a declared variable; returns false when the
    /// variable is unknown.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> bool {
        match self.entries.iter_mut().find(|v| v.name == name) {
            Some(var) => {
                var.value = value;
                true
            }
            None => false,
        }
    }

    /// Variables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.entries.iter()
    }

    /// Iterative variables in declaration order.
    pub fn iterative(&self) -> impl Iterator<Item = (&str, &Iteration)> + '_ {
        self.entries
            .iter()
            .filter_map(|v| v.iteration.as_ref().map(|it| (v.name.as_str(), it)))
    }

    /// Number of declared variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current values, for [`restore`](Self::restore).
    pub fn snapshot(&self) -> VariableSnapshot {
        self.entries.iter().map(|v| v.value.clone()).collect()
    }

    /// Reinstates values captured by [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: VariableSnapshot) {
        for (var, value) in self.entries.iter_mut().zip(snapshot) {
            var.value = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_restores_values() {
        let mut vars = Variables::new();
        vars.declare("a", Some(Value::Int(1)));
        vars.declare_iterative("b", Iteration::new([Value::Int(1)], IterationMode::AllValues));
        let snap = vars.snapshot();
        assert!(vars.set("a", None));
        assert!(vars.set("b", Some(Value::Int(9))));
        assert!(!vars.set("c", None));
        vars.restore(snap);
        assert_eq!(vars.value("a"), Some(&Value::Int(1)));
        assert_eq!(vars.value("b"), None);
        assert_eq!(vars.iterative().count(), 1);
    }
}
