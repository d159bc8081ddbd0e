// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Result of one successful match.
use crate::ident::ElementId;
use crate::two_way::{SequentialMap, TwoWayMap};
use crate::value::Value;

/// Pattern element ↔ host element binding plus captured variable values.
///
/// Keys are elements of the pattern graph, values elements of the host
/// graph. Parameter bindings keep insertion order because later bindings may
/// depend on earlier ones when they are restored onto the pattern. Cloning
/// yields an independent copy; the replacement engine always works on one.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    map: TwoWayMap<ElementId, ElementId>,
    parameters: SequentialMap<String, Value>,
}

impl MatchResult {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `pattern` to `host`; returns the host element previously bound.
    pub fn put(&mut self, pattern: ElementId, host: ElementId) -> Option<ElementId> {
        self.map.put(pattern, host)
    }

    /// Host element bound to `pattern`.
    pub fn get(&self, pattern: ElementId) -> Option<ElementId> {
        self.map.get(&pattern)
    }

    /// Pattern element bound to `host`.
    pub fn get_key(&self, host: ElementId) -> Option<ElementId> {
        self.map.get_key(&host)
    }

    /// True when some pattern element is bound to `host`.
    pub fn is_host_bound(&self, host: ElementId) -> bool {
        self.map.contains_value(&host)
    }

    /// Unbinds `pattern`; returns its host element.
    pub fn remove(&mut self, pattern: ElementId) -> Option<ElementId> {
        self.map.remove(&pattern)
    }

    /// Number of bound pattern elements.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bound pairs, sorted by pattern element for stable iteration.
    pub fn pairs(&self) -> Vec<(ElementId, ElementId)> {
        let mut out: Vec<_> = self.map.iter().collect();
        out.sort_unstable();
        out
    }

    /// Variable bindings in insertion order.
    pub fn parameter_values(&self) -> &SequentialMap<String, Value> {
        &self.parameters
    }

    /// Value bound to variable `name`.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(&name.to_owned())
    }

    /// Records a variable binding.
    pub fn bind_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut SequentialMap<String, Value> {
        &mut self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{NodeId, PortId};

    #[test]
    fn clone_is_independent() {
        let mut a = MatchResult::new();
        a.put(NodeId(1).into(), NodeId(7).into());
        a.bind_parameter("x", Value::Int(3));
        let mut b = a.clone();
        b.put(PortId(0).into(), PortId(4).into());
        b.bind_parameter("y", Value::Int(9));
        b.remove(NodeId(1).into());
        assert_eq!(a.get(NodeId(1).into()), Some(NodeId(7).into()));
        assert_eq!(a.len(), 1);
        assert_eq!(a.parameter_values().len(), 1);
        assert_eq!(b.get_key(PortId(4).into()), Some(PortId(0).into()));
        assert_eq!(b.parameter("y"), Some(&Value::Int(9)));
    }
}
