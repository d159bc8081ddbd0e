// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered ingredient lists attached to pattern and replacement elements.
//!
//! Criteria and operations are both stored as an [`IngredientList`]: an
//! ordered list evaluated front to back, addressable by index or by label
//! (`criterion1`, `operation3`, ... one-based), with a JSON structural encoding.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Kind of entry an [`IngredientList`] holds.
pub trait Ingredient {
    /// Prefix of generated labels (`"criterion"` yields `criterion1`, ...).
    const LABEL_PREFIX: &'static str;
}

/// Ordered list of criteria or operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientList<T> {
    items: Vec<T>,
}

impl<T> Default for IngredientList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> From<Vec<T>> for IngredientList<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for IngredientList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T: Ingredient> IngredientList<T> {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its index.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Entries as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Entry at `index`.
    ///
    /// Indices arrive from callers and encodings as signed integers; negative
    /// or out-of-range values are reported as
    /// [`MatchError::InvalidIngredientIndex`].
    pub fn get(&self, index: i64) -> Result<&T, MatchError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.items.get(i))
            .ok_or(MatchError::InvalidIngredientIndex {
                element: None,
                index,
                len: self.items.len(),
            })
    }

    /// Generated label for the entry at `index`.
    pub fn label(index: usize) -> String {
        format!("{}{}", T::LABEL_PREFIX, index + 1)
    }

    /// Index and entry carrying `label`.
    pub fn by_label(&self, label: &str) -> Option<(usize, &T)> {
        let n: usize = label.strip_prefix(T::LABEL_PREFIX)?.parse().ok()?;
        let index = n.checked_sub(1)?;
        self.items.get(index).map(|item| (index, item))
    }
}

impl<T: Ingredient + Serialize> IngredientList<T> {
    /// Structural encoding (JSON array).
    pub fn encode(&self) -> Result<String, MatchError> {
        serde_json::to_string(&self.items).map_err(|e| MatchError::malformed(None, e.to_string()))
    }
}

impl<T: Ingredient + DeserializeOwned> IngredientList<T> {
    /// Parses a structural encoding produced by [`encode`](Self::encode).
    pub fn decode(text: &str) -> Result<Self, MatchError> {
        serde_json::from_str(text).map_err(|e| MatchError::malformed(None, e.to_string()))
    }
}

impl<'a, T> IntoIterator for &'a IngredientList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::criterion::Criterion;

    #[test]
    fn negative_and_out_of_range_indices_are_rejected() {
        let list: IngredientList<Criterion> = vec![Criterion::subclass("Source")].into();
        assert!(list.get(0).is_ok());
        for bad in [-1, 1, i64::MIN] {
            let err = list.get(bad).unwrap_err();
            assert!(matches!(
                err,
                MatchError::InvalidIngredientIndex { index, len: 1, .. } if index == bad
            ));
        }
    }

    #[test]
    fn labels_are_one_based() {
        let list: IngredientList<Criterion> =
            vec![Criterion::subclass("A"), Criterion::subclass("B")].into();
        assert_eq!(IngredientList::<Criterion>::label(1), "criterion2");
        let (i, c) = list.by_label("criterion2").unwrap();
        assert_eq!(i, 1);
        assert_eq!(c, &Criterion::subclass("B"));
        assert!(list.by_label("criterion0").is_none());
        assert!(list.by_label("operation1").is_none());
    }

    #[test]
    fn undecodable_text_is_a_malformed_criterion() {
        let err = IngredientList::<Criterion>::decode("[{\"kind\":\"nope\"}]").unwrap_err();
        assert!(matches!(err, MatchError::MalformedCriterion { .. }));
        let list: IngredientList<Criterion> = vec![Criterion::attribute("value", "5")].into();
        let back = IngredientList::<Criterion>::decode(&list.encode().unwrap()).unwrap();
        assert_eq!(back, list);
    }
}
