//! Field definitions and the [`FieldSet`] bitset.

use crate::id::FieldId;

/// Classification of a field's per-cell layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// One value per cell.
    Scalar,
    /// A fixed number of components per cell, stored cell-major.
    Vector {
        /// Number of components (e.g. `1 + n_traps` for the concentration vector).
        dims: u32,
    },
}

impl FieldType {
    /// Number of `f64` slots this field type requires per cell.
    pub fn components(&self) -> u32 {
        match self {
            Self::Scalar => 1,
            Self::Vector { dims } => *dims,
        }
    }
}

/// Definition of a field registered at setup.
///
/// `FieldId(n)` is the index of the definition in the layout.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    /// Name used in logs, exports, and the output bundle.
    pub name: String,
    /// Per-cell layout.
    pub field_type: FieldType,
    /// Optional unit annotation (e.g. `"K"`, `"m-3"`).
    pub units: Option<String>,
}

impl FieldDef {
    /// A scalar field.
    pub fn scalar(name: impl Into<String>, units: Option<&str>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Scalar,
            units: units.map(str::to_string),
        }
    }

    /// A vector field with `dims` components per cell.
    pub fn vector(name: impl Into<String>, dims: u32, units: Option<&str>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Vector { dims },
            units: units.map(str::to_string),
        }
    }

    /// Total storage length for a mesh with `cell_count` cells.
    pub fn storage_len(&self, cell_count: usize) -> usize {
        cell_count * self.field_type.components() as usize
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("field name must not be empty".to_string());
        }
        if self.field_type.components() == 0 {
            return Err(format!("field '{}' has zero components", self.name));
        }
        Ok(())
    }
}

/// A set of field IDs stored as a growable bitset.
///
/// Stages declare the fields they read and write with a `FieldSet`; the
/// pipeline validator uses these declarations to check the stage list
/// and to route reads.
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    words: Vec<u64>,
}

impl FieldSet {
    const WORD: usize = 64;

    /// Create an empty field set.
    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    fn locate(field: FieldId) -> (usize, u64) {
        let idx = field.0 as usize;
        (idx / Self::WORD, 1u64 << (idx % Self::WORD))
    }

    /// Insert a field ID into the set.
    pub fn insert(&mut self, field: FieldId) {
        let (word, mask) = Self::locate(field);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask;
    }

    /// Check whether the set contains a field ID.
    pub fn contains(&self, field: FieldId) -> bool {
        let (word, mask) = Self::locate(field);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Return the union of two sets.
    pub fn union(&self, other: &Self) -> Self {
        let len = self.words.len().max(other.words.len());
        let words = (0..len)
            .map(|i| self.word(i) | other.word(i))
            .collect();
        Self { words }
    }

    /// Return the elements of `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let words = (0..self.words.len())
            .map(|i| self.word(i) & !other.word(i))
            .collect();
        Self { words }
    }

    /// Check whether every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        (0..self.words.len()).all(|i| self.word(i) & !other.word(i) == 0)
    }

    /// Returns `true` if the set contains no fields.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of fields in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the field IDs in ascending order.
    pub fn iter(&self) -> FieldSetIter<'_> {
        FieldSetIter {
            words: &self.words,
            position: 0,
        }
    }

    fn word(&self, i: usize) -> u64 {
        self.words.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| self.word(i) == other.word(i))
    }
}

impl Eq for FieldSet {}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = FieldId;
    type IntoIter = FieldSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the IDs in a [`FieldSet`], ascending.
pub struct FieldSetIter<'a> {
    words: &'a [u64],
    position: usize,
}

impl Iterator for FieldSetIter<'_> {
    type Item = FieldId;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.words.len() * FieldSet::WORD;
        while self.position < total {
            let pos = self.position;
            self.position += 1;
            let word = self.words[pos / FieldSet::WORD];
            if word & (1u64 << (pos % FieldSet::WORD)) != 0 {
                return Some(FieldId(pos as u32));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_field_set() -> impl Strategy<Value = FieldSet> {
        prop::collection::vec(0u32..160, 0..24)
            .prop_map(|ids| ids.into_iter().map(FieldId).collect::<FieldSet>())
    }

    #[test]
    fn vector_storage_is_cell_major() {
        let def = FieldDef::vector("concentration", 3, None);
        assert_eq!(def.storage_len(10), 30);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn zero_component_vector_rejected() {
        let def = FieldDef::vector("broken", 0, None);
        assert!(def.validate().is_err());
    }

    #[test]
    fn trailing_zero_words_do_not_affect_equality() {
        let mut a = FieldSet::empty();
        a.insert(FieldId(100));
        let b: FieldSet = [FieldId(3)].into_iter().collect();
        let c: FieldSet = [FieldId(3)].into_iter().collect();
        assert_eq!(b, c);
        assert_eq!(a.difference(&a), FieldSet::empty());
    }

    proptest! {
        #[test]
        fn union_commutative(a in arb_field_set(), b in arb_field_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
        }

        #[test]
        fn union_contains_both(a in arb_field_set(), b in arb_field_set()) {
            let u = a.union(&b);
            prop_assert!(a.is_subset(&u));
            prop_assert!(b.is_subset(&u));
        }

        #[test]
        fn difference_removes_common(a in arb_field_set(), b in arb_field_set()) {
            for field in a.difference(&b).iter() {
                prop_assert!(a.contains(field));
                prop_assert!(!b.contains(field));
            }
        }

        #[test]
        fn len_matches_iter_count(a in arb_field_set()) {
            prop_assert_eq!(a.len(), a.iter().count());
        }

        #[test]
        fn iteration_is_ascending(a in arb_field_set()) {
            let ids: Vec<u32> = a.iter().map(|f| f.0).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
