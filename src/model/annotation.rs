//! Statement annotations: qualifiers, references and rank.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Rank, Snak};

/// Insertion-ordered collection without duplicates.
///
/// Two sets are equal when they hold the same elements, whatever the order
/// they were inserted in.
#[derive(Debug, Clone)]
pub struct OrderedSet<T> {
    items: Vec<T>,
}

impl<T: PartialEq> OrderedSet<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Insert `item` unless an equal element is present. Returns whether
    /// it was inserted.
    pub fn insert(&mut self, item: T) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Append every element of `other` not already present, keeping order.
    pub fn union_with(&mut self, other: impl IntoIterator<Item = T>) {
        for item in other {
            self.insert(item);
        }
    }
}

impl<T: PartialEq> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for OrderedSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.items.iter().all(|i| other.items.contains(i))
    }
}

impl<T: Eq> Eq for OrderedSet<T> {}

impl<T: PartialEq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.union_with(iter);
        set
    }
}

impl<T> IntoIterator for OrderedSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for OrderedSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

impl<'de, T: Deserialize<'de> + PartialEq> Deserialize<'de> for OrderedSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(|items| items.into_iter().collect())
    }
}

/// Ordered set of qualifier snaks.
pub type SnakSet = OrderedSet<Snak>;

/// A reference record is itself an ordered set of snaks.
pub type ReferenceRecord = SnakSet;

pub type ReferenceRecordSet = OrderedSet<ReferenceRecord>;

/// Qualifiers, references and rank recorded for one statement occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub qualifiers: SnakSet,
    pub references: ReferenceRecordSet,
    pub rank: Rank,
}

impl AnnotationRecord {
    pub fn new(qualifiers: SnakSet, references: ReferenceRecordSet, rank: Rank) -> Self {
        Self { qualifiers, references, rank }
    }
}

pub type AnnotationRecordSet = OrderedSet<AnnotationRecord>;
