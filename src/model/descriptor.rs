//! Entity descriptors (label, aliases, description) and their merge rule.

use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

use super::Text;

/// Bitset selecting descriptor fields. Defaults to all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorMask(u8);

impl DescriptorMask {
    pub const LABEL: DescriptorMask = DescriptorMask(1);
    pub const ALIASES: DescriptorMask = DescriptorMask(1 << 1);
    pub const DESCRIPTION: DescriptorMask = DescriptorMask(1 << 2);
    pub const ALL: DescriptorMask = DescriptorMask(0b111);
    pub const NONE: DescriptorMask = DescriptorMask(0);

    pub fn contains(self, other: DescriptorMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for DescriptorMask {
    fn default() -> Self {
        DescriptorMask::ALL
    }
}

impl BitOr for DescriptorMask {
    type Output = DescriptorMask;
    fn bitor(self, rhs: DescriptorMask) -> DescriptorMask {
        DescriptorMask(self.0 | rhs.0)
    }
}

impl BitAnd for DescriptorMask {
    type Output = DescriptorMask;
    fn bitand(self, rhs: DescriptorMask) -> DescriptorMask {
        DescriptorMask(self.0 & rhs.0)
    }
}

/// Label, aliases and description of an entity in one language.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Descriptor {
    pub label: Option<Text>,
    pub aliases: Vec<Text>,
    pub description: Option<Text>,
}

impl Descriptor {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.aliases.is_empty() && self.description.is_none()
    }

    /// Drop every field not selected by `mask`.
    pub fn masked(mut self, mask: DescriptorMask) -> Self {
        if !mask.contains(DescriptorMask::LABEL) {
            self.label = None;
        }
        if !mask.contains(DescriptorMask::ALIASES) {
            self.aliases.clear();
        }
        if !mask.contains(DescriptorMask::DESCRIPTION) {
            self.description = None;
        }
        self
    }

    /// Add an alias unless one with the same normalized text and language
    /// is already present.
    pub fn push_alias(&mut self, alias: Text) {
        let key = alias_key(&alias);
        if !self.aliases.iter().any(|a| alias_key(a) == key) {
            self.aliases.push(alias);
        }
    }

    /// Merge a descriptor from a later source: label and description keep
    /// the first value seen, aliases accumulate in order.
    pub fn merge(&mut self, later: Descriptor) {
        if self.label.is_none() {
            self.label = later.label;
        }
        if self.description.is_none() {
            self.description = later.description;
        }
        for alias in later.aliases {
            self.push_alias(alias);
        }
    }
}

/// Merge descriptors in source order. Absent when every input is absent.
pub fn merge_descriptors(
    descriptors: impl IntoIterator<Item = Option<Descriptor>>,
    mask: DescriptorMask,
) -> Option<Descriptor> {
    let mut merged: Option<Descriptor> = None;
    for desc in descriptors.into_iter().flatten() {
        match merged.as_mut() {
            Some(m) => m.merge(desc),
            None => {
                let mut first = Descriptor::default();
                first.merge(desc);
                merged = Some(first);
            }
        }
    }
    merged.map(|d| d.masked(mask)).filter(|d| !d.is_empty())
}

/// Alias identity: whitespace-collapsed content plus language.
fn alias_key(text: &Text) -> (String, Option<&str>) {
    let content = text.content.split_whitespace().collect::<Vec<_>>().join(" ");
    (content, text.language.as_deref())
}
