//! Statements and ranks.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Entity, Snak};

/// Statement rank. The derived order is the best-rank order:
/// `Deprecated < Normal < Preferred`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    Deprecated,
    #[default]
    Normal,
    Preferred,
}

/// A subject entity plus a snak. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Entity,
    pub snak: Snak,
}

impl Statement {
    pub fn new(subject: Entity, snak: Snak) -> Self {
        Self { subject, snak }
    }

    pub fn property(&self) -> &Entity {
        self.snak.property()
    }

    /// The (subject, property) key that best-rank reduction groups by.
    pub fn rank_key(&self) -> (&Entity, &Entity) {
        (&self.subject, self.snak.property())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Statement({}, {})", self.subject, self.snak)
    }
}
