//! Snaks: a property paired with a value, or with an explicit
//! "some value" / "no value" marker.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

use super::{Entity, Value};

/// The three snak kinds, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnakKind {
    Value,
    SomeValue,
    NoValue,
}

impl SnakKind {
    pub fn mask(self) -> SnakMask {
        match self {
            SnakKind::Value => SnakMask::VALUE_SNAK,
            SnakKind::SomeValue => SnakMask::SOME_VALUE_SNAK,
            SnakKind::NoValue => SnakMask::NO_VALUE_SNAK,
        }
    }
}

/// A (property, value-or-kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "snak")]
pub enum Snak {
    Value { property: Entity, value: Value },
    SomeValue { property: Entity },
    NoValue { property: Entity },
}

impl Snak {
    pub fn value(property: Entity, value: impl Into<Value>) -> Self {
        Snak::Value { property, value: value.into() }
    }

    pub fn some_value(property: Entity) -> Self {
        Snak::SomeValue { property }
    }

    pub fn no_value(property: Entity) -> Self {
        Snak::NoValue { property }
    }

    pub fn property(&self) -> &Entity {
        match self {
            Snak::Value { property, .. }
            | Snak::SomeValue { property }
            | Snak::NoValue { property } => property,
        }
    }

    pub fn kind(&self) -> SnakKind {
        match self {
            Snak::Value { .. } => SnakKind::Value,
            Snak::SomeValue { .. } => SnakKind::SomeValue,
            Snak::NoValue { .. } => SnakKind::NoValue,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Snak::Value { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Snak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snak::Value { property, value } => write!(f, "ValueSnak({property}, {value})"),
            Snak::SomeValue { property } => write!(f, "SomeValueSnak({property})"),
            Snak::NoValue { property } => write!(f, "NoValueSnak({property})"),
        }
    }
}

// ============================================================================
// SnakMask
// ============================================================================

/// Bitset of accepted snak kinds. Defaults to all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnakMask(u8);

impl SnakMask {
    pub const VALUE_SNAK: SnakMask = SnakMask(1);
    pub const SOME_VALUE_SNAK: SnakMask = SnakMask(1 << 1);
    pub const NO_VALUE_SNAK: SnakMask = SnakMask(1 << 2);
    pub const ALL: SnakMask = SnakMask(0b111);
    pub const NONE: SnakMask = SnakMask(0);

    pub fn contains(self, other: SnakMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn accepts(self, kind: SnakKind) -> bool {
        self.contains(kind.mask())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for SnakMask {
    fn default() -> Self {
        SnakMask::ALL
    }
}

impl BitOr for SnakMask {
    type Output = SnakMask;
    fn bitor(self, rhs: SnakMask) -> SnakMask {
        SnakMask(self.0 | rhs.0)
    }
}

impl BitAnd for SnakMask {
    type Output = SnakMask;
    fn bitand(self, rhs: SnakMask) -> SnakMask {
        SnakMask(self.0 & rhs.0)
    }
}
