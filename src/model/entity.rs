//! Entities: items, properties and lexemes identified by an IRI.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Which kind of entity an identifier denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Item,
    Property,
    Lexeme,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Item => "Item",
            EntityKind::Property => "Property",
            EntityKind::Lexeme => "Lexeme",
        }
    }
}

/// An entity reference.
///
/// Equality and hashing look at the identifier only: the kind is a tag
/// derived from where the identifier was found, not part of its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    kind: EntityKind,
    iri: String,
}

impl Entity {
    pub fn new(kind: EntityKind, iri: impl Into<String>) -> Self {
        Self { kind, iri: iri.into() }
    }

    pub fn item(iri: impl Into<String>) -> Self {
        Self::new(EntityKind::Item, iri)
    }

    pub fn property(iri: impl Into<String>) -> Self {
        Self::new(EntityKind::Property, iri)
    }

    pub fn lexeme(iri: impl Into<String>) -> Self {
        Self::new(EntityKind::Lexeme, iri)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn iri(&self) -> &str {
        &self.iri
    }

    pub fn is_property(&self) -> bool {
        self.kind == EntityKind::Property
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.iri == other.iri
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.iri.hash(state);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<{}>)", self.kind.name(), self.iri)
    }
}
