//! The abstract query: a filter over statements.

use serde::{Deserialize, Serialize};

use super::{Entity, EntityKind, Rank, Snak, SnakMask, Statement, Value};
use crate::{Error, Result};

/// Constraint on one filter slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    /// No constraint.
    #[default]
    Any,
    /// Exactly this value (quantity and time match field-wise).
    Is(Value),
    /// Any of these values. Produced by composite resolution, or given
    /// directly by callers.
    OneOf(Vec<Value>),
    /// The entity in this slot must itself be the subject of a value
    /// statement for every `(property, value)` conjunct.
    Composite(Vec<(Entity, Value)>),
}

impl Selector {
    /// `entityWith(property = value)`.
    pub fn with(property: Entity, value: impl Into<Value>) -> Self {
        Selector::Composite(vec![(property, value.into())])
    }

    /// Add a conjunct. Turns `Any` into a one-conjunct composite; any other
    /// non-composite selector is left as is.
    pub fn and(self, property: Entity, value: impl Into<Value>) -> Self {
        match self {
            Selector::Composite(mut conjuncts) => {
                conjuncts.push((property, value.into()));
                Selector::Composite(conjuncts)
            }
            Selector::Any => Selector::with(property, value),
            other => other,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Selector::Any)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Selector::Composite(_))
    }

    /// Whether `candidate` satisfies this selector.
    ///
    /// An unresolved composite cannot be decided in memory and never
    /// matches; stores resolve composites into `OneOf` before checking.
    pub fn matches(&self, candidate: &Value) -> bool {
        match self {
            Selector::Any => true,
            Selector::Is(v) => v.matches(candidate),
            Selector::OneOf(vs) => vs.iter().any(|v| v.matches(candidate)),
            Selector::Composite(_) => false,
        }
    }

    /// Values the selector pins the slot to, if any.
    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Selector::Is(v) => Some(std::slice::from_ref(v)),
            Selector::OneOf(vs) => Some(vs),
            _ => None,
        }
    }
}

impl From<Value> for Selector {
    fn from(v: Value) -> Self {
        Selector::Is(v)
    }
}

impl From<Entity> for Selector {
    fn from(e: Entity) -> Self {
        Selector::Is(Value::Entity(e))
    }
}

/// Which slot of a filter a selector sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Subject,
    Property,
    Value,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Subject => "subject",
            Slot::Property => "property",
            Slot::Value => "value",
        }
    }
}

/// An abstract query over statements.
///
/// Equality ignores `rank`: rank constraints are applied by the store
/// after fetching and do not change which native queries a filter
/// compiles to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub subject: Selector,
    pub property: Selector,
    pub value: Selector,
    pub snak_mask: SnakMask,
    pub rank: Option<Rank>,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.property == other.property
            && self.value == other.value
            && self.snak_mask == other.snak_mask
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, s: impl Into<Selector>) -> Self {
        self.subject = s.into();
        self
    }

    pub fn property(mut self, p: impl Into<Selector>) -> Self {
        self.property = p.into();
        self
    }

    pub fn value(mut self, v: impl Into<Selector>) -> Self {
        self.value = v.into();
        self
    }

    pub fn snak_mask(mut self, mask: SnakMask) -> Self {
        self.snak_mask = mask;
        self
    }

    pub fn rank(mut self, rank: Rank) -> Self {
        self.rank = Some(rank);
        self
    }

    /// The filter that selects exactly `stmt`'s subject, property and snak.
    pub fn for_statement(stmt: &Statement) -> Self {
        let base = Filter::new()
            .subject(stmt.subject.clone())
            .property(stmt.property().clone());
        match &stmt.snak {
            Snak::Value { value, .. } => base.value(value.clone()).snak_mask(SnakMask::VALUE_SNAK),
            Snak::SomeValue { .. } => base.snak_mask(SnakMask::SOME_VALUE_SNAK),
            Snak::NoValue { .. } => base.snak_mask(SnakMask::NO_VALUE_SNAK),
        }
    }

    pub fn selector(&self, slot: Slot) -> &Selector {
        match slot {
            Slot::Subject => &self.subject,
            Slot::Property => &self.property,
            Slot::Value => &self.value,
        }
    }

    pub fn selector_mut(&mut self, slot: Slot) -> &mut Selector {
        match slot {
            Slot::Subject => &mut self.subject,
            Slot::Property => &mut self.property,
            Slot::Value => &mut self.value,
        }
    }

    pub fn has_composite(&self) -> bool {
        self.subject.is_composite() || self.property.is_composite() || self.value.is_composite()
    }

    /// True when the filter provably matches nothing: an empty snak mask,
    /// an empty `OneOf`, or a value constraint with value snaks masked out.
    pub fn is_empty(&self) -> bool {
        let empty_set = |s: &Selector| matches!(s, Selector::OneOf(vs) if vs.is_empty());
        self.snak_mask.is_empty()
            || empty_set(&self.subject)
            || empty_set(&self.property)
            || empty_set(&self.value)
            || (!self.value.is_any() && !self.snak_mask.contains(SnakMask::VALUE_SNAK))
    }

    /// Check slot variants. Stores call this before doing anything else,
    /// so malformed filters fail at the call.
    pub fn validate(&self) -> Result<()> {
        check_entities(&self.subject, Slot::Subject, None)?;
        check_entities(&self.property, Slot::Property, Some(EntityKind::Property))?;
        if let Selector::Composite(conjuncts) = &self.value {
            check_conjuncts(conjuncts, Slot::Value)?;
        }
        Ok(())
    }

    /// In-memory check of a candidate statement with the rank its source
    /// attributed to it. This is the late-filter predicate.
    pub fn matches(&self, stmt: &Statement, rank: Rank) -> bool {
        if let Some(r) = self.rank {
            if r != rank {
                return false;
            }
        }
        if !self.snak_mask.accepts(stmt.snak.kind()) {
            return false;
        }
        if !self.subject.matches(&Value::Entity(stmt.subject.clone())) {
            return false;
        }
        if !self.property.matches(&Value::Entity(stmt.property().clone())) {
            return false;
        }
        match &stmt.snak {
            Snak::Value { value, .. } => self.value.matches(value),
            Snak::SomeValue { .. } | Snak::NoValue { .. } => self.value.is_any(),
        }
    }
}

fn check_entities(selector: &Selector, slot: Slot, kind: Option<EntityKind>) -> Result<()> {
    match selector {
        Selector::Any => Ok(()),
        Selector::Is(_) | Selector::OneOf(_) => {
            for v in selector.values().unwrap_or_default() {
                let entity = v.as_entity().ok_or_else(|| {
                    Error::Argument(format!("{} must be an entity, got {}", slot.name(), v.type_name()))
                })?;
                if let Some(kind) = kind {
                    if entity.kind() != kind {
                        return Err(Error::Argument(format!(
                            "{} must be a {}, got {}",
                            slot.name(),
                            kind.name(),
                            entity
                        )));
                    }
                }
            }
            Ok(())
        }
        Selector::Composite(conjuncts) => check_conjuncts(conjuncts, slot),
    }
}

fn check_conjuncts(conjuncts: &[(Entity, Value)], slot: Slot) -> Result<()> {
    if conjuncts.is_empty() {
        return Err(Error::Argument(format!("empty composite selector in {}", slot.name())));
    }
    for (property, _) in conjuncts {
        if !property.is_property() {
            return Err(Error::Argument(format!(
                "composite conjunct in {} needs a property, got {property}",
                slot.name()
            )));
        }
    }
    Ok(())
}
