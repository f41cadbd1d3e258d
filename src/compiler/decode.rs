//! Rows back into statements.
//!
//! Decoding is two-phase: [`decode_row`] produces a [`Decoded`] whose
//! value may still be an untyped plain literal, and the caller settles
//! those with [`Decoded::finish`] once it knows whether the property is
//! an external-identifier property.

use crate::model::{parse_date, Decimal, Entity, Quantity, Rank, Snak, Statement, Text, Time, TimePrecision, Value};
use crate::native::{Row, Term};
use crate::vocab::{ns, Vocabulary};

use super::rules::vars::*;
use super::Fragment;

/// How a fragment's rows map to snaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// `?value` is the main value, or a blank node for some-value.
    Simple,
    /// `?amount` plus optional unit and bounds.
    Quantity,
    /// `?time` plus optional precision, timezone and calendar.
    Time,
    /// No-value statements; the row carries no value.
    NoValue,
}

/// A decoded value, with plain literals left open.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Value(Value),
    /// Untagged string: `Text` or `ExternalId` depending on the property.
    Plain(String),
    SomeValue,
    NoValue,
}

/// A statement as read from one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub subject: Entity,
    pub property: Entity,
    pub value: RawValue,
    pub rank: Rank,
    pub node: Option<Term>,
}

impl Decoded {
    /// Property whose type must be known before [`finish`](Self::finish).
    pub fn pending_property(&self) -> Option<&Entity> {
        matches!(self.value, RawValue::Plain(_)).then_some(&self.property)
    }

    pub fn finish(self, external_id: bool) -> Candidate {
        let snak = snak_of(self.property, self.value, external_id);
        Candidate { statement: Statement::new(self.subject, snak), rank: self.rank, node: self.node }
    }
}

/// A statement produced by a backend, with the rank its source gives it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub statement: Statement,
    pub rank: Rank,
    /// Statement node the annotations hang off, when reified.
    pub node: Option<Term>,
}

impl Candidate {
    pub fn new(statement: Statement, rank: Rank) -> Self {
        Self { statement, rank, node: None }
    }
}

/// Build a snak from a decoded value.
pub fn snak_of(property: Entity, value: RawValue, external_id: bool) -> Snak {
    match value {
        RawValue::Value(v) => Snak::value(property, v),
        RawValue::Plain(s) if external_id => Snak::value(property, Value::ExternalId(s)),
        RawValue::Plain(s) => Snak::value(property, Text::untagged(s)),
        RawValue::SomeValue => Snak::some_value(property),
        RawValue::NoValue => Snak::no_value(property),
    }
}

/// Read a term as a simple value.
pub fn term_value(term: &Term, vocab: &Vocabulary) -> Option<RawValue> {
    Some(match term {
        Term::Iri(iri) => RawValue::Value(Value::Entity(vocab.entity(iri))),
        Term::Blank(_) => RawValue::SomeValue,
        Term::Literal(lit) => {
            if let Some(lang) = &lit.language {
                return Some(RawValue::Value(Value::Text(Text::new(lit.lexical.as_str(), lang.as_str()))));
            }
            match lit.datatype.as_deref() {
                Some(ns::XSD_DECIMAL) | Some(ns::XSD_INTEGER) => {
                    RawValue::Value(Value::Quantity(Quantity::new(lit.lexical.parse().ok()?)))
                }
                Some(ns::XSD_DATE_TIME) => RawValue::Value(Value::Time(Time::new(parse_date(&lit.lexical)?))),
                _ => RawValue::Plain(lit.lexical.clone()),
            }
        }
    })
}

/// Decode one row of `fragment`. Rows that do not describe a statement
/// (blank subjects, malformed literals) decode to `None`.
pub fn decode_row(fragment: &Fragment, row: &Row, vocab: &Vocabulary) -> Option<Decoded> {
    let subject = match &fragment.subject {
        Some(s) => s.clone(),
        None => vocab.entity(row.get(SUBJECT)?.as_iri()?),
    };
    let property = match &fragment.property {
        Some(p) => p.clone(),
        None => match row.get(PROPERTY)? {
            Term::Literal(local) => vocab.property(&local.lexical),
            Term::Iri(iri) => Entity::property(iri.as_str()),
            Term::Blank(_) => return None,
        },
    };
    let value = match fragment.decoder {
        Decoder::Simple => term_value(row.get(VALUE)?, vocab)?,
        Decoder::NoValue => RawValue::NoValue,
        Decoder::Quantity => RawValue::Value(Value::Quantity(quantity(row, vocab)?)),
        Decoder::Time => RawValue::Value(Value::Time(time(row, vocab)?)),
    };
    let rank = row
        .get(RANK)
        .and_then(Term::as_iri)
        .and_then(Vocabulary::rank_from_iri)
        .unwrap_or(fragment.rank);
    Some(Decoded { subject, property, value, rank, node: row.get(STMT).cloned() })
}

/// Read a value node's fields, bound under the quantity or time
/// variables, as a full value.
pub fn value_node(row: &Row, vocab: &Vocabulary) -> Option<Value> {
    if row.is_bound(AMOUNT) {
        quantity(row, vocab).map(Value::Quantity)
    } else {
        time(row, vocab).map(Value::Time)
    }
}

fn decimal(term: Option<&Term>) -> Option<Option<Decimal>> {
    match term {
        None => Some(None),
        Some(t) => t.as_literal()?.lexical.parse().ok().map(Some),
    }
}

fn integer<T: std::str::FromStr>(term: Option<&Term>) -> Option<T> {
    term?.as_literal()?.lexical.trim_start_matches('+').parse().ok()
}

fn quantity(row: &Row, vocab: &Vocabulary) -> Option<Quantity> {
    let amount = decimal(row.get(AMOUNT))??;
    let mut q = Quantity::new(amount);
    q.unit = row.get(UNIT).and_then(Term::as_iri).map(|iri| vocab.entity(iri));
    q.lower_bound = decimal(row.get(LOWER))?;
    q.upper_bound = decimal(row.get(UPPER))?;
    Some(q)
}

fn time(row: &Row, vocab: &Vocabulary) -> Option<Time> {
    let date = parse_date(&row.get(TIME)?.as_literal()?.lexical)?;
    let mut t = Time::new(date);
    t.precision = integer::<u8>(row.get(PRECISION)).and_then(TimePrecision::from_code);
    t.timezone = integer::<i16>(row.get(TIMEZONE));
    t.calendar = row.get(CALENDAR).and_then(Term::as_iri).map(|iri| vocab.entity(iri));
    Some(t)
}
