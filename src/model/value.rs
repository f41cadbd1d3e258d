//! Statement values and their matching predicate.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Decimal, Entity};

/// A statement value.
///
/// Values of different variants are never equal and never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Entity(Entity),
    Text(Text),
    ExternalId(String),
    Quantity(Quantity),
    Time(Time),
}

/// A string with an optional language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Text {
    pub content: String,
    pub language: Option<String>,
}

impl Text {
    pub fn new(content: impl Into<String>, language: impl Into<String>) -> Self {
        Self { content: content.into(), language: Some(language.into()) }
    }

    pub fn untagged(content: impl Into<String>) -> Self {
        Self { content: content.into(), language: None }
    }
}

/// A quantity: an exact amount with optional unit and bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: Decimal,
    pub unit: Option<Entity>,
    pub lower_bound: Option<Decimal>,
    pub upper_bound: Option<Decimal>,
}

impl Quantity {
    pub fn new(amount: Decimal) -> Self {
        Self { amount, unit: None, lower_bound: None, upper_bound: None }
    }

    pub fn with_unit(mut self, unit: Entity) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_bounds(mut self, lower: Decimal, upper: Decimal) -> Self {
        self.lower_bound = Some(lower);
        self.upper_bound = Some(upper);
        self
    }

    /// Field-wise wildcard match: every field set in `self` must equal the
    /// candidate's; unset fields impose nothing.
    pub fn matches(&self, candidate: &Quantity) -> bool {
        self.amount == candidate.amount
            && field_matches(&self.unit, &candidate.unit)
            && field_matches(&self.lower_bound, &candidate.lower_bound)
            && field_matches(&self.upper_bound, &candidate.upper_bound)
    }
}

/// Granularity of a time value. Codes follow the Wikibase data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimePrecision {
    BillionYears = 0,
    HundredMillionYears = 1,
    TenMillionYears = 2,
    MillionYears = 3,
    HundredThousandYears = 4,
    TenThousandYears = 5,
    Millennium = 6,
    Century = 7,
    Decade = 8,
    Year = 9,
    Month = 10,
    Day = 11,
    Hour = 12,
    Minute = 13,
    Second = 14,
}

impl TimePrecision {
    const ALL: [TimePrecision; 15] = [
        TimePrecision::BillionYears,
        TimePrecision::HundredMillionYears,
        TimePrecision::TenMillionYears,
        TimePrecision::MillionYears,
        TimePrecision::HundredThousandYears,
        TimePrecision::TenThousandYears,
        TimePrecision::Millennium,
        TimePrecision::Century,
        TimePrecision::Decade,
        TimePrecision::Year,
        TimePrecision::Month,
        TimePrecision::Day,
        TimePrecision::Hour,
        TimePrecision::Minute,
        TimePrecision::Second,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// A point in time with optional precision, timezone offset (minutes) and
/// calendar model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    pub date: NaiveDateTime,
    pub precision: Option<TimePrecision>,
    pub timezone: Option<i16>,
    pub calendar: Option<Entity>,
}

impl Time {
    pub fn new(date: NaiveDateTime) -> Self {
        Self { date, precision: None, timezone: None, calendar: None }
    }

    pub fn with_precision(mut self, precision: TimePrecision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_timezone(mut self, minutes: i16) -> Self {
        self.timezone = Some(minutes);
        self
    }

    pub fn with_calendar(mut self, calendar: Entity) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Field-wise wildcard match, see [`Quantity::matches`].
    pub fn matches(&self, candidate: &Time) -> bool {
        self.date == candidate.date
            && field_matches(&self.precision, &candidate.precision)
            && field_matches(&self.timezone, &candidate.timezone)
            && field_matches(&self.calendar, &candidate.calendar)
    }

    /// Lexical `xsd:dateTime` form of the date.
    pub fn lexical_date(&self) -> String {
        format_date(&self.date)
    }
}

/// Format a date as an `xsd:dateTime` literal in UTC.
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse an `xsd:dateTime`-like literal.
///
/// Accepts a leading `+`, a trailing `Z`, and Wikibase's `00` month/day
/// placeholders (normalized to `01`).
pub fn parse_date(lexical: &str) -> Option<NaiveDateTime> {
    let s = lexical.trim().trim_start_matches('+').trim_end_matches('Z');
    let (date, clock) = s.split_once('T').unwrap_or((s, "00:00:00"));
    let mut parts = date.rsplitn(3, '-');
    let day = parts.next()?;
    let month = parts.next()?;
    let year = parts.next()?;
    let fix = |p: &str| if p == "00" { "01".to_string() } else { p.to_string() };
    let normalized = format!("{year}-{}-{}T{clock}", fix(month), fix(day));
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S").ok()
}

fn field_matches<T: PartialEq>(pattern: &Option<T>, candidate: &Option<T>) -> bool {
    match pattern {
        None => true,
        Some(p) => candidate.as_ref() == Some(p),
    }
}

// ============================================================================
// Matching
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Entity(e) => e.kind().name(),
            Value::Text(_) => "Text",
            Value::ExternalId(_) => "ExternalId",
            Value::Quantity(_) => "Quantity",
            Value::Time(_) => "Time",
        }
    }

    /// Match `self`, used as a filter value, against a candidate.
    ///
    /// Quantity and time use field-wise wildcard matching; every other
    /// variant matches by equality.
    pub fn matches(&self, candidate: &Value) -> bool {
        match (self, candidate) {
            (Value::Quantity(f), Value::Quantity(c)) => f.matches(c),
            (Value::Time(f), Value::Time(c)) => f.matches(c),
            _ => self == candidate,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<Entity> for Value { fn from(v: Entity) -> Self { Value::Entity(v) } }
impl From<Text> for Value { fn from(v: Text) -> Self { Value::Text(v) } }
impl From<Quantity> for Value { fn from(v: Quantity) -> Self { Value::Quantity(v) } }
impl From<Time> for Value { fn from(v: Time) -> Self { Value::Time(v) } }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Entity(e) => write!(f, "{e}"),
            Value::Text(t) => match &t.language {
                Some(lang) => write!(f, "\"{}\"@{lang}", t.content.replace('"', "\\\"")),
                None => write!(f, "\"{}\"", t.content.replace('"', "\\\"")),
            },
            Value::ExternalId(id) => write!(f, "ExternalId({id:?})"),
            Value::Quantity(q) => {
                write!(f, "Quantity({}", q.amount)?;
                if let Some(unit) = &q.unit { write!(f, ", unit={unit}")?; }
                if let Some(lb) = &q.lower_bound { write!(f, ", lower={lb}")?; }
                if let Some(ub) = &q.upper_bound { write!(f, ", upper={ub}")?; }
                write!(f, ")")
            }
            Value::Time(t) => {
                write!(f, "Time({}", t.lexical_date())?;
                if let Some(p) = t.precision { write!(f, ", precision={}", p.code())?; }
                if let Some(tz) = t.timezone { write!(f, ", tz={tz}")?; }
                if let Some(cal) = &t.calendar { write!(f, ", calendar={cal}")?; }
                write!(f, ")")
            }
        }
    }
}
