//! # Native Query Model
//!
//! The shape of what the mapping compiler emits and what a backend
//! endpoint executes: RDF terms, triple patterns with variables, and a
//! small basic-graph-pattern query with optional groups, prefix
//! decomposition binds and value constraints.
//!
//! | Type | Role |
//! |------|------|
//! | [`Term`] | IRI, literal or blank node |
//! | [`NativeQuery`] | one compiled fragment's query |
//! | [`Row`] | one solution: variable → term |
//! | [`NativeEndpoint`] | "execute a native query" capability |
//! | [`MemoryGraph`] | in-memory endpoint over a [`TripleGraph`] |

pub mod graph;
pub mod io;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{parse_date, Decimal};
use crate::vocab::ns;
use crate::{Error, Result};

pub use graph::{MemoryGraph, TripleGraph};
pub use io::{parse_triples, write_ntriples};

// ============================================================================
// Terms
// ============================================================================

/// An RDF literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl Literal {
    /// Numeric value for `xsd:decimal` / `xsd:integer` literals.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.datatype.as_deref() {
            Some(ns::XSD_DECIMAL) | Some(ns::XSD_INTEGER) => self.lexical.parse().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<chrono::NaiveDateTime> {
        match self.datatype.as_deref() {
            Some(ns::XSD_DATE_TIME) => parse_date(&self.lexical),
            _ => None,
        }
    }

    /// Plain string: no language tag, no datatype or `xsd:string`.
    pub fn is_plain(&self) -> bool {
        self.language.is_none()
            && matches!(self.datatype.as_deref(), None | Some(ns::XSD_STRING))
    }
}

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Term {
    Iri(String),
    Literal(Literal),
    Blank(String),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    pub fn plain(lexical: impl Into<String>) -> Self {
        Term::Literal(Literal { lexical: lexical.into(), language: None, datatype: None })
    }

    pub fn lang(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: lexical.into(),
            language: Some(language.into()),
            datatype: None,
        })
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: lexical.into(),
            language: None,
            datatype: Some(datatype.into()),
        })
    }

    pub fn decimal(d: &Decimal) -> Self {
        Term::typed(d.to_string(), ns::XSD_DECIMAL)
    }

    pub fn integer(i: i64) -> Self {
        Term::typed(i.to_string(), ns::XSD_INTEGER)
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    /// Term equality as the query engine sees it: numeric literals compare
    /// by value, everything else structurally.
    pub fn same_term(&self, other: &Term) -> bool {
        if let (Term::Literal(a), Term::Literal(b)) = (self, other) {
            if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (a.as_date(), b.as_date()) {
                return x == y;
            }
        }
        self == other
    }
}

/// N-Triples rendering.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal(lit) => {
                write!(f, "\"{}\"", io::escape(&lit.lexical))?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = &lit.datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A ground triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self { subject, predicate, object }
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// A query variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternTerm {
    Var(Var),
    Const(Term),
}

impl PatternTerm {
    pub fn var(name: &str) -> Self {
        PatternTerm::Var(Var::new(name))
    }

    pub fn iri(iri: impl Into<String>) -> Self {
        PatternTerm::Const(Term::iri(iri))
    }
}

impl From<Term> for PatternTerm {
    fn from(t: Term) -> Self {
        PatternTerm::Const(t)
    }
}

impl From<Var> for PatternTerm {
    fn from(v: Var) -> Self {
        PatternTerm::Var(v)
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternTerm::Var(v) => write!(f, "{v}"),
            PatternTerm::Const(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

/// A filter over one solution.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Variable bound to a term equal to the given one.
    Eq(Var, Term),
    /// Variable bound to one of the given terms.
    In(Var, Vec<Term>),
    IsBlank(Var),
    NotBlank(Var),
    /// Variable left unbound by every optional group (`!BOUND(?v)`).
    Unbound(Var),
    /// Variable bound to anything but a literal of one of these datatypes.
    NotTyped(Var, Vec<String>),
    /// Disjunction of conjunctions.
    AnyOf(Vec<Vec<Constraint>>),
}

impl Constraint {
    pub fn holds(&self, row: &Row) -> bool {
        match self {
            Constraint::Eq(v, t) => row.get(v.name()).is_some_and(|x| x.same_term(t)),
            Constraint::In(v, ts) => row
                .get(v.name())
                .is_some_and(|x| ts.iter().any(|t| x.same_term(t))),
            Constraint::IsBlank(v) => row.get(v.name()).is_some_and(Term::is_blank),
            Constraint::NotBlank(v) => row.get(v.name()).is_some_and(|x| !x.is_blank()),
            Constraint::Unbound(v) => !row.is_bound(v.name()),
            Constraint::NotTyped(v, datatypes) => row.get(v.name()).is_some_and(|x| {
                !x.as_literal()
                    .and_then(|l| l.datatype.as_deref())
                    .is_some_and(|dt| datatypes.iter().any(|d| d == dt))
            }),
            Constraint::AnyOf(alternatives) => alternatives
                .iter()
                .any(|conj| conj.iter().all(|c| c.holds(row))),
        }
    }

    /// Every variable the constraint reads.
    pub fn vars(&self) -> Vec<&Var> {
        match self {
            Constraint::Eq(v, _)
            | Constraint::In(v, _)
            | Constraint::IsBlank(v)
            | Constraint::NotBlank(v)
            | Constraint::Unbound(v)
            | Constraint::NotTyped(v, _) => vec![v],
            Constraint::AnyOf(alternatives) => {
                alternatives.iter().flatten().flat_map(Constraint::vars).collect()
            }
        }
    }
}

/// `BIND(STRAFTER(STR(?source), prefix) AS ?into)`, dropping solutions
/// whose `?source` is not an IRI under `prefix`. Binding an already bound
/// `?into` acts as an equality check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decompose {
    pub source: Var,
    pub prefix: String,
    pub into: Var,
}

/// A basic graph pattern query.
///
/// Evaluation order: required patterns, decomposition binds, constraints
/// over required variables, optional groups (left joins), remaining
/// constraints. Solutions come out in a deterministic order so offset
/// pagination is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeQuery {
    pub patterns: Vec<TriplePattern>,
    pub binds: Vec<Decompose>,
    pub optionals: Vec<Vec<TriplePattern>>,
    pub constraints: Vec<Constraint>,
}

impl NativeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(
        &mut self,
        s: impl Into<PatternTerm>,
        p: impl Into<PatternTerm>,
        o: impl Into<PatternTerm>,
    ) -> &mut Self {
        self.patterns.push(TriplePattern { subject: s.into(), predicate: p.into(), object: o.into() });
        self
    }

    pub fn optional(&mut self, group: Vec<TriplePattern>) -> &mut Self {
        self.optionals.push(group);
        self
    }

    pub fn bind(&mut self, source: &str, prefix: impl Into<String>, into: &str) -> &mut Self {
        self.binds.push(Decompose {
            source: Var::new(source),
            prefix: prefix.into(),
            into: Var::new(into),
        });
        self
    }

    pub fn constrain(&mut self, constraint: Constraint) -> &mut Self {
        self.constraints.push(constraint);
        self
    }
}

/// SPARQL-like rendering for logs.
impl fmt::Display for NativeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for p in &self.patterns {
            write!(f, " {} {} {} .", p.subject, p.predicate, p.object)?;
        }
        for b in &self.binds {
            write!(f, " BIND(STRAFTER({}, {:?}) AS {})", b.source, b.prefix, b.into)?;
        }
        for group in &self.optionals {
            write!(f, " OPTIONAL {{")?;
            for p in group {
                write!(f, " {} {} {} .", p.subject, p.predicate, p.object)?;
            }
            write!(f, " }}")?;
        }
        if !self.constraints.is_empty() {
            write!(f, " FILTER({} constraints)", self.constraints.len())?;
        }
        write!(f, " }}")
    }
}

// ============================================================================
// Rows
// ============================================================================

/// One solution of a native query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    bindings: SmallVec<[(Var, Term); 8]>,
}

impl Row {
    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.iter().find(|(v, _)| v.name() == var).map(|(_, t)| t)
    }

    pub fn is_bound(&self, var: &str) -> bool {
        self.get(var).is_some()
    }

    pub fn insert(&mut self, var: Var, term: Term) {
        match self.bindings.iter_mut().find(|(v, _)| *v == var) {
            Some(slot) => slot.1 = term,
            None => self.bindings.push((var, term)),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ============================================================================
// Endpoint capability
// ============================================================================

/// A source that can run native queries.
///
/// Implementations may be remote; each call is one round trip and is
/// only made when a consumer pulls the page it produces.
#[async_trait]
pub trait NativeEndpoint: Send + Sync + 'static {
    /// Run `query` and return at most `limit` solutions starting at
    /// solution number `offset`.
    async fn execute(&self, query: &NativeQuery, limit: usize, offset: usize) -> Result<Vec<Row>>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "endpoint"
    }
}

/// Serialization formats understood by [`parse_triples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    NTriples,
    Json,
}

impl Format {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nt" | "ntriples" | "n-triples" => Ok(Format::NTriples),
            "json" => Ok(Format::Json),
            other => Err(Error::Construction(format!("unsupported serialization format: {other}"))),
        }
    }
}
