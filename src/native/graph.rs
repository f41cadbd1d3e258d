//! In-memory triple graph and the evaluator for [`NativeQuery`].

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use super::{
    parse_triples, Constraint, Decompose, Format, NativeEndpoint, NativeQuery, PatternTerm, Row,
    Term, Triple, TriplePattern, Var,
};
use crate::Result;

/// Triples in insertion order, indexed by subject and by predicate.
#[derive(Debug, Default)]
pub struct TripleGraph {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
    by_subject: HashMap<Term, Vec<usize>>,
    by_predicate: HashMap<Term, Vec<usize>>,
}

impl TripleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a triple. Returns false if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if !self.seen.insert(triple.clone()) {
            return false;
        }
        let idx = self.triples.len();
        self.by_subject.entry(triple.subject.clone()).or_default().push(idx);
        self.by_predicate.entry(triple.predicate.clone()).or_default().push(idx);
        self.triples.push(triple);
        true
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Candidate triples for a pattern whose subject and predicate may be
    /// known, using the narrowest index available.
    fn scan(&self, subject: Option<&Term>, predicate: Option<&Term>) -> Vec<&Triple> {
        let pick = |idx: Option<&Vec<usize>>| -> Vec<&Triple> {
            idx.map(|v| v.iter().map(|&i| &self.triples[i]).collect()).unwrap_or_default()
        };
        match (subject, predicate) {
            (Some(s), _) => pick(self.by_subject.get(s)),
            (None, Some(p)) => pick(self.by_predicate.get(p)),
            (None, None) => self.triples.iter().collect(),
        }
    }

    /// Evaluate `query` to every solution, in a stable order.
    pub fn evaluate(&self, query: &NativeQuery) -> Vec<Row> {
        let mut rows = vec![Row::default()];
        for pattern in &query.patterns {
            rows = self.join(rows, pattern);
            if rows.is_empty() {
                return rows;
            }
        }
        rows.retain_mut(|row| query.binds.iter().all(|b| apply_bind(b, row)));

        // Constraints over variables the required part binds run before the
        // optional groups; the rest see the left-joined solutions.
        let mut required: HashSet<&str> = HashSet::new();
        for p in &query.patterns {
            for t in [&p.subject, &p.predicate, &p.object] {
                if let PatternTerm::Var(v) = t {
                    required.insert(v.name());
                }
            }
        }
        for b in &query.binds {
            required.insert(b.into.name());
        }
        let (early, late): (Vec<&Constraint>, Vec<&Constraint>) = query
            .constraints
            .iter()
            .partition(|c| c.vars().iter().all(|v| required.contains(v.name())));
        rows.retain(|row| early.iter().all(|c| c.holds(row)));

        for group in &query.optionals {
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    let mut extended = vec![row.clone()];
                    for pattern in group {
                        extended = self.join(extended, pattern);
                    }
                    if extended.is_empty() { vec![row] } else { extended }
                })
                .collect();
        }
        rows.retain(|row| late.iter().all(|c| c.holds(row)));
        rows
    }

    fn join(&self, rows: Vec<Row>, pattern: &TriplePattern) -> Vec<Row> {
        let mut out = Vec::new();
        for row in rows {
            let s = resolve(&pattern.subject, &row);
            let p = resolve(&pattern.predicate, &row);
            for triple in self.scan(s.as_ref(), p.as_ref()) {
                let mut next = row.clone();
                if unify(&mut next, &pattern.subject, &triple.subject)
                    && unify(&mut next, &pattern.predicate, &triple.predicate)
                    && unify(&mut next, &pattern.object, &triple.object)
                {
                    out.push(next);
                }
            }
        }
        out
    }
}

fn resolve(term: &PatternTerm, row: &Row) -> Option<Term> {
    match term {
        PatternTerm::Const(t) => Some(t.clone()),
        PatternTerm::Var(v) => row.get(v.name()).cloned(),
    }
}

fn unify(row: &mut Row, pattern: &PatternTerm, term: &Term) -> bool {
    match pattern {
        PatternTerm::Const(t) => t.same_term(term),
        PatternTerm::Var(v) => match row.get(v.name()) {
            Some(bound) => bound.same_term(term),
            None => {
                row.insert(v.clone(), term.clone());
                true
            }
        },
    }
}

fn apply_bind(bind: &Decompose, row: &mut Row) -> bool {
    let Some(local) = row
        .get(bind.source.name())
        .and_then(Term::as_iri)
        .and_then(|iri| iri.strip_prefix(bind.prefix.as_str()))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
    else {
        return false;
    };
    let value = Term::plain(local);
    match row.get(bind.into.name()) {
        Some(bound) => bound.same_term(&value),
        None => {
            row.insert(Var::new(bind.into.name()), value);
            true
        }
    }
}

// ============================================================================
// MemoryGraph endpoint
// ============================================================================

/// A [`TripleGraph`] behind a lock, usable as a [`NativeEndpoint`].
#[derive(Debug, Default)]
pub struct MemoryGraph {
    graph: RwLock<TripleGraph>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let g = Self::new();
        g.extend(triples);
        g
    }

    pub fn insert(&self, triple: Triple) -> bool {
        self.graph.write().insert(triple)
    }

    pub fn extend(&self, triples: impl IntoIterator<Item = Triple>) -> usize {
        let mut graph = self.graph.write();
        triples.into_iter().filter(|t| graph.insert(t.clone())).count()
    }

    /// Parse and add serialized triples. Returns how many were new.
    pub fn load(&self, bytes: &[u8], format: Format) -> Result<usize> {
        let triples = parse_triples(bytes, format)?;
        let added = self.extend(triples);
        tracing::debug!(added, ?format, "loaded triples");
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    /// Copy of every triple, in insertion order.
    pub fn snapshot(&self) -> Vec<Triple> {
        self.graph.read().triples().to_vec()
    }
}

#[async_trait]
impl NativeEndpoint for MemoryGraph {
    async fn execute(&self, query: &NativeQuery, limit: usize, offset: usize) -> Result<Vec<Row>> {
        let rows = {
            let graph = self.graph.read();
            graph.evaluate(query)
        };
        tracing::trace!(%query, total = rows.len(), limit, offset, "evaluated native query");
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
