//! Store-level behaviour shared by every backend.
//!
//! Backends only produce raw candidates for a filter without composite
//! selectors (`CandidateSource`). Everything the flags control is
//! layered on top here:
//!
//! | Layer | When |
//! |-------|------|
//! | `Deferred` | always; resolves composites on first pull |
//! | `LateFilter` | always; full check with LATE_FILTER, residual slots and rank otherwise |
//! | `Dedup` | backends that can return the same statement twice |
//! | `BestRank` | BEST_RANK |
//! | `Limit` | a limit is in effect |

use std::collections::VecDeque;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::compiler::Candidate;
use crate::model::{Entity, Filter, Rank, Selector, Slot, Snak, SnakMask, Statement, Value};
use crate::{Error, Result};

use super::stream::{BoxCursor, CandidateCursor, Exhausted, StatementStream};
use super::{Store, StoreFlags, StoreOptions};

// ============================================================================
// Shared options
// ============================================================================

/// Store options behind a lock. Each call takes a snapshot, so a flag
/// change never affects a stream already handed out.
#[derive(Debug)]
pub struct SharedOptions {
    options: RwLock<StoreOptions>,
}

impl SharedOptions {
    pub fn new(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options: RwLock::new(options) })
    }

    /// Wrap options known to be valid, such as the defaults.
    pub(crate) fn from_valid(options: StoreOptions) -> Self {
        Self { options: RwLock::new(options) }
    }

    pub fn snapshot(&self) -> StoreOptions {
        self.options.read().clone()
    }

    pub fn update(&self, f: &mut dyn FnMut(&mut StoreOptions)) {
        let mut options = self.options.write();
        f(&mut options);
        tracing::debug!(flags = options.flags.bits(), page_size = options.page_size, "store options changed");
    }
}

// ============================================================================
// Backend seam
// ============================================================================

/// Raw candidate production for one resolved filter.
pub(crate) trait CandidateSource: Store + Clone {
    /// Open a cursor over candidates for `filter`, which holds no
    /// composite selectors. Also returns the slots whose selectors were
    /// not enforced at the source.
    fn open(&self, filter: &Filter, options: &StoreOptions) -> Result<(BoxCursor, Vec<Slot>)>;

    /// Whether the same statement may come out of `open` more than once.
    fn may_repeat(&self) -> bool;
}

/// Build the layered stream for one filter call. `limit` is final: store
/// defaults have already been applied by the caller.
pub(crate) fn filter_stream<S: CandidateSource>(
    store: &S,
    filter: &Filter,
    limit: Option<usize>,
    page_size: Option<usize>,
) -> Result<StatementStream> {
    filter.validate()?;
    let mut options = store.options();
    if let Some(size) = page_size {
        if size == 0 {
            return Err(Error::Argument("page_size must be positive".into()));
        }
        options.page_size = size;
    }
    if filter.is_empty() || limit == Some(0) {
        return Ok(StatementStream::empty());
    }

    let best_rank = options.flags.contains(StoreFlags::BEST_RANK);
    let mut cursor: BoxCursor = Box::new(Deferred {
        store: store.clone(),
        filter: filter.clone(),
        options,
        state: DeferredState::Pending,
    });
    if best_rank {
        cursor = Box::new(BestRank::new(cursor));
    }
    if let Some(n) = limit {
        cursor = Box::new(Limit { inner: cursor, remaining: n });
    }
    Ok(StatementStream::new(cursor))
}

/// Count by draining an unlimited stream.
pub(crate) async fn count<S: CandidateSource>(store: &S, filter: &Filter) -> Result<u64> {
    let mut stream = filter_stream(store, filter, None, None)?;
    let mut n = 0;
    while stream.next_candidate().await?.is_some() {
        n += 1;
    }
    Ok(n)
}

/// Exact membership: some candidate for the statement's own filter must
/// equal it.
pub(crate) async fn contains<S: CandidateSource>(store: &S, statement: &Statement) -> Result<bool> {
    let mut stream = filter_stream(store, &Filter::for_statement(statement), None, None)?;
    while let Some(stmt) = stream.next().await? {
        if &stmt == statement {
            return Ok(true);
        }
    }
    Ok(false)
}

// ============================================================================
// Composite resolution
// ============================================================================

/// Replace every composite selector by the set of entities satisfying all
/// its conjuncts, using `store` itself for the sub-queries. The store's
/// default limit never truncates a candidate set. `None` when some
/// composite resolves to nothing.
pub async fn resolve_composites(store: &dyn Store, filter: &Filter) -> Result<Option<Filter>> {
    if !filter.has_composite() {
        return Ok(Some(filter.clone()));
    }
    let mut resolved = filter.clone();
    for slot in [Slot::Subject, Slot::Property, Slot::Value] {
        let Selector::Composite(conjuncts) = filter.selector(slot) else {
            continue;
        };
        let mut candidates: Option<Vec<Entity>> = None;
        for (property, value) in conjuncts {
            let mut sub = Filter::new()
                .property(property.clone())
                .value(value.clone())
                .snak_mask(SnakMask::VALUE_SNAK);
            if let Some(current) = &candidates {
                sub = sub.subject(Selector::OneOf(current.iter().cloned().map(Value::Entity).collect()));
            }
            let mut stream = store.filter_all(&sub, None)?;
            let mut seen = HashSet::new();
            let mut found = Vec::new();
            while let Some(stmt) = stream.next().await? {
                let subject = stmt.subject;
                if (slot != Slot::Property || subject.is_property()) && seen.insert(subject.clone()) {
                    found.push(subject);
                }
            }
            let narrowed = match candidates {
                None => found,
                Some(prev) => prev.into_iter().filter(|e| seen.contains(e)).collect(),
            };
            if narrowed.is_empty() {
                tracing::debug!(slot = slot.name(), "composite selector matches nothing");
                return Ok(None);
            }
            candidates = Some(narrowed);
        }
        let entities = candidates.unwrap_or_default();
        tracing::debug!(slot = slot.name(), candidates = entities.len(), "resolved composite selector");
        *resolved.selector_mut(slot) = Selector::OneOf(entities.into_iter().map(Value::Entity).collect());
    }
    Ok(Some(resolved))
}

// ============================================================================
// Layers
// ============================================================================

enum DeferredState {
    Pending,
    Open(BoxCursor),
}

/// Resolves composites and opens the backend on first pull.
pub(crate) struct Deferred<S> {
    store: S,
    filter: Filter,
    options: StoreOptions,
    state: DeferredState,
}

async fn open_source<S: CandidateSource>(store: &S, filter: &Filter, options: &StoreOptions) -> Result<BoxCursor> {
    let Some(resolved) = resolve_composites(store, filter).await? else {
        return Ok(Box::new(Exhausted));
    };
    let (source, residual) = store.open(&resolved, options)?;
    let full = options.flags.contains(StoreFlags::LATE_FILTER);
    let mut cursor: BoxCursor = Box::new(LateFilter { inner: source, filter: resolved, full, residual });
    if store.may_repeat() {
        cursor = Box::new(Dedup { inner: cursor, seen: HashSet::new() });
    }
    Ok(cursor)
}

#[async_trait]
impl<S: CandidateSource> CandidateCursor for Deferred<S> {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        if let DeferredState::Pending = self.state {
            let cursor = open_source(&self.store, &self.filter, &self.options).await?;
            self.state = DeferredState::Open(cursor);
        }
        match &mut self.state {
            DeferredState::Open(cursor) => cursor.next().await,
            DeferredState::Pending => Ok(None),
        }
    }
}

/// In-memory filter check.
pub(crate) struct LateFilter {
    inner: BoxCursor,
    filter: Filter,
    /// Check the whole filter; otherwise only residual slots and rank.
    full: bool,
    residual: Vec<Slot>,
}

impl LateFilter {
    fn accepts(&self, c: &Candidate) -> bool {
        if self.full {
            return self.filter.matches(&c.statement, c.rank);
        }
        if self.filter.rank.is_some_and(|r| r != c.rank) {
            return false;
        }
        self.residual.iter().all(|slot| slot_matches(&self.filter, *slot, &c.statement))
    }
}

fn slot_matches(filter: &Filter, slot: Slot, stmt: &Statement) -> bool {
    let selector = filter.selector(slot);
    match slot {
        Slot::Subject => selector.matches(&Value::Entity(stmt.subject.clone())),
        Slot::Property => selector.matches(&Value::Entity(stmt.property().clone())),
        Slot::Value => match &stmt.snak {
            Snak::Value { value, .. } => selector.matches(value),
            _ => selector.is_any(),
        },
    }
}

#[async_trait]
impl CandidateCursor for LateFilter {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        while let Some(c) = self.inner.next().await? {
            if self.accepts(&c) {
                return Ok(Some(c));
            }
            tracing::trace!(statement = %c.statement, "late filter dropped candidate");
        }
        Ok(None)
    }
}

/// Drops repeats of a statement already emitted; the first occurrence
/// (and its rank) wins.
pub(crate) struct Dedup {
    inner: BoxCursor,
    seen: HashSet<Statement>,
}

#[async_trait]
impl CandidateCursor for Dedup {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        while let Some(c) = self.inner.next().await? {
            if self.seen.insert(c.statement.clone()) {
                return Ok(Some(c));
            }
        }
        Ok(None)
    }
}

/// Keeps, for each (subject, property), only the statements of the
/// highest rank seen. Needs the whole input before the first output, so
/// the first pull drains the layer below.
pub(crate) struct BestRank {
    inner: Option<BoxCursor>,
    ready: VecDeque<Candidate>,
}

impl BestRank {
    pub(crate) fn new(inner: BoxCursor) -> Self {
        Self { inner: Some(inner), ready: VecDeque::new() }
    }
}

#[async_trait]
impl CandidateCursor for BestRank {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        if let Some(mut inner) = self.inner.take() {
            let mut all = Vec::new();
            while let Some(c) = inner.next().await? {
                all.push(c);
            }
            let mut best: HashMap<(Entity, Entity), Rank> = HashMap::new();
            for c in &all {
                let key = (c.statement.subject.clone(), c.statement.property().clone());
                let slot = best.entry(key).or_insert(c.rank);
                *slot = (*slot).max(c.rank);
            }
            let total = all.len();
            self.ready = all
                .into_iter()
                .filter(|c| {
                    let (s, p) = c.statement.rank_key();
                    best.get(&(s.clone(), p.clone())) == Some(&c.rank)
                })
                .collect();
            tracing::debug!(total, kept = self.ready.len(), "best-rank reduction");
        }
        Ok(self.ready.pop_front())
    }
}

/// Stops after `remaining` candidates without pulling further.
pub(crate) struct Limit {
    inner: BoxCursor,
    remaining: usize,
}

#[async_trait]
impl CandidateCursor for Limit {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let next = self.inner.next().await?;
        if next.is_some() {
            self.remaining -= 1;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::stream::Buffered;
    use pretty_assertions::assert_eq;

    fn q(n: u32) -> Entity {
        Entity::item(format!("http://www.wikidata.org/entity/Q{n}"))
    }

    fn p(n: u32) -> Entity {
        Entity::property(format!("http://www.wikidata.org/entity/P{n}"))
    }

    fn cand(s: u32, prop: u32, v: u32, rank: Rank) -> Candidate {
        Candidate::new(Statement::new(q(s), Snak::value(p(prop), q(v))), rank)
    }

    fn buffered(cs: Vec<Candidate>) -> BoxCursor {
        Box::new(Buffered(cs.into()))
    }

    async fn drain(mut c: BoxCursor) -> Vec<Candidate> {
        let mut out = Vec::new();
        while let Some(x) = c.next().await.unwrap() {
            out.push(x);
        }
        out
    }

    #[tokio::test]
    async fn test_best_rank_keeps_ties_in_order() {
        let input = vec![
            cand(1, 6, 10, Rank::Normal),
            cand(1, 6, 11, Rank::Preferred),
            cand(2, 6, 12, Rank::Deprecated),
            cand(1, 6, 13, Rank::Preferred),
        ];
        let out = drain(Box::new(BestRank::new(buffered(input)))).await;
        let ranks: Vec<_> = out.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![Rank::Preferred, Rank::Deprecated, Rank::Preferred]);
        assert_eq!(out[0].statement.snak.as_value(), Some(&Value::Entity(q(11))));
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_rank() {
        let input = vec![cand(1, 6, 10, Rank::Preferred), cand(1, 6, 10, Rank::Normal)];
        let out = drain(Box::new(Dedup { inner: buffered(input), seen: HashSet::new() })).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rank, Rank::Preferred);
    }

    #[tokio::test]
    async fn test_limit_stops() {
        let input = vec![cand(1, 6, 10, Rank::Normal), cand(2, 6, 10, Rank::Normal)];
        let out = drain(Box::new(Limit { inner: buffered(input), remaining: 1 })).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_residual_check_without_late_filter() {
        let filter = Filter::new().subject(Selector::OneOf(vec![Value::Entity(q(1))]));
        let input = vec![cand(1, 6, 10, Rank::Normal), cand(2, 6, 10, Rank::Normal)];
        let late = LateFilter { inner: buffered(input), filter, full: false, residual: vec![Slot::Subject] };
        let out = drain(Box::new(late)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].statement.subject, q(1));
    }
}
