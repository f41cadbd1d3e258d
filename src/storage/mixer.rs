//! Mixer: one logical store over an ordered list of child stores.
//!
//! | Operation | Merge |
//! |-----------|-------|
//! | `filter` | source 1's matches, then source 2's, ... (BEST_RANK re-applied across sources) |
//! | `count` | sum of per-source counts, no cross-source dedup |
//! | `contains` | any source |
//! | `get_annotations` | union of every source's records for the statement |
//! | `get_descriptors` | first label/description in source order, union of aliases |
//!
//! Sources are queried sequentially, so emission order is source order
//! and only one child stream is open at a time. Children are read through
//! `filter_all`: their default limits do not apply, the mixer's own does.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::compiler::Candidate;
use crate::model::{
    merge_descriptors, AnnotationRecordSet, Descriptor, DescriptorMask, Entity, Filter, Slot, Statement,
};
use crate::{Error, Result};

use super::policy::{self, resolve_composites, CandidateSource, SharedOptions};
use super::stream::{Annotated, AnnotationCursor, AnnotationStream, BoxCursor, CandidateCursor, StatementStream};
use super::{validate_language, validate_statements, Store, StoreOptions};

/// Federation over child stores. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Mixer {
    inner: Arc<MixerInner>,
}

struct MixerInner {
    sources: Vec<Arc<dyn Store>>,
    options: SharedOptions,
}

impl Mixer {
    pub fn new(sources: Vec<Box<dyn Store>>, options: StoreOptions) -> Result<Self> {
        Self::from_arcs(sources.into_iter().map(Arc::from).collect(), options)
    }

    /// Mixer over stores that are also used elsewhere.
    pub fn from_arcs(sources: Vec<Arc<dyn Store>>, options: StoreOptions) -> Result<Self> {
        let options = SharedOptions::new(options)?;
        tracing::debug!(sources = sources.len(), "created mixer");
        Ok(Self { inner: Arc::new(MixerInner { sources, options }) })
    }

    pub fn sources(&self) -> &[Arc<dyn Store>] {
        &self.inner.sources
    }

    fn skip_failed(&self) -> bool {
        self.inner.options.snapshot().skip_failed_sources
    }
}

/// Swallow a source failure when the policy allows it.
fn tolerate<T>(skip_failed: bool, source: &dyn Store, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e @ Error::Argument(_)) => Err(e),
        Err(e) if skip_failed => {
            tracing::warn!(source = source.name(), error = %e, "skipping failed source");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// Filter fan-out
// ============================================================================

/// Each source's stream in turn. A source is opened only when the
/// previous one is exhausted.
struct ConcatCursor {
    sources: Vec<Arc<dyn Store>>,
    next_source: usize,
    current: Option<StatementStream>,
    filter: Filter,
    page_size: usize,
    skip_failed: bool,
}

#[async_trait]
impl CandidateCursor for ConcatCursor {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                let source = &self.sources[self.next_source - 1];
                let pulled = stream.next_candidate().await;
                match tolerate(self.skip_failed, source.as_ref(), pulled)? {
                    Some(Some(c)) => return Ok(Some(c)),
                    Some(None) | None => self.current = None,
                }
            }
            let Some(source) = self.sources.get(self.next_source) else {
                return Ok(None);
            };
            self.next_source += 1;
            let opened = source.filter_all(&self.filter, Some(self.page_size));
            self.current = tolerate(self.skip_failed, source.as_ref(), opened)?;
        }
    }
}

impl CandidateSource for Mixer {
    fn open(&self, filter: &Filter, options: &StoreOptions) -> Result<(BoxCursor, Vec<Slot>)> {
        let cursor = ConcatCursor {
            sources: self.inner.sources.clone(),
            next_source: 0,
            current: None,
            filter: filter.clone(),
            page_size: options.page_size,
            skip_failed: options.skip_failed_sources,
        };
        Ok((Box::new(cursor), Vec::new()))
    }

    fn may_repeat(&self) -> bool {
        false
    }
}

// ============================================================================
// Annotations
// ============================================================================

struct MixerAnnotations {
    sources: Vec<Arc<dyn Store>>,
    pending: VecDeque<Statement>,
    skip_failed: bool,
}

impl MixerAnnotations {
    async fn from_source(&self, source: &dyn Store, stmt: &Statement) -> Result<Option<AnnotationRecordSet>> {
        let mut stream = source.get_annotations(vec![stmt.clone()])?;
        Ok(stream.next().await?.and_then(|(_, records)| records))
    }
}

#[async_trait]
impl AnnotationCursor for MixerAnnotations {
    async fn next(&mut self) -> Result<Option<Annotated>> {
        let Some(stmt) = self.pending.pop_front() else {
            return Ok(None);
        };
        let mut merged: Option<AnnotationRecordSet> = None;
        for source in &self.sources {
            let records = self.from_source(source.as_ref(), &stmt).await;
            if let Some(Some(records)) = tolerate(self.skip_failed, source.as_ref(), records)? {
                merged.get_or_insert_with(AnnotationRecordSet::new).union_with(records);
            }
        }
        Ok(Some((stmt, merged)))
    }
}

// ============================================================================
// Store impl
// ============================================================================

#[async_trait]
impl Store for Mixer {
    fn name(&self) -> &str {
        "mixer"
    }

    fn options(&self) -> StoreOptions {
        self.inner.options.snapshot()
    }

    fn update_options(&self, f: &mut dyn FnMut(&mut StoreOptions)) {
        self.inner.options.update(f);
    }

    fn filter(&self, filter: &Filter, limit: Option<usize>, page_size: Option<usize>) -> Result<StatementStream> {
        policy::filter_stream(self, filter, limit.or(self.options().limit), page_size)
    }

    fn filter_all(&self, filter: &Filter, page_size: Option<usize>) -> Result<StatementStream> {
        policy::filter_stream(self, filter, None, page_size)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        filter.validate()?;
        let Some(resolved) = resolve_composites(self, filter).await? else {
            return Ok(0);
        };
        let skip_failed = self.skip_failed();
        let mut total = 0;
        for source in &self.inner.sources {
            let n = source.count(&resolved).await;
            total += tolerate(skip_failed, source.as_ref(), n)?.unwrap_or(0);
        }
        Ok(total)
    }

    async fn contains(&self, statement: &Statement) -> Result<bool> {
        validate_statements(std::slice::from_ref(statement))?;
        let skip_failed = self.skip_failed();
        for source in &self.inner.sources {
            let found = source.contains(statement).await;
            if tolerate(skip_failed, source.as_ref(), found)? == Some(true) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream> {
        validate_statements(&statements)?;
        Ok(AnnotationStream::new(Box::new(MixerAnnotations {
            sources: self.inner.sources.clone(),
            pending: statements.into(),
            skip_failed: self.skip_failed(),
        })))
    }

    async fn get_descriptors(
        &self,
        entities: &[Entity],
        language: &str,
        mask: DescriptorMask,
    ) -> Result<Vec<(Entity, Option<Descriptor>)>> {
        validate_language(language)?;
        let skip_failed = self.skip_failed();
        let mut per_source = Vec::with_capacity(self.inner.sources.len());
        for source in &self.inner.sources {
            let found = source.get_descriptors(entities, language, mask).await;
            if let Some(found) = tolerate(skip_failed, source.as_ref(), found)? {
                per_source.push(found);
            }
        }
        Ok(entities
            .iter()
            .enumerate()
            .map(|(i, entity)| {
                let found = per_source.iter().map(|descs| descs.get(i).and_then(|(_, d)| d.clone()));
                (entity.clone(), merge_descriptors(found, mask))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{Rank, Snak};
    use crate::storage::stream::Buffered;
    use crate::storage::{EmptyStore, StoreFlags};
    use pretty_assertions::assert_eq;

    fn q(n: u32) -> Entity {
        Entity::item(format!("http://www.wikidata.org/entity/Q{n}"))
    }

    fn p(n: u32) -> Entity {
        Entity::property(format!("http://www.wikidata.org/entity/P{n}"))
    }

    /// A child that fails every pull after validating, and counts how
    /// often it was opened.
    #[derive(Default)]
    struct Broken {
        opened: AtomicUsize,
    }

    struct Failing;

    #[async_trait]
    impl CandidateCursor for Failing {
        async fn next(&mut self) -> Result<Option<Candidate>> {
            Err(Error::Execution("endpoint unreachable".into()))
        }
    }

    #[async_trait]
    impl Store for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn options(&self) -> StoreOptions {
            StoreOptions::default()
        }
        fn update_options(&self, _f: &mut dyn FnMut(&mut StoreOptions)) {}
        fn filter(&self, _f: &Filter, _l: Option<usize>, _p: Option<usize>) -> Result<StatementStream> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(StatementStream::new(Box::new(Failing)))
        }
        fn filter_all(&self, f: &Filter, p: Option<usize>) -> Result<StatementStream> {
            self.filter(f, None, p)
        }
        async fn count(&self, _f: &Filter) -> Result<u64> {
            Err(Error::Execution("endpoint unreachable".into()))
        }
        async fn contains(&self, _s: &Statement) -> Result<bool> {
            Err(Error::Execution("endpoint unreachable".into()))
        }
        fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream> {
            Ok(AnnotationStream::unknown(statements))
        }
        async fn get_descriptors(
            &self,
            entities: &[Entity],
            _language: &str,
            _mask: DescriptorMask,
        ) -> Result<Vec<(Entity, Option<Descriptor>)>> {
            Ok(entities.iter().map(|e| (e.clone(), None)).collect())
        }
    }

    /// A child serving fixed candidates.
    struct Fixed(Vec<Candidate>);

    #[async_trait]
    impl Store for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn options(&self) -> StoreOptions {
            StoreOptions::default()
        }
        fn update_options(&self, _f: &mut dyn FnMut(&mut StoreOptions)) {}
        fn filter(&self, f: &Filter, _l: Option<usize>, _p: Option<usize>) -> Result<StatementStream> {
            let matching = self.0.iter().filter(|c| f.matches(&c.statement, c.rank)).cloned().collect();
            Ok(StatementStream::new(Box::new(Buffered(matching))))
        }
        fn filter_all(&self, f: &Filter, p: Option<usize>) -> Result<StatementStream> {
            self.filter(f, None, p)
        }
        async fn count(&self, f: &Filter) -> Result<u64> {
            Ok(self.filter(f, None, None)?.collect().await?.len() as u64)
        }
        async fn contains(&self, s: &Statement) -> Result<bool> {
            Ok(self.0.iter().any(|c| &c.statement == s))
        }
        fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream> {
            Ok(AnnotationStream::unknown(statements))
        }
        async fn get_descriptors(
            &self,
            entities: &[Entity],
            _language: &str,
            _mask: DescriptorMask,
        ) -> Result<Vec<(Entity, Option<Descriptor>)>> {
            Ok(entities.iter().map(|e| (e.clone(), None)).collect())
        }
    }

    fn fixed(rows: &[(u32, Rank)]) -> Arc<dyn Store> {
        Arc::new(Fixed(
            rows.iter()
                .map(|(v, rank)| Candidate::new(Statement::new(q(1), Snak::value(p(31), q(*v))), *rank))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn test_source_order_and_cross_source_best_rank() {
        let sources = vec![fixed(&[(5, Rank::Normal)]), fixed(&[(6, Rank::Preferred), (7, Rank::Normal)])];
        let mixer = Mixer::from_arcs(sources, StoreOptions::default()).unwrap();
        let f = Filter::new().subject(q(1));

        let best = mixer.filter(&f, None, None).unwrap().collect().await.unwrap();
        assert_eq!(best, vec![Statement::new(q(1), Snak::value(p(31), q(6)))]);

        mixer.unset_flag(StoreFlags::BEST_RANK);
        let all = mixer.filter(&f, None, None).unwrap().collect().await.unwrap();
        let values: Vec<_> = all.iter().filter_map(|s| s.snak.as_value().cloned()).collect();
        assert_eq!(values, vec![q(5).into(), q(6).into(), q(7).into()]);
        assert_eq!(mixer.count(&f).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failing_source_propagates_by_default() {
        let sources: Vec<Arc<dyn Store>> = vec![fixed(&[(5, Rank::Normal)]), Arc::new(Broken::default())];
        let mixer = Mixer::from_arcs(sources, StoreOptions::default()).unwrap();
        mixer.unset_flag(StoreFlags::BEST_RANK);
        let mut stream = mixer.filter(&Filter::new().subject(q(1)), None, None).unwrap();
        assert!(stream.next().await.unwrap().is_some());
        assert!(matches!(stream.next().await, Err(Error::Execution(_))));
        assert!(mixer.count(&Filter::new().subject(q(1))).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_source_skipped_on_request() {
        let sources: Vec<Arc<dyn Store>> =
            vec![Arc::new(Broken::default()), fixed(&[(5, Rank::Normal)]), Arc::new(EmptyStore::default())];
        let options = StoreOptions { skip_failed_sources: true, ..StoreOptions::default() };
        let mixer = Mixer::from_arcs(sources, options).unwrap();
        let f = Filter::new().subject(q(1));
        assert_eq!(mixer.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 1);
        assert_eq!(mixer.count(&f).await.unwrap(), 1);
        assert!(mixer.contains(&Statement::new(q(1), Snak::value(p(31), q(5)))).await.unwrap());
    }

    #[tokio::test]
    async fn test_stream_opens_sources_lazily() {
        let broken = Arc::new(Broken::default());
        let sources: Vec<Arc<dyn Store>> = vec![fixed(&[(5, Rank::Normal)]), broken.clone()];
        let mixer = Mixer::from_arcs(sources, StoreOptions::default()).unwrap();
        mixer.unset_flag(StoreFlags::BEST_RANK);

        let mut stream = mixer.filter(&Filter::new().subject(q(1)), None, None).unwrap();
        assert_eq!(broken.opened.load(Ordering::SeqCst), 0);
        assert!(stream.next().await.unwrap().is_some());
        // the first source still had the statement; the second is untouched
        assert_eq!(broken.opened.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(broken.opened.load(Ordering::SeqCst), 0);

        let mut stream = mixer.filter(&Filter::new().subject(q(1)), None, None).unwrap();
        assert!(stream.next().await.unwrap().is_some());
        assert!(stream.next().await.is_err());
        assert_eq!(broken.opened.load(Ordering::SeqCst), 1);
    }
}
