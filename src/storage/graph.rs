//! Graph store: statements out of Wikibase-shaped RDF.
//!
//! Filters compile to native query fragments ([`crate::compiler`]) run
//! against a [`NativeEndpoint`] one page at a time, in fragment order.
//!
//! ## Limitations
//!
//! - **Offset paging**: pages are requested by offset, so an endpoint
//!   that changes between pages may skip or repeat rows. Repeats are
//!   removed by the dedup layer; skips are not detected.
//! - **One query per page**: no fragment runs ahead of the consumer.
//! - **BEST_RANK drains**: with BEST_RANK set (the default) the first pull
//!   reads every page of every fragment before yielding, since a
//!   preferred statement may come last. A small `limit` does not shorten
//!   this. Clear the flag for page-at-a-time pulls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::compiler::decode::{self, snak_of};
use crate::compiler::{compile, decode_row, default_rules, term_value, Candidate, CompileSettings, Decoded, Fragment, Plan, RawValue, RuleTable};
use crate::model::{
    AnnotationRecord, AnnotationRecordSet, Descriptor, DescriptorMask, Entity, Filter, Rank, ReferenceRecordSet,
    Slot, Snak, SnakSet, Statement, Text, Value,
};
use crate::native::{Constraint, MemoryGraph, NativeEndpoint, NativeQuery, PatternTerm, Row, Term, Var};
use crate::vocab::{ns, PredicateFamily, Vocabulary};
use crate::Result;

use super::policy::{self, CandidateSource, SharedOptions};
use super::stream::{Annotated, AnnotationCursor, AnnotationStream, BoxCursor, CandidateCursor, StatementStream};
use super::{validate_language, validate_statements, Store, StoreFlags, StoreOptions};

// ============================================================================
// GraphStore
// ============================================================================

/// Store over a native endpoint. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<GraphInner>,
}

struct GraphInner {
    endpoint: Arc<dyn NativeEndpoint>,
    vocab: Vocabulary,
    rules: RuleTable,
    options: SharedOptions,
    /// property → whether its untagged literals are external ids
    property_types: RwLock<HashMap<Entity, bool>>,
}

impl GraphStore {
    pub fn new(endpoint: Arc<dyn NativeEndpoint>, options: StoreOptions) -> Result<Self> {
        Self::with_vocabulary(endpoint, Vocabulary::default(), options)
    }

    pub fn with_vocabulary(endpoint: Arc<dyn NativeEndpoint>, vocab: Vocabulary, options: StoreOptions) -> Result<Self> {
        Self::with_rules(endpoint, vocab, default_rules()?, options)
    }

    pub fn with_rules(
        endpoint: Arc<dyn NativeEndpoint>,
        vocab: Vocabulary,
        rules: RuleTable,
        options: StoreOptions,
    ) -> Result<Self> {
        let options = SharedOptions::new(options)?;
        tracing::debug!(endpoint = endpoint.name(), rules = rules.len(), "created graph store");
        Ok(Self {
            inner: Arc::new(GraphInner {
                endpoint,
                vocab,
                rules,
                options,
                property_types: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Store over an in-memory graph with default settings.
    pub fn from_graph(graph: MemoryGraph) -> Result<Self> {
        Self::new(Arc::new(graph), StoreOptions::default())
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.inner.vocab
    }

    pub fn endpoint(&self) -> &Arc<dyn NativeEndpoint> {
        &self.inner.endpoint
    }

    /// The plan `filter` compiles to under the current flags.
    pub fn compile(&self, filter: &Filter) -> Result<Plan> {
        let options = self.inner.options.snapshot();
        compile(&self.inner.rules, filter, &self.inner.vocab, settings(&options))
    }
}

fn settings(options: &StoreOptions) -> CompileSettings {
    CompileSettings {
        early_filter: options.flags.contains(StoreFlags::EARLY_FILTER),
        max_pushed_candidates: options.max_pushed_candidates,
    }
}

impl GraphInner {
    /// Every solution of `query`, paging through the endpoint.
    async fn fetch_all(&self, query: &NativeQuery, page_size: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        loop {
            let page = self.endpoint.execute(query, page_size, rows.len()).await?;
            let done = page.len() < page_size;
            rows.extend(page);
            if done {
                return Ok(rows);
            }
        }
    }

    /// Of `properties`, those whose untagged literals are external ids.
    /// Unknown properties are looked up once and cached.
    async fn external_ids<'a>(
        &self,
        properties: impl IntoIterator<Item = &'a Entity>,
        page_size: usize,
    ) -> Result<HashSet<Entity>> {
        let wanted: HashSet<Entity> = properties.into_iter().cloned().collect();
        if wanted.is_empty() {
            return Ok(HashSet::new());
        }
        let unknown: Vec<Entity> = {
            let known = self.property_types.read();
            wanted.iter().filter(|p| !known.contains_key(*p)).cloned().collect()
        };
        if !unknown.is_empty() {
            let mut q = NativeQuery::new();
            q.pattern(
                PatternTerm::var("p"),
                PatternTerm::iri(ns::WIKIBASE_PROPERTY_TYPE),
                PatternTerm::iri(ns::WIKIBASE_EXTERNAL_ID),
            );
            q.constrain(Constraint::In(Var::new("p"), unknown.iter().map(|p| Term::iri(p.iri())).collect()));
            let rows = self.fetch_all(&q, page_size).await?;
            let external: HashSet<&str> = rows.iter().filter_map(|r| r.get("p")?.as_iri()).collect();
            let mut known = self.property_types.write();
            for p in &unknown {
                known.insert(p.clone(), external.contains(p.iri()));
            }
            tracing::trace!(looked_up = unknown.len(), external = external.len(), "property types");
        }
        let known = self.property_types.read();
        Ok(wanted.into_iter().filter(|p| known.get(p).copied().unwrap_or(false)).collect())
    }

    /// Settle plain literals and turn decoded rows into candidates.
    async fn finish(&self, decoded: Vec<Decoded>, page_size: usize) -> Result<Vec<Candidate>> {
        let external = self.external_ids(decoded.iter().filter_map(Decoded::pending_property), page_size).await?;
        Ok(decoded
            .into_iter()
            .map(|d| {
                let ext = d.pending_property().is_some_and(|p| external.contains(p));
                d.finish(ext)
            })
            .collect())
    }

    // ------------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------------

    async fn annotations(&self, stmt: &Statement, options: &StoreOptions) -> Result<Option<AnnotationRecordSet>> {
        // Always compile precisely here: only exact matches carry annotations.
        let exact = CompileSettings { early_filter: true, ..settings(options) };
        let plan = compile(&self.rules, &Filter::for_statement(stmt), &self.vocab, exact)?;

        let mut occurrences: Vec<(Option<Term>, Rank)> = Vec::new();
        for fragment in &plan.fragments {
            let rows = self.fetch_all(&fragment.query, options.page_size).await?;
            let decoded = rows.iter().filter_map(|r| decode_row(fragment, r, &self.vocab)).collect();
            for c in self.finish(decoded, options.page_size).await? {
                if c.statement == *stmt && !occurrences.iter().any(|(n, _)| *n == c.node) {
                    occurrences.push((c.node, c.rank));
                }
            }
        }
        if occurrences.is_empty() {
            return Ok(None);
        }

        let mut records = AnnotationRecordSet::new();
        for (node, rank) in occurrences {
            let (qualifiers, mut references) = match &node {
                Some(node) => self.describe_statement(node, stmt.property(), options.page_size).await?,
                None => (SnakSet::new(), ReferenceRecordSet::new()),
            };
            references.union_with(options.extra_references.iter().cloned());
            records.insert(AnnotationRecord::new(qualifiers, references, rank));
        }
        Ok(Some(records))
    }

    /// Qualifiers and references hanging off a statement node.
    async fn describe_statement(
        &self,
        node: &Term,
        main_property: &Entity,
        page_size: usize,
    ) -> Result<(SnakSet, ReferenceRecordSet)> {
        let (qualifiers, reference_nodes) = self
            .snaks_of(node, PredicateFamily::Qualifier, PredicateFamily::QualifierValueNode, Some(main_property), page_size)
            .await?;
        let mut references = ReferenceRecordSet::new();
        for reference in reference_nodes {
            let (snaks, _) = self
                .snaks_of(&reference, PredicateFamily::Reference, PredicateFamily::ReferenceValueNode, None, page_size)
                .await?;
            if !snaks.is_empty() {
                references.insert(snaks);
            }
        }
        Ok((qualifiers, references))
    }

    /// Snaks stated on `node` through the `simple`/`valued` predicate
    /// families, plus the nodes it derives references from. Value nodes
    /// supersede the simple form of the same property's quantity or time.
    async fn snaks_of(
        &self,
        node: &Term,
        simple: PredicateFamily,
        valued: PredicateFamily,
        main_property: Option<&Entity>,
        page_size: usize,
    ) -> Result<(SnakSet, Vec<Term>)> {
        let mut simple_values: Vec<(Entity, RawValue)> = Vec::new();
        let mut full_values: Vec<(Entity, Value)> = Vec::new();
        let mut derived = Vec::new();
        for (pred, obj) in self.outgoing(node, page_size).await? {
            if pred == ns::PROV_WAS_DERIVED_FROM {
                derived.push(obj);
                continue;
            }
            if pred == ns::RDF_TYPE {
                let local = obj.as_iri().and_then(|iri| iri.strip_prefix(self.vocab.prefix(PredicateFamily::NoValue)));
                if let Some(property) = local.map(|l| self.vocab.property(l)) {
                    if Some(&property) != main_property {
                        simple_values.push((property, RawValue::NoValue));
                    }
                }
                continue;
            }
            match self.vocab.classify_predicate(&pred) {
                Some((family, local)) if family == simple => {
                    if let Some(raw) = term_value(&obj, &self.vocab) {
                        simple_values.push((self.vocab.property(local), raw));
                    }
                }
                Some((family, local)) if family == valued => {
                    if let Some(value) = self.value_node(&obj, page_size).await? {
                        full_values.push((self.vocab.property(local), value));
                    }
                }
                _ => {}
            }
        }
        simple_values.retain(|(p, raw)| {
            let projection = matches!(raw, RawValue::Value(Value::Quantity(_) | Value::Time(_)));
            !(projection && full_values.iter().any(|(fp, _)| fp == p))
        });

        let pending = simple_values.iter().filter(|(_, raw)| matches!(raw, RawValue::Plain(_))).map(|(p, _)| p);
        let external = self.external_ids(pending, page_size).await?;
        let mut snaks = SnakSet::new();
        for (property, raw) in simple_values {
            let ext = external.contains(&property);
            snaks.insert(snak_of(property, raw, ext));
        }
        for (property, value) in full_values {
            snaks.insert(Snak::value(property, value));
        }
        Ok((snaks, derived))
    }

    /// `(predicate IRI, object)` of every triple with subject `node`.
    async fn outgoing(&self, node: &Term, page_size: usize) -> Result<Vec<(String, Term)>> {
        let mut q = NativeQuery::new();
        q.pattern(node.clone(), PatternTerm::var("pred"), PatternTerm::var("obj"));
        let rows = self.fetch_all(&q, page_size).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Some((r.get("pred")?.as_iri()?.to_string(), r.get("obj")?.clone())))
            .collect())
    }

    /// Quantity or time described by a value node.
    async fn value_node(&self, node: &Term, page_size: usize) -> Result<Option<Value>> {
        use crate::compiler::rules::vars;
        let mut row = Row::default();
        for (pred, obj) in self.outgoing(node, page_size).await? {
            let var = match pred.as_str() {
                ns::WIKIBASE_QUANTITY_AMOUNT => vars::AMOUNT,
                ns::WIKIBASE_QUANTITY_UNIT => vars::UNIT,
                ns::WIKIBASE_QUANTITY_LOWER_BOUND => vars::LOWER,
                ns::WIKIBASE_QUANTITY_UPPER_BOUND => vars::UPPER,
                ns::WIKIBASE_TIME_VALUE => vars::TIME,
                ns::WIKIBASE_TIME_PRECISION => vars::PRECISION,
                ns::WIKIBASE_TIME_TIMEZONE => vars::TIMEZONE,
                ns::WIKIBASE_TIME_CALENDAR_MODEL => vars::CALENDAR,
                _ => continue,
            };
            row.insert(Var::new(var), obj);
        }
        Ok(decode::value_node(&row, &self.vocab))
    }

    // ------------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------------

    async fn descriptor(&self, entity: &Entity, language: &str, fetch: DescriptorMask, page_size: usize) -> Result<Descriptor> {
        let mut predicates = Vec::new();
        if fetch.contains(DescriptorMask::LABEL) {
            predicates.push(Term::iri(ns::RDFS_LABEL));
        }
        if fetch.contains(DescriptorMask::ALIASES) {
            predicates.push(Term::iri(ns::SKOS_ALT_LABEL));
        }
        if fetch.contains(DescriptorMask::DESCRIPTION) {
            predicates.push(Term::iri(ns::SCHEMA_DESCRIPTION));
        }
        let mut descriptor = Descriptor::default();
        if predicates.is_empty() {
            return Ok(descriptor);
        }
        let mut q = NativeQuery::new();
        q.pattern(PatternTerm::iri(entity.iri()), PatternTerm::var("pred"), PatternTerm::var("obj"));
        q.constrain(Constraint::In(Var::new("pred"), predicates));
        for row in self.fetch_all(&q, page_size).await? {
            let (Some(pred), Some(lit)) = (row.get("pred").and_then(Term::as_iri), row.get("obj").and_then(Term::as_literal))
            else {
                continue;
            };
            let Some(lang) = lit.language.as_deref().filter(|l| l.eq_ignore_ascii_case(language)) else {
                continue;
            };
            let text = Text::new(lit.lexical.as_str(), lang);
            match pred {
                ns::RDFS_LABEL if descriptor.label.is_none() => descriptor.label = Some(text),
                ns::SKOS_ALT_LABEL => descriptor.push_alias(text),
                ns::SCHEMA_DESCRIPTION if descriptor.description.is_none() => descriptor.description = Some(text),
                _ => {}
            }
        }
        Ok(descriptor)
    }
}

// ============================================================================
// Fragment cursor
// ============================================================================

/// Pages through fragments in order, one endpoint call per refill.
struct FragmentCursor {
    inner: Arc<GraphInner>,
    fragments: VecDeque<Fragment>,
    offset: usize,
    page_size: usize,
    buffer: VecDeque<Candidate>,
}

#[async_trait]
impl CandidateCursor for FragmentCursor {
    async fn next(&mut self) -> Result<Option<Candidate>> {
        loop {
            if let Some(c) = self.buffer.pop_front() {
                return Ok(Some(c));
            }
            let Some(fragment) = self.fragments.front() else {
                return Ok(None);
            };
            let rows = self.inner.endpoint.execute(&fragment.query, self.page_size, self.offset).await?;
            tracing::debug!(rule = fragment.rule, offset = self.offset, rows = rows.len(), "fetched page");
            let exhausted = rows.len() < self.page_size;
            self.offset += rows.len();
            let decoded: Vec<Decoded> = rows.iter().filter_map(|r| decode_row(fragment, r, &self.inner.vocab)).collect();
            let candidates = self.inner.finish(decoded, self.page_size).await?;
            self.buffer.extend(candidates);
            if exhausted {
                self.fragments.pop_front();
                self.offset = 0;
            }
        }
    }
}

impl CandidateSource for GraphStore {
    fn open(&self, filter: &Filter, options: &StoreOptions) -> Result<(BoxCursor, Vec<Slot>)> {
        let plan = compile(&self.inner.rules, filter, &self.inner.vocab, settings(options))?;
        let cursor = FragmentCursor {
            inner: self.inner.clone(),
            fragments: plan.fragments.into(),
            offset: 0,
            page_size: options.page_size,
            buffer: VecDeque::new(),
        };
        Ok((Box::new(cursor), plan.residual))
    }

    fn may_repeat(&self) -> bool {
        true
    }
}

// ============================================================================
// Annotation cursor
// ============================================================================

struct GraphAnnotations {
    inner: Arc<GraphInner>,
    options: StoreOptions,
    pending: VecDeque<Statement>,
}

#[async_trait]
impl AnnotationCursor for GraphAnnotations {
    async fn next(&mut self) -> Result<Option<Annotated>> {
        let Some(stmt) = self.pending.pop_front() else {
            return Ok(None);
        };
        let records = self.inner.annotations(&stmt, &self.options).await?;
        Ok(Some((stmt, records)))
    }
}

// ============================================================================
// Store impl
// ============================================================================

#[async_trait]
impl Store for GraphStore {
    fn name(&self) -> &str {
        "rdf"
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
        policy::count(self, filter).await
    }

    async fn contains(&self, statement: &Statement) -> Result<bool> {
        validate_statements(std::slice::from_ref(statement))?;
        policy::contains(self, statement).await
    }

    fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream> {
        validate_statements(&statements)?;
        Ok(AnnotationStream::new(Box::new(GraphAnnotations {
            inner: self.inner.clone(),
            options: self.options(),
            pending: statements.into(),
        })))
    }

    async fn get_descriptors(
        &self,
        entities: &[Entity],
        language: &str,
        mask: DescriptorMask,
    ) -> Result<Vec<(Entity, Option<Descriptor>)>> {
        validate_language(language)?;
        let options = self.options();
        let fetch = if options.flags.contains(StoreFlags::EARLY_FILTER) { mask } else { DescriptorMask::ALL };
        let mut out = Vec::with_capacity(entities.len());
        for entity in entities {
            let descriptor = self.inner.descriptor(entity, language, fetch, options.page_size).await?.masked(mask);
            out.push((entity.clone(), (!descriptor.is_empty()).then_some(descriptor)));
        }
        Ok(out)
    }
}
