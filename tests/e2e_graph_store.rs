//! End-to-end tests for the graph store over the Wikidata-layout fixture.
//!
//! Each test exercises: filter -> compile -> page through MemoryGraph ->
//! decode -> late filter -> dedup -> best rank -> caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kif_rs::model::parse_date;
use kif_rs::{
    AnnotationRecord, Decimal, DescriptorMask, Entity, Error, Filter, Format, GraphStore, MemoryGraph, NativeEndpoint,
    NativeQuery, Quantity, Rank, ReferenceRecordSet, Row, Selector, Snak, SnakKind, SnakMask, SnakSet, Statement,
    Store, StoreFlags, StoreOptions, Text, Time, TimePrecision, Value,
};
use pretty_assertions::assert_eq;

const WD: &str = "http://www.wikidata.org/entity/";

fn item(local: &str) -> Entity {
    Entity::item(format!("{WD}{local}"))
}

fn prop(local: &str) -> Entity {
    Entity::property(format!("{WD}{local}"))
}

fn cities() -> GraphStore {
    GraphStore::from_graph(cities_graph()).unwrap()
}

fn cities_graph() -> MemoryGraph {
    let graph = MemoryGraph::new();
    graph.load(include_bytes!("fixtures/cities.nt"), Format::NTriples).unwrap();
    graph
}

/// Endpoint wrapper counting round trips.
struct Counting {
    graph: MemoryGraph,
    calls: AtomicUsize,
}

#[async_trait]
impl NativeEndpoint for Counting {
    async fn execute(&self, query: &NativeQuery, limit: usize, offset: usize) -> kif_rs::Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.graph.execute(query, limit, offset).await
    }
}

fn population() -> Quantity {
    let mut q = Quantity::new("3644826".parse::<Decimal>().unwrap());
    q.unit = Some(item("Q199"));
    q
}

fn inception(precision: TimePrecision) -> Time {
    let mut t = Time::new(parse_date("1237-01-01T00:00:00Z").unwrap());
    t.precision = Some(precision);
    t
}

// ============================================================================
// 1. Every snak kind of one subject
// ============================================================================

#[tokio::test]
async fn test_subject_statements_of_every_kind() {
    let store = cities();
    let stmts = store.filter(&Filter::new().subject(item("Q64")), None, None).unwrap().collect().await.unwrap();

    let expected = [
        Statement::new(item("Q64"), Snak::value(prop("P31"), item("Q5119"))),
        Statement::new(item("Q64"), Snak::value(prop("P214"), Value::ExternalId("122753".into()))),
        Statement::new(item("Q64"), Snak::some_value(prop("P1449"))),
        Statement::new(item("Q64"), Snak::value(prop("P1082"), population())),
        Statement::new(item("Q64"), Snak::no_value(prop("P40"))),
    ];
    for stmt in &expected {
        assert!(stmts.contains(stmt), "missing {stmt}");
    }
    // the year-precision inception, with every field read from its value node
    let time = stmts
        .iter()
        .find(|s| s.property() == &prop("P571"))
        .and_then(|s| s.snak.as_value())
        .cloned();
    match time {
        Some(Value::Time(t)) => {
            assert_eq!(t.precision, Some(TimePrecision::Year));
            assert_eq!(t.timezone, Some(0));
            assert_eq!(t.calendar, Some(item("Q1985727")));
        }
        other => panic!("unexpected inception {other:?}"),
    }
    assert_eq!(stmts.len(), 6);
}

#[tokio::test]
async fn test_filter_twice_yields_same_sequence() {
    let store = cities();
    let f = Filter::new().subject(item("Q64"));
    let first = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    let second = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_small_pages_return_everything() {
    let store = cities();
    let f = Filter::new().subject(item("Q64"));
    let paged = store.filter(&f, None, Some(1)).unwrap().collect().await.unwrap();
    let whole = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(paged, whole);
}

#[tokio::test]
async fn test_limit_and_count() {
    let store = cities();
    let f = Filter::new().subject(item("Q64"));
    assert_eq!(store.filter(&f, Some(2), None).unwrap().collect().await.unwrap().len(), 2);
    assert_eq!(store.count(&f).await.unwrap(), 6);

    store.update_options(&mut |o| o.limit = Some(1));
    assert_eq!(store.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 1);
    assert_eq!(store.count(&f).await.unwrap(), 6);
}

// ============================================================================
// 2. Rank
// ============================================================================

#[tokio::test]
async fn test_best_rank_on_and_off() {
    let store = cities();
    let f = Filter::new().subject(item("Q64")).property(prop("P31"));

    let best = store.filter(&f, None, None).unwrap().collect_ranked().await.unwrap();
    assert_eq!(best, vec![(Statement::new(item("Q64"), Snak::value(prop("P31"), item("Q5119"))), Rank::Preferred)]);

    store.unset_flag(StoreFlags::BEST_RANK);
    let all = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_rank_filter_applies_before_best_rank() {
    let store = cities();
    let f = Filter::new().subject(item("Q64")).property(prop("P31")).rank(Rank::Normal);
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(prop("P31"), item("Q515")))]);
}

// ============================================================================
// 3. Values
// ============================================================================

#[tokio::test]
async fn test_quantity_fields_match_as_wildcards() {
    let store = cities();
    let base = Filter::new().subject(item("Q64")).property(prop("P1082"));

    let bare = Quantity::new("3644826".parse::<Decimal>().unwrap());
    let f = base.clone().value(Value::Quantity(bare));
    assert_eq!(store.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 1);

    let f = base.clone().value(Value::Quantity(population()));
    assert_eq!(store.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 1);

    let mut metres = population();
    metres.unit = Some(item("Q11573"));
    let f = base.value(Value::Quantity(metres));
    assert!(store.filter(&f, None, None).unwrap().collect().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_time_precision_must_agree() {
    let store = cities();
    let base = Filter::new().subject(item("Q64")).property(prop("P571"));

    let f = base.clone().value(Value::Time(inception(TimePrecision::Year)));
    assert_eq!(store.count(&f).await.unwrap(), 1);

    let f = base.clone().value(Value::Time(inception(TimePrecision::Day)));
    assert_eq!(store.count(&f).await.unwrap(), 0);

    let open = Time::new(parse_date("1237-01-01T00:00:00Z").unwrap());
    let f = base.value(Value::Time(open));
    assert_eq!(store.count(&f).await.unwrap(), 1);
}

#[tokio::test]
async fn test_external_id_by_value() {
    let store = cities();
    let f = Filter::new().property(prop("P214")).value(Value::ExternalId("122753".into()));
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(prop("P214"), Value::ExternalId("122753".into())))]);
}

#[tokio::test]
async fn test_snak_mask_selects_kinds() {
    let store = cities();
    let f = Filter::new().subject(item("Q64")).snak_mask(SnakMask::SOME_VALUE_SNAK);
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::some_value(prop("P1449")))]);

    let f = Filter::new().subject(item("Q64")).snak_mask(SnakMask::NO_VALUE_SNAK);
    let kinds: Vec<_> =
        store.filter(&f, None, None).unwrap().collect().await.unwrap().iter().map(|s| s.snak.kind()).collect();
    assert_eq!(kinds, vec![SnakKind::NoValue]);
}

// ============================================================================
// 4. Direct triples
// ============================================================================

#[tokio::test]
async fn test_truthy_only_where_unreified() {
    let store = cities();
    let f = Filter::new().subject(item("Q64")).property(prop("P17"));
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(prop("P17"), item("Q183")))]);

    // wdt:P31 duplicates a reified statement and is not read twice
    store.unset_flag(StoreFlags::BEST_RANK);
    let f = Filter::new().subject(item("Q64")).property(prop("P31"));
    assert_eq!(store.count(&f).await.unwrap(), 2);
}

#[tokio::test]
async fn test_plain_and_same_as_triples() {
    let store = cities();
    let based_near = Entity::property("http://xmlns.com/foaf/0.1/based_near");
    let f = Filter::new().property(based_near.clone());
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(based_near, item("Q183")))]);

    let f = Filter::new().subject(item("Q64")).property(prop("P460"));
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(prop("P460"), item("Q821244")))]);
}

// ============================================================================
// 5. Composite selectors
// ============================================================================

#[tokio::test]
async fn test_composite_subject_is_an_intersection() {
    let store = cities();
    let cities_in_germany = Selector::with(prop("P31"), item("Q515")).and(prop("P17"), item("Q183"));
    let f = Filter::new().subject(cities_in_germany).property(prop("P31"));
    let subjects: Vec<Entity> =
        store.filter(&f, None, None).unwrap().collect().await.unwrap().into_iter().map(|s| s.subject).collect();
    assert_eq!(subjects.len(), 2);
    assert!(subjects.contains(&item("Q64")));
    assert!(subjects.contains(&item("Q1055")));
}

#[tokio::test]
async fn test_composite_without_matches_is_empty() {
    let store = cities();
    let f = Filter::new().subject(Selector::with(prop("P17"), item("Q30")));
    assert!(store.filter(&f, None, None).unwrap().collect().await.unwrap().is_empty());
    assert_eq!(store.count(&f).await.unwrap(), 0);
}

// ============================================================================
// 6. Flags
// ============================================================================

#[tokio::test]
async fn test_early_and_late_filter_off_is_raw() {
    let store = cities();
    store.set_flags(StoreFlags::NONE);
    let f = Filter::new().subject(item("Q64")).property(prop("P31")).value(item("Q515"));
    assert_eq!(store.count(&f).await.unwrap(), 2);

    store.set_flag(StoreFlags::LATE_FILTER);
    let stmts = store.filter(&f, None, None).unwrap().collect().await.unwrap();
    assert_eq!(stmts, vec![Statement::new(item("Q64"), Snak::value(prop("P31"), item("Q515")))]);
}

#[tokio::test]
async fn test_flag_change_does_not_touch_open_stream() {
    let store = cities();
    let f = Filter::new().subject(item("Q64")).property(prop("P31"));
    let stream = store.filter(&f, None, None).unwrap();
    store.unset_flag(StoreFlags::BEST_RANK);
    assert_eq!(stream.collect().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_composite_ignores_default_limit() {
    let store = cities();
    store.update_options(&mut |o| o.limit = Some(1));
    let cities_in_germany = Selector::with(prop("P31"), item("Q515")).and(prop("P17"), item("Q183"));
    let f = Filter::new().subject(cities_in_germany).property(prop("P17"));

    assert_eq!(store.count(&f).await.unwrap(), 2);
    let subjects: Vec<Entity> =
        store.filter(&f, Some(100), None).unwrap().collect().await.unwrap().into_iter().map(|s| s.subject).collect();
    assert_eq!(subjects.len(), 2);
    assert!(subjects.contains(&item("Q64")));
    assert!(subjects.contains(&item("Q1055")));
    // the default limit still caps the outer call
    assert_eq!(store.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 1);
}

// ============================================================================
// 7. Pull scheduling
// ============================================================================

#[tokio::test]
async fn test_pages_fetched_only_on_pull() {
    let endpoint = Arc::new(Counting { graph: cities_graph(), calls: AtomicUsize::new(0) });
    let options = StoreOptions { page_size: 1, ..StoreOptions::default() };
    let store = GraphStore::new(endpoint.clone(), options).unwrap();
    store.unset_flag(StoreFlags::BEST_RANK);
    let f = Filter::new().subject(item("Q64")).property(prop("P31"));

    let drained = {
        let before = endpoint.calls.load(Ordering::SeqCst);
        assert_eq!(store.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 2);
        endpoint.calls.load(Ordering::SeqCst) - before
    };

    let before = endpoint.calls.load(Ordering::SeqCst);
    let mut stream = store.filter(&f, None, None).unwrap();
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), before);

    assert!(stream.next().await.unwrap().is_some());
    let after_first = endpoint.calls.load(Ordering::SeqCst) - before;
    assert!(after_first >= 1);
    assert!(after_first < drained, "first pull fetched {after_first} of {drained} pages");

    drop(stream);
    assert_eq!(endpoint.calls.load(Ordering::SeqCst) - before, after_first);
}

#[tokio::test]
async fn test_best_rank_reads_every_page_on_first_pull() {
    let endpoint = Arc::new(Counting { graph: cities_graph(), calls: AtomicUsize::new(0) });
    let options = StoreOptions { page_size: 1, ..StoreOptions::default() };
    let store = GraphStore::new(endpoint.clone(), options).unwrap();
    let f = Filter::new().subject(item("Q64")).property(prop("P31"));

    let mut stream = store.filter(&f, Some(1), None).unwrap();
    assert!(stream.next().await.unwrap().is_some());
    let first = endpoint.calls.load(Ordering::SeqCst);
    assert!(stream.next().await.unwrap().is_none());
    assert_eq!(endpoint.calls.load(Ordering::SeqCst), first);
}

// ============================================================================
// 8. Contains, annotations, descriptors
// ============================================================================

#[tokio::test]
async fn test_contains_is_exact() {
    let store = cities();
    let stmt = Statement::new(item("Q64"), Snak::value(prop("P1082"), population()));
    assert!(store.contains(&stmt).await.unwrap());

    let bare = Quantity::new("3644826".parse::<Decimal>().unwrap());
    let partial = Statement::new(item("Q64"), Snak::value(prop("P1082"), bare));
    assert!(!store.contains(&partial).await.unwrap());
}

#[tokio::test]
async fn test_annotations_read_qualifiers_and_references() {
    let store = cities();
    let stmt = Statement::new(item("Q64"), Snak::value(prop("P1082"), population()));
    let missing = Statement::new(item("Q64"), Snak::value(prop("P31"), item("Q5")));
    let truthy = Statement::new(item("Q64"), Snak::value(prop("P17"), item("Q183")));

    let out = store.get_annotations(vec![stmt.clone(), missing.clone(), truthy.clone()]).unwrap().collect().await.unwrap();
    assert_eq!(out.len(), 3);

    let mut point_in_time = Time::new(parse_date("2019-12-31T00:00:00Z").unwrap());
    point_in_time.precision = Some(TimePrecision::Day);
    point_in_time.timezone = Some(0);
    point_in_time.calendar = Some(item("Q1985727"));
    let qualifiers: SnakSet = [Snak::value(prop("P585"), point_in_time)].into_iter().collect();
    let stated_in: SnakSet = [Snak::value(prop("P248"), item("Q36578"))].into_iter().collect();
    let references: ReferenceRecordSet = [stated_in].into_iter().collect();
    let expected = AnnotationRecord::new(qualifiers, references, Rank::Normal);

    assert_eq!(out[0].0, stmt);
    assert_eq!(out[0].1.as_ref().map(|r| r.as_slice().to_vec()), Some(vec![expected]));
    assert_eq!(out[1], (missing, None));
    let bare = AnnotationRecord::new(SnakSet::new(), ReferenceRecordSet::new(), Rank::Normal);
    assert_eq!(out[2].1.as_ref().map(|r| r.as_slice().to_vec()), Some(vec![bare]));
}

#[tokio::test]
async fn test_extra_references_join_every_record() {
    let store = cities();
    let retrieved: SnakSet = [Snak::value(prop("P813"), Text::untagged("today"))].into_iter().collect();
    let extra: ReferenceRecordSet = [retrieved.clone()].into_iter().collect();
    store.update_options(&mut |o| o.extra_references = extra.clone());

    let stmt = Statement::new(item("Q64"), Snak::no_value(prop("P40")));
    let out = store.get_annotations(vec![stmt]).unwrap().collect().await.unwrap();
    let records = out[0].1.clone().unwrap();
    let record = &records.as_slice()[0];
    assert!(record.qualifiers.is_empty());
    assert!(record.references.contains(&retrieved));
}

#[tokio::test]
async fn test_descriptors_in_language_and_mask() {
    let store = cities();
    let entities = [item("Q64"), item("Q1055"), item("Q90")];
    let out = store.get_descriptors(&entities, "en", DescriptorMask::ALL).await.unwrap();

    let berlin = out[0].1.clone().unwrap();
    assert_eq!(berlin.label, Some(Text::new("Berlin", "en")));
    assert_eq!(berlin.aliases, vec![Text::new("Berlin, Germany", "en")]);
    assert_eq!(berlin.description, Some(Text::new("capital of Germany", "en")));
    assert_eq!(out[1].1.as_ref().and_then(|d| d.label.clone()), Some(Text::new("Hamburg", "en")));
    assert_eq!(out[2], (item("Q90"), None));

    let labels = store.get_descriptors(&entities[..1], "de", DescriptorMask::LABEL).await.unwrap();
    let berlin = labels[0].1.clone().unwrap();
    assert_eq!(berlin.label, Some(Text::new("Berlin", "de")));
    assert!(berlin.aliases.is_empty());

    let none = store.get_descriptors(&entities[1..2], "de", DescriptorMask::ALL).await.unwrap();
    assert_eq!(none[0].1, None);
}

// ============================================================================
// 9. Argument errors
// ============================================================================

#[tokio::test]
async fn test_argument_errors_are_synchronous() {
    let store = cities();
    let f = Filter::new().property(item("Q5"));
    assert!(matches!(store.filter(&f, None, None), Err(Error::Argument(_))));
    assert!(matches!(store.filter(&Filter::new(), None, Some(0)), Err(Error::Argument(_))));
    let bad = Statement::new(item("Q64"), Snak::some_value(item("Q5")));
    assert!(matches!(store.get_annotations(vec![bad]), Err(Error::Argument(_))));
}
