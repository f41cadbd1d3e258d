//! End-to-end tests for the mixer over three graph stores.
//!
//! Source A holds Berlin, source B Hamburg and source C Paris. Hamburg's
//! instance-of statement is also in source A, annotated differently.

use std::sync::Arc;

use kif_rs::{
    DescriptorMask, Entity, Filter, Format, GraphStore, MemoryGraph, Mixer, Rank, Selector, Snak, Statement, Store,
    StoreFlags, StoreOptions, Text,
};
use pretty_assertions::assert_eq;

const WD: &str = "http://www.wikidata.org/entity/";

fn item(local: &str) -> Entity {
    Entity::item(format!("{WD}{local}"))
}

fn prop(local: &str) -> Entity {
    Entity::property(format!("{WD}{local}"))
}

const SOURCE_A: &str = r#"
<http://www.wikidata.org/entity/Q64> <http://www.wikidata.org/prop/P31> <http://www.wikidata.org/entity/statement/A1> .
<http://www.wikidata.org/entity/statement/A1> <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q515> .
<http://www.wikidata.org/entity/statement/A1> <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#NormalRank> .
<http://www.wikidata.org/entity/Q1055> <http://www.wikidata.org/prop/P31> <http://www.wikidata.org/entity/statement/A2> .
<http://www.wikidata.org/entity/statement/A2> <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q515> .
<http://www.wikidata.org/entity/statement/A2> <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#NormalRank> .
<http://www.wikidata.org/entity/statement/A2> <http://www.wikidata.org/prop/qualifier/P642> <http://www.wikidata.org/entity/Q183> .
<http://www.wikidata.org/entity/Q1055> <http://www.w3.org/2000/01/rdf-schema#label> "Hamburg"@en .
<http://www.wikidata.org/entity/Q1055> <http://www.w3.org/2004/02/skos/core#altLabel> "HH"@en .
"#;

const SOURCE_B: &str = r#"
<http://www.wikidata.org/entity/Q1055> <http://www.wikidata.org/prop/P31> <http://www.wikidata.org/entity/statement/B1> .
<http://www.wikidata.org/entity/statement/B1> <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q515> .
<http://www.wikidata.org/entity/statement/B1> <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#NormalRank> .
<http://www.wikidata.org/entity/statement/B1> <http://www.w3.org/ns/prov#wasDerivedFrom> <http://www.wikidata.org/reference/B2> .
<http://www.wikidata.org/reference/B2> <http://www.wikidata.org/prop/reference/P143> <http://www.wikidata.org/entity/Q48183> .
<http://www.wikidata.org/entity/Q1055> <http://www.wikidata.org/prop/P31> <http://www.wikidata.org/entity/statement/B3> .
<http://www.wikidata.org/entity/statement/B3> <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q1549591> .
<http://www.wikidata.org/entity/statement/B3> <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#PreferredRank> .
<http://www.wikidata.org/entity/Q1055> <http://www.w3.org/2000/01/rdf-schema#label> "Free and Hanseatic City of Hamburg"@en .
<http://www.wikidata.org/entity/Q1055> <http://www.w3.org/2004/02/skos/core#altLabel> "HH"@en .
<http://www.wikidata.org/entity/Q1055> <http://www.w3.org/2004/02/skos/core#altLabel> "Hansestadt"@en .
<http://www.wikidata.org/entity/Q1055> <http://schema.org/description> "city in Germany"@en .
"#;

const SOURCE_C: &str = r#"
<http://www.wikidata.org/entity/Q90> <http://www.wikidata.org/prop/P31> <http://www.wikidata.org/entity/statement/C1> .
<http://www.wikidata.org/entity/statement/C1> <http://www.wikidata.org/prop/statement/P31> <http://www.wikidata.org/entity/Q515> .
<http://www.wikidata.org/entity/statement/C1> <http://wikiba.se/ontology#rank> <http://wikiba.se/ontology#NormalRank> .
"#;

fn graph_store(nt: &str) -> Arc<dyn Store> {
    let graph = MemoryGraph::new();
    graph.load(nt.as_bytes(), Format::NTriples).unwrap();
    Arc::new(GraphStore::from_graph(graph).unwrap())
}

fn sources() -> Vec<Arc<dyn Store>> {
    vec![graph_store(SOURCE_A), graph_store(SOURCE_B), graph_store(SOURCE_C)]
}

fn mixer() -> Mixer {
    Mixer::from_arcs(sources(), StoreOptions::default()).unwrap()
}

fn hamburg_city() -> Statement {
    Statement::new(item("Q1055"), Snak::value(prop("P31"), item("Q515")))
}

#[tokio::test]
async fn test_filter_yields_sources_in_order() {
    let mixer = mixer();
    mixer.unset_flag(StoreFlags::BEST_RANK);
    let f = Filter::new().property(prop("P31")).value(item("Q515"));
    let subjects: Vec<Entity> =
        mixer.filter(&f, None, None).unwrap().collect().await.unwrap().into_iter().map(|s| s.subject).collect();
    // no cross-source dedup: Hamburg comes from A and again from B
    assert_eq!(subjects, vec![item("Q64"), item("Q1055"), item("Q1055"), item("Q90")]);
}

#[tokio::test]
async fn test_best_rank_across_sources() {
    let mixer = mixer();
    let f = Filter::new().subject(item("Q1055")).property(prop("P31"));
    let ranked = mixer.filter(&f, None, None).unwrap().collect_ranked().await.unwrap();
    // B's preferred statement outranks the normal ones from A and B
    assert_eq!(
        ranked,
        vec![(Statement::new(item("Q1055"), Snak::value(prop("P31"), item("Q1549591"))), Rank::Preferred)]
    );
}

#[tokio::test]
async fn test_count_is_sum_of_sources() {
    let mixer = mixer();
    let f = Filter::new();
    let mut expected = 0;
    for source in mixer.sources() {
        expected += source.count(&f).await.unwrap();
    }
    assert_eq!(mixer.count(&f).await.unwrap(), expected);
    assert_eq!(expected, 4);
}

#[tokio::test]
async fn test_contains_any_source() {
    let mixer = mixer();
    assert!(mixer.contains(&hamburg_city()).await.unwrap());
    let paris = Statement::new(item("Q90"), Snak::value(prop("P31"), item("Q515")));
    assert!(mixer.contains(&paris).await.unwrap());
    let nowhere = Statement::new(item("Q90"), Snak::value(prop("P31"), item("Q5")));
    assert!(!mixer.contains(&nowhere).await.unwrap());
}

#[tokio::test]
async fn test_annotations_union_across_sources() {
    let mixer = mixer();
    let out = mixer.get_annotations(vec![hamburg_city()]).unwrap().collect().await.unwrap();
    let records = out[0].1.clone().unwrap();
    assert_eq!(records.len(), 2);

    let of: Vec<_> = records.iter().filter(|r| !r.qualifiers.is_empty()).collect();
    assert_eq!(of.len(), 1);
    assert!(of[0].qualifiers.contains(&Snak::value(prop("P642"), item("Q183"))));
    let sourced: Vec<_> = records.iter().filter(|r| !r.references.is_empty()).collect();
    assert_eq!(sourced.len(), 1);
}

#[tokio::test]
async fn test_descriptor_merge_in_source_order() {
    let mixer = mixer();
    let out = mixer.get_descriptors(&[item("Q1055"), item("Q90")], "en", DescriptorMask::ALL).await.unwrap();
    let hamburg = out[0].1.clone().unwrap();
    assert_eq!(hamburg.label, Some(Text::new("Hamburg", "en")));
    assert_eq!(hamburg.aliases, vec![Text::new("HH", "en"), Text::new("Hansestadt", "en")]);
    assert_eq!(hamburg.description, Some(Text::new("city in Germany", "en")));
    assert_eq!(out[1].1, None);

    let masked = mixer.get_descriptors(&[item("Q1055")], "en", DescriptorMask::ALIASES).await.unwrap();
    let hamburg = masked[0].1.clone().unwrap();
    assert_eq!(hamburg.label, None);
    assert_eq!(hamburg.description, None);
    assert_eq!(hamburg.aliases.len(), 2);
}

#[tokio::test]
async fn test_composite_resolved_across_sources() {
    // A says Hamburg is a city; B gives it a preferred rank as a city-state.
    let mixer = mixer();
    let f = Filter::new()
        .subject(Selector::with(prop("P31"), item("Q515")).and(prop("P31"), item("Q1549591")))
        .property(prop("P31"));
    let subjects: Vec<Entity> =
        mixer.filter(&f, None, None).unwrap().collect().await.unwrap().into_iter().map(|s| s.subject).collect();
    assert_eq!(subjects, vec![item("Q1055")]);
}

#[tokio::test]
async fn test_nested_mixers() {
    let inner: Arc<dyn Store> = Arc::new(Mixer::from_arcs(sources()[..2].to_vec(), StoreOptions::default()).unwrap());
    let outer = Mixer::from_arcs(vec![inner, graph_store(SOURCE_C)], StoreOptions::default()).unwrap();
    assert_eq!(outer.count(&Filter::new()).await.unwrap(), 4);
}

#[tokio::test]
async fn test_child_default_limits_do_not_truncate() {
    let sources = sources();
    for source in &sources {
        source.update_options(&mut |o| o.limit = Some(1));
    }
    let mixer = Mixer::from_arcs(sources, StoreOptions::default()).unwrap();
    mixer.unset_flag(StoreFlags::BEST_RANK);

    let f = Filter::new().property(prop("P31")).value(item("Q515"));
    assert_eq!(mixer.filter(&f, None, None).unwrap().collect().await.unwrap().len(), 4);

    let f = Filter::new()
        .subject(Selector::with(prop("P31"), item("Q515")).and(prop("P31"), item("Q1549591")))
        .property(prop("P31"));
    let subjects: Vec<Entity> =
        mixer.filter(&f, None, None).unwrap().collect().await.unwrap().into_iter().map(|s| s.subject).collect();
    // A's city statement, then B's city and city-state statements
    assert_eq!(subjects, vec![item("Q1055"); 3]);
}
