//! Source vocabulary: how a Wikibase-style RDF graph spells statements.
//!
//! The default layout is Wikidata's:
//!
//! ```text
//! wd:Q42  p:P31  wds:S1 .          # subject → statement node
//! wds:S1  ps:P31 wd:Q5 .           # simple main value
//! wds:S1  psv:P1082 wdv:V1 .       # quantity / time main value node
//! wds:S1  wikibase:rank wikibase:NormalRank .
//! wds:S1  pq:P580 "..."^^xsd:dateTime .
//! wds:S1  prov:wasDerivedFrom wdref:R1 .
//! wdref:R1 pr:P248 wd:Q36578 .
//! wd:Q42  wdt:P31 wd:Q5 .          # truthy shortcut
//! wds:S2  a wdno:P40 .             # no-value main snak
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{Entity, EntityKind, Rank};

/// Fixed IRIs outside the per-property prefixes.
pub mod ns {
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
    pub const SKOS_ALT_LABEL: &str = "http://www.w3.org/2004/02/skos/core#altLabel";
    pub const SCHEMA_DESCRIPTION: &str = "http://schema.org/description";
    pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";
    pub const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";

    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

    pub const WIKIBASE: &str = "http://wikiba.se/ontology#";
    pub const WIKIBASE_RANK: &str = "http://wikiba.se/ontology#rank";
    pub const WIKIBASE_PREFERRED_RANK: &str = "http://wikiba.se/ontology#PreferredRank";
    pub const WIKIBASE_NORMAL_RANK: &str = "http://wikiba.se/ontology#NormalRank";
    pub const WIKIBASE_DEPRECATED_RANK: &str = "http://wikiba.se/ontology#DeprecatedRank";
    pub const WIKIBASE_PROPERTY_TYPE: &str = "http://wikiba.se/ontology#propertyType";
    pub const WIKIBASE_EXTERNAL_ID: &str = "http://wikiba.se/ontology#ExternalId";
    pub const WIKIBASE_QUANTITY_AMOUNT: &str = "http://wikiba.se/ontology#quantityAmount";
    pub const WIKIBASE_QUANTITY_UNIT: &str = "http://wikiba.se/ontology#quantityUnit";
    pub const WIKIBASE_QUANTITY_LOWER_BOUND: &str = "http://wikiba.se/ontology#quantityLowerBound";
    pub const WIKIBASE_QUANTITY_UPPER_BOUND: &str = "http://wikiba.se/ontology#quantityUpperBound";
    pub const WIKIBASE_TIME_VALUE: &str = "http://wikiba.se/ontology#timeValue";
    pub const WIKIBASE_TIME_PRECISION: &str = "http://wikiba.se/ontology#timePrecision";
    pub const WIKIBASE_TIME_TIMEZONE: &str = "http://wikiba.se/ontology#timeTimezone";
    pub const WIKIBASE_TIME_CALENDAR_MODEL: &str = "http://wikiba.se/ontology#timeCalendarModel";
}

/// Per-property predicate families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateFamily {
    /// `p:` subject → statement node
    Claim,
    /// `ps:` statement node → simple value
    StatementValue,
    /// `psv:` statement node → value node
    StatementValueNode,
    /// `pq:` qualifier simple value
    Qualifier,
    /// `pqv:` qualifier value node
    QualifierValueNode,
    /// `pr:` reference simple value
    Reference,
    /// `prv:` reference value node
    ReferenceValueNode,
    /// `wdt:` truthy shortcut
    Direct,
    /// `wdno:` no-value class
    NoValue,
}

/// IRI layout of a Wikibase-style source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub entity: String,
    pub claim: String,
    pub statement_value: String,
    pub statement_value_node: String,
    pub qualifier: String,
    pub qualifier_value_node: String,
    pub reference: String,
    pub reference_value_node: String,
    pub direct: String,
    pub no_value: String,
    /// Property whose statements are also searched as `owl:sameAs` links.
    pub same_as_property: Option<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::wikidata()
    }
}

impl Vocabulary {
    pub fn wikidata() -> Self {
        Self::with_base("http://www.wikidata.org/")
    }

    /// Wikibase layout rooted at `base` (`{base}entity/`, `{base}prop/…`).
    pub fn with_base(base: &str) -> Self {
        Self {
            entity: format!("{base}entity/"),
            claim: format!("{base}prop/"),
            statement_value: format!("{base}prop/statement/"),
            statement_value_node: format!("{base}prop/statement/value/"),
            qualifier: format!("{base}prop/qualifier/"),
            qualifier_value_node: format!("{base}prop/qualifier/value/"),
            reference: format!("{base}prop/reference/"),
            reference_value_node: format!("{base}prop/reference/value/"),
            direct: format!("{base}prop/direct/"),
            no_value: format!("{base}prop/novalue/"),
            same_as_property: Some(format!("{base}entity/P460")),
        }
    }

    pub fn prefix(&self, family: PredicateFamily) -> &str {
        match family {
            PredicateFamily::Claim => &self.claim,
            PredicateFamily::StatementValue => &self.statement_value,
            PredicateFamily::StatementValueNode => &self.statement_value_node,
            PredicateFamily::Qualifier => &self.qualifier,
            PredicateFamily::QualifierValueNode => &self.qualifier_value_node,
            PredicateFamily::Reference => &self.reference,
            PredicateFamily::ReferenceValueNode => &self.reference_value_node,
            PredicateFamily::Direct => &self.direct,
            PredicateFamily::NoValue => &self.no_value,
        }
    }

    /// `prefix(family) + local`.
    pub fn predicate(&self, family: PredicateFamily, local: &str) -> String {
        format!("{}{local}", self.prefix(family))
    }

    /// Split a predicate IRI into its family and property local name.
    ///
    /// Longer prefixes are tried first: `prop/statement/value/` also starts
    /// with `prop/statement/` and `prop/`.
    pub fn classify_predicate<'a>(&self, iri: &'a str) -> Option<(PredicateFamily, &'a str)> {
        const ORDER: [PredicateFamily; 9] = [
            PredicateFamily::StatementValueNode,
            PredicateFamily::QualifierValueNode,
            PredicateFamily::ReferenceValueNode,
            PredicateFamily::StatementValue,
            PredicateFamily::Qualifier,
            PredicateFamily::Reference,
            PredicateFamily::Direct,
            PredicateFamily::NoValue,
            PredicateFamily::Claim,
        ];
        let mut families = ORDER.to_vec();
        families.sort_by_key(|f| std::cmp::Reverse(self.prefix(*f).len()));
        families.into_iter().find_map(|family| {
            iri.strip_prefix(self.prefix(family))
                .filter(|local| !local.is_empty() && !local.contains('/'))
                .map(|local| (family, local))
        })
    }

    /// Local name of an entity IRI in this vocabulary.
    pub fn entity_local<'a>(&self, iri: &'a str) -> Option<&'a str> {
        iri.strip_prefix(self.entity.as_str()).filter(|l| !l.is_empty())
    }

    pub fn entity_iri(&self, local: &str) -> String {
        format!("{}{local}", self.entity)
    }

    /// Build an entity from an IRI, deriving its kind from the local name:
    /// `P…` property, `L…` lexeme, anything else an item.
    pub fn entity(&self, iri: &str) -> Entity {
        let kind = match self.entity_local(iri).and_then(|l| l.chars().next()) {
            Some('P') => EntityKind::Property,
            Some('L') => EntityKind::Lexeme,
            _ => EntityKind::Item,
        };
        Entity::new(kind, iri)
    }

    pub fn property(&self, local: &str) -> Entity {
        Entity::property(self.entity_iri(local))
    }

    /// Whether `property` lives in this vocabulary's entity namespace and
    /// so has `p:`/`ps:`/`wdt:` predicates.
    pub fn is_wikibase_property(&self, property: &Entity) -> bool {
        property.is_property() && self.entity_local(property.iri()).is_some()
    }

    pub fn is_same_as_property(&self, property: &Entity) -> bool {
        self.same_as_property.as_deref() == Some(property.iri())
    }

    pub fn rank_iri(rank: Rank) -> &'static str {
        match rank {
            Rank::Preferred => ns::WIKIBASE_PREFERRED_RANK,
            Rank::Normal => ns::WIKIBASE_NORMAL_RANK,
            Rank::Deprecated => ns::WIKIBASE_DEPRECATED_RANK,
        }
    }

    pub fn rank_from_iri(iri: &str) -> Option<Rank> {
        match iri {
            ns::WIKIBASE_PREFERRED_RANK => Some(Rank::Preferred),
            ns::WIKIBASE_NORMAL_RANK => Some(Rank::Normal),
            ns::WIKIBASE_DEPRECATED_RANK => Some(Rank::Deprecated),
            _ => None,
        }
    }
}
