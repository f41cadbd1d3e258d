//! Built-in mapping rules for Wikibase-shaped RDF.
//!
//! | Rule | Priority | Statements from |
//! |------|----------|-----------------|
//! | `statement_simple` | Default | `p:` / `ps:` reified statements |
//! | `statement_quantity` | Default | `psv:` quantity value nodes |
//! | `statement_time` | Default | `psv:` time value nodes |
//! | `statement_no_value` | Default | `wdno:` classes |
//! | `truthy` | Low | `wdt:` triples of unreified (subject, property) pairs |
//! | `plain_triple` | Low | any predicate outside the Wikibase namespace |
//! | `same_as` | Low | `owl:sameAs` for the configured same-as property |

use crate::model::{Entity, Quantity, Rank, SnakKind, Time, Value};
use crate::native::{Constraint, NativeQuery, PatternTerm, Term, TriplePattern, Var};
use crate::vocab::{ns, PredicateFamily, Vocabulary};
use crate::Result;

use super::{Binding, Bindings, CompileContext, Decoder, Pattern, Priority, RuleTable, SlotPattern};

/// Variable names shared by rule bodies and the row decoder.
pub mod vars {
    pub const SUBJECT: &str = "subject";
    pub const PROPERTY: &str = "property";
    pub const STMT: &str = "stmt";
    pub const VALUE: &str = "value";
    pub const RANK: &str = "rank";
    pub const NODE: &str = "node";
    pub const AMOUNT: &str = "amount";
    pub const UNIT: &str = "unit";
    pub const LOWER: &str = "lower";
    pub const UPPER: &str = "upper";
    pub const TIME: &str = "time";
    pub const PRECISION: &str = "precision";
    pub const TIMEZONE: &str = "timezone";
    pub const CALENDAR: &str = "calendar";
}

use vars::*;

/// The rule table used by graph stores unless one is supplied.
pub fn default_rules() -> Result<RuleTable> {
    let mut t = RuleTable::builder();
    let statement = Pattern {
        subject: SlotPattern::Free(SUBJECT),
        property: SlotPattern::Free(PROPERTY),
        value: SlotPattern::Free(VALUE),
    };
    t.register(
        "statement_simple",
        statement,
        &[(PROPERTY, is_wikibase_property), (VALUE, is_simple_value)],
        Priority::Default,
        Rank::Normal,
        statement_simple,
    )?;
    t.register(
        "statement_quantity",
        statement,
        &[(PROPERTY, is_wikibase_property), (VALUE, is_quantity)],
        Priority::Default,
        Rank::Normal,
        statement_quantity,
    )?;
    t.register(
        "statement_time",
        statement,
        &[(PROPERTY, is_wikibase_property), (VALUE, is_time)],
        Priority::Default,
        Rank::Normal,
        statement_time,
    )?;
    t.register(
        "statement_no_value",
        Pattern { value: SlotPattern::Wildcard, ..statement },
        &[(PROPERTY, is_wikibase_property)],
        Priority::Default,
        Rank::Normal,
        statement_no_value,
    )?;

    let bound_property = Pattern { property: SlotPattern::Bound(PROPERTY), ..statement };
    t.register(
        "truthy",
        bound_property,
        &[(PROPERTY, is_wikibase_property)],
        Priority::Low,
        Rank::Normal,
        truthy,
    )?;
    t.register(
        "plain_triple",
        bound_property,
        &[(PROPERTY, is_plain_property)],
        Priority::Low,
        Rank::Normal,
        plain_triple,
    )?;
    t.register(
        "same_as",
        bound_property,
        &[(PROPERTY, is_same_as_property), (VALUE, is_entity)],
        Priority::Low,
        Rank::Normal,
        same_as,
    )?;
    Ok(t.build())
}

// ============================================================================
// Argument checks
// ============================================================================

fn is_wikibase_property(v: &Value, vocab: &Vocabulary) -> bool {
    v.as_entity().is_some_and(|e| vocab.is_wikibase_property(e))
}

fn is_plain_property(v: &Value, vocab: &Vocabulary) -> bool {
    v.as_entity().is_some_and(|e| e.is_property() && !vocab.is_wikibase_property(e))
}

fn is_same_as_property(v: &Value, vocab: &Vocabulary) -> bool {
    v.as_entity().is_some_and(|e| vocab.is_same_as_property(e))
}

fn is_entity(v: &Value, _: &Vocabulary) -> bool {
    matches!(v, Value::Entity(_))
}

fn is_simple_value(v: &Value, _: &Vocabulary) -> bool {
    matches!(v, Value::Entity(_) | Value::Text(_) | Value::ExternalId(_))
}

fn is_quantity(v: &Value, _: &Vocabulary) -> bool {
    matches!(v, Value::Quantity(_))
}

fn is_time(v: &Value, _: &Vocabulary) -> bool {
    matches!(v, Value::Time(_))
}

// ============================================================================
// Shared query pieces
// ============================================================================

fn var(name: &str) -> PatternTerm {
    PatternTerm::var(name)
}

fn triple(s: PatternTerm, p: PatternTerm, o: PatternTerm) -> TriplePattern {
    TriplePattern { subject: s, predicate: p, object: o }
}

fn subject_term(q: &mut NativeQuery, binding: &Binding<'_>) -> PatternTerm {
    if let Some(e) = binding.one_entity() {
        return PatternTerm::iri(e.iri());
    }
    if let Binding::Many(_) = binding {
        let iris = binding.entities().map(|e| Term::iri(e.iri())).collect();
        q.constrain(Constraint::In(Var::new(SUBJECT), iris));
    }
    var(SUBJECT)
}

/// Predicate of `family` for the bound property, or a variable decomposed
/// into `?property` when the property is open or a set.
fn property_predicate(
    q: &mut NativeQuery,
    vocab: &Vocabulary,
    family: PredicateFamily,
    binding: &Binding<'_>,
    pred_var: &str,
) -> PatternTerm {
    if let Some(local) = binding.one_entity().and_then(|e| vocab.entity_local(e.iri())) {
        return PatternTerm::iri(vocab.predicate(family, local));
    }
    q.bind(pred_var, vocab.prefix(family), PROPERTY);
    if let Binding::Many(_) = binding {
        let locals = binding
            .entities()
            .filter_map(|e| vocab.entity_local(e.iri()))
            .map(Term::plain)
            .collect();
        q.constrain(Constraint::In(Var::new(PROPERTY), locals));
    }
    var(pred_var)
}

fn simple_term(v: &Value) -> Option<Term> {
    match v {
        Value::Entity(e) => Some(Term::iri(e.iri())),
        Value::Text(t) => Some(match &t.language {
            Some(lang) => Term::lang(t.content.as_str(), lang.as_str()),
            None => Term::plain(t.content.as_str()),
        }),
        Value::ExternalId(id) => Some(Term::plain(id.as_str())),
        Value::Quantity(_) | Value::Time(_) => None,
    }
}

/// Term for a value as a direct triple object: quantities and times
/// collapse to their amount or date.
fn direct_term(v: &Value) -> Option<Term> {
    match v {
        Value::Quantity(q) => Some(Term::decimal(&q.amount)),
        Value::Time(t) => Some(Term::typed(t.lexical_date(), ns::XSD_DATE_TIME)),
        other => simple_term(other),
    }
}

/// Constrain `?value` to the bound value(s), or by snak mask when open.
/// Returns false when the mask leaves nothing for this query to produce.
fn constrain_value(
    q: &mut NativeQuery,
    ctx: &CompileContext<'_>,
    binding: &Binding<'_>,
    encode: fn(&Value) -> Option<Term>,
) -> bool {
    let value_ok = ctx.accepts(SnakKind::Value);
    let some_ok = ctx.accepts(SnakKind::SomeValue);
    match binding {
        Binding::One(v) => {
            if let Some(t) = encode(v) {
                q.constrain(Constraint::Eq(Var::new(VALUE), t));
            }
            value_ok
        }
        Binding::Many(vs) => {
            let terms = vs.iter().filter_map(|v| encode(v)).collect();
            q.constrain(Constraint::In(Var::new(VALUE), terms));
            value_ok
        }
        Binding::Unbound => {
            if value_ok && !some_ok {
                q.constrain(Constraint::NotBlank(Var::new(VALUE)));
            } else if some_ok && !value_ok {
                q.constrain(Constraint::IsBlank(Var::new(VALUE)));
            }
            value_ok || some_ok
        }
    }
}

fn rank_pattern(q: &mut NativeQuery) {
    q.pattern(var(STMT), PatternTerm::iri(ns::WIKIBASE_RANK), var(RANK));
}

/// Subject and property pinned by the filter, carried on the fragment.
fn fixed(b: &Bindings<'_>) -> (Option<Entity>, Option<Entity>) {
    (b.subject.one_entity().cloned(), b.property.one_entity().cloned())
}

// ============================================================================
// Reified statements
// ============================================================================

fn statement_simple(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    let mut q = NativeQuery::new();
    if !constrain_value(&mut q, ctx, &b.value, simple_term) {
        return Ok(());
    }
    let s = subject_term(&mut q, &b.subject);
    let claim = property_predicate(&mut q, ctx.vocab, PredicateFamily::Claim, &b.property, "claim_pred");
    let ps = property_predicate(&mut q, ctx.vocab, PredicateFamily::StatementValue, &b.property, "value_pred");
    q.pattern(s, claim, var(STMT));
    q.pattern(var(STMT), ps, var(VALUE));
    rank_pattern(&mut q);
    // quantity and time main values are read from their value nodes
    q.constrain(Constraint::NotTyped(
        Var::new(VALUE),
        vec![ns::XSD_DECIMAL.into(), ns::XSD_INTEGER.into(), ns::XSD_DATE_TIME.into()],
    ));
    let (subject, property) = fixed(b);
    ctx.emit(q, Decoder::Simple, subject, property);
    Ok(())
}

fn value_node_query(ctx: &CompileContext<'_>, b: &Bindings<'_>, q: &mut NativeQuery) {
    let s = subject_term(q, &b.subject);
    let claim = property_predicate(q, ctx.vocab, PredicateFamily::Claim, &b.property, "claim_pred");
    let psv = property_predicate(q, ctx.vocab, PredicateFamily::StatementValueNode, &b.property, "value_pred");
    q.pattern(s, claim, var(STMT));
    q.pattern(var(STMT), psv, var(NODE));
    rank_pattern(q);
}

fn optional(q: &mut NativeQuery, predicate: &str, object: &str) {
    q.optional(vec![triple(var(NODE), PatternTerm::iri(predicate), var(object))]);
}

fn quantity_constraints(quantity: &Quantity) -> Vec<Constraint> {
    let mut cs = vec![Constraint::Eq(Var::new(AMOUNT), Term::decimal(&quantity.amount))];
    if let Some(unit) = &quantity.unit {
        cs.push(Constraint::Eq(Var::new(UNIT), Term::iri(unit.iri())));
    }
    if let Some(lower) = &quantity.lower_bound {
        cs.push(Constraint::Eq(Var::new(LOWER), Term::decimal(lower)));
    }
    if let Some(upper) = &quantity.upper_bound {
        cs.push(Constraint::Eq(Var::new(UPPER), Term::decimal(upper)));
    }
    cs
}

fn time_constraints(time: &Time) -> Vec<Constraint> {
    let mut cs = vec![Constraint::Eq(Var::new(TIME), Term::typed(time.lexical_date(), ns::XSD_DATE_TIME))];
    if let Some(precision) = time.precision {
        cs.push(Constraint::Eq(Var::new(PRECISION), Term::integer(i64::from(precision.code()))));
    }
    if let Some(tz) = time.timezone {
        cs.push(Constraint::Eq(Var::new(TIMEZONE), Term::integer(i64::from(tz))));
    }
    if let Some(calendar) = &time.calendar {
        cs.push(Constraint::Eq(Var::new(CALENDAR), Term::iri(calendar.iri())));
    }
    cs
}

/// Push field-wise constraints for bound values of one kind.
fn constrain_fields(q: &mut NativeQuery, binding: &Binding<'_>, fields: impl Fn(&Value) -> Option<Vec<Constraint>>) {
    let alternatives: Vec<Vec<Constraint>> = binding.values().into_iter().filter_map(|v| fields(v)).collect();
    match alternatives.len() {
        0 => {}
        1 => alternatives.into_iter().flatten().for_each(|c| {
            q.constrain(c);
        }),
        _ => {
            q.constrain(Constraint::AnyOf(alternatives));
        }
    }
}

fn statement_quantity(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    if !ctx.accepts(SnakKind::Value) {
        return Ok(());
    }
    let mut q = NativeQuery::new();
    value_node_query(ctx, b, &mut q);
    q.pattern(var(NODE), PatternTerm::iri(ns::WIKIBASE_QUANTITY_AMOUNT), var(AMOUNT));
    optional(&mut q, ns::WIKIBASE_QUANTITY_UNIT, UNIT);
    optional(&mut q, ns::WIKIBASE_QUANTITY_LOWER_BOUND, LOWER);
    optional(&mut q, ns::WIKIBASE_QUANTITY_UPPER_BOUND, UPPER);
    constrain_fields(&mut q, &b.value, |v| match v {
        Value::Quantity(quantity) => Some(quantity_constraints(quantity)),
        _ => None,
    });
    let (subject, property) = fixed(b);
    ctx.emit(q, Decoder::Quantity, subject, property);
    Ok(())
}

fn statement_time(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    if !ctx.accepts(SnakKind::Value) {
        return Ok(());
    }
    let mut q = NativeQuery::new();
    value_node_query(ctx, b, &mut q);
    q.pattern(var(NODE), PatternTerm::iri(ns::WIKIBASE_TIME_VALUE), var(TIME));
    optional(&mut q, ns::WIKIBASE_TIME_PRECISION, PRECISION);
    optional(&mut q, ns::WIKIBASE_TIME_TIMEZONE, TIMEZONE);
    optional(&mut q, ns::WIKIBASE_TIME_CALENDAR_MODEL, CALENDAR);
    constrain_fields(&mut q, &b.value, |v| match v {
        Value::Time(time) => Some(time_constraints(time)),
        _ => None,
    });
    let (subject, property) = fixed(b);
    ctx.emit(q, Decoder::Time, subject, property);
    Ok(())
}

fn statement_no_value(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    if !ctx.accepts(SnakKind::NoValue) {
        return Ok(());
    }
    let mut q = NativeQuery::new();
    let s = subject_term(&mut q, &b.subject);
    let claim = property_predicate(&mut q, ctx.vocab, PredicateFamily::Claim, &b.property, "claim_pred");
    let class = property_predicate(&mut q, ctx.vocab, PredicateFamily::NoValue, &b.property, "novalue_class");
    q.pattern(s, claim, var(STMT));
    q.pattern(var(STMT), PatternTerm::iri(ns::RDF_TYPE), class);
    rank_pattern(&mut q);
    let (subject, property) = fixed(b);
    ctx.emit(q, Decoder::NoValue, subject, property);
    Ok(())
}

// ============================================================================
// Direct triples
// ============================================================================

/// `wdt:` triples, one fragment per property. Pairs that also have a
/// reified statement are left to the statement rules.
fn truthy(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    for property in b.property.entities() {
        let Some(local) = ctx.vocab.entity_local(property.iri()) else { continue };
        let mut q = NativeQuery::new();
        if !constrain_value(&mut q, ctx, &b.value, direct_term) {
            return Ok(());
        }
        let s = subject_term(&mut q, &b.subject);
        q.optional(vec![triple(
            s.clone(),
            PatternTerm::iri(ctx.vocab.predicate(PredicateFamily::Claim, local)),
            var(STMT),
        )]);
        q.pattern(s, PatternTerm::iri(ctx.vocab.predicate(PredicateFamily::Direct, local)), var(VALUE));
        q.constrain(Constraint::Unbound(Var::new(STMT)));
        let subject = b.subject.one_entity().cloned();
        ctx.emit(q, Decoder::Simple, subject, Some(property.clone()));
    }
    Ok(())
}

/// Triples whose predicate is the property IRI itself.
fn plain_triple(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    for property in b.property.entities() {
        let mut q = NativeQuery::new();
        if !constrain_value(&mut q, ctx, &b.value, direct_term) {
            return Ok(());
        }
        let s = subject_term(&mut q, &b.subject);
        q.pattern(s, PatternTerm::iri(property.iri()), var(VALUE));
        let subject = b.subject.one_entity().cloned();
        ctx.emit(q, Decoder::Simple, subject, Some(property.clone()));
    }
    Ok(())
}

/// `owl:sameAs` links read as statements of the same-as property.
fn same_as(ctx: &mut CompileContext<'_>, b: &Bindings<'_>) -> Result<()> {
    let Some(property) = b.property.entities().next().cloned() else {
        return Ok(());
    };
    let mut q = NativeQuery::new();
    if !constrain_value(&mut q, ctx, &b.value, simple_term) {
        return Ok(());
    }
    let s = subject_term(&mut q, &b.subject);
    q.pattern(s, PatternTerm::iri(ns::OWL_SAME_AS), var(VALUE));
    let subject = b.subject.one_entity().cloned();
    ctx.emit(q, Decoder::Simple, subject, Some(property));
    Ok(())
}
