//! Mapping compiler: turns a [`Filter`] into native query fragments.
//!
//! The compiler is backend-agnostic. A [`RuleTable`] is built once from
//! registered rules; compiling a filter unifies it with every rule
//! applicable to the filter's shape and collects what the rule bodies
//! emit.
//!
//! ```text
//! Filter ──effective selectors──▶ shape ──▶ candidate rules (by priority)
//!        ──arg checks──▶ rule body ──emit──▶ Fragment { query, decoder, rank }
//! ```

pub mod decode;
pub mod rules;

use smallvec::SmallVec;

use crate::model::{Entity, Filter, Rank, Selector, Slot, SnakKind, SnakMask, Value};
use crate::native::NativeQuery;
use crate::vocab::Vocabulary;
use crate::{Error, Result};

pub use decode::{decode_row, term_value, Candidate, Decoded, Decoder, RawValue};
pub use rules::default_rules;

/// Per-variable predicate on bound values.
pub type ArgCheck = fn(&Value, &Vocabulary) -> bool;

/// Rule body: inspect bindings, emit zero or more fragments.
pub type RuleBody = fn(&mut CompileContext<'_>, &Bindings<'_>) -> Result<()>;

/// Rules are tried in ascending priority, then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Default,
    Low,
}

/// How a rule's pattern constrains one filter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPattern {
    /// Matches a wildcard or a concrete selector, binding the variable to
    /// whatever is there.
    Free(&'static str),
    /// Matches only a concrete selector.
    Bound(&'static str),
    /// Matches only a wildcard.
    Wildcard,
}

impl SlotPattern {
    pub fn var(self) -> Option<&'static str> {
        match self {
            SlotPattern::Free(v) | SlotPattern::Bound(v) => Some(v),
            SlotPattern::Wildcard => None,
        }
    }

    fn accepts(self, concrete: bool) -> bool {
        match self {
            SlotPattern::Free(_) => true,
            SlotPattern::Bound(_) => concrete,
            SlotPattern::Wildcard => !concrete,
        }
    }
}

/// A rule's filter pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub subject: SlotPattern,
    pub property: SlotPattern,
    pub value: SlotPattern,
}

impl Pattern {
    pub fn slot(&self, slot: Slot) -> SlotPattern {
        match slot {
            Slot::Subject => self.subject,
            Slot::Property => self.property,
            Slot::Value => self.value,
        }
    }

    fn slot_of(&self, var: &str) -> Option<Slot> {
        SLOTS.into_iter().find(|s| self.slot(*s).var() == Some(var))
    }

    fn accepts(&self, shape: usize) -> bool {
        SLOTS
            .into_iter()
            .enumerate()
            .all(|(bit, slot)| self.slot(slot).accepts(shape & (1 << bit) != 0))
    }
}

const SLOTS: [Slot; 3] = [Slot::Subject, Slot::Property, Slot::Value];

/// Which of the three slots hold a concrete selector, as a 3-bit index.
fn shape_of(filter: &Filter) -> usize {
    SLOTS
        .into_iter()
        .enumerate()
        .filter(|(_, slot)| !filter.selector(*slot).is_any())
        .fold(0, |acc, (bit, _)| acc | (1 << bit))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

/// A registered mapping rule.
#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub pattern: Pattern,
    pub checks: Vec<(&'static str, ArgCheck)>,
    pub priority: Priority,
    /// Rank attributed to statements whose row carries no rank.
    pub rank: Rank,
    body: RuleBody,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("checks", &self.checks.iter().map(|(v, _)| *v).collect::<Vec<_>>())
            .field("priority", &self.priority)
            .field("rank", &self.rank)
            .finish()
    }
}

// ============================================================================
// Rule table
// ============================================================================

#[derive(Debug, Default)]
pub struct RuleTableBuilder {
    rules: Vec<Rule>,
}

impl RuleTableBuilder {
    /// Register a rule. Every checked variable must occur in the pattern.
    pub fn register(
        &mut self,
        name: &'static str,
        pattern: Pattern,
        checks: &[(&'static str, ArgCheck)],
        priority: Priority,
        rank: Rank,
        body: RuleBody,
    ) -> Result<RuleId> {
        if let Some((var, _)) = checks.iter().find(|(v, _)| pattern.slot_of(v).is_none()) {
            return Err(Error::Construction(format!("rule {name}: check on unknown variable ?{var}")));
        }
        let id = RuleId(self.rules.len());
        self.rules.push(Rule { name, pattern, checks: checks.to_vec(), priority, rank, body });
        Ok(id)
    }

    pub fn build(self) -> RuleTable {
        let mut by_shape: [Vec<usize>; 8] = Default::default();
        for (shape, candidates) in by_shape.iter_mut().enumerate() {
            candidates.extend((0..self.rules.len()).filter(|&i| self.rules[i].pattern.accepts(shape)));
            // stable: registration order within a priority
            candidates.sort_by_key(|&i| self.rules[i].priority);
        }
        RuleTable { rules: self.rules, by_shape }
    }
}

/// Immutable set of rules, indexed by filter shape.
#[derive(Debug)]
pub struct RuleTable {
    rules: Vec<Rule>,
    by_shape: [Vec<usize>; 8],
}

impl RuleTable {
    pub fn builder() -> RuleTableBuilder {
        RuleTableBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    /// Rules whose pattern accepts `filter`'s shape, in priority order.
    pub fn candidates(&self, filter: &Filter) -> impl Iterator<Item = &Rule> {
        self.by_shape[shape_of(filter)].iter().map(|&i| &self.rules[i])
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// What a slot variable is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding<'a> {
    Unbound,
    One(&'a Value),
    Many(SmallVec<[&'a Value; 4]>),
}

impl<'a> Binding<'a> {
    fn of(selector: &'a Selector) -> Self {
        match selector.values() {
            None => Binding::Unbound,
            Some([one]) => Binding::One(one),
            Some(many) => Binding::Many(many.iter().collect()),
        }
    }

    pub fn values(&self) -> SmallVec<[&'a Value; 4]> {
        match self {
            Binding::Unbound => SmallVec::new(),
            Binding::One(v) => SmallVec::from_elem(*v, 1),
            Binding::Many(vs) => vs.clone(),
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &'a Entity> + '_ {
        self.values().into_iter().filter_map(Value::as_entity)
    }

    /// The single entity this binding pins, if any.
    pub fn one_entity(&self) -> Option<&'a Entity> {
        match self {
            Binding::One(v) => v.as_entity(),
            _ => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self, Binding::Unbound)
    }

    /// Keep the values passing `keep`; `None` when a bound slot loses all.
    fn narrow(self, keep: impl Fn(&Value) -> bool) -> Option<Self> {
        match self {
            Binding::Unbound => Some(Binding::Unbound),
            Binding::One(v) => keep(v).then_some(Binding::One(v)),
            Binding::Many(vs) => {
                let kept: SmallVec<[&Value; 4]> = vs.into_iter().filter(|v| keep(v)).collect();
                match kept.len() {
                    0 => None,
                    1 => Some(Binding::One(kept[0])),
                    _ => Some(Binding::Many(kept)),
                }
            }
        }
    }
}

/// Slot bindings handed to a rule body.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings<'a> {
    pub subject: Binding<'a>,
    pub property: Binding<'a>,
    pub value: Binding<'a>,
}

impl<'a> Bindings<'a> {
    fn of(filter: &'a Filter) -> Self {
        Self {
            subject: Binding::of(&filter.subject),
            property: Binding::of(&filter.property),
            value: Binding::of(&filter.value),
        }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Binding<'a> {
        match slot {
            Slot::Subject => &mut self.subject,
            Slot::Property => &mut self.property,
            Slot::Value => &mut self.value,
        }
    }

    /// Apply a rule's checks. A set binding keeps the values that pass;
    /// the rule is skipped when a bound variable has none left.
    fn checked(&self, rule: &Rule, vocab: &Vocabulary) -> Option<Self> {
        let mut out = self.clone();
        for (var, check) in &rule.checks {
            let slot = rule.pattern.slot_of(var)?;
            let binding = std::mem::replace(out.slot_mut(slot), Binding::Unbound);
            *out.slot_mut(slot) = binding.narrow(|v| check(v, vocab))?;
        }
        Some(out)
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compiler knobs taken from the store's options and flags.
#[derive(Debug, Clone, Copy)]
pub struct CompileSettings {
    /// Push value-field and snak-mask constraints into native queries.
    pub early_filter: bool,
    /// Largest `OneOf` pushed down as a membership constraint.
    pub max_pushed_candidates: usize,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self { early_filter: true, max_pushed_candidates: 256 }
    }
}

/// One native query plus how to decode its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub rule: &'static str,
    pub rank: Rank,
    pub query: NativeQuery,
    pub decoder: Decoder,
    /// Subject fixed by the filter, when the query does not bind one.
    pub subject: Option<Entity>,
    /// Property fixed by the filter, when the query does not bind one.
    pub property: Option<Entity>,
}

/// Result of compiling a filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub fragments: Vec<Fragment>,
    /// Slots whose selector was not pushed down and must be re-checked on
    /// every candidate regardless of LATE_FILTER.
    pub residual: Vec<Slot>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// State visible to a rule body while it runs.
pub struct CompileContext<'a> {
    pub vocab: &'a Vocabulary,
    pub early_filter: bool,
    /// Snak kinds the emitted queries must produce. All kinds when early
    /// filtering is off.
    pub snak_mask: SnakMask,
    rule: &'a Rule,
    fragments: Vec<Fragment>,
}

impl<'a> CompileContext<'a> {
    pub fn accepts(&self, kind: SnakKind) -> bool {
        self.snak_mask.accepts(kind)
    }

    pub fn emit(
        &mut self,
        query: NativeQuery,
        decoder: Decoder,
        subject: Option<Entity>,
        property: Option<Entity>,
    ) {
        self.fragments.push(Fragment {
            rule: self.rule.name,
            rank: self.rule.rank,
            query,
            decoder,
            subject,
            property,
        });
    }
}

/// Compile `filter` against `table`.
///
/// Composite selectors are expected to be resolved already; any left are
/// compiled as wildcards and reported as residual, as are `OneOf` sets
/// too large to push down.
pub fn compile(
    table: &RuleTable,
    filter: &Filter,
    vocab: &Vocabulary,
    settings: CompileSettings,
) -> Result<Plan> {
    filter.validate()?;
    if filter.is_empty() {
        return Ok(Plan::default());
    }

    let mut effective = filter.clone();
    let mut residual = Vec::new();
    for slot in SLOTS {
        let selector = effective.selector_mut(slot);
        let unpushable = match selector {
            Selector::Composite(_) => true,
            Selector::OneOf(vs) => vs.len() > settings.max_pushed_candidates,
            _ => false,
        };
        if unpushable {
            *selector = Selector::Any;
            residual.push(slot);
        }
    }
    if !settings.early_filter {
        effective.value = Selector::Any;
    }
    let snak_mask = if settings.early_filter { filter.snak_mask } else { SnakMask::ALL };

    let bindings = Bindings::of(&effective);
    let mut fragments = Vec::new();
    for rule in table.candidates(&effective) {
        let Some(checked) = bindings.checked(rule, vocab) else {
            tracing::trace!(rule = rule.name, "argument checks rejected rule");
            continue;
        };
        let mut ctx = CompileContext {
            vocab,
            early_filter: settings.early_filter,
            snak_mask,
            rule,
            fragments: Vec::new(),
        };
        (rule.body)(&mut ctx, &checked)?;
        tracing::trace!(rule = rule.name, emitted = ctx.fragments.len(), "applied rule");
        fragments.extend(ctx.fragments);
    }

    tracing::debug!(fragments = fragments.len(), ?residual, "compiled filter");
    Ok(Plan { fragments, residual })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut CompileContext<'_>, _: &Bindings<'_>) -> Result<()> {
        Ok(())
    }

    fn is_entity(v: &Value, _: &Vocabulary) -> bool {
        v.as_entity().is_some()
    }

    #[test]
    fn test_shape_index() {
        let mut b = RuleTable::builder();
        let any = Pattern { subject: SlotPattern::Free("s"), property: SlotPattern::Free("p"), value: SlotPattern::Free("v") };
        let wildcard_value = Pattern { value: SlotPattern::Wildcard, ..any };
        let bound_prop = Pattern { property: SlotPattern::Bound("p"), ..any };
        b.register("low", any, &[], Priority::Low, Rank::Normal, noop).unwrap();
        b.register("wild", wildcard_value, &[], Priority::Default, Rank::Normal, noop).unwrap();
        b.register("bound", bound_prop, &[], Priority::Default, Rank::Normal, noop).unwrap();
        let table = b.build();

        let names = |f: &Filter| table.candidates(f).map(|r| r.name).collect::<Vec<_>>();
        assert_eq!(names(&Filter::new()), vec!["wild", "low"]);
        let p = Entity::property("http://www.wikidata.org/entity/P31");
        assert_eq!(names(&Filter::new().property(p.clone())), vec!["wild", "bound", "low"]);
        let q = Entity::item("http://www.wikidata.org/entity/Q5");
        assert_eq!(names(&Filter::new().property(p).value(q)), vec!["bound", "low"]);
    }

    #[test]
    fn test_register_rejects_unknown_check_var() {
        let mut b = RuleTable::builder();
        let pat = Pattern { subject: SlotPattern::Free("s"), property: SlotPattern::Free("p"), value: SlotPattern::Wildcard };
        let err = b.register("bad", pat, &[("v", is_entity)], Priority::Default, Rank::Normal, noop);
        assert!(matches!(err, Err(Error::Construction(_))));
    }

    #[test]
    fn test_checks_narrow_sets() {
        let mut b = RuleTable::builder();
        let pat = Pattern { subject: SlotPattern::Free("s"), property: SlotPattern::Free("p"), value: SlotPattern::Free("v") };
        b.register("entities", pat, &[("v", is_entity)], Priority::Default, Rank::Normal, noop).unwrap();
        let table = b.build();
        let vocab = Vocabulary::wikidata();
        let filter = Filter::new().value(Selector::OneOf(vec![
            Value::ExternalId("x".into()),
            Value::Entity(Entity::item("http://www.wikidata.org/entity/Q5")),
        ]));
        let rule = table.candidates(&filter).next().unwrap();
        let checked = Bindings::of(&filter).checked(rule, &vocab).unwrap();
        assert!(matches!(checked.value, Binding::One(Value::Entity(_))));

        let only_ids = Filter::new().value(Value::ExternalId("x".into()));
        assert!(Bindings::of(&only_ids).checked(rule, &vocab).is_none());
    }

    #[test]
    fn test_oversized_one_of_is_residual() {
        let table = default_rules().unwrap();
        let vocab = Vocabulary::wikidata();
        let subjects = (0..5)
            .map(|i| Value::Entity(Entity::item(format!("http://www.wikidata.org/entity/Q{i}"))))
            .collect();
        let filter = Filter::new().subject(Selector::OneOf(subjects));
        let settings = CompileSettings { early_filter: true, max_pushed_candidates: 3 };
        let plan = compile(&table, &filter, &vocab, settings).unwrap();
        assert_eq!(plan.residual, vec![Slot::Subject]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_empty_filter_compiles_to_nothing() {
        let table = default_rules().unwrap();
        let vocab = Vocabulary::wikidata();
        let plan = compile(&table, &Filter::new().snak_mask(SnakMask::NONE), &vocab, CompileSettings::default()).unwrap();
        assert!(plan.is_empty());
    }
}
