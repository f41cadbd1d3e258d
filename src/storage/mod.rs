//! # Store Trait
//!
//! This is THE contract between callers and any statement source.
//! Every backend answers the same four questions: which statements match
//! a filter, how many there are, what annotations a statement carries, and
//! how an entity is labelled.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `EmptyStore` | `empty` | Knows nothing |
//! | `GraphStore` | `graph` | Wikibase-shaped RDF behind a native endpoint |
//! | `Mixer` | `mixer` | Ordered union of child stores |
//!
//! ## Filter pipeline
//!
//! ```text
//! filter() ─validate─▶ StatementStream (nothing fetched yet)
//! first pull ─▶ resolve composites ─▶ compile ─▶ backend pages
//!            ─▶ late filter ─▶ dedup ─▶ best rank ─▶ limit ─▶ caller
//! ```

pub mod empty;
pub mod graph;
pub mod mixer;
pub mod policy;
pub mod stream;

use std::ops::{BitAnd, BitOr, Not};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Descriptor, DescriptorMask, Entity, Filter, ReferenceRecordSet, Statement};
use crate::native::{Format, MemoryGraph};
use crate::vocab::Vocabulary;
use crate::{Error, Result};

pub use empty::EmptyStore;
pub use graph::GraphStore;
pub use mixer::Mixer;
pub use policy::SharedOptions;
pub use stream::{Annotated, AnnotationCursor, AnnotationStream, BoxCursor, CandidateCursor, StatementStream};

// ============================================================================
// Flags and options
// ============================================================================

/// Store behaviour switches. Defaults to all set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreFlags(u8);

impl StoreFlags {
    /// Push value and snak-mask constraints into native queries.
    pub const EARLY_FILTER: StoreFlags = StoreFlags(1);
    /// Re-check every candidate against the filter in memory.
    pub const LATE_FILTER: StoreFlags = StoreFlags(1 << 1);
    /// Keep only the best-ranked statements per (subject, property).
    pub const BEST_RANK: StoreFlags = StoreFlags(1 << 2);
    pub const ALL: StoreFlags = StoreFlags(0b111);
    pub const NONE: StoreFlags = StoreFlags(0);

    pub fn contains(self, other: StoreFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for StoreFlags {
    fn default() -> Self {
        StoreFlags::ALL
    }
}

impl BitOr for StoreFlags {
    type Output = StoreFlags;
    fn bitor(self, rhs: StoreFlags) -> StoreFlags {
        StoreFlags(self.0 | rhs.0)
    }
}

impl BitAnd for StoreFlags {
    type Output = StoreFlags;
    fn bitand(self, rhs: StoreFlags) -> StoreFlags {
        StoreFlags(self.0 & rhs.0)
    }
}

impl Not for StoreFlags {
    type Output = StoreFlags;
    fn not(self) -> StoreFlags {
        StoreFlags(!self.0 & StoreFlags::ALL.0)
    }
}

/// Per-store settings. Per-call `limit` and `page_size` arguments
/// override the defaults here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    pub flags: StoreFlags,
    /// Rows requested per native query round trip.
    pub page_size: usize,
    /// Default cap on statements per filter call.
    pub limit: Option<usize>,
    /// Reference records appended to every annotation record.
    pub extra_references: ReferenceRecordSet,
    /// Largest candidate set pushed down as a membership constraint.
    pub max_pushed_candidates: usize,
    /// Mixer only: log and skip children that fail instead of failing.
    pub skip_failed_sources: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            flags: StoreFlags::ALL,
            page_size: 100,
            limit: None,
            extra_references: ReferenceRecordSet::new(),
            max_pushed_candidates: 256,
            skip_failed_sources: false,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Construction("page_size must be positive".into()));
        }
        if self.max_pushed_candidates == 0 {
            return Err(Error::Construction("max_pushed_candidates must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// The universal store contract.
///
/// `filter` and `get_annotations` validate their arguments and return a
/// stream without doing I/O; errors from the backend surface from the
/// stream's `next()`. Flag changes apply to calls made after the change.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Backend name as used in configuration.
    fn name(&self) -> &str;

    /// Snapshot of the current options.
    fn options(&self) -> StoreOptions;

    /// Change options in place.
    fn update_options(&self, f: &mut dyn FnMut(&mut StoreOptions));

    fn set_options(&self, options: StoreOptions) -> Result<()> {
        options.validate()?;
        self.update_options(&mut |o| *o = options.clone());
        Ok(())
    }

    fn flags(&self) -> StoreFlags {
        self.options().flags
    }

    fn set_flags(&self, flags: StoreFlags) {
        self.update_options(&mut |o| o.flags = flags);
    }

    fn set_flag(&self, flag: StoreFlags) {
        self.update_options(&mut |o| o.flags = o.flags | flag);
    }

    fn unset_flag(&self, flag: StoreFlags) {
        self.update_options(&mut |o| o.flags = o.flags & !flag);
    }

    /// Statements matching `filter`. `None` falls back to the store's
    /// default limit and page size.
    fn filter(&self, filter: &Filter, limit: Option<usize>, page_size: Option<usize>) -> Result<StatementStream>;

    /// Every statement matching `filter`, with no limit at all: the store's
    /// default limit does not apply. Composite resolution and federation
    /// pull their sub-queries through here.
    fn filter_all(&self, filter: &Filter, page_size: Option<usize>) -> Result<StatementStream>;

    /// Number of statements `filter` yields, ignoring any default limit.
    async fn count(&self, filter: &Filter) -> Result<u64>;

    /// Whether the store holds exactly `statement`.
    async fn contains(&self, statement: &Statement) -> Result<bool>;

    /// Annotation records for each statement, in input order.
    fn get_annotations(&self, statements: Vec<Statement>) -> Result<AnnotationStream>;

    /// Descriptor of each entity in `language`, restricted to `mask`.
    /// A descriptor is `None` when none of its selected fields is known.
    async fn get_descriptors(
        &self,
        entities: &[Entity],
        language: &str,
        mask: DescriptorMask,
    ) -> Result<Vec<(Entity, Option<Descriptor>)>>;
}

/// Check statement arguments the way `filter` checks selectors.
pub(crate) fn validate_statements(statements: &[Statement]) -> Result<()> {
    match statements.iter().find(|s| !s.property().is_property()) {
        Some(s) => Err(Error::Argument(format!("statement property must be a property: {s}"))),
        None => Ok(()),
    }
}

pub(crate) fn validate_language(language: &str) -> Result<()> {
    if language.trim().is_empty() {
        return Err(Error::Argument("descriptor language must not be empty".into()));
    }
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

/// Serialized triples loaded into an `rdf` store at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSource {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Inline data, used when `path` is absent.
    #[serde(default)]
    pub data: Option<String>,
}

fn default_format() -> String {
    "ntriples".into()
}

/// Declarative store description for [`open_store`].
///
/// ```json
/// { "backend": "mixer",
///   "options": { "page_size": 50 },
///   "children": [ { "backend": "rdf", "sources": [ { "path": "a.nt" } ] },
///                 { "backend": "empty" } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: String,
    #[serde(default)]
    pub options: StoreOptions,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub sources: Vec<GraphSource>,
    #[serde(default)]
    pub children: Vec<StoreConfig>,
}

impl StoreConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            options: StoreOptions::default(),
            vocabulary: Vocabulary::default(),
            sources: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Construction(format!("invalid store configuration: {e}")))
    }
}

/// Build a store from its configuration.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn Store>> {
    config.options.validate()?;
    let store: Box<dyn Store> = match config.backend.as_str() {
        "empty" => Box::new(EmptyStore::new(config.options.clone())?),
        "rdf" => {
            let graph = MemoryGraph::new();
            for source in &config.sources {
                load_source(&graph, source)?;
            }
            Box::new(GraphStore::with_vocabulary(
                Arc::new(graph),
                config.vocabulary.clone(),
                config.options.clone(),
            )?)
        }
        "mixer" => {
            let children = config.children.iter().map(open_store).collect::<Result<Vec<_>>>()?;
            Box::new(Mixer::new(children, config.options.clone())?)
        }
        other => return Err(Error::Construction(format!("unknown store backend: {other:?}"))),
    };
    tracing::info!(backend = store.name(), "opened store");
    Ok(store)
}

fn load_source(graph: &MemoryGraph, source: &GraphSource) -> Result<()> {
    let format = Format::from_name(&source.format)?;
    let bytes = match (&source.path, &source.data) {
        (Some(path), _) => std::fs::read(path)
            .map_err(|e| Error::Construction(format!("cannot read {}: {e}", path.display())))?,
        (None, Some(data)) => data.clone().into_bytes(),
        (None, None) => return Err(Error::Construction("graph source needs a path or inline data".into())),
    };
    let loaded = graph
        .load(&bytes, format)
        .map_err(|e| Error::Construction(format!("cannot load graph source: {e}")))?;
    tracing::debug!(triples = loaded, format = %source.format, "loaded graph source");
    Ok(())
}
