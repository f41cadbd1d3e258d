//! # kif-rs: Statement Stores over Knowledge Graphs
//!
//! Query Wikidata-style statements (subject, property, value, with
//! qualifiers, references and rank) out of RDF graphs, through one
//! abstract filter language.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `Store` is the contract between callers and backends
//! 2. **Clean DTOs**: `Entity`, `Value`, `Snak`, `Statement` cross all boundaries
//! 3. **Compiler owns nothing**: filter → native query fragments is a pure function
//! 4. **Lazy streams**: nothing is fetched until a consumer pulls
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kif_rs::{open_store, Filter, Store, StoreConfig, Vocabulary};
//!
//! # async fn example() -> kif_rs::Result<()> {
//! let config = StoreConfig::from_json(r#"{
//!     "backend": "rdf",
//!     "sources": [{ "format": "ntriples", "path": "dump.nt" }]
//! }"#)?;
//! let store = open_store(&config)?;
//!
//! let vocab = Vocabulary::wikidata();
//! let filter = Filter::new()
//!     .subject(vocab.entity("http://www.wikidata.org/entity/Q42"))
//!     .property(vocab.property("P31"));
//! let mut stream = store.filter(&filter, None, None)?;
//! while let Some(stmt) = stream.next().await? {
//!     println!("{stmt}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Backend | Name | Description |
//! |---------|------|-------------|
//! | Empty | `empty` | Contains nothing; the neutral mixer child |
//! | Graph | `rdf` | Wikibase-shaped RDF behind a [`NativeEndpoint`] |
//! | Mixer | `mixer` | Ordered union of child stores |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod vocab;
pub mod native;
pub mod compiler;
pub mod storage;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Entity, EntityKind, Value, Text, Quantity, Time, TimePrecision, Decimal,
    Snak, SnakKind, SnakMask, Statement, Rank,
    AnnotationRecord, AnnotationRecordSet, ReferenceRecord, ReferenceRecordSet, SnakSet,
    Descriptor, DescriptorMask, Filter, Selector, Slot,
};

pub use vocab::Vocabulary;

// ============================================================================
// Re-exports: Native queries and compilation
// ============================================================================

pub use native::{Format, MemoryGraph, NativeEndpoint, NativeQuery, Row, Term, Triple};
pub use compiler::{compile, default_rules, Plan, RuleTable};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{
    open_store, AnnotationStream, EmptyStore, GraphStore, Mixer, StatementStream, Store,
    StoreConfig, StoreFlags, StoreOptions,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad store configuration, caught when the store is built.
    #[error("Construction error: {0}")]
    Construction(String),

    /// Bad arguments to a store operation, caught before any I/O.
    #[error("Argument error: {0}")]
    Argument(String),

    /// A backend failed while a query was running.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
