//! # Statement Model
//!
//! Values, snaks, statements, annotations, descriptors and the abstract
//! filter. These types cross every boundary: caller ↔ store ↔ compiler ↔
//! mixer.
//!
//! No native-query types here. This module is pure data with
//! no I/O or async.

pub mod entity;
pub mod decimal;
pub mod value;
pub mod snak;
pub mod statement;
pub mod annotation;
pub mod descriptor;
pub mod filter;

pub use entity::{Entity, EntityKind};
pub use decimal::Decimal;
pub use value::{Value, Text, Quantity, Time, TimePrecision, format_date, parse_date};
pub use snak::{Snak, SnakKind, SnakMask};
pub use statement::{Statement, Rank};
pub use annotation::{
    OrderedSet, SnakSet, ReferenceRecord, ReferenceRecordSet,
    AnnotationRecord, AnnotationRecordSet,
};
pub use descriptor::{Descriptor, DescriptorMask, merge_descriptors};
pub use filter::{Filter, Selector, Slot};
