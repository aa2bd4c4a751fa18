//! Coordinate records recovered from generated text.
//!
//! - [`types`]: [`GeoRecord`] and [`EnrichedRecord`]
//! - [`extract`]: the tiered [`ResponseExtractor`]
//! - [`naming`]: display names from listing URLs and positional attachment
//!
//! Nothing in this crate performs I/O.

pub mod extract;
pub mod naming;
pub mod types;

pub use extract::{Extraction, ExtractionTier, ResponseExtractor};
pub use naming::{attach, derive_name, Attachment};
pub use types::{EnrichedRecord, GeoRecord};
