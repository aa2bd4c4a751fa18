//! End-to-end geocoding of listing links.
//!
//! [`GeocodingOrchestrator::convert`] runs one sequential pass:
//! crawl → generate → extract → attach links → append to the archive.
//! Only invalid input and an unavailable browser fail the call; every other
//! problem is returned as a [`PipelineWarning`] next to whatever was
//! recovered.

pub mod orchestrator;
pub mod prompts;
pub mod warnings;

pub use orchestrator::{ConvertRequest, ConvertResponse, GeocodingOrchestrator};
pub use warnings::PipelineWarning;
