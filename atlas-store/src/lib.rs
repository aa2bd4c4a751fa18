//! Durable, country-keyed archive of enriched opportunity records.
//!
//! The archive is one JSON object on disk mapping a lower-cased country to
//! an array of records. Every append rewrites the whole document through a
//! temporary file in the same directory followed by an atomic rename, so
//! readers never observe a half-written file.
//!
//! Appends through clones of one [`OpportunityStore`] are serialized.
//! Separate processes writing the same file are not: the rename prevents
//! corruption but two overlapping read-merge-write cycles can lose one
//! batch.

pub mod store;

pub use store::{AppendError, Archive, OpportunityStore};
