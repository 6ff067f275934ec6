//! Data models for bookscout.

mod entry;

pub use entry::{sort_for_output, CatalogEntry, COLUMNS, UNKNOWN_TITLE};
