//! Extraction engine: from a portal listing to stored records.

mod classify;
mod columns;
mod detail;
mod engine;

pub use classify::{parse_closing_date, should_explore};
pub use columns::{CandidateRecord, ColumnOffsets, ColumnResolver, ColumnStrategy};
pub use detail::{parse_decimal, parse_description, parse_items, parse_metadata};
pub use engine::{harvest_now, DrillFailure, ExtractionEngine, ExtractionResult, SessionContext};
