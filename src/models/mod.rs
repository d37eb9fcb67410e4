//! Data models for bidharvest.

mod record;
mod session;
mod target;

pub use record::{record_id, Record, RecordDetail, RecordItem, RecordKeyScope};
pub use session::{
    format_duration, NamedCount, Session, SessionStats, SessionStatus, SummaryArtifact,
    TargetCounts, TargetError, TargetOutcome, TOP_NEW_LIMIT,
};
pub use target::Target;
