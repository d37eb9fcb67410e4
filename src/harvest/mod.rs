//! Worker pool and session orchestration.
//!
//! The orchestrator partitions a resolved target list into contiguous
//! chunks, runs one [`Worker`] per chunk, and folds the workers' messages
//! into the session statistics on a single task.

mod events;
mod partition;
mod session;
mod session_log;
mod worker;

pub use events::{LogLevel, LogLine, Progress, SessionEvent, WorkerMessage};
pub use partition::partition;
pub use session::{default_workers, SessionOptions, SessionOrchestrator};
pub use session_log::{log_file_name, summary_file_name, SessionLog};
pub use worker::Worker;
