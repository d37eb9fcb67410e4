//! Error taxonomy for the harvesting pipeline.
//!
//! Per-target failures ([`ExtractionError`], [`PersistenceError`]) are caught
//! at the worker boundary and turned into data. Only [`ResolutionError`] and
//! I/O failures on the session artifacts abort a run.

use thiserror::Error;

/// The target catalog could not be queried. Fatal to the whole run.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Target catalog unreachable: {0}")]
    Catalog(#[from] diesel::result::Error),
}

/// A store write or read failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Item replacement for {record_id} failed after delete: {source}")]
    ItemsLost {
        record_id: String,
        #[source]
        source: diesel::result::Error,
    },
}

/// Errors that abort extraction of a single target.
///
/// `Display` of [`ExtractionError::Timeout`] is the bare word `Timeout`; the
/// worker records `to_string()` verbatim as the target's error message.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Timeout")]
    Timeout,

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ExtractionError {
    /// Short machine-readable kind, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NavigationFailed(_) => "navigation_failed",
            Self::ParseFailed(_) => "parse_failed",
            Self::Persistence(_) => "persistence",
        }
    }
}

/// Worker setup failure. Terminates the worker; its remaining targets are
/// left unprocessed and unreported.
#[derive(Debug, Error)]
pub enum WorkerFatal {
    #[error("Browser session could not be started: {0}")]
    BrowserLaunch(String),

    #[error("Store connection could not be opened: {0}")]
    StoreConnection(String),
}

/// Errors that prevent a session from running at all.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Session artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
