//! The seam between the extraction engine and a live browser session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, WorkerFatal};
use crate::models::Target;

/// Raw listing as captured from the portal.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingBody {
    /// The machine-readable data response (preferred).
    Json(serde_json::Value),
    /// Cell texts of the rendered grid, used when no data response arrived.
    Rendered(Vec<Vec<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// Bumped on every listing load; handles from older loads are stale.
    pub generation: u64,
    pub body: ListingBody,
}

/// Cell values that identify one listing row.
///
/// Process numbers repeat across organizations on the same portal, so both
/// must match, each as a whole cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub process_number: String,
    pub organization: String,
}

impl RowKey {
    pub fn new(process_number: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            process_number: process_number.into(),
            organization: organization.into(),
        }
    }

    /// Whether a row's cell texts carry this key.
    pub fn matches<S: AsRef<str>>(&self, cells: &[S]) -> bool {
        let has = |value: &str| cells.iter().any(|c| c.as_ref().trim() == value);
        has(&self.process_number) && has(&self.organization)
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.process_number, self.organization)
    }
}

/// Reference to a rendered listing row.
///
/// Only valid while the row is still attached; re-resolve by `key` after
/// anything that may have re-rendered the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    pub index: usize,
    pub key: RowKey,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailPanel {
    Description,
    Metadata,
    Items,
}

impl DetailPanel {
    pub const ALL: [DetailPanel; 3] = [Self::Description, Self::Metadata, Self::Items];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Metadata => "metadata",
            Self::Items => "items",
        }
    }
}

/// One single-threaded browser session positioned on a portal.
#[async_trait]
pub trait PortalDriver: Send {
    /// Navigate to the target's listing and capture its payload.
    async fn load_listing(&mut self, target: &Target) -> Result<Listing, ExtractionError>;

    /// Whether `row` still points at a rendered row carrying its key.
    async fn is_attached(&mut self, row: &RowHandle) -> Result<bool, ExtractionError>;

    /// Locate the first rendered row whose cells carry `key`.
    async fn find_row(&mut self, key: &RowKey) -> Result<Option<RowHandle>, ExtractionError>;

    async fn open_detail(&mut self, row: &RowHandle) -> Result<(), ExtractionError>;

    /// Activate a panel of the open detail view and return its HTML.
    async fn read_panel(&mut self, panel: DetailPanel) -> Result<String, ExtractionError>;

    async fn close_detail(&mut self) -> Result<(), ExtractionError>;

    /// Release the browser session. Called once, on every exit path.
    async fn shutdown(&mut self);
}

/// Creates one driver per worker.
#[async_trait]
pub trait DriverFactory: Send + Sync + 'static {
    type Driver: PortalDriver + 'static;

    async fn launch(&self, worker_id: usize) -> Result<Self::Driver, WorkerFatal>;
}
