//! Procurement record models.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How the composite record key is scoped.
///
/// `Organization` keeps the historical `org-process` key. `Target` prefixes
/// the owner id so two portals sharing a numbering scheme cannot collide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKeyScope {
    #[default]
    Organization,
    Target,
}

impl RecordKeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Target => "target",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organization" | "org" => Some(Self::Organization),
            "target" | "owner" => Some(Self::Target),
            _ => None,
        }
    }
}

/// Build the deterministic record id.
///
/// Inputs are trimmed; the same organization and process number always
/// yield the same bytes.
pub fn record_id(
    scope: RecordKeyScope,
    owner_id: &str,
    organization: &str,
    process_number: &str,
) -> String {
    let base = format!("{}-{}", organization.trim(), process_number.trim());
    match scope {
        RecordKeyScope::Organization => base,
        RecordKeyScope::Target => format!("{}:{}", owner_id.trim(), base),
    }
}

/// One procurement notice harvested from a target's listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Composite natural key, see [`record_id`].
    pub id: String,
    /// Id of the target this record was harvested from.
    pub owner_id: String,
    pub process_number: String,
    pub organization: String,
    pub status: String,
    /// Closing date in portal-local time, when it could be parsed.
    pub closing_date: Option<NaiveDateTime>,
    /// Free-text object of the procurement.
    pub summary_text: String,
    pub modality: String,
}

/// Extended fields obtained from the detail view.
///
/// `None` fields leave the stored value untouched on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetail {
    pub description: Option<String>,
    pub disclosure_window: Option<String>,
    pub dispute_mode: Option<String>,
    pub estimated_value: Option<f64>,
    /// Remaining metadata pairs that have no dedicated column.
    pub flags: BTreeMap<String, String>,
}

impl RecordDetail {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.disclosure_window.is_none()
            && self.dispute_mode.is_none()
            && self.estimated_value.is_none()
            && self.flags.is_empty()
    }
}

/// One line of a record's item grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordItem {
    pub record_id: String,
    pub line_number: i32,
    pub code: String,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
    pub lot_id: Option<String>,
}
