//! Harvest session models.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::Target;

/// Maximum entries kept in the summary's top-new ranking.
pub const TOP_NEW_LIMIT: usize = 50;

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Per-target result counts as reported by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCounts {
    pub found: u64,
    pub new: u64,
    pub updated: u64,
    /// Error message when extraction of the target failed.
    pub error: Option<String>,
}

impl TargetCounts {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> TargetOutcome {
        if self.error.is_some() {
            TargetOutcome::Errored
        } else if self.new > 0 {
            TargetOutcome::New
        } else if self.updated > 0 {
            TargetOutcome::UpdatedOnly
        } else {
            TargetOutcome::ZeroResult
        }
    }
}

/// Classification of one processed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Contributed at least one new record.
    New,
    /// Only refreshed existing records.
    UpdatedOnly,
    /// Finished without error and without touching any record.
    ZeroResult,
    Errored,
}

/// Running aggregate for a session. Mutated only by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub targets_total: u64,
    pub targets_processed: u64,
    pub new_records: u64,
    pub updated_records: u64,
    pub per_target_errors: BTreeMap<String, String>,
    pub zero_result_targets: BTreeSet<String>,
    pub top_new_by_target: BTreeMap<String, u64>,
    pub updated_only_targets: BTreeSet<String>,
    #[serde(skip)]
    names: BTreeMap<String, String>,
}

impl SessionStats {
    pub fn new(targets_total: u64) -> Self {
        Self {
            targets_total,
            ..Self::default()
        }
    }

    /// Fold one target's result into the aggregate.
    pub fn apply(&mut self, target: &Target, counts: &TargetCounts) -> TargetOutcome {
        self.targets_processed += 1;
        self.names
            .insert(target.id.clone(), target.display_name.clone());

        let outcome = counts.outcome();
        match outcome {
            TargetOutcome::Errored => {
                let message = counts.error.clone().unwrap_or_default();
                self.per_target_errors.insert(target.id.clone(), message);
                return outcome;
            }
            TargetOutcome::New => {
                self.top_new_by_target.insert(target.id.clone(), counts.new);
            }
            TargetOutcome::UpdatedOnly => {
                self.updated_only_targets.insert(target.id.clone());
            }
            TargetOutcome::ZeroResult => {
                self.zero_result_targets.insert(target.id.clone());
            }
        }
        self.new_records += counts.new;
        self.updated_records += counts.updated;
        outcome
    }

    /// Percentage of targets processed, 0..=100.
    pub fn pct(&self) -> f64 {
        if self.targets_total == 0 {
            return 100.0;
        }
        (self.targets_processed as f64 / self.targets_total as f64 * 100.0).min(100.0)
    }

    pub fn display_name<'a>(&'a self, target_id: &'a str) -> &'a str {
        self.names
            .get(target_id)
            .map(String::as_str)
            .unwrap_or(target_id)
    }

    /// Targets with new records, highest first, capped at [`TOP_NEW_LIMIT`].
    pub fn top_new(&self) -> Vec<NamedCount> {
        let mut ranked: Vec<NamedCount> = self
            .top_new_by_target
            .iter()
            .map(|(id, count)| NamedCount {
                target_id: id.clone(),
                display_name: self.display_name(id).to_string(),
                count: *count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.target_id.cmp(&b.target_id)));
        ranked.truncate(TOP_NEW_LIMIT);
        ranked
    }

    pub fn error_targets(&self) -> Vec<TargetError> {
        self.per_target_errors
            .iter()
            .map(|(id, message)| TargetError {
                target_id: id.clone(),
                display_name: self.display_name(id).to_string(),
                message: message.clone(),
            })
            .collect()
    }
}

/// One harvesting run over a resolved target set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub label: String,
    pub filter_description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub target_count: u64,
    pub stats: SessionStats,
}

impl Session {
    /// Create a pending session for a filter. The label defaults to the
    /// filter text, or "all targets" when unfiltered.
    pub fn new(label: Option<String>, filter_description: Option<String>, target_count: u64) -> Self {
        let label = label.unwrap_or_else(|| match &filter_description {
            Some(filter) => format!("WHERE: {}", filter),
            None => "all targets".to_string(),
        });
        Self {
            id: Self::generate_id(),
            label,
            filter_description,
            started_at: Utc::now(),
            finished_at: None,
            status: SessionStatus::Pending,
            target_count,
            stats: SessionStats::new(target_count),
        }
    }

    /// `sess-YYYYMMDD-HHMMSS-xxxx`: sortable by creation time, random suffix.
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "sess-{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            &suffix[..4]
        )
    }

    pub fn duration_ms(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedCount {
    pub target_id: String,
    pub display_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetError {
    pub target_id: String,
    pub display_name: String,
    pub message: String,
}

/// Final summary document written next to the session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryArtifact {
    pub ok: bool,
    pub empty: bool,
    pub cancelled: bool,
    pub session_id: String,
    pub label: String,
    pub filter_description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration as `mm:ss`.
    pub duration: String,
    pub duration_ms: i64,
    pub targets_total: u64,
    pub targets_processed: u64,
    pub new_records: u64,
    pub updated_records: u64,
    pub error_targets: Vec<TargetError>,
    pub zero_result_targets: Vec<String>,
    pub top_new: Vec<NamedCount>,
    pub log_file: String,
    pub summary_file: String,
}

impl SummaryArtifact {
    /// Build the summary for a finalized session.
    pub fn from_session(
        session: &Session,
        cancelled: bool,
        log_file: impl Into<String>,
        summary_file: impl Into<String>,
    ) -> Self {
        let stats = &session.stats;
        let duration_ms = session.duration_ms();
        Self {
            ok: true,
            empty: session.target_count == 0,
            cancelled,
            session_id: session.id.clone(),
            label: session.label.clone(),
            filter_description: session.filter_description.clone(),
            started_at: session.started_at,
            finished_at: session.finished_at.unwrap_or_else(Utc::now),
            duration: format_duration(duration_ms),
            duration_ms,
            targets_total: stats.targets_total,
            targets_processed: stats.targets_processed,
            new_records: stats.new_records,
            updated_records: stats.updated_records,
            error_targets: stats.error_targets(),
            zero_result_targets: stats.zero_result_targets.iter().cloned().collect(),
            top_new: stats.top_new(),
            log_file: log_file.into(),
            summary_file: summary_file.into(),
        }
    }
}

/// Format milliseconds as `mm:ss`. Minutes are not wrapped into hours.
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str) -> Target {
        Target::new(id, format!("City {}", id), format!("http://{}.example", id))
    }

    fn counts(found: u64, new: u64, updated: u64) -> TargetCounts {
        TargetCounts {
            found,
            new,
            updated,
            error: None,
        }
    }

    #[test]
    fn apply_classifies_every_target_once() {
        let mut stats = SessionStats::new(5);
        assert_eq!(stats.apply(&target("a"), &counts(3, 2, 1)), TargetOutcome::New);
        assert_eq!(stats.apply(&target("b"), &counts(4, 0, 4)), TargetOutcome::UpdatedOnly);
        assert_eq!(stats.apply(&target("c"), &counts(0, 0, 0)), TargetOutcome::ZeroResult);
        assert_eq!(
            stats.apply(&target("d"), &TargetCounts::failed("Timeout")),
            TargetOutcome::Errored
        );

        assert_eq!(stats.targets_processed, 4);
        assert!(stats.targets_processed <= stats.targets_total);
        assert_eq!(stats.new_records, 2);
        assert_eq!(stats.updated_records, 5);
        assert_eq!(stats.per_target_errors.get("d").map(String::as_str), Some("Timeout"));

        let classified = stats.top_new_by_target.len()
            + stats.updated_only_targets.len()
            + stats.zero_result_targets.len()
            + stats.per_target_errors.len();
        assert_eq!(classified as u64, stats.targets_processed);
        assert_eq!(stats.pct(), 80.0);
    }

    #[test]
    fn top_new_is_sorted_and_capped() {
        let mut stats = SessionStats::new(60);
        for i in 0..60u64 {
            stats.apply(&target(&format!("t{:02}", i)), &counts(i + 1, i + 1, 0));
        }
        let top = stats.top_new();
        assert_eq!(top.len(), TOP_NEW_LIMIT);
        assert_eq!(top[0].count, 60);
        assert_eq!(top[0].display_name, "City t59");
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn session_defaults() {
        let all = Session::new(None, None, 0);
        assert_eq!(all.label, "all targets");
        assert_eq!(all.status, SessionStatus::Pending);
        assert!(all.id.starts_with("sess-"));
        assert_eq!(all.id.len(), "sess-20240101-120000-abcd".len());

        let filtered = Session::new(None, Some("SG_UF = 'SP'".into()), 3);
        assert_eq!(filtered.label, "WHERE: SG_UF = 'SP'");
        assert_eq!(filtered.stats.targets_total, 3);
    }

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(61_500), "01:01");
        assert_eq!(format_duration(3_725_000), "62:05");
    }

    #[test]
    fn empty_summary() {
        let mut session = Session::new(None, None, 0);
        session.finished_at = Some(Utc::now());
        let summary = SummaryArtifact::from_session(&session, false, "a.ndjson", "a-summary.json");
        assert!(summary.ok && summary.empty && !summary.cancelled);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["sessionId"], session.id.as_str());
        assert_eq!(json["logFile"], "a.ndjson");
    }
}
