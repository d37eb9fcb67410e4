//! Messages exchanged inside a session and events relayed out of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SessionStatus, SummaryArtifact, Target, TargetCounts};

/// Worker → orchestrator. Workers never touch the session aggregate
/// directly; everything they report travels as one of these.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    TargetDone {
        worker_id: usize,
        target: Target,
        counts: TargetCounts,
        elapsed_ms: u64,
    },
    Log {
        worker_id: usize,
        level: LogLevel,
        msg: String,
    },
    WorkerDone {
        worker_id: usize,
    },
    WorkerFailed {
        worker_id: usize,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of the session's structured log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub msg: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogLine {
    pub fn new(level: LogLevel, msg: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            level,
            msg: msg.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, msg)
    }

    pub fn warn(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, msg)
    }

    /// Attach a structured field. Values that fail to serialize are skipped.
    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(key.to_string(), value);
        }
        self
    }
}

/// Running progress of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub pct: f64,
    pub processed: u64,
    pub total: u64,
    pub new_records: u64,
    pub updated_records: u64,
}

/// Events relayed to whoever presents the session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Log {
        session_id: String,
        line: LogLine,
    },
    Progress {
        session_id: String,
        progress: Progress,
    },
    Summary {
        session_id: String,
        summary: Box<SummaryArtifact>,
    },
    Status {
        session_id: String,
        status: SessionStatus,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Log { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::Summary { session_id, .. }
            | Self::Status { session_id, .. } => session_id,
        }
    }
}
