//! Per-session artifacts: an append-only NDJSON log and a summary document.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::events::LogLine;
use crate::models::SummaryArtifact;

pub fn log_file_name(session_id: &str) -> String {
    format!("{}.ndjson", session_id)
}

pub fn summary_file_name(session_id: &str) -> String {
    format!("{}-summary.json", session_id)
}

/// Log sink for one session. Dropping it releases the file.
pub struct SessionLog {
    file: File,
    log_path: PathBuf,
    summary_path: PathBuf,
}

impl SessionLog {
    /// Open (or create) the session's log under `logs_dir`.
    pub fn open(logs_dir: &Path, session_id: &str) -> io::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join(log_file_name(session_id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        Ok(Self {
            file,
            log_path,
            summary_path: logs_dir.join(summary_file_name(session_id)),
        })
    }

    pub fn append(&mut self, line: &LogLine) -> io::Result<()> {
        let json = serde_json::to_string(line)?;
        writeln!(self.file, "{}", json)?;
        self.file.flush()
    }

    pub fn write_summary(&self, summary: &SummaryArtifact) -> io::Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(&self.summary_path, json)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_one_object_per_line() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");
        {
            let mut log = SessionLog::open(&logs, "sess-1").unwrap();
            log.append(&LogLine::info("started")).unwrap();
            log.append(&LogLine::warn("slow").field("target", "a")).unwrap();
        }
        // Reopening appends rather than truncating.
        let mut log = SessionLog::open(&logs, "sess-1").unwrap();
        log.append(&LogLine::info("finished")).unwrap();

        let content = std::fs::read_to_string(logs.join("sess-1.ndjson")).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["target"], "a");
        assert_eq!(lines[2]["msg"], "finished");
    }

    #[test]
    fn artifact_names() {
        assert_eq!(log_file_name("sess-x"), "sess-x.ndjson");
        assert_eq!(summary_file_name("sess-x"), "sess-x-summary.json");
    }
}
