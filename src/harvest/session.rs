//! Session orchestration: partition, supervise workers, aggregate, finalize.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::events::{LogLevel, LogLine, Progress, SessionEvent, WorkerMessage};
use super::partition::partition;
use super::session_log::{log_file_name, summary_file_name, SessionLog};
use super::worker::Worker;
use crate::browser::DriverFactory;
use crate::error::HarvestError;
use crate::extract::{ColumnResolver, SessionContext};
use crate::models::{
    RecordKeyScope, Session, SessionStats, SessionStatus, SummaryArtifact, Target, TargetOutcome,
};
use crate::repository::{AsyncSqlitePool, DieselTargetRepository};

/// Buffer between workers and the aggregation loop.
const WORKER_CHANNEL_SIZE: usize = 256;

/// `min(max(4, cpus / 2), 16)`.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).clamp(4, 16)
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub workers: usize,
    /// Drill into every record regardless of closing date.
    pub force: bool,
    pub key_scope: RecordKeyScope,
    pub label: Option<String>,
    pub filter_description: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            force: false,
            key_scope: RecordKeyScope::default(),
            label: None,
            filter_description: None,
        }
    }
}

/// Runs harvesting sessions against one store.
pub struct SessionOrchestrator<F: DriverFactory> {
    pool: AsyncSqlitePool,
    factory: Arc<F>,
    resolver: ColumnResolver,
    logs_dir: PathBuf,
    events: Option<mpsc::Sender<SessionEvent>>,
    cancel: CancellationToken,
}

impl<F: DriverFactory> SessionOrchestrator<F> {
    pub fn new(pool: AsyncSqlitePool, factory: F, logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            factory: Arc::new(factory),
            resolver: ColumnResolver::default(),
            logs_dir: logs_dir.into(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: ColumnResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Relay session events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops workers between targets when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve targets from the catalog and run a session over them.
    ///
    /// A catalog failure fails the session before any worker starts and
    /// writes no artifacts.
    pub async fn run(
        &self,
        filter: Option<&str>,
        options: &SessionOptions,
    ) -> Result<Session, HarvestError> {
        let mut session = Session::new(options.label.clone(), filter.map(str::to_string), 0);
        self.emit_status(&session.id, SessionStatus::Pending).await;

        let targets = match DieselTargetRepository::new(self.pool.clone())
            .resolve(filter)
            .await
        {
            Ok(targets) => targets,
            Err(e) => {
                error!("Session {}: {}", session.id, e);
                self.emit_status(&session.id, SessionStatus::Failed).await;
                return Err(e.into());
            }
        };

        session.target_count = targets.len() as u64;
        session.stats = SessionStats::new(session.target_count);
        self.execute(session, targets, options).await
    }

    /// Run a session over an already resolved target list.
    pub async fn start_session(
        &self,
        targets: Vec<Target>,
        options: &SessionOptions,
    ) -> Result<Session, HarvestError> {
        let session = Session::new(
            options.label.clone(),
            options.filter_description.clone(),
            targets.len() as u64,
        );
        self.emit_status(&session.id, SessionStatus::Pending).await;
        self.execute(session, targets, options).await
    }

    async fn execute(
        &self,
        mut session: Session,
        targets: Vec<Target>,
        options: &SessionOptions,
    ) -> Result<Session, HarvestError> {
        let log = SessionLog::open(&self.logs_dir, &session.id)?;
        let mut sink = EventSink {
            session_id: session.id.clone(),
            log,
            events: self.events.clone(),
        };

        session.status = SessionStatus::Running;
        self.emit_status(&session.id, SessionStatus::Running).await;

        if targets.is_empty() {
            warn!("Session {}: no targets to process", session.id);
            sink.record(LogLine::warn("No targets to process").field("label", &session.label))
                .await;
            return self.finalize(session, sink).await;
        }

        let chunks = partition(&targets, options.workers);
        info!(
            "Session {} ({}): {} targets across {} workers",
            session.id,
            session.label,
            targets.len(),
            chunks.len()
        );
        sink.record(
            LogLine::info("Session started")
                .field("label", &session.label)
                .field("targets", targets.len())
                .field("workers", chunks.len())
                .field("force", options.force),
        )
        .await;

        let ctx = SessionContext::new(session.id.clone(), options.force, options.key_scope);
        let (tx, mut rx) = mpsc::channel::<WorkerMessage>(WORKER_CHANNEL_SIZE);
        let worker_count = chunks.len();
        let mut handles = Vec::with_capacity(worker_count);

        for (worker_id, chunk) in chunks.into_iter().enumerate() {
            let worker = Worker::new(
                worker_id,
                self.factory.clone(),
                self.pool.clone(),
                self.resolver.clone(),
                ctx.clone(),
                self.cancel.clone(),
            );
            let tx = tx.clone();
            handles.push(tokio::spawn(async move { worker.run(chunk, tx).await }));
        }
        // Only workers hold senders now; the loop ends once every one exits.
        drop(tx);

        let mut finished = 0usize;
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::TargetDone {
                    worker_id,
                    target,
                    counts,
                    elapsed_ms,
                } => {
                    let outcome = session.stats.apply(&target, &counts);
                    let line = match &counts.error {
                        Some(message) => LogLine::warn(format!(
                            "{}: {}",
                            target.display_name, message
                        ))
                        .field("error", message),
                        None => LogLine::info(format!(
                            "{}: found={} new={} updated={}",
                            target.display_name, counts.found, counts.new, counts.updated
                        )),
                    };
                    sink.record(
                        line.field("worker", worker_id)
                            .field("target", &target.id)
                            .field("found", counts.found)
                            .field("new", counts.new)
                            .field("updated", counts.updated)
                            .field("outcome", outcome_name(outcome))
                            .field("elapsedMs", elapsed_ms),
                    )
                    .await;
                    sink.emit(SessionEvent::Progress {
                        session_id: session.id.clone(),
                        progress: progress(&session.stats),
                    })
                    .await;
                }
                WorkerMessage::Log {
                    worker_id,
                    level,
                    msg,
                } => {
                    sink.record(LogLine::new(level, msg).field("worker", worker_id))
                        .await;
                }
                WorkerMessage::WorkerDone { worker_id } => {
                    finished += 1;
                    sink.record(
                        LogLine::info(format!("worker {} done", worker_id))
                            .field("finished", finished)
                            .field("workers", worker_count),
                    )
                    .await;
                }
                WorkerMessage::WorkerFailed { worker_id, error } => {
                    finished += 1;
                    sink.record(
                        LogLine::new(LogLevel::Error, format!("worker {} failed", worker_id))
                            .field("error", error),
                    )
                    .await;
                }
            }
        }

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Worker {} task failed: {}", worker_id, e);
                sink.record(
                    LogLine::error(format!("worker {} failed", worker_id))
                        .field("error", e.to_string()),
                )
                .await;
            }
        }

        self.finalize(session, sink).await
    }

    /// Write the summary, emit it, and mark the session done. The log sink
    /// is released on return.
    async fn finalize(
        &self,
        mut session: Session,
        mut sink: EventSink,
    ) -> Result<Session, HarvestError> {
        session.finished_at = Some(Utc::now());
        session.status = SessionStatus::Done;
        let cancelled = self.cancel.is_cancelled()
            && session.stats.targets_processed < session.stats.targets_total;

        let summary = SummaryArtifact::from_session(
            &session,
            cancelled,
            log_file_name(&session.id),
            summary_file_name(&session.id),
        );
        sink.record(
            LogLine::info("Session finished")
                .field("processed", session.stats.targets_processed)
                .field("total", session.stats.targets_total)
                .field("newRecords", session.stats.new_records)
                .field("updatedRecords", session.stats.updated_records)
                .field("errors", session.stats.per_target_errors.len())
                .field("duration", &summary.duration)
                .field("cancelled", cancelled),
        )
        .await;
        sink.log.write_summary(&summary)?;
        info!(
            "Session {} finished in {}: {} new, {} updated, {} errors",
            session.id,
            summary.duration,
            summary.new_records,
            summary.updated_records,
            summary.error_targets.len()
        );

        sink.emit(SessionEvent::Summary {
            session_id: session.id.clone(),
            summary: Box::new(summary),
        })
        .await;
        self.emit_status(&session.id, SessionStatus::Done).await;
        Ok(session)
    }

    async fn emit_status(&self, session_id: &str, status: SessionStatus) {
        if let Some(tx) = &self.events {
            let _ = tx
                .send(SessionEvent::Status {
                    session_id: session_id.to_string(),
                    status,
                })
                .await;
        }
    }
}

/// Writes log lines to the session log and relays every event.
struct EventSink {
    session_id: String,
    log: SessionLog,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    async fn record(&mut self, line: LogLine) {
        if let Err(e) = self.log.append(&line) {
            warn!(
                "Failed to append to {}: {}",
                self.log.log_path().display(),
                e
            );
        }
        self.emit(SessionEvent::Log {
            session_id: self.session_id.clone(),
            line,
        })
        .await;
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

fn progress(stats: &SessionStats) -> Progress {
    Progress {
        pct: stats.pct(),
        processed: stats.targets_processed,
        total: stats.targets_total,
        new_records: stats.new_records,
        updated_records: stats.updated_records,
    }
}

fn outcome_name(outcome: TargetOutcome) -> &'static str {
    match outcome {
        TargetOutcome::New => "new",
        TargetOutcome::UpdatedOnly => "updated_only",
        TargetOutcome::ZeroResult => "zero_result",
        TargetOutcome::Errored => "error",
    }
}
