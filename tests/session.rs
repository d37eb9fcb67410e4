//! Session orchestration end to end with scripted workers.

mod common;

use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bidharvest::harvest::{LogLevel, SessionEvent, SessionOptions, SessionOrchestrator};
use bidharvest::models::{SessionStatus, SummaryArtifact};
use bidharvest::HarvestError;

use common::{row, seed_targets, target, temp_store, Call, PortalScript, ScriptedFactory, FUTURE, PAST};

fn options(workers: usize) -> SessionOptions {
    SessionOptions {
        workers,
        ..SessionOptions::default()
    }
}

fn collect(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[SessionEvent]) -> Vec<SessionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

fn read_summary(logs: &Path, session_id: &str) -> SummaryArtifact {
    let path = logs.join(format!("{}-summary.json", session_id));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn read_log(logs: &Path, session_id: &str) -> Vec<serde_json::Value> {
    std::fs::read_to_string(logs.join(format!("{}.ndjson", session_id)))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn three_targets_two_workers() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let factory = ScriptedFactory::new([
        ("a".to_string(), PortalScript::rows(vec![row("1/2099", "ORG A", FUTURE)])),
        ("b".to_string(), PortalScript::rows(vec![row("2/2001", "ORG B", PAST)])),
        ("c".to_string(), PortalScript::default()),
    ]);
    let (tx, rx) = mpsc::channel(1024);
    let orchestrator = SessionOrchestrator::new(pool, factory.clone(), &logs).with_events(tx);

    let session = orchestrator
        .start_session(vec![target("a"), target("b"), target("c")], &options(2))
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.stats.targets_processed, 3);
    assert_eq!(session.stats.new_records, 2);
    assert!(session.stats.zero_result_targets.contains("c"));

    // Worker 0 got [a, b], worker 1 got [c]; each processed its chunk in order.
    let loads = |w| -> Vec<Call> {
        factory
            .calls_of(w)
            .into_iter()
            .filter(|c| matches!(c, Call::Load(_)))
            .collect()
    };
    assert_eq!(loads(0), vec![Call::Load("a".into()), Call::Load("b".into())]);
    assert_eq!(loads(1), vec![Call::Load("c".into())]);
    assert_eq!(factory.calls_of(0).last(), Some(&Call::Shutdown));
    assert_eq!(factory.calls_of(1).last(), Some(&Call::Shutdown));

    drop(orchestrator);
    let events = collect(rx);
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Pending, SessionStatus::Running, SessionStatus::Done]
    );
    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress { progress, .. } => Some(progress.processed),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2, 3]);
    assert!(events
        .iter()
        .all(|e| e.session_id() == session.id));

    let summary = read_summary(&logs, &session.id);
    assert!(summary.ok);
    assert!(!summary.empty);
    assert_eq!(summary.targets_processed, 3);
    assert_eq!(summary.top_new.len(), 2);
    assert_eq!(summary.zero_result_targets, vec!["c".to_string()]);
    assert_eq!(summary.log_file, format!("{}.ndjson", session.id));

    let log = read_log(&logs, &session.id);
    let done_lines = log.iter().filter(|l| l["target"].is_string()).count();
    assert_eq!(done_lines, 3);
    assert_eq!(log.last().unwrap()["msg"], "Session finished");
}

#[tokio::test]
async fn timed_out_target_is_recorded_and_session_finishes() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let factory = ScriptedFactory::new([
        ("slow".to_string(), PortalScript::timeout()),
        ("ok".to_string(), PortalScript::rows(vec![row("1/2001", "ORG", PAST)])),
    ]);
    let orchestrator = SessionOrchestrator::new(pool, factory, &logs);

    let session = orchestrator
        .start_session(vec![target("slow"), target("ok")], &options(1))
        .await
        .unwrap();

    let stats = &session.stats;
    assert_eq!(stats.targets_processed, 2);
    assert_eq!(stats.per_target_errors.get("slow").map(String::as_str), Some("Timeout"));
    assert_eq!(stats.new_records, 1);
    assert!(!stats.zero_result_targets.contains("slow"));

    let summary = read_summary(&logs, &session.id);
    assert_eq!(summary.error_targets.len(), 1);
    assert_eq!(summary.error_targets[0].message, "Timeout");
    assert_eq!(summary.error_targets[0].display_name, "Prefeitura slow");

    let log = read_log(&logs, &session.id);
    let failed = log.iter().find(|l| l["target"] == "slow").unwrap();
    assert_eq!(failed["level"], "warn");
    assert_eq!(failed["error"], "Timeout");
    assert_eq!(failed["found"], 0);
}

#[tokio::test]
async fn every_target_failing_still_produces_a_summary() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let factory = ScriptedFactory::new([
        ("x".to_string(), PortalScript::timeout()),
        ("y".to_string(), PortalScript::timeout()),
    ]);
    let orchestrator = SessionOrchestrator::new(pool, factory, &logs);

    let session = orchestrator
        .start_session(vec![target("x"), target("y")], &options(2))
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(read_summary(&logs, &session.id).error_targets.len(), 2);
}

#[tokio::test]
async fn worker_setup_failure_leaves_its_chunk_unreported() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let factory = ScriptedFactory::new([
        ("a".to_string(), PortalScript::default()),
        ("b".to_string(), PortalScript::default()),
        ("c".to_string(), PortalScript::default()),
    ])
    .failing_workers([0]);
    let orchestrator = SessionOrchestrator::new(pool, factory, &logs);

    let session = orchestrator
        .start_session(vec![target("a"), target("b"), target("c")], &options(2))
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.stats.targets_total, 3);
    assert_eq!(session.stats.targets_processed, 1);
    assert!(session.stats.per_target_errors.is_empty());

    let log = read_log(&logs, &session.id);
    let crash = log.iter().find(|l| l["msg"] == "worker 0 failed").unwrap();
    assert_eq!(crash["level"], "error");
}

#[tokio::test]
async fn empty_target_list_finalizes_immediately() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let (tx, rx) = mpsc::channel(64);
    let orchestrator =
        SessionOrchestrator::new(pool, ScriptedFactory::default(), &logs).with_events(tx);

    let session = orchestrator.start_session(Vec::new(), &options(4)).await.unwrap();
    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.target_count, 0);

    drop(orchestrator);
    let events = collect(rx);
    let summary = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::Summary { summary, .. } => Some(summary.clone()),
            _ => None,
        })
        .unwrap();
    assert!(summary.ok);
    assert!(summary.empty);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Log { line, .. } if line.level == LogLevel::Warn
    )));
    assert_eq!(statuses(&events).last(), Some(&SessionStatus::Done));
}

#[tokio::test]
async fn cancellation_stops_workers_between_targets() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let factory = ScriptedFactory::new([
        ("a".to_string(), PortalScript::default()),
        ("b".to_string(), PortalScript::default()),
    ]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orchestrator =
        SessionOrchestrator::new(pool, factory.clone(), &logs).with_cancellation(cancel);

    let session = orchestrator
        .start_session(vec![target("a"), target("b")], &options(1))
        .await
        .unwrap();

    assert_eq!(session.status, SessionStatus::Done);
    assert_eq!(session.stats.targets_processed, 0);
    assert!(read_summary(&logs, &session.id).cancelled);
    assert!(!factory.calls().iter().any(|(_, c)| matches!(c, Call::Load(_))));
    assert_eq!(factory.calls_of(0), vec![Call::Shutdown]);
}

#[tokio::test]
async fn run_resolves_targets_from_the_catalog() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    seed_targets(&pool, &[target("a"), target("b")], Some("SP")).await;
    seed_targets(&pool, &[target("c")], Some("RJ")).await;
    let factory = ScriptedFactory::new(
        ["a", "b", "c"].map(|id| (id.to_string(), PortalScript::default())),
    );
    let orchestrator = SessionOrchestrator::new(pool, factory, &logs);

    let session = orchestrator
        .run(Some("REGION = 'SP'"), &options(4))
        .await
        .unwrap();
    assert_eq!(session.label, "WHERE: REGION = 'SP'");
    assert_eq!(session.filter_description.as_deref(), Some("REGION = 'SP'"));
    assert_eq!(session.stats.targets_total, 2);
    assert_eq!(session.stats.targets_processed, 2);
}

#[tokio::test]
async fn catalog_failure_fails_the_session() {
    let (dir, pool) = temp_store().await;
    let logs = dir.path().join("logs");
    let (tx, rx) = mpsc::channel(16);
    let orchestrator =
        SessionOrchestrator::new(pool, ScriptedFactory::default(), &logs).with_events(tx);

    let err = orchestrator
        .run(Some("no_such_column = 1"), &options(2))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Resolution(_)));

    drop(orchestrator);
    let events = collect(rx);
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Pending, SessionStatus::Failed]
    );
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Summary { .. })));
    assert!(!logs.exists());
}
