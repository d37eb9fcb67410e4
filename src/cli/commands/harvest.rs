//! The `run` command: one harvesting session over the catalog.

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::browser::ChromiumDriverFactory;
use crate::config::Settings;
use crate::harvest::{LogLevel, SessionEvent, SessionOptions, SessionOrchestrator};
use crate::models::SummaryArtifact;
use crate::repository::init_schema;

use super::helpers::{sanitize_filter, truncate};

/// How many top targets to print after a run.
const TOP_NEW_SHOWN: usize = 10;

pub struct RunArgs {
    pub filter: Option<String>,
    pub workers: Option<usize>,
    pub headed: bool,
    pub force: bool,
    pub label: Option<String>,
}

/// Resolve targets, run a session, and print its summary.
pub async fn cmd_run(settings: &Settings, args: RunArgs) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let pool = settings.pool();
    init_schema(&pool)
        .await
        .with_context(|| format!("Failed to open database {}", pool.database_url()))?;

    let filter = args.filter.as_deref().and_then(sanitize_filter);
    let mut browser = settings.browser.clone();
    if args.headed {
        browser.headless = false;
    }
    let options = SessionOptions {
        workers: args.workers.unwrap_or(settings.workers).max(1),
        force: args.force,
        key_scope: settings.key_scope,
        label: args.label,
        filter_description: filter.clone(),
    };

    println!(
        "{} Harvesting {} with up to {} workers{}",
        style("→").cyan(),
        filter
            .as_deref()
            .map(|f| format!("targets where {}", f))
            .unwrap_or_else(|| "all targets".to_string()),
        options.workers,
        if options.force { " (forced drill-down)" } else { "" }
    );

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "\n{} Stopping after the current targets...",
                    style("!").yellow()
                );
                cancel.cancel();
            }
        })
    };

    // Event channel for progress updates
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(100);

    let orchestrator = SessionOrchestrator::new(
        pool,
        ChromiumDriverFactory::new(browser, settings.portal.clone()),
        settings.logs_dir.clone(),
    )
    .with_resolver(settings.column_resolver())
    .with_events(event_tx)
    .with_cancellation(cancel);

    // Spawn event handler task (UI layer)
    let event_handler = tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        let mut summary: Option<SummaryArtifact> = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Progress { progress, .. } => {
                    pb.set_length(progress.total);
                    pb.set_position(progress.processed);
                    pb.set_message(format!(
                        "{} new, {} updated",
                        progress.new_records, progress.updated_records
                    ));
                }
                SessionEvent::Log { line, .. } => match line.level {
                    LogLevel::Warn => {
                        pb.println(format!("  {} {}", style("!").yellow(), line.msg))
                    }
                    LogLevel::Error => pb.println(format!("  {} {}", style("✗").red(), line.msg)),
                    LogLevel::Info => {}
                },
                SessionEvent::Summary { summary: s, .. } => summary = Some(*s),
                SessionEvent::Status { session_id, status } => {
                    tracing::debug!("Session {} is {}", session_id, status.as_str());
                }
            }
        }
        pb.finish_and_clear();
        summary
    });

    let result = orchestrator.run(filter.as_deref(), &options).await;
    // Closes the event channel so the handler can finish.
    drop(orchestrator);
    let summary = event_handler.await.ok().flatten();
    ctrl_c.abort();

    let session = result.context("Harvest session failed")?;
    match summary {
        Some(summary) => print_summary(&summary, settings),
        None => println!(
            "{} Session {} finished without a summary",
            style("!").yellow(),
            session.id
        ),
    }
    Ok(())
}

fn print_summary(summary: &SummaryArtifact, settings: &Settings) {
    if summary.empty {
        println!("{} No targets matched", style("!").yellow());
        return;
    }

    println!(
        "{} Session {} ({}) finished in {}",
        style("✓").green(),
        summary.session_id,
        summary.label,
        summary.duration
    );
    if summary.cancelled {
        println!(
            "  {} cancelled: {} of {} targets processed",
            style("!").yellow(),
            summary.targets_processed,
            summary.targets_total
        );
    } else {
        println!(
            "  {} {} of {} targets processed",
            style("→").dim(),
            summary.targets_processed,
            summary.targets_total
        );
    }
    println!(
        "  {} {} new, {} updated records",
        style("→").dim(),
        summary.new_records,
        summary.updated_records
    );

    if !summary.top_new.is_empty() {
        println!("\n{}", style("Most new records").bold());
        for entry in summary.top_new.iter().take(TOP_NEW_SHOWN) {
            println!("  {:<40} {:>6}", truncate(&entry.display_name, 39), entry.count);
        }
    }

    if !summary.zero_result_targets.is_empty() {
        println!(
            "\n  {} {} targets without changes",
            style("○").dim(),
            summary.zero_result_targets.len()
        );
    }

    if !summary.error_targets.is_empty() {
        println!(
            "\n{} {} targets failed",
            style("✗").red(),
            summary.error_targets.len()
        );
        for error in &summary.error_targets {
            println!(
                "  {:<30} {}",
                truncate(&error.display_name, 29),
                style(&error.message).dim()
            );
        }
    }

    println!(
        "\n  {} log: {}",
        style("→").dim(),
        settings.logs_dir.join(&summary.log_file).display()
    );
    println!(
        "  {} summary: {}",
        style("→").dim(),
        settings.logs_dir.join(&summary.summary_file).display()
    );
}
