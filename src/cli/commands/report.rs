//! Reporting commands.

use console::style;

use crate::config::Settings;
use crate::repository::DieselReportRepository;

use super::helpers::truncate;

/// Show the most recent update date and per-target counts for it.
pub async fn cmd_last_update(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let report = DieselReportRepository::new(settings.pool())
        .last_update_summary()
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let Some(ref last_date) = report.last_date else {
        println!("{} No records harvested yet", style("!").yellow());
        return Ok(());
    };

    println!("\n{} {}", style("Last update:").bold(), last_date);
    println!("{}", "-".repeat(50));
    for row in &report.rows {
        println!("{:<40} {:>8}", truncate(&row.display_name, 39), row.count);
    }
    Ok(())
}

/// Show thirty-day statistics.
pub async fn cmd_stats(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let stats = DieselReportRepository::new(settings.pool()).stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("\n{}", style("Top targets by new records (30 days)").bold());
    println!("{}", "-".repeat(50));
    if stats.top_new.is_empty() {
        println!("  {}", style("none").dim());
    }
    for row in &stats.top_new {
        println!("{:<40} {:>8}", truncate(&row.display_name, 39), row.count);
    }

    println!("\n{}", style("Days since last new record").bold());
    println!("{}", "-".repeat(50));
    for row in &stats.idle {
        println!("{:<40} {:>8}", truncate(&row.display_name, 39), row.idle_days);
    }

    println!("\n{}", style("Modalities (30 days)").bold());
    println!("{}", "-".repeat(50));
    for row in &stats.modalities {
        println!("{:<40} {:>8}", truncate(&row.modality, 39), row.count);
    }
    Ok(())
}
