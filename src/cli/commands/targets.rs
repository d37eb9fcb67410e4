//! Target catalog commands.

use console::style;

use crate::config::Settings;
use crate::models::Target;
use crate::repository::DieselTargetRepository;

use super::helpers::truncate;

/// List catalog targets.
pub async fn cmd_targets_list(settings: &Settings) -> anyhow::Result<()> {
    let repo = DieselTargetRepository::new(settings.pool());
    let targets = repo.list().await?;

    if targets.is_empty() {
        println!(
            "{} No targets in the catalog. Add one with 'bidharvest targets add'.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Targets").bold());
    println!("{}", "-".repeat(78));
    println!("{:<15} {:<28} {:<6} Base address", "ID", "Name", "Region");
    println!("{}", "-".repeat(78));

    for target in targets {
        println!(
            "{:<15} {:<28} {:<6} {}",
            truncate(&target.id, 15),
            truncate(&target.display_name, 27),
            target.region.as_deref().unwrap_or("-"),
            target.base_address.as_deref().unwrap_or("(none)")
        );
    }

    Ok(())
}

/// Add or replace a catalog target.
pub async fn cmd_targets_add(
    settings: &Settings,
    id: &str,
    name: &str,
    base_address: &str,
    region: Option<&str>,
) -> anyhow::Result<()> {
    let parsed = url::Url::parse(base_address)
        .map_err(|e| anyhow::anyhow!("Invalid base address '{}': {}", base_address, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Base address must be http(s): {}", base_address);
    }

    let repo = DieselTargetRepository::new(settings.pool());
    let target = Target::new(id, name, base_address);
    let region = region.map(str::to_uppercase);
    repo.save(&target, region.as_deref()).await?;

    println!("{} Saved target {} ({})", style("✓").green(), id, name);
    Ok(())
}
