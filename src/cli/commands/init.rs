//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::init_schema;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    init_schema(&settings.pool()).await?;

    println!(
        "{} Initialized bidharvest in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!(
        "  {} Add targets with 'bidharvest targets add <id> <name> <base-address>'",
        style("→").dim()
    );

    Ok(())
}
