//! Migration, sweeper daemon and one-shot sweep commands.

use super::OutputFormat;
use chrono::Utc;
use insignia::{Insignia, InsigniaConfig};

/// Apply pending database migrations.
pub async fn run_migrations(config: &InsigniaConfig) -> Result<(), Box<dyn std::error::Error>> {
    insignia::migrate(config).await?;
    Ok(())
}

/// Run the expiry sweeper until Ctrl-C.
pub async fn serve(config: &InsigniaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let insignia = Insignia::connect(config).await?;
    let sweeper = insignia.spawn_sweeper()?;
    tracing::info!(schedule = ?insignia.schedule(), "Insignia sweeper running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!(state = %insignia.sweeper().state(), "Shutting down");
    sweeper.abort();
    Ok(())
}

/// Sweep once and print the report.
pub async fn sweep(config: &InsigniaConfig, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let insignia = Insignia::connect(config).await?;
    let report = insignia.sweeper().run_once(Utc::now()).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Human => {
            println!("Expired links examined: {}", report.examined);
            println!("Links removed:          {}", report.removed);
            println!("Blobs deleted:          {}", report.blobs_deleted);
            println!("Unlinked blobs released: {}", report.unreferenced_released);
            println!("Failures:               {}", report.failed);
        }
    }
    Ok(())
}
