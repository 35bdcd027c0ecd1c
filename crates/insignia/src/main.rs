//! Insignia CLI binary.
//!
//! This binary provides command-line access to the media store:
//! - Apply database migrations
//! - Run the expiry sweeper as a daemon, or once
//! - Store, retrieve and delete media by name

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, delete_media, retrieve_media, run_migrations, serve, store_media, sweep};
    use insignia::observability::{ObservabilityConfig, init_observability};

    // Parse command-line arguments
    let cli = Cli::parse();

    let mut observability = ObservabilityConfig::new().with_json_logs(cli.json_logs);
    if cli.verbose {
        observability = observability.with_log_level("debug");
    }
    init_observability(&observability)?;

    let config = insignia::InsigniaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Migrate => run_migrations(&config).await?,
        Commands::Serve => serve(&config).await?,
        Commands::Sweep { format } => sweep(&config, format).await?,
        Commands::Store {
            media_class,
            file,
            name,
            format,
        } => store_media(&config, &media_class, &file, name.as_deref(), format).await?,
        Commands::Retrieve {
            media_class,
            name,
            output,
        } => retrieve_media(&config, &media_class, &name, output.as_deref()).await?,
        Commands::Delete { media_class, name } => delete_media(&config, &media_class, &name).await?,
    }

    Ok(())
}
