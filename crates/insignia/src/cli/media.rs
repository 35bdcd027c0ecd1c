//! Store, retrieve and delete commands.

use super::OutputFormat;
use insignia::{DeletionOutcome, Insignia, InsigniaConfig};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Store a file and print the resulting link.
pub async fn store_media(
    config: &InsigniaConfig,
    media_class: &str,
    file: &Path,
    name: Option<&str>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("{} has no file name; pass --name", file.display()))?,
    };
    let bytes = tokio::fs::read(file).await?;

    let insignia = Insignia::connect(config).await?;
    let stored = insignia.media().store_media(bytes, media_class, &name).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stored)?),
        OutputFormat::Human => {
            println!("Link:    {}/{}", stored.link().media_class(), stored.link().name());
            println!("Blob:    {}", stored.blob_id());
            println!("Digest:  {}", stored.digest());
            if let Some(expires_at) = stored.link().expires_at() {
                println!("Expires: {}", expires_at);
            }
            if *stored.deduplicated() {
                println!("Identical content was already stored; reused it.");
            }
        }
    }
    Ok(())
}

/// Write the content behind a link to `output`, or stdout.
pub async fn retrieve_media(
    config: &InsigniaConfig,
    media_class: &str,
    name: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let insignia = Insignia::connect(config).await?;
    let bytes = insignia.media().retrieve_media(media_class, name).await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &bytes).await?;
            tracing::info!(path = %path.display(), size = bytes.len(), "Wrote media");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// Delete a link.
pub async fn delete_media(
    config: &InsigniaConfig,
    media_class: &str,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let insignia = Insignia::connect(config).await?;
    match insignia.media().delete_media(media_class, name).await? {
        DeletionOutcome::Deleted { blob_deleted: true, .. } => {
            println!("Deleted {}/{} and its content", media_class, name)
        }
        DeletionOutcome::Deleted { .. } => {
            println!("Deleted {}/{}; the content is still linked elsewhere", media_class, name)
        }
        DeletionOutcome::AlreadyGone => println!("{}/{} was already gone", media_class, name),
    }
    Ok(())
}
