use anyhow::Result;
use dialoguer::Confirm;
use std::path::PathBuf;

use crate::archive::{ArchiveClient, UploadMetadata};
use crate::track::LocalFile;

pub async fn upload(archive: &ArchiveClient, file: PathBuf, metadata: UploadMetadata) -> Result<()> {
    let receipt = archive.upload(&LocalFile::new(file), &metadata).await?;
    println!("Uploaded to Zenodo: {}", receipt.url);
    Ok(())
}

pub async fn list(archive: &ArchiveClient) -> Result<()> {
    let history = archive.list_history().await?;
    if history.is_empty() {
        println!("No archived uploads.");
    }
    for entry in history {
        println!("{}  {}\n    {}", entry.date, entry.name, entry.link);
    }
    Ok(())
}

pub async fn delete(archive: &ArchiveClient, yes: bool) -> Result<()> {
    let confirmed = yes
        || Confirm::new()
            .with_prompt("Delete the whole upload history?")
            .default(false)
            .interact()?;
    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }

    archive.delete_history().await?;
    println!("History deleted.");
    Ok(())
}
