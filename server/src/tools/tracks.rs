use anyhow::{bail, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::archive::{ArchiveClient, UploadMetadata};
use crate::playback::Player;
use crate::render::Scene;
use crate::session::Session;
use crate::track::LocalFile;

/// Draw the files on a fresh scene and print it, optionally archiving each file.
pub async fn show(
    files: Vec<PathBuf>,
    upload: Option<(&ArchiveClient, UploadMetadata)>,
    interval: Duration,
) -> Result<()> {
    let files: Vec<LocalFile> = files.iter().map(LocalFile::new).collect();

    let mut session = Session::new(Scene::new(), interval);
    let loaded = session.load_files(files.iter().cloned());
    log::info!("Loaded {} of {} track files", loaded, files.len());

    println!("{}", serde_json::to_string_pretty(session.surface())?);

    if let Some((archive, metadata)) = upload {
        let mut failures = 0;
        for file in &files {
            match archive.upload(file, &metadata).await {
                Ok(receipt) => println!("Uploaded to Zenodo: {}", receipt.url),
                Err(err) => {
                    println!("Upload failed: {:#}", err);
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            bail!("{} of {} uploads failed", failures, files.len());
        }
    }
    Ok(())
}

/// Replay one track, printing progress in place until it finishes.
pub async fn play(file: PathBuf, interval: Duration) -> Result<()> {
    let mut session = Session::new(Scene::new(), interval);
    session.load_files([LocalFile::new(&file)]);
    let points = match session.track() {
        Some(track) if !track.is_empty() => track.len(),
        _ => bail!("No points to play in {}", file.display()),
    };

    let session = Arc::new(Mutex::new(session));
    let mut player = Player::new(session.clone());
    let mut progress = player.subscribe();

    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let ratio = *progress.borrow_and_update();
            print!("\r  Progress: {:>3.0}%", ratio * 100.0);
            let _ = io::stdout().flush();
        }
    });

    player.play().await?;
    player.wait().await;
    printer.abort();
    println!();

    let session = session.lock().await;
    println!(
        "  Played {} points: {} markers, {} segments",
        points,
        session.surface().markers().count(),
        session.surface().polylines().count()
    );
    Ok(())
}
