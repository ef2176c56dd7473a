use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use archive::{ArchiveClient, UploadMetadata};
use cli::{Cli, Command, HistorySubCommand};
use config::config;

mod archive;
mod cli;
mod config;
mod playback;
mod render;
mod server;
mod session;
mod tools;
mod track;
mod viewer;
mod wind;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Cli::parse();
    let archive_url = args
        .archive_url
        .clone()
        .unwrap_or_else(|| config().archive_url.clone());

    match args.cmd {
        Command::Show {
            files,
            upload,
            author,
            description,
            account,
        } => {
            let archive = ArchiveClient::new(&archive_url)?;
            let metadata = upload.then(|| {
                UploadMetadata::new(
                    author.as_deref().unwrap_or_default(),
                    description.as_deref().unwrap_or_default(),
                    account.as_deref(),
                )
            });
            let upload = metadata.map(|metadata| (&archive, metadata));
            tools::tracks::show(files, upload, config().playback_interval()).await
        }
        Command::Play { file, interval_ms } => {
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config().playback_interval());
            tools::tracks::play(file, interval).await
        }
        Command::Wind { url } => {
            tools::wind::exec(&url.unwrap_or_else(|| config().wind_url(&archive_url))).await
        }
        Command::Upload {
            file,
            author,
            description,
            account,
        } => {
            let archive = ArchiveClient::new(&archive_url)?;
            let metadata = UploadMetadata::new(&author, &description, account.as_deref());
            tools::archive::upload(&archive, file, metadata).await
        }
        Command::History(history) => {
            let archive = ArchiveClient::new(&archive_url)?;
            match history.cmd {
                HistorySubCommand::List => tools::archive::list(&archive).await,
                HistorySubCommand::Delete { yes } => tools::archive::delete(&archive, yes).await,
            }
        }
        Command::Serve { address } => {
            let wind_source = wind::WindSource::new(&config().wind_url(&archive_url))?;
            server::run(
                address,
                wind_source,
                ArchiveClient::new(&archive_url)?,
                config().wind_refresh(),
                config().playback_interval(),
            )
            .await;
            Ok(())
        }
    }
}
