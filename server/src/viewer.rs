use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use shared::{FromViewer, ToViewer, WindGrid};

use crate::archive::{ArchiveClient, UploadMetadata};
use crate::playback::Player;
use crate::render::Scene;
use crate::session::Session;
use crate::track::{FileSource, MemoryFile};

/// Serve one connected viewer: its own session and player, fed by the shared
/// wind layer.
pub async fn start(
    ws: WebSocket,
    mut wind: watch::Receiver<WindGrid>,
    archive: Arc<ArchiveClient>,
    interval: Duration,
) {
    let id = Uuid::new_v4();
    log::info!("Viewer {} connected", id);

    let (mut viewer_ws_tx, mut viewer_ws_rx) = ws.split();

    let (tx, mut outbox) = mpsc::unbounded_channel::<ToViewer>();
    tokio::task::spawn(async move {
        while let Some(to_viewer) = outbox.recv().await {
            let encoded = match serde_json::to_string(&to_viewer) {
                Ok(encoded) => encoded,
                Err(e) => {
                    log::error!("Failed to serialize message to viewer: {}", e);
                    continue;
                }
            };
            if let Err(e) = viewer_ws_tx.send(Message::text(encoded)).await {
                log::error!("websocket send error: {}", e);
                break;
            }
        }
    });

    let mut session = Session::new(Scene::with_viewer(tx.clone()), interval);
    let grid = wind.borrow_and_update().clone();
    session.show_wind(&grid);

    let mut player = Player::new(Arc::new(Mutex::new(session)));
    let mut progress = player.subscribe();

    loop {
        tokio::select! {
            received = viewer_ws_rx.next() => {
                let msg = match received {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        log::error!("websocket receive error: {}", e);
                        break;
                    }
                    None => break,
                };
                if let Err(e) = handle_message(msg, &mut player, &archive, &tx).await {
                    log::warn!("Viewer {}: {:#}", id, e);
                    let _ = tx.send(ToViewer::Error {
                        message: format!("{:#}", e),
                    });
                }
            }
            Ok(()) = wind.changed() => {
                let grid = wind.borrow_and_update().clone();
                player.session().lock().await.show_wind(&grid);
            }
            Ok(()) = progress.changed() => {
                let ratio = *progress.borrow_and_update();
                let _ = tx.send(ToViewer::Progress { ratio });
            }
        }
    }

    log::info!("Viewer {} disconnected", id);
}

async fn handle_message(
    msg: Message,
    player: &mut Player<Scene>,
    archive: &Arc<ArchiveClient>,
    tx: &mpsc::UnboundedSender<ToViewer>,
) -> anyhow::Result<()> {
    let Ok(s) = msg.to_str() else {
        // Not a text message, ignoring
        return Ok(());
    };
    let from_viewer: FromViewer = serde_json::from_str(s)?;
    log::debug!("Handling viewer message: {:?}", from_viewer);

    match from_viewer {
        FromViewer::LoadTracks { files } => {
            player.stop();
            let files = files
                .into_iter()
                .map(|file| MemoryFile::new(file.name, file.csv));
            player.session().lock().await.load_files(files);
        }
        FromViewer::Play => player.play().await?,
        FromViewer::Pause => player.pause().await,
        FromViewer::Faster => player.faster().await,
        FromViewer::Slower => player.slower().await,
        FromViewer::Upload {
            file,
            author,
            description,
            account,
        } => {
            let archive = archive.clone();
            reply_later(tx, async move {
                let metadata = UploadMetadata::new(&author, &description, account.as_deref());
                let file = MemoryFile::new(file.name, file.csv);
                let receipt = archive.upload(&file, &metadata).await?;
                Ok(ToViewer::Uploaded {
                    name: file.name().to_string(),
                    url: receipt.url,
                })
            });
        }
        FromViewer::ListHistory => {
            let archive = archive.clone();
            reply_later(tx, async move {
                let entries = archive.list_history().await?;
                Ok(ToViewer::History { entries })
            });
        }
        FromViewer::DeleteHistory => {
            let archive = archive.clone();
            reply_later(tx, async move {
                archive.delete_history().await?;
                Ok(ToViewer::HistoryDeleted)
            });
        }
    }
    Ok(())
}

/// Run an archive request off the message loop and send its outcome, or the
/// error, to the viewer.
fn reply_later<F>(tx: &mpsc::UnboundedSender<ToViewer>, request: F)
where
    F: Future<Output = anyhow::Result<ToViewer>> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let reply = request.await.unwrap_or_else(|e| {
            log::warn!("Archive request failed: {:#}", e);
            ToViewer::Error {
                message: format!("{:#}", e),
            }
        });
        let _ = tx.send(reply);
    });
}
