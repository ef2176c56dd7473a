use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use shared::WindGrid;

use crate::archive::ArchiveClient;
use crate::viewer;
use crate::wind::{example_grid, velocity_json, WindSource};

pub async fn run(
    address: SocketAddr,
    wind_source: WindSource,
    archive: ArchiveClient,
    refresh: Duration,
    interval: Duration,
) {
    let (wind_tx, wind_rx) = watch::channel(example_grid());
    tokio::spawn(wind_source.refresh_loop(refresh, wind_tx));

    log::info!("Viewer server listening on {}", address);
    warp::serve(routes(wind_rx, Arc::new(archive), interval))
        .run(address)
        .await
}

pub fn routes(
    wind: watch::Receiver<WindGrid>,
    archive: Arc<ArchiveClient>,
    interval: Duration,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health_route = warp::path!("health").map(|| StatusCode::OK);

    let wind_route = warp::path!("wind.json")
        .and(with_wind(wind.clone()))
        .map(|wind: watch::Receiver<WindGrid>| warp::reply::json(&velocity_json(&wind.borrow())));

    let session_route = warp::path("session")
        .and(warp::ws())
        .and(with_wind(wind))
        .map(move |ws: warp::ws::Ws, wind: watch::Receiver<WindGrid>| {
            let archive = archive.clone();
            ws.on_upgrade(move |socket| viewer::start(socket, wind, archive, interval))
        });

    health_route
        .or(wind_route)
        .or(session_route)
        .recover(rejection)
}

fn with_wind(
    wind: watch::Receiver<WindGrid>,
) -> impl Filter<Extract = (watch::Receiver<WindGrid>,), Error = Infallible> + Clone {
    warp::any().map(move || wind.clone())
}

#[derive(Serialize)]
struct ErrorMessage {
    code: u16,
    message: String,
}

pub async fn rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found.")
    } else {
        log::error!("Error: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
    };

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message: message.into(),
    });

    Ok(warp::reply::with_status(json, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::{FromViewer, ToViewer, TrackFile};
    use tokio::time::timeout;

    fn test_routes() -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        // nothing listens on port 1
        routes_with_archive("http://127.0.0.1:1")
    }

    fn routes_with_archive(
        archive_url: &str,
    ) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
        let (_, rx) = watch::channel(example_grid());
        let archive = Arc::new(ArchiveClient::new(archive_url).unwrap());
        routes(rx, archive, Duration::from_millis(100))
    }

    fn fake_archive() -> String {
        let history = warp::path!("historial").map(|| {
            warp::reply::json(&serde_json::json!([
                { "nombre": "a.csv", "enlace": "https://zenodo.org/record/1", "fecha": "2024-01-01" },
            ]))
        });
        let upload = warp::path!("subir-zenodo")
            .and(warp::post())
            .and(warp::multipart::form())
            .map(|_form: warp::multipart::FormData| {
                warp::reply::json(&serde_json::json!({ "zenodo_url": "https://zenodo.org/record/7" }))
            });
        let (addr, server) = warp::serve(history.or(upload)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let res = warp::test::request()
            .path("/health")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wind_json() {
        let res = warp::test::request()
            .path("/wind.json")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = serde_json::from_slice(res.body()).unwrap();
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["header"]["parameterNumber"], 2);
        assert_eq!(records[1]["header"]["parameterNumber"], 3);
        assert_eq!(records[0]["data"].as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_not_found() {
        let res = warp::test::request()
            .path("/nope")
            .reply(&test_routes())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], 404);
    }

    async fn next_message(client: &mut warp::test::WsClient) -> ToViewer {
        let msg = timeout(Duration::from_secs(5), client.recv())
            .await
            .expect("no message from server")
            .expect("websocket closed");
        serde_json::from_str(msg.to_str().unwrap()).unwrap()
    }

    fn send(msg: &FromViewer) -> String {
        serde_json::to_string(msg).unwrap()
    }

    #[tokio::test]
    async fn test_session_shows_wind_then_plays_track() {
        let mut client = warp::test::ws()
            .path("/session")
            .handshake(test_routes())
            .await
            .expect("handshake");

        assert!(matches!(
            next_message(&mut client).await,
            ToViewer::WindOverlay { .. }
        ));
        assert!(matches!(
            next_message(&mut client).await,
            ToViewer::FitBounds { .. }
        ));

        client.send_text(send(&FromViewer::Play)).await;
        match next_message(&mut client).await {
            ToViewer::Error { message } => assert!(message.contains("track")),
            other => panic!("unexpected message: {:?}", other),
        }

        client
            .send_text(send(&FromViewer::LoadTracks {
                files: vec![TrackFile {
                    name: "a.csv".to_string(),
                    csv: "id,lat,lon\nA,41.0,2.0\nB,41.1,2.1".to_string(),
                }],
            }))
            .await;
        client.send_text(send(&FromViewer::Play)).await;

        let mut markers = 0;
        loop {
            match next_message(&mut client).await {
                ToViewer::LayerAdded { layer, .. } => {
                    if matches!(layer, shared::Layer::Marker { .. }) {
                        markers += 1;
                    }
                }
                ToViewer::Progress { ratio } if ratio == 1.0 => break,
                _ => (),
            }
        }
        // two from the load, two from the replay
        assert_eq!(markers, 4);
    }

    #[tokio::test]
    async fn test_session_archive_requests() {
        let mut client = warp::test::ws()
            .path("/session")
            .handshake(routes_with_archive(&fake_archive()))
            .await
            .expect("handshake");
        next_message(&mut client).await;
        next_message(&mut client).await;

        client.send_text(send(&FromViewer::ListHistory)).await;
        match next_message(&mut client).await {
            ToViewer::History { entries } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "a.csv");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        client
            .send_text(send(&FromViewer::Upload {
                file: TrackFile {
                    name: "a.csv".to_string(),
                    csv: "id,lat,lon\nA,41.0,2.0".to_string(),
                },
                author: "Ana".to_string(),
                description: "Regatta".to_string(),
                account: None,
            }))
            .await;
        match next_message(&mut client).await {
            ToViewer::Uploaded { name, url } => {
                assert_eq!(name, "a.csv");
                assert_eq!(url, "https://zenodo.org/record/7");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_reports_unreachable_archive() {
        let mut client = warp::test::ws()
            .path("/session")
            .handshake(test_routes())
            .await
            .expect("handshake");
        next_message(&mut client).await;
        next_message(&mut client).await;

        client.send_text(send(&FromViewer::DeleteHistory)).await;
        match next_message(&mut client).await {
            ToViewer::Error { message } => assert!(message.contains("archive")),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_reports_bad_message() {
        let mut client = warp::test::ws()
            .path("/session")
            .handshake(test_routes())
            .await
            .expect("handshake");
        next_message(&mut client).await;
        next_message(&mut client).await;

        client.send_text("{\"type\":\"Rewind\"}").await;
        assert!(matches!(
            next_message(&mut client).await,
            ToViewer::Error { .. }
        ));
    }
}
