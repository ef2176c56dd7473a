use serde::{Deserialize, Serialize};

use super::models::*;

/// A track file sent inline by a viewer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TrackFile {
    pub name: String,
    pub csv: String,
}

/// Messages sent from a viewer to the server
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum FromViewer {
    LoadTracks { files: Vec<TrackFile> },
    Play,
    Pause,
    Faster,
    Slower,
    Upload {
        file: TrackFile,
        author: String,
        description: String,
        account: Option<String>,
    },
    ListHistory,
    DeleteHistory,
}

/// Messages sent from the server to a viewer
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ToViewer {
    LayerAdded { id: LayerId, layer: Layer },
    TrackLayersCleared,
    WindOverlay { overlay: WindOverlay },
    FitBounds { bounds: LngLatBounds },
    Progress { ratio: f64 },
    Uploaded { name: String, url: String },
    History { entries: Vec<HistoryEntry> },
    HistoryDeleted,
    Error { message: String },
}
