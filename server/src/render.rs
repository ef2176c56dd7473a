use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use shared::{
    Layer, LayerId, LngLat, LngLatBounds, ToViewer, TrackPoint, WindGrid, WindOverlay, WindStyle,
};

use crate::track::Track;

const MARKER_RADIUS: f64 = 4.0;
const MARKER_FILL_OPACITY: f64 = 0.8;

/// Whatever tracks and the wind overlay get drawn on.
pub trait MapSurface {
    fn add_layer(&mut self, layer: Layer) -> LayerId;

    /// Remove every polyline and point marker. The wind overlay stays.
    fn clear_track_layers(&mut self);

    /// Replace the current wind overlay, if any.
    fn set_wind_overlay(&mut self, overlay: WindOverlay);

    fn fit_bounds(&mut self, bounds: LngLatBounds);
}

pub fn popup_text(point: &TrackPoint) -> String {
    format!(
        "Point ID: {}\nLat: {}\nLon: {}",
        point.id, point.lat, point.lon
    )
}

pub fn marker(point: &TrackPoint, color: &str) -> Layer {
    Layer::Marker {
        position: point.position(),
        color: color.to_string(),
        radius: MARKER_RADIUS,
        fill_opacity: MARKER_FILL_OPACITY,
        popup: popup_text(point),
    }
}

pub fn polyline(points: &[LngLat], color: &str) -> Layer {
    Layer::Polyline {
        points: points.to_vec(),
        color: color.to_string(),
    }
}

/// Clear previous track layers, then draw `track`.
pub fn render_track<S: MapSurface + ?Sized>(surface: &mut S, track: &Track) {
    surface.clear_track_layers();
    draw_track(surface, track);
}

/// Draw `track` on top of what is already there: one marker per point, one
/// polyline through all of them, viewport fitted to the points. An empty
/// track draws nothing.
pub fn draw_track<S: MapSurface + ?Sized>(surface: &mut S, track: &Track) {
    let Some(bounds) = track.bounds() else {
        return;
    };

    for point in &track.points {
        surface.add_layer(marker(point, &track.color));
    }
    let line: Vec<LngLat> = track.points.iter().map(TrackPoint::position).collect();
    surface.add_layer(polyline(&line, &track.color));
    surface.fit_bounds(bounds);
}

pub fn render_wind<S: MapSurface + ?Sized>(surface: &mut S, grid: &WindGrid) {
    surface.set_wind_overlay(WindOverlay {
        grid: grid.clone(),
        style: WindStyle::default(),
    });
    if let Some(bounds) = grid.bounds() {
        surface.fit_bounds(bounds);
    }
}

/// In-memory map state. When attached to a viewer, every change is also
/// forwarded as a [`ToViewer`] message.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    layers: BTreeMap<LayerId, Layer>,
    wind: Option<WindOverlay>,
    viewport: Option<LngLatBounds>,
    #[serde(skip)]
    next_id: LayerId,
    #[serde(skip)]
    viewer: Option<mpsc::UnboundedSender<ToViewer>>,
}

impl Scene {
    pub fn new() -> Self {
        Scene::default()
    }

    pub fn with_viewer(viewer: mpsc::UnboundedSender<ToViewer>) -> Self {
        Scene {
            viewer: Some(viewer),
            ..Scene::default()
        }
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn markers(&self) -> impl Iterator<Item = &Layer> {
        self.layers()
            .filter(|l| matches!(l, Layer::Marker { .. }))
    }

    pub fn polylines(&self) -> impl Iterator<Item = &Layer> {
        self.layers()
            .filter(|l| matches!(l, Layer::Polyline { .. }))
    }

    pub fn wind(&self) -> Option<&WindOverlay> {
        self.wind.as_ref()
    }

    pub fn viewport(&self) -> Option<&LngLatBounds> {
        self.viewport.as_ref()
    }

    fn publish(&self, message: ToViewer) {
        if let Some(viewer) = &self.viewer {
            // the viewer may already be gone
            let _ = viewer.send(message);
        }
    }
}

impl MapSurface for Scene {
    fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = self.next_id;
        self.next_id += 1;
        self.publish(ToViewer::LayerAdded {
            id,
            layer: layer.clone(),
        });
        self.layers.insert(id, layer);
        id
    }

    fn clear_track_layers(&mut self) {
        self.layers.clear();
        self.publish(ToViewer::TrackLayersCleared);
    }

    fn set_wind_overlay(&mut self, overlay: WindOverlay) {
        self.publish(ToViewer::WindOverlay {
            overlay: overlay.clone(),
        });
        self.wind = Some(overlay);
    }

    fn fit_bounds(&mut self, bounds: LngLatBounds) {
        self.viewport = Some(bounds);
        self.publish(ToViewer::FitBounds { bounds });
    }
}
