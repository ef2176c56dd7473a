use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct LngLatBounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl LngLatBounds {
    /// Smallest box containing every position, `None` when there are none.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LngLat>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => LngLatBounds { sw: p, ne: p },
                Some(b) => LngLatBounds {
                    sw: LngLat {
                        lng: b.sw.lng.min(p.lng),
                        lat: b.sw.lat.min(p.lat),
                    },
                    ne: LngLat {
                        lng: b.ne.lng.max(p.lng),
                        lat: b.ne.lat.max(p.lat),
                    },
                },
            })
        })
    }
}

/// One row of a track file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TrackPoint {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

impl TrackPoint {
    pub fn position(&self) -> LngLat {
        LngLat {
            lng: self.lon,
            lat: self.lat,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindHeader {
    pub lo1: f64,
    pub la1: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub ref_time: String,
    pub parameter_unit: String,
}

impl WindHeader {
    /// `nx * ny`, saturating instead of overflowing.
    pub fn cell_count(&self) -> usize {
        self.nx.saturating_mul(self.ny)
    }
}

/// U/V wind field over a regular lng/lat grid, rows running north to south
/// from `la1` and columns east from `lo1`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WindGrid {
    pub header: WindHeader,
    pub components: [Vec<f64>; 2],
    /// False when a geometric header field had to be defaulted.
    #[serde(skip)]
    pub header_known: bool,
}

impl WindGrid {
    pub fn u(&self) -> &[f64] {
        &self.components[0]
    }

    pub fn v(&self) -> &[f64] {
        &self.components[1]
    }

    /// Grid bounding box, only when the header came fully from upstream.
    pub fn bounds(&self) -> Option<LngLatBounds> {
        if !self.header_known || self.header.nx == 0 || self.header.ny == 0 {
            return None;
        }
        let h = &self.header;
        let east = h.lo1 + (h.nx - 1) as f64 * h.dx;
        let south = h.la1 - (h.ny - 1) as f64 * h.dy;
        Some(LngLatBounds {
            sw: LngLat {
                lng: h.lo1.min(east),
                lat: h.la1.min(south),
            },
            ne: LngLat {
                lng: h.lo1.max(east),
                lat: h.la1.max(south),
            },
        })
    }
}

/// Velocity overlay styling.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindStyle {
    pub color_scale: Vec<String>,
    pub opacity: f64,
    pub max_velocity: f64,
    pub velocity_scale: f64,
    pub particle_age: u32,
    pub line_width: f64,
}

impl Default for WindStyle {
    fn default() -> Self {
        WindStyle {
            color_scale: ["#2c7bb6", "#abd9e9", "#ffffbf", "#fdae61", "#d7191c"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            opacity: 0.2,
            max_velocity: 15.0,
            velocity_scale: 0.01,
            particle_age: 40,
            line_width: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WindOverlay {
    pub grid: WindGrid,
    pub style: WindStyle,
}

pub type LayerId = u64;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Layer {
    Polyline {
        points: Vec<LngLat>,
        color: String,
    },
    Marker {
        position: LngLat,
        color: String,
        radius: f64,
        fill_opacity: f64,
        popup: String,
    },
}

/// Archived upload, as listed by the archive service.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "enlace", default)]
    pub link: String,
    #[serde(rename = "fecha", default)]
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(known: bool) -> WindGrid {
        WindGrid {
            header: WindHeader {
                lo1: 2.0,
                la1: 42.0,
                dx: 0.5,
                dy: 0.25,
                nx: 3,
                ny: 5,
                ref_time: "2024-01-01T00:00:00Z".to_string(),
                parameter_unit: "m.s-1".to_string(),
            },
            components: [vec![0.0; 15], vec![0.0; 15]],
            header_known: known,
        }
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = LngLatBounds::from_points(vec![
            LngLat { lng: 2.0, lat: 41.0 },
            LngLat { lng: 2.5, lat: 40.5 },
            LngLat { lng: 1.5, lat: 41.2 },
        ])
        .unwrap();
        assert_eq!(bounds.sw, LngLat { lng: 1.5, lat: 40.5 });
        assert_eq!(bounds.ne, LngLat { lng: 2.5, lat: 41.2 });
    }

    #[test]
    fn test_bounds_from_no_points() {
        assert!(LngLatBounds::from_points(Vec::new()).is_none());
    }

    #[test]
    fn test_wind_grid_bounds() {
        let bounds = grid(true).bounds().unwrap();
        assert_eq!(bounds.sw, LngLat { lng: 2.0, lat: 41.0 });
        assert_eq!(bounds.ne, LngLat { lng: 3.0, lat: 42.0 });
    }

    #[test]
    fn test_wind_grid_bounds_unknown_header() {
        assert!(grid(false).bounds().is_none());
    }

    #[test]
    fn test_history_entry_wire_names() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{"nombre":"track.csv","enlace":"https://zenodo.org/record/1","fecha":"2024-05-01"}"#,
        )
        .unwrap();
        assert_eq!(entry.name, "track.csv");
        assert_eq!(entry.link, "https://zenodo.org/record/1");
        assert_eq!(entry.date, "2024-05-01");
    }

    #[test]
    fn test_history_entry_missing_fields() {
        let entry: HistoryEntry = serde_json::from_str(r#"{"nombre":"track.csv"}"#).unwrap();
        assert_eq!(entry.name, "track.csv");
        assert_eq!(entry.date, "");
    }

    #[test]
    fn test_cell_count_saturates() {
        let header = WindHeader {
            lo1: 0.0,
            la1: 0.0,
            dx: 1.0,
            dy: 1.0,
            nx: usize::MAX,
            ny: 2,
            ref_time: String::new(),
            parameter_unit: String::new(),
        };
        assert_eq!(header.cell_count(), usize::MAX);
    }

    #[test]
    fn test_layer_tagging() {
        let layer = Layer::Polyline {
            points: vec![LngLat { lng: 2.0, lat: 41.0 }],
            color: "red".to_string(),
        };
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["kind"], "polyline");
        assert_eq!(json["color"], "red");
    }
}
