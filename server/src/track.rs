use anyhow::{Context, Result};
use bytes::Bytes;
use std::iter::Skip;
use std::path::{Path, PathBuf};
use std::str::Lines;

use shared::{LngLatBounds, TrackPoint};

/// Display colors handed out to successive tracks.
pub const PALETTE: [&str; 5] = ["red", "blue", "green", "purple", "orange"];

/// Round-robin cursor over [`PALETTE`].
#[derive(Clone, Debug, Default)]
pub struct Palette {
    index: usize,
}

impl Palette {
    pub fn next(&mut self) -> &'static str {
        let color = PALETTE[self.index % PALETTE.len()];
        self.index += 1;
        color
    }
}

/// Lazy iterator over the data rows of a track CSV.
///
/// Cloning yields an independent cursor positioned at the same row, so a
/// sequence can be replayed from the start by cloning it before consumption.
#[derive(Clone, Debug)]
pub struct Points<'a> {
    lines: Skip<Lines<'a>>,
}

impl<'a> Iterator for Points<'a> {
    type Item = TrackPoint;

    fn next(&mut self) -> Option<TrackPoint> {
        for line in self.lines.by_ref() {
            if let Some(point) = parse_row(line) {
                return Some(point);
            }
        }
        None
    }
}

/// Parse the points of a CSV track: header line first, then `id,lat,lon` rows.
///
/// Rows whose latitude or longitude is missing or not a finite number are
/// skipped.
pub fn parse_points(text: &str) -> Points<'_> {
    Points {
        lines: text.trim().lines().skip(1),
    }
}

fn parse_row(line: &str) -> Option<TrackPoint> {
    let mut fields = line.split(',');
    let id = fields.next()?.trim();
    let lat = parse_coord(fields.next()?)?;
    let lon = parse_coord(fields.next()?)?;
    Some(TrackPoint {
        id: id.to_string(),
        lat,
        lon,
    })
}

fn parse_coord(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub name: String,
    pub points: Vec<TrackPoint>,
    pub color: String,
}

impl Track {
    pub fn parse(name: &str, text: &str, color: &str) -> Self {
        Track {
            name: name.to_string(),
            points: parse_points(text).collect(),
            color: color.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> Option<LngLatBounds> {
        LngLatBounds::from_points(self.points.iter().map(TrackPoint::position))
    }
}

/// Where track file contents come from.
pub trait FileSource {
    fn name(&self) -> &str;

    fn read_bytes(&self) -> Result<Bytes>;

    /// Contents decoded as UTF-8, invalid sequences replaced.
    fn read_text(&self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A track file on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
}

impl LocalFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        LocalFile { path, name }
    }
}

impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Bytes> {
        let content = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read track file {}", self.path.display()))?;
        Ok(Bytes::from(content))
    }
}

/// A track file already held in memory, e.g. received from a viewer.
#[derive(Clone, Debug)]
pub struct MemoryFile {
    pub name: String,
    pub content: Bytes,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        MemoryFile {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Bytes> {
        Ok(self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn point(id: &str, lat: f64, lon: f64) -> TrackPoint {
        TrackPoint {
            id: id.to_string(),
            lat,
            lon,
        }
    }

    #[test]
    fn test_parse_drops_bad_row() {
        let points: Vec<_> = parse_points("id,lat,lon\nA,41.0,2.0\nB,41.1,2.1\nC,bad,2.2").collect();
        assert_eq!(
            points,
            vec![point("A", 41.0, 2.0), point("B", 41.1, 2.1)]
        );
    }

    #[test]
    fn test_parse_keeps_row_order() {
        let mut csv = String::from("id,lat,lon\n");
        for i in 0..50 {
            csv.push_str(&format!("P{},{},{}\n", i, 40.0 + i as f64 * 0.01, 2.0));
        }
        let points: Vec<_> = parse_points(&csv).collect();
        assert_eq!(points.len(), 50);
        for (i, p) in points.iter().enumerate() {
            assert_eq!(p.id, format!("P{}", i));
        }
    }

    #[test]
    fn test_parse_trims_id_and_values() {
        let points: Vec<_> = parse_points("id,lat,lon\r\n  A , 41.5 , 2.25 \r\n").collect();
        assert_eq!(points, vec![point("A", 41.5, 2.25)]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert_eq!(parse_points("").count(), 0);
        assert_eq!(parse_points("id,lat,lon\n").count(), 0);
    }

    #[test]
    fn test_parse_only_bad_rows() {
        let track = Track::parse("bad.csv", "id,lat,lon\nA,x,2\nB,41,\nC\n\n", "red");
        assert!(track.is_empty());
        assert!(track.bounds().is_none());
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        let points: Vec<_> = parse_points("id,lat,lon\nA,NaN,2\nB,inf,2\nC,41,2").collect();
        assert_eq!(points, vec![point("C", 41.0, 2.0)]);
    }

    #[test]
    fn test_parse_ignores_extra_columns() {
        let points: Vec<_> = parse_points("id,lat,lon,alt\nA,41,2,120").collect();
        assert_eq!(points, vec![point("A", 41.0, 2.0)]);
    }

    #[test]
    fn test_points_restartable() {
        let points = parse_points("id,lat,lon\nA,41,2\nB,42,3");
        let first: Vec<_> = points.clone().collect();
        let second: Vec<_> = points.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_palette_round_robin() {
        let mut palette = Palette::default();
        let colors: Vec<_> = (0..7).map(|_| palette.next()).collect();
        assert_eq!(
            colors,
            vec!["red", "blue", "green", "purple", "orange", "red", "blue"]
        );
    }

    #[test]
    fn test_track_bounds() {
        let track = Track::parse("t.csv", "id,lat,lon\nA,41,2\nB,41.5,1.5", "red");
        let bounds = track.bounds().unwrap();
        assert_eq!(bounds.sw.lat, 41.0);
        assert_eq!(bounds.sw.lng, 1.5);
        assert_eq!(bounds.ne.lat, 41.5);
        assert_eq!(bounds.ne.lng, 2.0);
    }

    #[test]
    fn test_local_file_source() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "id,lat,lon\nA,41,2\n").unwrap();
        let file = LocalFile::new(tmp.path());
        assert_eq!(file.read_text().unwrap(), "id,lat,lon\nA,41,2\n");
        assert!(!file.name().is_empty());
    }

    #[test]
    fn test_local_file_missing() {
        let file = LocalFile::new("/nonexistent/track.csv");
        assert_eq!(file.name(), "track.csv");
        assert!(file.read_text().is_err());
    }

    #[test]
    fn test_memory_file_lossy_text() {
        let file = MemoryFile::new("m.csv", vec![b'i', b'd', 0xff]);
        assert_eq!(file.read_text().unwrap(), "id\u{fffd}");
    }
}
