use std::time::Duration;

use shared::WindGrid;

use crate::playback::{Playback, PlaybackError, Tick};
use crate::render::{draw_track, render_wind, MapSurface};
use crate::track::{FileSource, Palette, Track};

/// Everything one map view holds: the surface, the last loaded track and its
/// color cursor, and the playback state.
#[derive(Debug)]
pub struct Session<S> {
    surface: S,
    palette: Palette,
    track: Option<Track>,
    playback: Playback,
}

impl<S: MapSurface> Session<S> {
    pub fn new(surface: S, interval: Duration) -> Self {
        Session {
            surface,
            palette: Palette::default(),
            track: None,
            playback: Playback::new(interval),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut Playback {
        &mut self.playback
    }

    /// Replace the map's tracks with the given files, each drawn in the next
    /// palette color. The last readable file becomes the current track.
    /// Unreadable files are skipped. Returns the number of tracks loaded.
    pub fn load_files<I, F>(&mut self, files: I) -> usize
    where
        I: IntoIterator<Item = F>,
        F: FileSource,
    {
        self.playback.reset();
        self.surface.clear_track_layers();

        let mut loaded = 0;
        for file in files {
            let text = match file.read_text() {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Skipping {}: {:#}", file.name(), err);
                    continue;
                }
            };
            self.add_track(file.name(), &text);
            loaded += 1;
        }
        loaded
    }

    /// Replace the map's tracks with a single one parsed from `text`.
    pub fn load_track(&mut self, name: &str, text: &str) -> &Track {
        self.playback.reset();
        self.surface.clear_track_layers();
        self.add_track(name, text)
    }

    fn add_track(&mut self, name: &str, text: &str) -> &Track {
        let color = self.palette.next();
        let track = Track::parse(name, text, color);
        if track.is_empty() {
            log::warn!("No valid points in {}", name);
        } else {
            log::info!("Loaded {} points from {} ({})", track.len(), name, color);
        }
        draw_track(&mut self.surface, &track);
        self.track.insert(track)
    }

    pub fn show_wind(&mut self, grid: &WindGrid) {
        render_wind(&mut self.surface, grid);
    }

    pub fn start_playback(&mut self) -> Result<(), PlaybackError> {
        let track = self.track.as_ref().ok_or(PlaybackError::NoTrack)?;
        self.playback.start(track, &mut self.surface)
    }

    pub fn tick_playback(&mut self) -> Tick {
        match &self.track {
            Some(track) => self.playback.tick(track, &mut self.surface),
            None => Tick::Stopped,
        }
    }

    pub fn pause_playback(&mut self) {
        self.playback.pause();
    }
}
