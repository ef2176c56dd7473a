//! Timed replay of a track, one point per tick.
//!
//! [`Playback`] is the state machine; it only moves when [`Playback::tick`] is
//! called. [`Player`] owns the timer that calls it for a shared [`Session`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use shared::LngLat;

use crate::render::{marker, polyline, MapSurface};
use crate::session::Session;
use crate::track::Track;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Interval change applied by one faster/slower step, in milliseconds.
pub const SPEED_STEP_MS: i64 = 200;

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("Load a track before playing")]
    NoTrack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tick {
    /// Point `index - 1` was drawn.
    Drew { index: usize, progress: f64 },
    /// Every point has been drawn; the timer should stop.
    Finished,
    /// Not playing; the timer should stop.
    Stopped,
}

#[derive(Debug)]
pub struct Playback {
    state: PlaybackState,
    index: usize,
    line: Vec<LngLat>,
    interval: Duration,
}

impl Default for Playback {
    fn default() -> Self {
        Playback::new(DEFAULT_INTERVAL)
    }
}

impl Playback {
    pub fn new(interval: Duration) -> Self {
        Playback {
            state: PlaybackState::Idle,
            index: 0,
            line: Vec::new(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin from the first point, wiping whatever track layers are drawn.
    /// Always restarts at index 0, including after a pause.
    pub fn start<S: MapSurface + ?Sized>(
        &mut self,
        track: &Track,
        surface: &mut S,
    ) -> Result<(), PlaybackError> {
        if track.is_empty() {
            return Err(PlaybackError::NoTrack);
        }
        surface.clear_track_layers();
        self.index = 0;
        self.line.clear();
        self.state = PlaybackState::Playing;
        Ok(())
    }

    pub fn tick<S: MapSurface + ?Sized>(&mut self, track: &Track, surface: &mut S) -> Tick {
        if self.state != PlaybackState::Playing {
            return Tick::Stopped;
        }
        let Some(point) = track.points.get(self.index) else {
            self.state = PlaybackState::Finished;
            return Tick::Finished;
        };

        surface.add_layer(marker(point, &track.color));
        self.line.push(point.position());
        if self.line.len() > 1 {
            surface.add_layer(polyline(&self.line[self.line.len() - 2..], &track.color));
        }

        self.index += 1;
        Tick::Drew {
            index: self.index,
            progress: self.index as f64 / track.len() as f64,
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    /// Back to `Idle`, e.g. when the track is replaced.
    pub fn reset(&mut self) {
        self.state = PlaybackState::Idle;
        self.index = 0;
        self.line.clear();
    }

    /// Shift the tick interval by `delta_ms`, never below [`MIN_INTERVAL`].
    /// Takes effect on the next start.
    pub fn set_speed(&mut self, delta_ms: i64) {
        let current = self.interval.as_millis() as i64;
        let next = (current + delta_ms).max(MIN_INTERVAL.as_millis() as i64);
        self.interval = Duration::from_millis(next as u64);
    }

    pub fn faster(&mut self) {
        self.set_speed(-SPEED_STEP_MS);
    }

    pub fn slower(&mut self) {
        self.set_speed(SPEED_STEP_MS);
    }
}

pub type SharedSession<S> = Arc<Mutex<Session<S>>>;

/// Drives a session's playback from a tokio timer. At most one timer runs
/// per player; progress (0.0..=1.0) is published on a watch channel.
pub struct Player<S> {
    session: SharedSession<S>,
    timer: Option<JoinHandle<()>>,
    progress: Arc<watch::Sender<f64>>,
}

impl<S> Player<S>
where
    S: MapSurface + Send + 'static,
{
    pub fn new(session: SharedSession<S>) -> Self {
        let (progress, _) = watch::channel(0.0);
        Player {
            session,
            timer: None,
            progress: Arc::new(progress),
        }
    }

    pub fn session(&self) -> &SharedSession<S> {
        &self.session
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub async fn play(&mut self) -> Result<(), PlaybackError> {
        self.stop();

        let period = {
            let mut session = self.session.lock().await;
            session.start_playback()?;
            session.playback().interval()
        };
        self.progress.send_replace(0.0);

        let session = self.session.clone();
        let progress = self.progress.clone();
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let tick = session.lock().await.tick_playback();
                match tick {
                    Tick::Drew { progress: ratio, .. } => {
                        progress.send_replace(ratio);
                    }
                    Tick::Finished => {
                        progress.send_replace(1.0);
                        log::debug!("Playback finished");
                        return;
                    }
                    Tick::Stopped => return,
                }
            }
        }));
        Ok(())
    }

    pub async fn pause(&mut self) {
        self.stop();
        self.session.lock().await.pause_playback();
    }

    pub async fn faster(&self) {
        self.session.lock().await.playback_mut().faster();
    }

    pub async fn slower(&self) {
        self.session.lock().await.playback_mut().slower();
    }

    /// Cancel the timer, if any, leaving the playback state untouched.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Wait for the running playback to end on its own.
    pub async fn wait(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _ = timer.await;
        }
    }
}

impl<S> Drop for Player<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
