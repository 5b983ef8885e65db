//! Single-track playback
//!
//! At most one track plays at a time. Starting a track always tears the
//! previous one down first, and pausing or reaching the end removes the
//! track's chain from the shared graph.

use crate::error::PlaybackError;
use crate::graph::{AudioGraphManager, VisualizerHandle};
use crate::media::{DecodedAudio, MediaElement, MediaEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// A playable narration or clip
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub audio_url: String,
    /// Where playback starts, in seconds
    pub offset_secs: f64,
}

impl Track {
    pub fn new(id: impl Into<String>, audio_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio_url: audio_url.into(),
            offset_secs: 0.0,
        }
    }

    pub fn with_offset(mut self, offset_secs: f64) -> Self {
        self.offset_secs = offset_secs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Ended,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged {
        track_id: String,
        state: PlaybackState,
    },
    Error {
        track_id: String,
        message: String,
    },
}

/// Fetches and decodes a track's audio
pub trait TrackSource: Send + Sync {
    fn load(&self, url: &str) -> Result<DecodedAudio, Box<dyn std::error::Error + Send + Sync>>;
}

struct ActiveTrack {
    track: Track,
    element: MediaElement,
    events: Receiver<MediaEvent>,
    visualizer: VisualizerHandle,
}

struct ControllerState {
    state: PlaybackState,
    active: Option<ActiveTrack>,
    last_error: Option<String>,
    volume: f32,
}

pub struct PlaybackController {
    manager: Arc<AudioGraphManager>,
    source: Arc<dyn TrackSource>,
    /// Serializes play/pause/end handling
    transport: Mutex<()>,
    inner: Mutex<ControllerState>,
    subscribers: Mutex<Vec<Sender<PlaybackEvent>>>,
}

impl PlaybackController {
    pub fn new(manager: Arc<AudioGraphManager>, source: Arc<dyn TrackSource>) -> Self {
        Self {
            manager,
            source,
            transport: Mutex::new(()),
            inner: Mutex::new(ControllerState {
                state: PlaybackState::Idle,
                active: None,
                last_error: None,
                volume: 1.0,
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Play `track`, stopping whatever else is playing first.
    ///
    /// Playing the track that is already playing does nothing. On failure the
    /// controller is back to `Idle` with nothing left in the graph.
    pub fn play(&self, track: &Track) -> Result<(), PlaybackError> {
        let _transport = self.transport.lock();
        self.finish_if_ended();
        if self.is_playing(&track.id) {
            tracing::debug!(track = %track.id, "Track already playing");
            return Ok(());
        }

        self.stop_current();
        self.set_state(&track.id, PlaybackState::Loading);

        match self.start(track) {
            Ok(active) => {
                self.inner.lock().active = Some(active);
                self.set_state(&track.id, PlaybackState::Playing);
                tracing::info!(track = %track.id, "Playing");
                Ok(())
            }
            Err(e) => {
                self.manager.cleanup(Some(&track.audio_url));
                tracing::warn!(track = %track.id, error = %e, "Playback failed");
                self.inner.lock().last_error = Some(e.to_string());
                self.emit(PlaybackEvent::Error {
                    track_id: track.id.clone(),
                    message: e.to_string(),
                });
                self.set_state(&track.id, PlaybackState::Error);
                self.set_state(&track.id, PlaybackState::Idle);
                Err(e)
            }
        }
    }

    fn start(&self, track: &Track) -> Result<ActiveTrack, PlaybackError> {
        let audio = self
            .source
            .load(&track.audio_url)
            .map_err(|source| PlaybackError::Source {
                url: track.audio_url.clone(),
                source,
            })?;

        let element = MediaElement::new(track.audio_url.as_str());
        let events = element.subscribe();
        element.load(audio);

        let visualizer = self.manager.create_connection(&track.audio_url, &element)?;
        let volume = self.inner.lock().volume;
        self.manager.set_gain(&track.audio_url, volume);

        if track.offset_secs > 0.0 {
            element.seek(track.offset_secs)?;
        }
        element.play()?;

        Ok(ActiveTrack {
            track: track.clone(),
            element,
            events,
            visualizer,
        })
    }

    /// Stop the current track and remove its chain
    pub fn pause(&self) {
        let _transport = self.transport.lock();
        self.stop_current();
    }

    fn stop_current(&self) {
        let active = self.inner.lock().active.take();
        if let Some(active) = active {
            self.manager.cleanup(Some(&active.track.audio_url));
            active.element.pause();
            self.set_state(&active.track.id, PlaybackState::Idle);
            tracing::debug!(track = %active.track.id, "Stopped track");
        }
    }

    /// Handle element notifications; call periodically from the UI loop.
    ///
    /// Returns true when the current track reached its end.
    pub fn pump_events(&self) -> bool {
        let _transport = self.transport.lock();
        self.finish_if_ended()
    }

    /// Tear down the current track if it played to the end.
    /// Callers hold the transport lock.
    fn finish_if_ended(&self) -> bool {
        let ended = {
            let inner = self.inner.lock();
            match inner.active.as_ref() {
                Some(active) => {
                    let notified = active
                        .events
                        .try_iter()
                        .fold(false, |seen, event| {
                            seen || matches!(event, MediaEvent::Ended { .. })
                        });
                    notified || active.element.is_ended()
                }
                None => false,
            }
        };
        if !ended {
            return false;
        }

        let active = self.inner.lock().active.take();
        if let Some(active) = active {
            self.set_state(&active.track.id, PlaybackState::Ended);
            self.manager.cleanup(Some(&active.track.audio_url));
            self.set_state(&active.track.id, PlaybackState::Idle);
            tracing::info!(track = %active.track.id, "Track finished");
        }
        true
    }

    /// Volume for the current and future tracks, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        let mut inner = self.inner.lock();
        inner.volume = volume;
        if let Some(active) = inner.active.as_ref() {
            self.manager.set_gain(&active.track.audio_url, volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.lock().active.as_ref().map(|a| a.track.clone())
    }

    pub fn is_playing(&self, track_id: &str) -> bool {
        let inner = self.inner.lock();
        inner.state == PlaybackState::Playing
            && inner
                .active
                .as_ref()
                .is_some_and(|a| a.track.id == track_id && !a.element.is_ended())
    }

    /// Playhead of the current track in seconds
    pub fn position(&self) -> Option<f64> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.element.current_time())
    }

    pub fn visualizer(&self) -> Option<VisualizerHandle> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.visualizer.clone())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn set_state(&self, track_id: &str, state: PlaybackState) {
        self.inner.lock().state = state;
        self.emit(PlaybackEvent::StateChanged {
            track_id: track_id.to_string(),
            state,
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::software::SoftwareBackend;
    use crate::testing::FakeBackend;
    use std::collections::HashSet;

    struct StaticSource {
        frames: usize,
        missing: HashSet<String>,
    }

    impl StaticSource {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                missing: HashSet::new(),
            }
        }

        fn missing(mut self, url: &str) -> Self {
            self.missing.insert(url.to_string());
            self
        }
    }

    impl TrackSource for StaticSource {
        fn load(
            &self,
            url: &str,
        ) -> Result<DecodedAudio, Box<dyn std::error::Error + Send + Sync>> {
            if self.missing.contains(url) {
                return Err(format!("{url} not found").into());
            }
            Ok(DecodedAudio::new(vec![0.1; self.frames * 2], 48000))
        }
    }

    fn controller(backend: &Arc<FakeBackend>, source: StaticSource) -> PlaybackController {
        let manager = Arc::new(AudioGraphManager::new(
            backend.clone(),
            GraphConfig::default(),
        ));
        PlaybackController::new(manager, Arc::new(source))
    }

    #[test]
    fn test_new_track_stops_previous_first() {
        let backend = Arc::new(FakeBackend::new());
        let controller = controller(&backend, StaticSource::new(48000));
        let a = Track::new("a", "a.mp3");
        let b = Track::new("b", "b.mp3");

        controller.play(&a).unwrap();
        assert!(controller.is_playing("a"));
        controller.play(&b).unwrap();

        let log = backend.log();
        let stop_a = log
            .iter()
            .position(|e| e == "disconnect source:a.mp3")
            .unwrap();
        let start_b = log
            .iter()
            .position(|e| e == "create source:b.mp3")
            .unwrap();
        assert!(stop_a < start_b);

        assert!(!controller.is_playing("a"));
        assert!(controller.is_playing("b"));
        assert_eq!(controller.manager.state().active_connections, 1);
    }

    #[test]
    fn test_same_track_is_a_no_op() {
        let backend = Arc::new(FakeBackend::new());
        let controller = controller(&backend, StaticSource::new(48000));
        let a = Track::new("a", "a.mp3");

        controller.play(&a).unwrap();
        controller.play(&a).unwrap();
        assert_eq!(backend.sources_created(), 1);
        assert!(controller.is_playing("a"));
    }

    #[test]
    fn test_load_failure_resets_to_idle() {
        let backend = Arc::new(FakeBackend::new());
        let controller = controller(&backend, StaticSource::new(48000).missing("bad.mp3"));
        let events = controller.subscribe();

        let result = controller.play(&Track::new("bad", "bad.mp3"));
        assert!(matches!(result, Err(PlaybackError::Source { .. })));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.current_track().is_none());
        assert!(controller.last_error().is_some());
        assert_eq!(controller.manager.state().active_connections, 0);

        let states: Vec<PlaybackState> = events
            .try_iter()
            .filter_map(|e| match e {
                PlaybackEvent::StateChanged { state, .. } => Some(state),
                PlaybackEvent::Error { .. } => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PlaybackState::Loading,
                PlaybackState::Error,
                PlaybackState::Idle
            ]
        );

        // Still usable
        controller.play(&Track::new("good", "good.mp3")).unwrap();
        assert!(controller.is_playing("good"));
    }

    #[test]
    fn test_graph_failure_leaves_nothing_behind() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_fail_gain(true);
        let controller = controller(&backend, StaticSource::new(48000));

        let result = controller.play(&Track::new("a", "a.mp3"));
        assert!(matches!(result, Err(PlaybackError::Graph(_))));
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(!controller.manager.contains("a.mp3"));
    }

    #[test]
    fn test_pause_tears_down_chain() {
        let backend = Arc::new(FakeBackend::new());
        let controller = controller(&backend, StaticSource::new(48000));
        controller.play(&Track::new("a", "a.mp3")).unwrap();
        assert!(controller.visualizer().is_some());

        controller.pause();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.current_track().is_none());
        assert!(!controller.manager.contains("a.mp3"));
    }

    #[test]
    fn test_offset_and_volume_apply() {
        let backend = Arc::new(FakeBackend::new());
        let controller = controller(&backend, StaticSource::new(48000));
        controller.set_volume(2.0);
        assert_eq!(controller.volume(), 1.0);
        controller.set_volume(0.5);

        controller
            .play(&Track::new("a", "a.mp3").with_offset(0.25))
            .unwrap();
        assert_eq!(controller.position(), Some(0.25));
        assert!(backend.log().contains(&"gain 0.5".to_string()));
    }

    #[test]
    fn test_natural_end_returns_to_idle() {
        let backend = Arc::new(SoftwareBackend::new(48000).with_start_suspended(false));
        let renderer = backend.renderer();
        let manager = Arc::new(AudioGraphManager::new(
            backend.clone(),
            GraphConfig::default(),
        ));
        let controller = PlaybackController::new(manager, Arc::new(StaticSource::new(256)));
        let events = controller.subscribe();

        controller.play(&Track::new("a", "a.mp3")).unwrap();
        assert!(!controller.pump_events());

        let mut out = vec![0.0f32; 1024];
        renderer.render(&mut out);
        assert!(out[0] > 0.0);

        assert!(controller.pump_events());
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.current_track().is_none());

        let states: Vec<PlaybackState> = events
            .try_iter()
            .filter_map(|e| match e {
                PlaybackEvent::StateChanged { state, .. } => Some(state),
                PlaybackEvent::Error { .. } => None,
            })
            .collect();
        assert_eq!(
            &states[states.len() - 2..],
            &[PlaybackState::Ended, PlaybackState::Idle]
        );
    }

    #[test]
    fn test_replay_after_end_without_pumping() {
        let backend = Arc::new(SoftwareBackend::new(48000).with_start_suspended(false));
        let renderer = backend.renderer();
        let manager = Arc::new(AudioGraphManager::new(
            backend.clone(),
            GraphConfig::default(),
        ));
        let controller = PlaybackController::new(manager, Arc::new(StaticSource::new(256)));
        let a = Track::new("a", "a.mp3");

        controller.play(&a).unwrap();
        let mut out = vec![0.0f32; 1024];
        renderer.render(&mut out);
        assert!(!controller.is_playing("a"));

        controller.play(&a).unwrap();
        assert!(controller.is_playing("a"));
        assert_eq!(controller.state(), PlaybackState::Playing);

        let mut out = vec![0.0f32; 256];
        renderer.render(&mut out);
        assert!(out.iter().any(|&s| s > 0.0));
    }
}
