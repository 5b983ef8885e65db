//! Playable media element handles
//!
//! A `MediaElement` is the handle a source node wraps: decoded audio plus a
//! playhead. Clones share the same element. Wrapping is a one-time claim, so
//! a second source node for the same element is refused.

use crate::error::ElementError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Decoded audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved stereo samples (f32, -1.0 to 1.0)
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// How much of the element is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
}

/// Notifications emitted by an element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { element: u64 },
    Play { element: u64 },
    Pause { element: u64 },
    Ended { element: u64 },
}

struct Playhead {
    audio: Option<DecodedAudio>,
    /// Position in source frames (fractional when resampling)
    position: f64,
    paused: bool,
    ended: bool,
}

struct ElementInner {
    id: u64,
    src: String,
    claimed: AtomicBool,
    playhead: Mutex<Playhead>,
    metadata_ready: Condvar,
    listeners: Mutex<Vec<Sender<MediaEvent>>>,
}

/// Shared handle to a playable element
#[derive(Clone)]
pub struct MediaElement {
    inner: Arc<ElementInner>,
}

impl std::fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaElement")
            .field("id", &self.inner.id)
            .field("src", &self.inner.src)
            .finish()
    }
}

impl MediaElement {
    /// Create an empty element for `src`
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ElementInner {
                id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed),
                src: src.into(),
                claimed: AtomicBool::new(false),
                playhead: Mutex::new(Playhead {
                    audio: None,
                    position: 0.0,
                    paused: true,
                    ended: false,
                }),
                metadata_ready: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create an element with audio already loaded
    pub fn with_audio(src: impl Into<String>, audio: DecodedAudio) -> Self {
        let element = Self::new(src);
        element.load(audio);
        element
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn src(&self) -> &str {
        &self.inner.src
    }

    /// Attach decoded audio, rewinding and waking metadata waiters
    pub fn load(&self, audio: DecodedAudio) {
        {
            let mut playhead = self.inner.playhead.lock();
            playhead.audio = Some(audio);
            playhead.position = 0.0;
            playhead.ended = false;
            self.inner.metadata_ready.notify_all();
        }
        self.emit(MediaEvent::LoadedMetadata {
            element: self.inner.id,
        });
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.inner.playhead.lock().audio.is_some() {
            ReadyState::HaveMetadata
        } else {
            ReadyState::HaveNothing
        }
    }

    /// Block until audio is loaded or `timeout` elapses
    pub fn wait_for_metadata(&self, timeout: Duration) -> Result<(), ElementError> {
        let deadline = Instant::now() + timeout;
        let mut playhead = self.inner.playhead.lock();
        while playhead.audio.is_none() {
            if self
                .inner
                .metadata_ready
                .wait_until(&mut playhead, deadline)
                .timed_out()
            {
                if playhead.audio.is_some() {
                    break;
                }
                return Err(ElementError::MetadataTimeout(self.inner.src.clone()));
            }
        }
        Ok(())
    }

    /// Claim the element for a source node. Returns false if already claimed.
    pub fn claim_source(&self) -> bool {
        self.inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.inner.claimed.load(Ordering::Acquire)
    }

    /// Start or resume playback
    pub fn play(&self) -> Result<(), ElementError> {
        {
            let mut playhead = self.inner.playhead.lock();
            if playhead.audio.is_none() {
                return Err(ElementError::NoAudio(self.inner.src.clone()));
            }
            if playhead.ended {
                playhead.position = 0.0;
                playhead.ended = false;
            }
            playhead.paused = false;
        }
        self.emit(MediaEvent::Play {
            element: self.inner.id,
        });
        Ok(())
    }

    pub fn pause(&self) {
        let was_playing = {
            let mut playhead = self.inner.playhead.lock();
            !std::mem::replace(&mut playhead.paused, true)
        };
        if was_playing {
            self.emit(MediaEvent::Pause {
                element: self.inner.id,
            });
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.playhead.lock().paused
    }

    pub fn is_ended(&self) -> bool {
        self.inner.playhead.lock().ended
    }

    /// Move the playhead, clamped to the element's duration
    pub fn seek(&self, position_secs: f64) -> Result<(), ElementError> {
        if !position_secs.is_finite() || position_secs < 0.0 {
            return Err(ElementError::InvalidSeek(position_secs));
        }
        let mut playhead = self.inner.playhead.lock();
        let Some(audio) = playhead.audio.as_ref() else {
            return Err(ElementError::NoAudio(self.inner.src.clone()));
        };
        let frames = audio.frames() as f64;
        playhead.position = (position_secs * audio.sample_rate as f64).min(frames);
        playhead.ended = false;
        Ok(())
    }

    /// Playhead position in seconds
    pub fn current_time(&self) -> f64 {
        let playhead = self.inner.playhead.lock();
        match playhead.audio.as_ref() {
            Some(audio) if audio.sample_rate > 0 => playhead.position / audio.sample_rate as f64,
            _ => 0.0,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.inner
            .playhead
            .lock()
            .audio
            .as_ref()
            .map(DecodedAudio::duration_secs)
    }

    /// Receive this element's events
    pub fn subscribe(&self) -> Receiver<MediaEvent> {
        let (tx, rx) = unbounded();
        self.inner.listeners.lock().push(tx);
        rx
    }

    fn emit(&self, event: MediaEvent) {
        self.inner
            .listeners
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Render interleaved stereo at `output_rate`, advancing the playhead
    ///
    /// Writes silence while paused or empty. Reaching the end pauses the
    /// element and emits `Ended`.
    pub(crate) fn render_into(&self, output: &mut [f32], output_rate: u32) {
        let ended_now = {
            let mut playhead = self.inner.playhead.lock();
            let Playhead {
                audio,
                position,
                paused,
                ended,
            } = &mut *playhead;

            let audio = match audio.as_ref() {
                Some(audio) if !*paused && output_rate > 0 => audio,
                _ => {
                    output.fill(0.0);
                    return;
                }
            };

            let samples = &audio.samples;
            let frame_count = audio.frames();
            let step = audio.sample_rate as f64 / output_rate as f64;
            let mut hit_end = false;

            for frame in output.chunks_mut(2) {
                let pos = *position as usize;
                if hit_end || pos + 1 > frame_count {
                    hit_end = true;
                    frame.fill(0.0);
                    continue;
                }

                // Linear interpolation between neighbouring frames
                let frac = position.fract() as f32;
                let (l0, r0) = (samples[pos * 2], samples[pos * 2 + 1]);
                let (l1, r1) = if pos + 1 < frame_count {
                    (samples[pos * 2 + 2], samples[pos * 2 + 3])
                } else {
                    (l0, r0)
                };
                frame[0] = l0 + frac * (l1 - l0);
                if frame.len() > 1 {
                    frame[1] = r0 + frac * (r1 - r0);
                }

                *position += step;
            }

            if hit_end || *position as usize >= frame_count {
                *position = frame_count as f64;
                *paused = true;
                *ended = true;
                true
            } else {
                false
            }
        };

        if ended_now {
            tracing::debug!(src = %self.inner.src, "Media element reached end");
            self.emit(MediaEvent::Ended {
                element: self.inner.id,
            });
        }
    }
}
