//! Native software backend
//!
//! Renders the node graph in-process in 128-frame quanta. The output device
//! thread pulls audio through a `Renderer`, which always follows the most
//! recently created context.

mod context;
mod nodes;

pub use context::SoftwareContext;
pub use nodes::{SoftwareAnalyserNode, SoftwareGainNode, SoftwareSourceNode};

use crate::backend::{AudioBackend, AudioContext, ContextState};
use crate::error::BackendError;
use context::ContextInner;
use parking_lot::Mutex;
use std::sync::Arc;

/// Frames per render quantum
pub const RENDER_QUANTUM: usize = 128;

/// Backend creating software-rendered contexts
pub struct SoftwareBackend {
    sample_rate: u32,
    start_suspended: bool,
    current: Arc<Mutex<Option<Arc<ContextInner>>>>,
}

impl SoftwareBackend {
    /// Contexts start suspended until resumed, like a platform context
    /// created before a user gesture
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            start_suspended: true,
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// Choose whether new contexts start suspended
    pub fn with_start_suspended(mut self, start_suspended: bool) -> Self {
        self.start_suspended = start_suspended;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Handle for the output thread
    pub fn renderer(&self) -> Renderer {
        Renderer {
            current: self.current.clone(),
        }
    }
}

impl AudioBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_context(&self) -> Result<Arc<dyn AudioContext>, BackendError> {
        if self.sample_rate == 0 {
            return Err(BackendError::Unavailable("sample rate is zero".into()));
        }

        let initial = if self.start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };
        let inner = Arc::new(ContextInner::new(self.sample_rate, initial));
        *self.current.lock() = Some(inner.clone());

        tracing::debug!(sample_rate = self.sample_rate, state = ?initial, "Created software context");
        Ok(Arc::new(SoftwareContext::from_inner(inner)))
    }
}

/// Pulls rendered audio from the current context
#[derive(Clone)]
pub struct Renderer {
    current: Arc<Mutex<Option<Arc<ContextInner>>>>,
}

impl Renderer {
    /// Fill `output` with interleaved stereo; silence when nothing is running
    pub fn render(&self, output: &mut [f32]) {
        let context = self.current.lock().clone();
        match context {
            Some(context) => context.render(output),
            None => output.fill(0.0),
        }
    }

    /// Non-blocking variant for real-time callbacks: silence on contention
    pub fn try_render(&self, output: &mut [f32]) {
        let context = match self.current.try_lock() {
            Some(current) => current.clone(),
            None => {
                output.fill(0.0);
                return;
            }
        };
        match context {
            Some(context) => context.try_render(output),
            None => output.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{DecodedAudio, MediaElement};

    fn tone(frames: usize, rate: u32) -> DecodedAudio {
        let samples = (0..frames)
            .flat_map(|i| {
                let v = (i as f32 * 0.3).sin() * 0.5;
                [v, v]
            })
            .collect();
        DecodedAudio::new(samples, rate)
    }

    #[test]
    fn test_context_starts_suspended_and_renders_silence() {
        let backend = SoftwareBackend::new(48000);
        let context = backend.create_context().unwrap();
        assert_eq!(context.state(), ContextState::Suspended);

        let element = MediaElement::with_audio("a", tone(4800, 48000));
        let source = context.create_media_source(&element).unwrap();
        source.connect_to_output().unwrap();
        element.play().unwrap();

        let mut out = vec![1.0f32; 256];
        backend.renderer().render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(element.current_time(), 0.0);
    }

    #[test]
    fn test_chain_renders_through_gain_and_analyser() {
        let backend = SoftwareBackend::new(48000).with_start_suspended(false);
        let context = backend.create_context().unwrap();

        let element = MediaElement::with_audio("a", tone(48000, 48000));
        let source = context.create_media_source(&element).unwrap();
        let gain = context.create_gain().unwrap();
        let analyser = context.create_analyser(256).unwrap();
        source.connect(gain.as_node()).unwrap();
        gain.connect(analyser.as_node()).unwrap();
        analyser.connect_to_output().unwrap();
        gain.set_gain(0.5);
        element.play().unwrap();

        let mut out = vec![0.0f32; 1024];
        backend.renderer().render(&mut out);

        let expected = (1.0f32 * 0.3).sin() * 0.5 * 0.5;
        assert!((out[2] - expected).abs() < 1e-6);
        assert!(context.current_time() > 0.0);

        let mut bins = vec![0u8; analyser.frequency_bin_count()];
        analyser.byte_frequency_data(&mut bins);
        assert!(bins.iter().any(|&b| b > 0));
    }

    #[test]
    fn test_element_can_only_be_wrapped_once() {
        let backend = SoftwareBackend::new(48000);
        let context = backend.create_context().unwrap();
        let element = MediaElement::new("a");
        let _first = context.create_media_source(&element).unwrap();
        assert!(matches!(
            context.create_media_source(&element),
            Err(BackendError::AlreadyWrapped(_))
        ));
    }

    #[test]
    fn test_closed_context_refuses_nodes() {
        let backend = SoftwareBackend::new(48000);
        let context = backend.create_context().unwrap();
        context.close().unwrap();
        assert_eq!(context.state(), ContextState::Closed);
        assert!(context.create_gain().is_err());
        assert!(context.resume().is_err());

        // Closing does not consume the element's one-time claim
        let element = MediaElement::new("a");
        assert!(context.create_media_source(&element).is_err());
        assert!(!element.is_claimed());
    }

    #[test]
    fn test_disconnect_silences_output() {
        let backend = SoftwareBackend::new(48000).with_start_suspended(false);
        let context = backend.create_context().unwrap();
        let element = MediaElement::with_audio("a", tone(48000, 48000));
        let source = context.create_media_source(&element).unwrap();
        source.connect_to_output().unwrap();
        element.play().unwrap();

        source.disconnect().unwrap();
        let mut out = vec![1.0f32; 256];
        backend.renderer().render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_renderer_without_context_is_silent() {
        let backend = SoftwareBackend::new(44100);
        let mut out = vec![1.0f32; 64];
        backend.renderer().try_render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_zero_sample_rate_is_unavailable() {
        let backend = SoftwareBackend::new(0);
        assert!(matches!(
            backend.create_context(),
            Err(BackendError::Unavailable(_))
        ));
    }
}
