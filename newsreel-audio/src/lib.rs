//! Audio core for Newsreel
//!
//! This crate owns everything that touches the audio processing graph:
//! - Backend: the platform audio primitives (context, source, gain, analyser)
//! - Software: a native backend rendering the graph in-process
//! - Graph: the manager multiplexing sources onto one shared context
//! - Media: playable element handles that source nodes wrap
//! - Playback: single-track playback on top of the graph manager

pub mod backend;
mod connection;
mod error;
mod graph;
mod media;
mod playback;
pub mod software;

#[cfg(test)]
mod testing;

pub use backend::{AnalyserNode, AudioBackend, AudioContext, AudioNode, ContextState, GainNode, NodeId};
pub use error::{BackendError, ElementError, GraphError, PlaybackError};
pub use graph::{
    AudioGraphManager, FrequencyBuffer, GraphConfig, GraphEvent, GraphSnapshot, Subscription,
    SubscriptionId, VisualizerHandle,
};
pub use media::{DecodedAudio, MediaElement, MediaEvent, ReadyState};
pub use playback::{PlaybackController, PlaybackEvent, PlaybackState, Track, TrackSource};
pub use software::{Renderer, SoftwareBackend};
