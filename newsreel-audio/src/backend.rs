//! Platform audio primitives
//!
//! The graph manager only ever talks to these traits, so the native software
//! backend and test doubles are interchangeable. Semantics follow the usual
//! audio-graph model: a context owns nodes, nodes are wired with `connect`,
//! and a media element can be wrapped by a source node exactly once.

use crate::error::BackendError;
use crate::media::MediaElement;
use std::sync::Arc;

/// Identifier of a node, unique across contexts
pub type NodeId = u64;

/// Lifecycle state of an audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not producing audio (e.g. before a user gesture)
    Suspended,
    Running,
    Closed,
}

/// Factory for audio contexts
pub trait AudioBackend: Send + Sync {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Create a new processing context
    fn create_context(&self) -> Result<Arc<dyn AudioContext>, BackendError>;
}

/// A processing context owning a graph of nodes
pub trait AudioContext: Send + Sync {
    fn state(&self) -> ContextState;

    fn sample_rate(&self) -> u32;

    /// Seconds of audio rendered so far
    fn current_time(&self) -> f64;

    fn resume(&self) -> Result<(), BackendError>;

    /// Release the context; every node becomes inert
    fn close(&self) -> Result<(), BackendError>;

    /// Wrap a media element. Irreversible: the element can never be wrapped again.
    fn create_media_source(&self, element: &MediaElement)
        -> Result<Arc<dyn AudioNode>, BackendError>;

    fn create_gain(&self) -> Result<Arc<dyn GainNode>, BackendError>;

    fn create_analyser(&self, fft_size: usize) -> Result<Arc<dyn AnalyserNode>, BackendError>;
}

/// A node in a context's graph
pub trait AudioNode: Send + Sync {
    fn id(&self) -> NodeId;

    /// Route this node's output into `destination`
    fn connect(&self, destination: &dyn AudioNode) -> Result<(), BackendError>;

    /// Route this node's output to the context's audio output
    fn connect_to_output(&self) -> Result<(), BackendError>;

    /// Remove every outgoing connection
    fn disconnect(&self) -> Result<(), BackendError>;
}

/// Volume stage
pub trait GainNode: AudioNode {
    fn as_node(&self) -> &dyn AudioNode;

    fn set_gain(&self, gain: f32);
}

/// Frequency/time-domain sampling stage; passes audio through unchanged
pub trait AnalyserNode: AudioNode {
    fn as_node(&self) -> &dyn AudioNode;

    fn fft_size(&self) -> usize;

    /// Number of bins written by `byte_frequency_data` (half the FFT size)
    fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    /// Write the current spectrum, one byte per bin
    fn byte_frequency_data(&self, out: &mut [u8]);

    /// Write the current waveform, 128 being silence
    fn byte_time_domain_data(&self, out: &mut [u8]);
}
