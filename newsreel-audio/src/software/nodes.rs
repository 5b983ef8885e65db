//! Software node handles
//!
//! Handles refer to their context weakly; dropping the last handle removes
//! the node from the graph.

use super::context::{ContextInner, Edge, NodeKind};
use crate::backend::{AnalyserNode, AudioNode, GainNode, NodeId};
use crate::error::BackendError;
use newsreel_analysis::FrequencyAnalyser;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub(crate) struct NodeHandle {
    id: NodeId,
    context: Weak<ContextInner>,
}

impl NodeHandle {
    pub fn new(id: NodeId, context: &Arc<ContextInner>) -> Self {
        Self {
            id,
            context: Arc::downgrade(context),
        }
    }

    fn context(&self) -> Result<Arc<ContextInner>, BackendError> {
        self.context
            .upgrade()
            .ok_or_else(|| BackendError::InvalidState("context was dropped".into()))
    }

    fn add_edge(&self, edge: Edge) -> Result<(), BackendError> {
        let context = self.context()?;
        context.ensure_open()?;
        let mut graph = context.graph.lock();

        if let Edge::Node(target) = edge {
            if !graph.contains_node(target) {
                return Err(BackendError::Node(format!(
                    "node {target} does not belong to this context"
                )));
            }
        }

        graph.add_edge(self.id, edge);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        // Disconnecting from a dropped or closed context is a no-op
        if let Some(context) = self.context.upgrade() {
            context.graph.lock().clear_edges(self.id);
        }
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut NodeKind)) {
        if let Some(context) = self.context.upgrade() {
            if let Some(kind) = context.graph.lock().node_mut(self.id) {
                f(kind);
            }
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            context.graph.lock().remove_node(self.id);
        }
    }
}

macro_rules! impl_audio_node {
    ($ty:ty) => {
        impl AudioNode for $ty {
            fn id(&self) -> NodeId {
                self.handle.id
            }

            fn connect(&self, destination: &dyn AudioNode) -> Result<(), BackendError> {
                self.handle.add_edge(Edge::Node(destination.id()))
            }

            fn connect_to_output(&self) -> Result<(), BackendError> {
                self.handle.add_edge(Edge::Output)
            }

            fn disconnect(&self) -> Result<(), BackendError> {
                self.handle.disconnect()
            }
        }
    };
}

/// Source node wrapping a media element
pub struct SoftwareSourceNode {
    handle: NodeHandle,
}

impl SoftwareSourceNode {
    pub(crate) fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }
}

impl_audio_node!(SoftwareSourceNode);

/// Gain stage
pub struct SoftwareGainNode {
    handle: NodeHandle,
}

impl SoftwareGainNode {
    pub(crate) fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }
}

impl_audio_node!(SoftwareGainNode);

impl GainNode for SoftwareGainNode {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn set_gain(&self, gain: f32) {
        if !gain.is_finite() {
            return;
        }
        self.handle.update(|kind| {
            if let NodeKind::Gain(value) = kind {
                *value = gain;
            }
        });
    }
}

/// Analyser stage sharing its DSP state with the graph
pub struct SoftwareAnalyserNode {
    handle: NodeHandle,
    analyser: Arc<Mutex<FrequencyAnalyser>>,
    fft_size: usize,
}

impl SoftwareAnalyserNode {
    pub(crate) fn new(
        handle: NodeHandle,
        analyser: Arc<Mutex<FrequencyAnalyser>>,
        fft_size: usize,
    ) -> Self {
        Self {
            handle,
            analyser,
            fft_size,
        }
    }
}

impl_audio_node!(SoftwareAnalyserNode);

impl AnalyserNode for SoftwareAnalyserNode {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_frequency_data(&self, out: &mut [u8]) {
        self.analyser.lock().byte_frequency_data(out);
    }

    fn byte_time_domain_data(&self, out: &mut [u8]) {
        self.analyser.lock().byte_time_domain_data(out);
    }
}
