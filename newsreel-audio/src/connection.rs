//! Per-source processing chain

use crate::backend::{AnalyserNode, AudioNode, GainNode};
use crate::graph::{FrequencyBuffer, VisualizerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One source's chain: source → gain → analyser → output
pub(crate) struct AudioConnection {
    pub key: String,
    pub source: Arc<dyn AudioNode>,
    pub gain: Arc<dyn GainNode>,
    pub analyser: Arc<dyn AnalyserNode>,
    pub data: FrequencyBuffer,
    pub live: Arc<AtomicBool>,
}

impl AudioConnection {
    pub fn handle(&self) -> VisualizerHandle {
        VisualizerHandle::new(
            self.key.clone(),
            self.analyser.clone(),
            self.data.clone(),
            self.live.clone(),
        )
    }

    /// Disconnect every node; failures are logged and do not stop the rest
    pub fn disconnect(&self) {
        self.live.store(false, Ordering::Release);
        disconnect_chain(
            &self.key,
            Some(self.source.as_ref()),
            Some(self.gain.as_node()),
            Some(self.analyser.as_node()),
        );
    }
}

/// Disconnect whatever part of a chain exists, source first
pub(crate) fn disconnect_chain(
    key: &str,
    source: Option<&dyn AudioNode>,
    gain: Option<&dyn AudioNode>,
    analyser: Option<&dyn AudioNode>,
) {
    let stages = [("source", source), ("gain", gain), ("analyser", analyser)];
    for (stage, node) in stages {
        let Some(node) = node else {
            continue;
        };
        if let Err(e) = node.disconnect() {
            tracing::warn!(key, stage, error = %e, "Failed to disconnect node");
        }
    }
}
