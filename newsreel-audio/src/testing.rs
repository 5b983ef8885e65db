//! Recording test backend with failure injection

use crate::backend::{AnalyserNode, AudioBackend, AudioContext, AudioNode, ContextState, GainNode, NodeId};
use crate::error::BackendError;
use crate::media::MediaElement;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Shared {
    log: Mutex<Vec<String>>,
    next_id: AtomicU64,
    contexts: AtomicUsize,
    sources: AtomicUsize,
    start_suspended: AtomicBool,
    fail_context: AtomicBool,
    fail_resume: AtomicBool,
    fail_gain: AtomicBool,
    fail_disconnect: Mutex<Option<String>>,
    /// (entered, release): source creation signals `entered` then blocks on `release`
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl Shared {
    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub(crate) struct FakeBackend {
    shared: Arc<Shared>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.shared.log.lock().clone()
    }

    pub fn contexts_created(&self) -> usize {
        self.shared.contexts.load(Ordering::SeqCst)
    }

    pub fn sources_created(&self) -> usize {
        self.shared.sources.load(Ordering::SeqCst)
    }

    pub fn set_start_suspended(&self, value: bool) {
        self.shared.start_suspended.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_context(&self, value: bool) {
        self.shared.fail_context.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_resume(&self, value: bool) {
        self.shared.fail_resume.store(value, Ordering::SeqCst);
    }

    pub fn set_fail_gain(&self, value: bool) {
        self.shared.fail_gain.store(value, Ordering::SeqCst);
    }

    /// Make disconnect fail for nodes whose label starts with `prefix`
    pub fn set_fail_disconnect(&self, prefix: &str) {
        *self.shared.fail_disconnect.lock() = Some(prefix.to_string());
    }

    /// Hold source creation until released.
    ///
    /// Returns a receiver signalled when a build reaches source creation and
    /// a sender that lets it continue.
    pub fn install_gate(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        *self.shared.gate.lock() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn remove_gate(&self) {
        *self.shared.gate.lock() = None;
    }
}

impl AudioBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_context(&self) -> Result<Arc<dyn AudioContext>, BackendError> {
        if self.shared.fail_context.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("injected failure".into()));
        }
        self.shared.contexts.fetch_add(1, Ordering::SeqCst);
        self.shared.record("create context".into());

        let state = if self.shared.start_suspended.load(Ordering::SeqCst) {
            ContextState::Suspended
        } else {
            ContextState::Running
        };
        Ok(Arc::new(FakeContext {
            shared: self.shared.clone(),
            state: Mutex::new(state),
        }))
    }
}

struct FakeContext {
    shared: Arc<Shared>,
    state: Mutex<ContextState>,
}

impl FakeContext {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if *self.state.lock() == ContextState::Closed {
            return Err(BackendError::InvalidState("context is closed".into()));
        }
        Ok(())
    }

    fn node(&self, label: impl FnOnce(NodeId) -> String) -> FakeNode {
        let id = self.shared.id();
        let label = label(id);
        self.shared.record(format!("create {label}"));
        FakeNode {
            id,
            label,
            shared: self.shared.clone(),
        }
    }
}

impl AudioContext for FakeContext {
    fn state(&self) -> ContextState {
        *self.state.lock()
    }

    fn sample_rate(&self) -> u32 {
        48000
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn resume(&self) -> Result<(), BackendError> {
        if self.shared.fail_resume.load(Ordering::SeqCst) {
            return Err(BackendError::InvalidState("injected resume failure".into()));
        }
        self.ensure_open()?;
        self.shared.record("resume".into());
        *self.state.lock() = ContextState::Running;
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        self.shared.record("close".into());
        *self.state.lock() = ContextState::Closed;
        Ok(())
    }

    fn create_media_source(
        &self,
        element: &MediaElement,
    ) -> Result<Arc<dyn AudioNode>, BackendError> {
        let gate = self.shared.gate.lock().clone();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }

        self.ensure_open()?;
        if !element.claim_source() {
            return Err(BackendError::AlreadyWrapped(element.src().to_string()));
        }
        self.shared.sources.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.node(|_| format!("source:{}", element.src()))))
    }

    fn create_gain(&self) -> Result<Arc<dyn GainNode>, BackendError> {
        self.ensure_open()?;
        if self.shared.fail_gain.load(Ordering::SeqCst) {
            return Err(BackendError::Node("injected gain failure".into()));
        }
        Ok(Arc::new(FakeGain {
            node: self.node(|id| format!("gain#{id}")),
        }))
    }

    fn create_analyser(&self, fft_size: usize) -> Result<Arc<dyn AnalyserNode>, BackendError> {
        self.ensure_open()?;
        Ok(Arc::new(FakeAnalyser {
            node: self.node(|id| format!("analyser#{id}")),
            fft_size,
        }))
    }
}

struct FakeNode {
    id: NodeId,
    label: String,
    shared: Arc<Shared>,
}

impl AudioNode for FakeNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn connect(&self, destination: &dyn AudioNode) -> Result<(), BackendError> {
        self.shared
            .record(format!("connect {} -> {}", self.label, destination.id()));
        Ok(())
    }

    fn connect_to_output(&self) -> Result<(), BackendError> {
        self.shared.record(format!("connect {} -> output", self.label));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        let failing = self
            .shared
            .fail_disconnect
            .lock()
            .as_deref()
            .is_some_and(|prefix| self.label.starts_with(prefix));
        if failing {
            self.shared.record(format!("disconnect-failed {}", self.label));
            return Err(BackendError::Node("injected disconnect failure".into()));
        }
        self.shared.record(format!("disconnect {}", self.label));
        Ok(())
    }
}

struct FakeGain {
    node: FakeNode,
}

impl AudioNode for FakeGain {
    fn id(&self) -> NodeId {
        self.node.id()
    }

    fn connect(&self, destination: &dyn AudioNode) -> Result<(), BackendError> {
        self.node.connect(destination)
    }

    fn connect_to_output(&self) -> Result<(), BackendError> {
        self.node.connect_to_output()
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        self.node.disconnect()
    }
}

impl GainNode for FakeGain {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn set_gain(&self, gain: f32) {
        self.node.shared.record(format!("gain {gain}"));
    }
}

struct FakeAnalyser {
    node: FakeNode,
    fft_size: usize,
}

impl AudioNode for FakeAnalyser {
    fn id(&self) -> NodeId {
        self.node.id()
    }

    fn connect(&self, destination: &dyn AudioNode) -> Result<(), BackendError> {
        self.node.connect(destination)
    }

    fn connect_to_output(&self) -> Result<(), BackendError> {
        self.node.connect_to_output()
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        self.node.disconnect()
    }
}

impl AnalyserNode for FakeAnalyser {
    fn as_node(&self) -> &dyn AudioNode {
        self
    }

    fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn byte_frequency_data(&self, out: &mut [u8]) {
        out.fill(42);
    }

    fn byte_time_domain_data(&self, out: &mut [u8]) {
        out.fill(128);
    }
}
