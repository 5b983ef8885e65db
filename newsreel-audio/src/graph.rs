//! Shared audio graph manager
//!
//! One processing context is shared by every logical source. Each source key
//! gets at most one chain (source → gain → analyser → output); concurrent
//! requests for the same key share a single in-flight build.

use crate::backend::{AnalyserNode, AudioBackend, AudioContext, ContextState};
use crate::connection::{disconnect_chain, AudioConnection};
use crate::error::{BackendError, GraphError};
use crate::media::MediaElement;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, MappedRwLockReadGuard, Mutex, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Graph manager settings
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Analyser FFT size; the frequency buffer holds half as many bins
    pub fft_size: usize,
    /// How long to wait for an element's metadata before giving up
    pub metadata_timeout: Duration,
    pub initial_gain: f32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            metadata_timeout: Duration::from_secs(5),
            initial_gain: 1.0,
        }
    }
}

/// Read-only view of a connection's frequency samples
#[derive(Clone)]
pub struct FrequencyBuffer {
    inner: Arc<RwLock<Vec<u8>>>,
}

impl FrequencyBuffer {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(vec![0; len])),
        }
    }

    pub fn read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.inner.read(), |data| data.as_slice())
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both views share the same storage
    pub fn ptr_eq(&self, other: &FrequencyBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn write_with(&self, f: impl FnOnce(&mut [u8])) {
        f(self.inner.write().as_mut_slice());
    }
}

/// What a visualizer needs: the analyser and its sample buffer
#[derive(Clone)]
pub struct VisualizerHandle {
    key: String,
    analyser: Arc<dyn AnalyserNode>,
    data: FrequencyBuffer,
    live: Arc<AtomicBool>,
}

impl std::fmt::Debug for VisualizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizerHandle")
            .field("key", &self.key)
            .field("bins", &self.data.len())
            .field("live", &self.is_live())
            .finish()
    }
}

impl VisualizerHandle {
    pub(crate) fn new(
        key: String,
        analyser: Arc<dyn AnalyserNode>,
        data: FrequencyBuffer,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            key,
            analyser,
            data,
            live,
        }
    }

    pub fn data(&self) -> &FrequencyBuffer {
        &self.data
    }

    /// Copy the analyser's current spectrum into the buffer.
    ///
    /// Returns false once the connection has been cleaned up; the buffer then
    /// keeps its last contents.
    pub fn refresh(&self) -> bool {
        if !self.is_live() {
            return false;
        }
        self.data
            .write_with(|buf| self.analyser.byte_frequency_data(buf));
        true
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Whether both handles belong to the same connection
    pub fn same_connection(&self, other: &VisualizerHandle) -> bool {
        self.data.ptr_eq(&other.data)
    }
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    ConnectionCreated { key: String },
    ConnectionRemoved { key: String },
    ContextClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Subscription {
    pub id: SubscriptionId,
    pub events: Receiver<GraphEvent>,
}

/// Observable manager state; never exposes nodes
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub initialized: bool,
    pub last_error: Option<GraphError>,
    pub active_connections: usize,
    pub context_state: Option<ContextState>,
}

/// Slot shared by every caller waiting on one key's build
struct PendingBuild {
    outcome: Mutex<Option<Result<VisualizerHandle, GraphError>>>,
    done: Condvar,
    cancelled: AtomicBool,
}

impl PendingBuild {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    fn wait(&self) -> Result<VisualizerHandle, GraphError> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut outcome);
        }
    }

    fn complete(&self, result: Result<VisualizerHandle, GraphError>) {
        *self.outcome.lock() = Some(result);
        self.done.notify_all();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct ManagerState {
    context: Option<Arc<dyn AudioContext>>,
    initialized: bool,
    last_error: Option<GraphError>,
    connections: HashMap<String, AudioConnection>,
    pending: HashMap<String, Arc<PendingBuild>>,
}

/// Owner of the shared audio context and every per-source chain
pub struct AudioGraphManager {
    backend: Arc<dyn AudioBackend>,
    config: GraphConfig,
    state: Mutex<ManagerState>,
    /// Serializes context creation against full teardown
    init_lock: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Sender<GraphEvent>)>>,
    next_subscription: AtomicU64,
}

fn construction(key: &str, reason: impl std::fmt::Display) -> GraphError {
    GraphError::GraphConstruction {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl AudioGraphManager {
    pub fn new(backend: Arc<dyn AudioBackend>, config: GraphConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(ManagerState::default()),
            init_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Make sure a running context exists. Idempotent.
    pub fn initialize(&self) -> Result<(), GraphError> {
        let _guard = self.init_lock.lock();
        self.initialize_locked()
    }

    fn initialize_locked(&self) -> Result<(), GraphError> {
        let existing = self.state.lock().context.clone();
        let context = match existing {
            Some(context) if context.state() != ContextState::Closed => context,
            stale => {
                if stale.is_some() {
                    tracing::debug!("Audio context was closed, creating a new one");
                    self.discard_connections();
                }
                match self.backend.create_context() {
                    Ok(context) => {
                        self.state.lock().context = Some(context.clone());
                        tracing::debug!(
                            backend = self.backend.name(),
                            sample_rate = context.sample_rate(),
                            "Created audio context"
                        );
                        context
                    }
                    Err(e) => return Err(self.record_init_failure(e)),
                }
            }
        };

        if context.state() == ContextState::Suspended {
            if let Err(e) = context.resume() {
                return Err(self.record_init_failure(e));
            }
            tracing::debug!("Resumed suspended audio context");
        }

        let mut state = self.state.lock();
        state.initialized = true;
        state.last_error = None;
        Ok(())
    }

    fn record_init_failure(&self, e: BackendError) -> GraphError {
        tracing::error!(backend = self.backend.name(), error = %e, "Audio context initialization failed");
        let err = GraphError::Initialization(e.to_string());
        let mut state = self.state.lock();
        state.initialized = false;
        state.last_error = Some(err.clone());
        err
    }

    /// Drop connections whose context has gone away underneath them
    fn discard_connections(&self) {
        let stale: Vec<AudioConnection> = {
            let mut state = self.state.lock();
            state.context = None;
            state.connections.drain().map(|(_, c)| c).collect()
        };
        for connection in stale {
            connection.disconnect();
            self.publish(GraphEvent::ConnectionRemoved {
                key: connection.key.clone(),
            });
        }
    }

    /// Get or build the chain for `key`.
    ///
    /// An existing chain is returned as-is. A concurrent build for the same
    /// key is joined instead of duplicated. The element is wrapped at most
    /// once; a failed build leaves nothing registered.
    pub fn create_connection(
        &self,
        key: &str,
        element: &MediaElement,
    ) -> Result<VisualizerHandle, GraphError> {
        let pending = {
            let mut state = self.state.lock();
            if let Some(connection) = state.connections.get(key) {
                return Ok(connection.handle());
            }
            if let Some(pending) = state.pending.get(key).cloned() {
                drop(state);
                tracing::debug!(key, "Joining in-flight connection build");
                return pending.wait();
            }
            let pending = Arc::new(PendingBuild::new());
            state.pending.insert(key.to_string(), pending.clone());
            pending
        };

        let built = self.build(key, element, &pending);
        let outcome = self.finish(key, &pending, built);
        pending.complete(outcome.clone());
        outcome
    }

    fn build(
        &self,
        key: &str,
        element: &MediaElement,
        pending: &PendingBuild,
    ) -> Result<AudioConnection, GraphError> {
        let context = {
            let _guard = self.init_lock.lock();
            if pending.is_cancelled() {
                return Err(GraphError::Cancelled(key.to_string()));
            }
            self.initialize_locked()
                .map_err(|e| construction(key, e))?;
            self.state
                .lock()
                .context
                .clone()
                .ok_or_else(|| construction(key, "audio context unavailable"))?
        };

        element
            .wait_for_metadata(self.config.metadata_timeout)
            .map_err(|e| construction(key, e))?;

        self.wire(key, context.as_ref(), element)
            .map_err(|e| construction(key, e))
    }

    fn wire(
        &self,
        key: &str,
        context: &dyn AudioContext,
        element: &MediaElement,
    ) -> Result<AudioConnection, BackendError> {
        let source = context.create_media_source(element)?;

        let gain = match context.create_gain() {
            Ok(gain) => gain,
            Err(e) => {
                disconnect_chain(key, Some(source.as_ref()), None, None);
                return Err(e);
            }
        };

        let analyser = match context.create_analyser(self.config.fft_size) {
            Ok(analyser) => analyser,
            Err(e) => {
                disconnect_chain(key, Some(source.as_ref()), Some(gain.as_node()), None);
                return Err(e);
            }
        };

        let wired = source
            .connect(gain.as_node())
            .and_then(|_| gain.connect(analyser.as_node()))
            .and_then(|_| analyser.connect_to_output());
        if let Err(e) = wired {
            disconnect_chain(
                key,
                Some(source.as_ref()),
                Some(gain.as_node()),
                Some(analyser.as_node()),
            );
            return Err(e);
        }
        gain.set_gain(self.config.initial_gain);

        let data = FrequencyBuffer::new(analyser.frequency_bin_count());
        Ok(AudioConnection {
            key: key.to_string(),
            source,
            gain,
            analyser,
            data,
            live: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Register or discard a finished build and clear its in-flight slot
    fn finish(
        &self,
        key: &str,
        pending: &Arc<PendingBuild>,
        built: Result<AudioConnection, GraphError>,
    ) -> Result<VisualizerHandle, GraphError> {
        let mut state = self.state.lock();
        if state
            .pending
            .get(key)
            .is_some_and(|slot| Arc::ptr_eq(slot, pending))
        {
            state.pending.remove(key);
        }

        if pending.is_cancelled() {
            drop(state);
            if let Ok(connection) = built {
                connection.disconnect();
            }
            tracing::debug!(key, "Discarded connection cleaned up during build");
            return Err(GraphError::Cancelled(key.to_string()));
        }

        match built {
            Ok(connection) => {
                let handle = connection.handle();
                state.connections.insert(key.to_string(), connection);
                drop(state);
                tracing::debug!(key, "Created audio connection");
                self.publish(GraphEvent::ConnectionCreated {
                    key: key.to_string(),
                });
                Ok(handle)
            }
            Err(e) => {
                let context_state = state.context.as_ref().map(|c| c.state());
                tracing::warn!(key, ?context_state, error = %e, "Failed to build audio connection");
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Tear down one connection, or everything when `key` is `None`.
    ///
    /// Full teardown closes the context and resets the manager to its
    /// uninitialized state. Idempotent.
    pub fn cleanup(&self, key: Option<&str>) {
        match key {
            Some(key) => self.cleanup_key(key),
            None => self.cleanup_all(),
        }
    }

    fn cleanup_key(&self, key: &str) {
        let (connection, pending) = {
            let mut state = self.state.lock();
            let pending = state.pending.remove(key);
            if let Some(pending) = &pending {
                pending.cancel();
            }
            (state.connections.remove(key), pending)
        };

        if pending.is_some() {
            tracing::debug!(key, "Cancelled in-flight connection build");
        }
        if let Some(connection) = connection {
            connection.disconnect();
            tracing::debug!(key, "Removed audio connection");
            self.publish(GraphEvent::ConnectionRemoved {
                key: key.to_string(),
            });
        }
    }

    fn cleanup_all(&self) {
        let _guard = self.init_lock.lock();
        let (connections, context) = {
            let mut state = self.state.lock();
            for (_, pending) in state.pending.drain() {
                pending.cancel();
            }
            let connections: Vec<AudioConnection> =
                state.connections.drain().map(|(_, c)| c).collect();
            let context = state.context.take();
            state.initialized = false;
            state.last_error = None;
            (connections, context)
        };

        for connection in connections {
            connection.disconnect();
            self.publish(GraphEvent::ConnectionRemoved {
                key: connection.key.clone(),
            });
        }

        if let Some(context) = context {
            if let Err(e) = context.close() {
                tracing::warn!(error = %e, "Failed to close audio context");
            }
            tracing::debug!("Closed audio context");
            self.publish(GraphEvent::ContextClosed);
        }
    }

    pub fn state(&self) -> GraphSnapshot {
        let state = self.state.lock();
        GraphSnapshot {
            initialized: state.initialized,
            last_error: state.last_error.clone(),
            active_connections: state.connections.len(),
            context_state: state.context.as_ref().map(|c| c.state()),
        }
    }

    pub fn visualizer(&self, key: &str) -> Option<VisualizerHandle> {
        self.state.lock().connections.get(key).map(AudioConnection::handle)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().connections.contains_key(key)
    }

    /// Set the volume of one connection. Returns false if there is none.
    pub fn set_gain(&self, key: &str, gain: f32) -> bool {
        match self.state.lock().connections.get(key) {
            Some(connection) => {
                connection.gain.set_gain(gain);
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = unbounded();
        self.subscribers.lock().push((id, tx));
        Subscription { id, events: rx }
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    fn publish(&self, event: GraphEvent) {
        self.subscribers
            .lock()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }
}
