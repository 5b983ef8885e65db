//! Software context: node graph and pull-based rendering

use super::nodes::{NodeHandle, SoftwareAnalyserNode, SoftwareGainNode, SoftwareSourceNode};
use super::RENDER_QUANTUM;
use crate::backend::{AnalyserNode, AudioContext, AudioNode, ContextState, GainNode, NodeId};
use crate::error::BackendError;
use crate::media::MediaElement;
use newsreel_analysis::FrequencyAnalyser;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Where a node's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Edge {
    Node(NodeId),
    Output,
}

pub(super) enum NodeKind {
    MediaSource(MediaElement),
    Gain(f32),
    Analyser(Arc<Mutex<FrequencyAnalyser>>),
}

/// Evaluation order and input slots, rebuilt only after the topology changes
struct RenderPlan {
    order: Vec<NodeId>,
    inputs: Vec<Vec<usize>>,
    to_output: Vec<bool>,
}

#[derive(Default)]
pub(super) struct Graph {
    nodes: HashMap<NodeId, NodeKind>,
    edges: HashMap<NodeId, Vec<Edge>>,
    plan: Option<RenderPlan>,
    // One buffer per plan slot, reused across quanta
    scratch: Vec<Vec<f32>>,
    mono: Vec<f32>,
}

impl Graph {
    pub fn insert_node(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes.insert(id, kind);
        self.plan = None;
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node parameters can change without invalidating the plan
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeKind> {
        self.nodes.get_mut(&id)
    }

    pub fn add_edge(&mut self, from: NodeId, edge: Edge) {
        let targets = self.edges.entry(from).or_default();
        if !targets.contains(&edge) {
            targets.push(edge);
            self.plan = None;
        }
    }

    pub fn clear_edges(&mut self, from: NodeId) {
        if self.edges.remove(&from).is_some() {
            self.plan = None;
        }
    }

    /// Pause every wrapped element and cut all connections
    pub fn shut_down(&mut self) {
        for kind in self.nodes.values() {
            if let NodeKind::MediaSource(element) = kind {
                element.pause();
            }
        }
        self.edges.clear();
        self.plan = None;
    }

    /// Drop a node along with every edge touching it
    pub fn remove_node(&mut self, id: NodeId) {
        self.nodes.remove(&id);
        self.edges.remove(&id);
        for targets in self.edges.values_mut() {
            targets.retain(|edge| *edge != Edge::Node(id));
        }
        self.plan = None;
    }

    fn ensure_plan(&mut self) {
        if self.plan.is_some() {
            return;
        }

        let (order, inputs) = self.topological_order();
        let slots: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();
        let inputs = order
            .iter()
            .map(|id| {
                inputs
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter_map(|upstream| slots.get(upstream).copied())
                    .collect()
            })
            .collect();
        let to_output = order
            .iter()
            .map(|id| {
                self.edges
                    .get(id)
                    .is_some_and(|targets| targets.contains(&Edge::Output))
            })
            .collect();

        self.scratch
            .resize_with(order.len(), || Vec::with_capacity(RENDER_QUANTUM * 2));
        if self.mono.capacity() < RENDER_QUANTUM {
            self.mono.reserve(RENDER_QUANTUM);
        }
        tracing::trace!(nodes = order.len(), "Rebuilt render plan");
        self.plan = Some(RenderPlan {
            order,
            inputs,
            to_output,
        });
    }

    /// Evaluation order (Kahn). Nodes on cycles are left out and stay silent.
    fn topological_order(&self) -> (Vec<NodeId>, HashMap<NodeId, Vec<NodeId>>) {
        let mut inputs: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut indegree: HashMap<NodeId, usize> = self.nodes.keys().map(|&id| (id, 0)).collect();

        for (&from, targets) in &self.edges {
            for edge in targets {
                if let Edge::Node(to) = *edge {
                    if let Some(count) = indegree.get_mut(&to) {
                        *count += 1;
                        inputs.entry(to).or_default().push(from);
                    }
                }
            }
        }

        let mut ready: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for edge in self.edges.get(&id).into_iter().flatten() {
                if let Edge::Node(to) = *edge {
                    if let Some(count) = indegree.get_mut(&to) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(to);
                        }
                    }
                }
            }
        }

        (order, inputs)
    }
}

pub(crate) struct ContextInner {
    sample_rate: u32,
    state: Mutex<ContextState>,
    pub(super) graph: Mutex<Graph>,
    frames_rendered: AtomicU64,
}

impl ContextInner {
    pub fn new(sample_rate: u32, state: ContextState) -> Self {
        Self {
            sample_rate,
            state: Mutex::new(state),
            graph: Mutex::new(Graph::default()),
            frames_rendered: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ContextState {
        *self.state.lock()
    }

    pub fn ensure_open(&self) -> Result<(), BackendError> {
        match self.state() {
            ContextState::Closed => Err(BackendError::InvalidState("context is closed".into())),
            _ => Ok(()),
        }
    }

    fn add_node(&self, kind: NodeKind) -> Result<NodeId, BackendError> {
        self.ensure_open()?;
        let id = next_node_id();
        self.graph.lock().insert_node(id, kind);
        Ok(id)
    }

    pub fn render(&self, output: &mut [f32]) {
        let mut graph = self.graph.lock();
        self.render_graph(&mut graph, output);
    }

    pub fn try_render(&self, output: &mut [f32]) {
        match self.graph.try_lock() {
            Some(mut graph) => self.render_graph(&mut graph, output),
            None => output.fill(0.0),
        }
    }

    fn render_graph(&self, graph: &mut Graph, output: &mut [f32]) {
        if self.state() != ContextState::Running {
            output.fill(0.0);
            return;
        }

        graph.ensure_plan();
        for quantum in output.chunks_mut(RENDER_QUANTUM * 2) {
            self.render_quantum(graph, quantum);
            self.frames_rendered
                .fetch_add((quantum.len() / 2) as u64, Ordering::Relaxed);
        }
    }

    fn render_quantum(&self, graph: &mut Graph, output: &mut [f32]) {
        output.fill(0.0);
        let Graph {
            nodes,
            plan,
            scratch,
            mono,
            ..
        } = graph;
        let Some(plan) = plan.as_ref() else {
            return;
        };

        for (slot, id) in plan.order.iter().enumerate() {
            // Inputs always sit in earlier slots
            let (done, rest) = scratch.split_at_mut(slot);
            let buffer = &mut rest[0];
            buffer.clear();
            buffer.resize(output.len(), 0.0);

            let Some(kind) = nodes.get(id) else {
                continue;
            };

            if let NodeKind::MediaSource(element) = kind {
                element.render_into(buffer, self.sample_rate);
            } else {
                for &input in &plan.inputs[slot] {
                    for (dst, &src) in buffer.iter_mut().zip(&done[input]) {
                        *dst += src;
                    }
                }
            }

            match kind {
                NodeKind::MediaSource(_) => {}
                NodeKind::Gain(gain) => buffer.iter_mut().for_each(|s| *s *= *gain),
                NodeKind::Analyser(analyser) => {
                    mono.clear();
                    mono.extend(
                        buffer
                            .chunks(2)
                            .map(|f| if f.len() == 2 { (f[0] + f[1]) * 0.5 } else { f[0] }),
                    );
                    analyser.lock().push_samples(mono);
                }
            }

            if plan.to_output[slot] {
                for (dst, &src) in output.iter_mut().zip(buffer.iter()) {
                    *dst += src;
                }
            }
        }
    }
}

/// A software-rendered audio context
pub struct SoftwareContext {
    inner: Arc<ContextInner>,
}

impl SoftwareContext {
    pub(super) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    /// Render interleaved stereo directly from this context
    pub fn render(&self, output: &mut [f32]) {
        self.inner.render(output);
    }
}

impl AudioContext for SoftwareContext {
    fn state(&self) -> ContextState {
        self.inner.state()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.inner.frames_rendered.load(Ordering::Relaxed) as f64 / self.inner.sample_rate as f64
    }

    fn resume(&self) -> Result<(), BackendError> {
        let mut state = self.inner.state.lock();
        match *state {
            ContextState::Closed => Err(BackendError::InvalidState(
                "cannot resume a closed context".into(),
            )),
            _ => {
                *state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn close(&self) -> Result<(), BackendError> {
        let mut state = self.inner.state.lock();
        if *state == ContextState::Closed {
            return Ok(());
        }
        *state = ContextState::Closed;
        drop(state);

        self.inner.graph.lock().shut_down();
        tracing::debug!("Closed software context");
        Ok(())
    }

    fn create_media_source(
        &self,
        element: &MediaElement,
    ) -> Result<Arc<dyn AudioNode>, BackendError> {
        self.inner.ensure_open()?;
        if !element.claim_source() {
            return Err(BackendError::AlreadyWrapped(element.src().to_string()));
        }
        let id = self.inner.add_node(NodeKind::MediaSource(element.clone()))?;
        Ok(Arc::new(SoftwareSourceNode::new(NodeHandle::new(
            id,
            &self.inner,
        ))))
    }

    fn create_gain(&self) -> Result<Arc<dyn GainNode>, BackendError> {
        let id = self.inner.add_node(NodeKind::Gain(1.0))?;
        Ok(Arc::new(SoftwareGainNode::new(NodeHandle::new(
            id,
            &self.inner,
        ))))
    }

    fn create_analyser(&self, fft_size: usize) -> Result<Arc<dyn AnalyserNode>, BackendError> {
        let analyser = FrequencyAnalyser::new(fft_size)
            .map_err(|e| BackendError::Node(e.to_string()))?;
        let analyser = Arc::new(Mutex::new(analyser));
        let id = self
            .inner
            .add_node(NodeKind::Analyser(analyser.clone()))?;
        Ok(Arc::new(SoftwareAnalyserNode::new(
            NodeHandle::new(id, &self.inner),
            analyser,
            fft_size,
        )))
    }
}
