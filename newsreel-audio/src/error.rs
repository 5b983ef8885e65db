//! Error types for the audio core

use thiserror::Error;

/// Failures reported by an audio backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Audio context unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Media element {0} is already wrapped by a source node")]
    AlreadyWrapped(String),
    #[error("Node error: {0}")]
    Node(String),
}

/// Failures of the shared graph manager
///
/// Cloneable so a single in-flight build can hand its outcome to every
/// caller waiting on the same source key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Audio context initialization failed: {0}")]
    Initialization(String),
    #[error("Graph construction failed for {key}: {reason}")]
    GraphConstruction { key: String, reason: String },
    #[error("Connection for {0} was cleaned up while it was being built")]
    Cancelled(String),
}

/// Failures of a media element
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    #[error("Timed out waiting for metadata of {0}")]
    MetadataTimeout(String),
    #[error("Media element {0} has no audio loaded")]
    NoAudio(String),
    #[error("Invalid seek position {0}")]
    InvalidSeek(f64),
}

/// Failures of a play attempt
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to load {url}: {source}")]
    Source {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Element(#[from] ElementError),
}
