use std::time::Duration;

use thiserror::Error;

use crate::graph::GraphState;

/// Errors reported by a native graph backend.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("backend initialization failed: {0}")]
    BackendInit(String),

    #[error("failed to create element {element}: {reason}")]
    ElementCreation { element: String, reason: String },

    #[error("failed to link elements: {0}")]
    Link(String),

    #[error("state change to {0:?} rejected")]
    StateChange(GraphState),

    #[error("state change did not complete within {0:?}")]
    StateChangeTimeout(Duration),

    #[error("seek rejected: {0}")]
    Seek(String),

    #[error("operation not supported by this graph: {0}")]
    Unsupported(&'static str),

    #[error("frame data size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("graph has been shut down")]
    ShutDown,
}

/// Errors surfaced by sessions, the registry and the library lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session has been disposed")]
    Disposed,

    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("media library is already loaded")]
    LibraryAlreadyLoaded,

    #[error("media library was torn down and cannot be loaded again")]
    LibraryTornDown,
}
