//! Error types for graph construction, scheduling, and cache storage.

use thiserror::Error;

/// Errors raised by [`PipelineNode`](crate::node::PipelineNode) operations.
///
/// The first four variants are graph-mutation failures raised by `connect`;
/// they never leave the graph partially modified.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("cannot connect {parent} -> {child}: {frozen} is frozen")]
    FrozenEndpoint {
        parent: String,
        child: String,
        frozen: String,
    },

    #[error("edge {parent} -> {child} already exists")]
    DuplicateEdge { parent: String, child: String },

    #[error("cannot connect {parent} -> {child}: edge {child} -> {parent} already exists")]
    ReciprocalEdge { parent: String, child: String },

    #[error("cannot connect {parent} -> {child}: edge would close a cycle")]
    Cycle { parent: String, child: String },

    #[error("node {tag} must be frozen before it can flow")]
    NotFrozen { tag: String },

    #[error("invalid tag {0:?}: tags must be non-blank")]
    InvalidTag(String),

    #[error("stage of node {tag} failed: {source}")]
    Stage {
        tag: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
}

impl GraphError {
    /// True for the `connect`-time topology errors.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GraphError::FrozenEndpoint { .. }
                | GraphError::DuplicateEdge { .. }
                | GraphError::ReciprocalEdge { .. }
                | GraphError::Cycle { .. }
        )
    }
}

/// Errors raised by [`ContentStore`](crate::store::ContentStore) backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload encoding error: {0}")]
    Encode(#[from] postcard::Error),

    #[error("JSON payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload {0} is indexed but missing from the store")]
    MissingPayload(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
