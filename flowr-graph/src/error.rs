//! Graph error types.

use crate::node::{GraphId, NodeId};
use thiserror::Error;

/// Errors from graph construction and mutation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(
        "cannot connect nodes from different graphs: {parent} of {} -> {child} of {}",
        .parent.graph,
        .child.graph
    )]
    CrossGraphConnection { parent: NodeId, child: NodeId },

    #[error("node {node} cannot be removed without disconnecting the graph")]
    UnremovableNode { node: NodeId },

    #[error("node {node} not found in graph {graph}")]
    NodeNotFound { node: NodeId, graph: GraphId },

    #[error("invalid payload type: expected '{expected}', found '{found}'")]
    InvalidPayloadType { expected: String, found: String },

    #[error("invalid graph: {reason}")]
    InvalidGraph { reason: String },
}

impl GraphError {
    /// Returns an error code suitable for boundary responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            GraphError::CrossGraphConnection { .. } => "CROSS_GRAPH_CONNECTION",
            GraphError::UnremovableNode { .. } => "UNREMOVABLE_NODE",
            GraphError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            GraphError::InvalidPayloadType { .. } => "INVALID_PAYLOAD_TYPE",
            GraphError::InvalidGraph { .. } => "BAD_REQUEST",
        }
    }
}
