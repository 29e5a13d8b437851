//! Scene store error types

use thiserror::Error;

use crate::scene::NodeId;

/// Errors raised by [`SceneStore`](crate::scene::SceneStore) editing actions.
///
/// A failed action leaves the store untouched and does not notify subscribers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Node not found by identifier
    #[error("Node '{0}' not found")]
    NodeNotFound(NodeId),

    /// Node already exists
    #[error("Node '{0}' already exists")]
    DuplicateNode(NodeId),

    /// Parent node does not exist
    #[error("Parent node '{0}' not found")]
    ParentNotFound(NodeId),

    /// Moving a node under itself or one of its descendants
    #[error("Moving '{node}' under '{parent}' would create a cycle")]
    CycleDetected {
        /// Node being moved
        node: NodeId,
        /// Requested new parent
        parent: NodeId,
    },
}

impl SceneError {
    /// The node identifier the error is about
    pub fn node_id(&self) -> &NodeId {
        match self {
            SceneError::NodeNotFound(id)
            | SceneError::DuplicateNode(id)
            | SceneError::ParentNotFound(id) => id,
            SceneError::CycleDetected { node, .. } => node,
        }
    }
}
