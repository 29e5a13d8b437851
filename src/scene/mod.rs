//! In-memory scene graph and the observable store that owns it.

mod graph;
mod node;
mod store;

pub use graph::{DanglingReference, SceneFingerprint, SceneGraph};
pub use node::{Node, NodeId, NodeKind};
pub use store::{SceneStore, StoreChange, StoreRevision, StoreSubscription};
