use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::graph::SceneGraph;
use super::node::{Node, NodeId};
use crate::errors::{SceneError, SceneResult};

/// Monotonic counter bumped by every store update, including no-op ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreRevision(u64);

impl StoreRevision {
    pub fn value(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StoreRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// State published to subscribers after every update.
#[derive(Clone, Debug, Default)]
pub struct StoreChange {
    pub revision: StoreRevision,
    pub graph: Arc<SceneGraph>,
}

/// Observable in-memory scene graph.
///
/// The store is the only writer of its graph: every mutation goes through one
/// of the action methods below, each of which bumps the revision and notifies
/// subscribers. Clones share the same underlying state.
#[derive(Clone)]
pub struct SceneStore {
    state: Arc<watch::Sender<StoreChange>>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStore {
    pub fn new() -> Self {
        Self::with_graph(SceneGraph::default())
    }

    pub fn with_graph(graph: SceneGraph) -> Self {
        let (state, _) = watch::channel(StoreChange {
            revision: StoreRevision::default(),
            graph: Arc::new(graph),
        });
        Self {
            state: Arc::new(state),
        }
    }

    /// Subscribe to every subsequent update. The current state counts as seen.
    pub fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            receiver: self.state.subscribe(),
        }
    }

    /// Cheap copy-on-write snapshot of the current graph.
    pub fn snapshot(&self) -> Arc<SceneGraph> {
        Arc::clone(&self.state.borrow().graph)
    }

    pub fn revision(&self) -> StoreRevision {
        self.state.borrow().revision
    }

    /// Replace the whole scene.
    pub fn set_scene(
        &self,
        nodes: BTreeMap<NodeId, Node>,
        root_node_ids: Vec<NodeId>,
    ) -> StoreRevision {
        self.apply(|graph| {
            *graph = SceneGraph::new(nodes, root_node_ids);
        })
    }

    pub fn clear_scene(&self) -> StoreRevision {
        self.apply(|graph| {
            *graph = SceneGraph::default();
        })
    }

    /// Notify subscribers without touching the tree, as selection-only or
    /// re-render updates do.
    pub fn touch(&self) -> StoreRevision {
        let mut revision = StoreRevision::default();
        self.state.send_modify(|state| {
            state.revision = state.revision.next();
            revision = state.revision;
        });
        revision
    }

    /// Insert a new node as the last child of `parent`, or as a new root.
    ///
    /// Any `parent_id`/`children` already on `node` are replaced: a new node
    /// starts as a leaf.
    pub fn insert_node(&self, mut node: Node, parent: Option<&NodeId>) -> SceneResult<StoreRevision> {
        self.try_apply(|graph| {
            if graph.contains(&node.id) {
                return Err(SceneError::DuplicateNode(node.id.clone()));
            }
            if let Some(parent_id) = parent {
                if !graph.contains(parent_id) {
                    return Err(SceneError::ParentNotFound(parent_id.clone()));
                }
            }

            let id = node.id.clone();
            node.parent_id = parent.cloned();
            node.children.clear();
            match parent.and_then(|parent_id| graph.nodes.get_mut(parent_id)) {
                Some(parent_node) => parent_node.children.push(id.clone()),
                None => graph.root_node_ids.push(id.clone()),
            }
            graph.nodes.insert(id, node);
            Ok(())
        })
    }

    /// Edit a node's name, kind or properties in place.
    ///
    /// `id`, `parent_id` and `children` are owned by the store and are
    /// restored after `edit` runs; use [`move_node`](Self::move_node) to
    /// re-parent. Subscribers are notified even when `edit` changes nothing.
    pub fn update_node<F>(&self, id: &NodeId, edit: F) -> SceneResult<StoreRevision>
    where
        F: FnOnce(&mut Node),
    {
        self.try_apply(|graph| {
            let node = graph
                .nodes
                .get_mut(id)
                .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?;

            let parent_id = node.parent_id.clone();
            let children = std::mem::take(&mut node.children);
            edit(node);
            node.id = id.clone();
            node.parent_id = parent_id;
            node.children = children;
            Ok(())
        })
    }

    /// Delete a node and its whole subtree. Returns the removed ids.
    pub fn remove_node(&self, id: &NodeId) -> SceneResult<Vec<NodeId>> {
        let mut removed = Vec::new();
        self.try_apply(|graph| {
            let parent_id = graph
                .get(id)
                .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?
                .parent_id
                .clone();

            removed = graph.subtree_ids(id);
            for removed_id in &removed {
                graph.nodes.remove(removed_id);
            }

            detach(graph, id, parent_id.as_ref());
            Ok(())
        })?;

        debug!("Removed {} node(s) under {}", removed.len(), id);
        Ok(removed)
    }

    /// Re-parent a node, optionally at a position in the new parent's listing.
    pub fn move_node(
        &self,
        id: &NodeId,
        new_parent: Option<&NodeId>,
        index: Option<usize>,
    ) -> SceneResult<StoreRevision> {
        self.try_apply(|graph| {
            let old_parent = graph
                .get(id)
                .ok_or_else(|| SceneError::NodeNotFound(id.clone()))?
                .parent_id
                .clone();

            if let Some(parent_id) = new_parent {
                if !graph.contains(parent_id) {
                    return Err(SceneError::ParentNotFound(parent_id.clone()));
                }
                if graph.subtree_ids(id).contains(parent_id) {
                    return Err(SceneError::CycleDetected {
                        node: id.clone(),
                        parent: parent_id.clone(),
                    });
                }
            }

            detach(graph, id, old_parent.as_ref());

            let siblings = match new_parent.and_then(|parent_id| graph.nodes.get_mut(parent_id)) {
                Some(parent_node) => &mut parent_node.children,
                None => &mut graph.root_node_ids,
            };
            let position = index.unwrap_or(siblings.len()).min(siblings.len());
            siblings.insert(position, id.clone());

            if let Some(node) = graph.nodes.get_mut(id) {
                node.parent_id = new_parent.cloned();
            }
            Ok(())
        })
    }

    fn apply<F>(&self, mutate: F) -> StoreRevision
    where
        F: FnOnce(&mut SceneGraph),
    {
        let mut revision = StoreRevision::default();
        self.state.send_modify(|state| {
            mutate(Arc::make_mut(&mut state.graph));
            state.revision = state.revision.next();
            revision = state.revision;
        });
        revision
    }

    /// Run a fallible mutation; on error nothing is published.
    ///
    /// Mutations validate before writing, so an `Err` always leaves the
    /// graph untouched.
    fn try_apply<F>(&self, mutate: F) -> SceneResult<StoreRevision>
    where
        F: FnOnce(&mut SceneGraph) -> SceneResult<()>,
    {
        let mut outcome = Ok(StoreRevision::default());
        self.state.send_if_modified(|state| {
            let result = mutate(Arc::make_mut(&mut state.graph));
            match result {
                Ok(()) => {
                    state.revision = state.revision.next();
                    outcome = Ok(state.revision);
                    true
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }
}

/// Remove `id` from its parent's listing, or from the roots.
fn detach(graph: &mut SceneGraph, id: &NodeId, parent_id: Option<&NodeId>) {
    match parent_id.and_then(|parent_id| graph.nodes.get_mut(parent_id)) {
        Some(parent_node) => parent_node.children.retain(|child| child != id),
        None => graph.root_node_ids.retain(|root| root != id),
    }
}

/// Receiving side of [`SceneStore::subscribe`].
///
/// Updates that arrive faster than they are consumed collapse into the latest
/// one; the revision still tells how many happened.
pub struct StoreSubscription {
    receiver: watch::Receiver<StoreChange>,
}

impl StoreSubscription {
    /// Wait for the next update. `None` once every store handle is dropped.
    pub async fn changed(&mut self) -> Option<StoreChange> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Take an update that was published but not yet seen, without waiting.
    pub fn pending(&mut self) -> Option<StoreChange> {
        match self.receiver.has_changed() {
            Ok(true) => Some(self.receiver.borrow_and_update().clone()),
            _ => None,
        }
    }

    pub fn current(&self) -> StoreChange {
        self.receiver.borrow().clone()
    }
}
