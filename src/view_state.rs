//! Editor view state touched by the load lifecycle.
//!
//! The autosave core only ever resets this to known defaults after a project
//! load; everything else about selection and phases belongs to the UI.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::scene::{NodeId, NodeKind, SceneGraph};

/// Current building/level focus plus any explicitly selected nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub building_id: Option<NodeId>,
    pub level_id: Option<NodeId>,
    #[serde(default)]
    pub selected_ids: Vec<NodeId>,
}

/// Editing phase of the design workflow
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorPhase {
    #[default]
    Site,
    Structure,
    Furnish,
}

/// Sink for the view-state resets the lifecycle performs after a load.
pub trait ViewState: Send + Sync {
    fn set_selection(&self, selection: Selection);

    fn set_phase(&self, phase: EditorPhase);

    /// Reset selection and phase for a freshly loaded graph.
    fn reset_after_load(&self, graph: &SceneGraph) {
        let (selection, phase) = default_view_for(graph);
        self.set_selection(selection);
        self.set_phase(phase);
    }
}

/// Focus the first building and its first level; with no building, start
/// at the site phase with nothing selected.
pub fn default_view_for(graph: &SceneGraph) -> (Selection, EditorPhase) {
    let Some(building) = graph.find_first(NodeKind::Building, &graph.root_node_ids) else {
        return (Selection::default(), EditorPhase::Site);
    };

    let level_id = graph
        .find_first(NodeKind::Level, &building.children)
        .map(|level| level.id.clone());

    let selection = Selection {
        building_id: Some(building.id.clone()),
        level_id,
        selected_ids: Vec::new(),
    };
    (selection, EditorPhase::Structure)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub selection: Selection,
    pub phase: EditorPhase,
}

/// Observable [`ViewState`] for hosts without their own UI store.
pub struct EditorViewState {
    state: watch::Sender<ViewSnapshot>,
}

impl Default for EditorViewState {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorViewState {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ViewSnapshot::default());
        Self { state }
    }

    pub fn current(&self) -> ViewSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.state.subscribe()
    }
}

impl ViewState for EditorViewState {
    fn set_selection(&self, selection: Selection) {
        self.state.send_modify(|view| view.selection = selection);
    }

    fn set_phase(&self, phase: EditorPhase) {
        self.state.send_modify(|view| view.phase = phase);
    }
}
