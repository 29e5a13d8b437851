#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use scene_sync::errors::{RepositoryError, RepositoryResult};
use scene_sync::repository::ModelRepository;
use scene_sync::scene::{Node, NodeKind, SceneGraph, SceneStore};
use scene_sync::view_state::EditorViewState;
use scene_sync::{AutosaveConfig, ProjectId, SceneSync, SceneSyncHandle};

pub const DEBOUNCE: Duration = Duration::from_secs(10);

/// Repository double that records every call.
///
/// Saves can be held until released, and failures can be queued up front.
pub struct RecordingRepository {
    models: Mutex<HashMap<ProjectId, SceneGraph>>,
    loads: Mutex<Vec<ProjectId>>,
    attempts: Mutex<Vec<(ProjectId, SceneGraph)>>,
    failures: Mutex<VecDeque<RepositoryError>>,
    gate: Option<Arc<Semaphore>>,
    load_delay: Option<Duration>,
    panic_next: AtomicBool,
    active_saves: AtomicUsize,
    max_active_saves: AtomicUsize,
    finished: watch::Sender<usize>,
}

impl Default for RecordingRepository {
    fn default() -> Self {
        let (finished, _) = watch::channel(0);
        Self {
            models: Mutex::default(),
            loads: Mutex::default(),
            attempts: Mutex::default(),
            failures: Mutex::default(),
            gate: None,
            load_delay: None,
            panic_next: AtomicBool::new(false),
            active_saves: AtomicUsize::new(0),
            max_active_saves: AtomicUsize::new(0),
            finished,
        }
    }
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves block until [`release`](Self::release) hands out a permit.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn with_model(self, project: &str, graph: SceneGraph) -> Self {
        self.models
            .lock()
            .unwrap()
            .insert(ProjectId::from(project), graph);
        self
    }

    pub fn release(&self, saves: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(saves);
        }
    }

    pub fn fail_next(&self, error: RepositoryError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// The next save call panics instead of returning.
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub fn loads(&self) -> Vec<ProjectId> {
        self.loads.lock().unwrap().clone()
    }

    /// Every save call, failed ones included, in call order
    pub fn attempts(&self) -> Vec<(ProjectId, SceneGraph)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn stored(&self, project: &str) -> Option<SceneGraph> {
        self.models
            .lock()
            .unwrap()
            .get(&ProjectId::from(project))
            .cloned()
    }

    pub fn max_concurrent_saves(&self) -> usize {
        self.max_active_saves.load(Ordering::SeqCst)
    }

    /// Wait until `count` save calls have returned.
    pub async fn wait_for_finished(&self, count: usize) {
        let mut finished = self.finished.subscribe();
        let _ = finished.wait_for(|done| *done >= count).await;
    }
}

#[async_trait]
impl ModelRepository for RecordingRepository {
    async fn load(&self, project_id: &ProjectId) -> RepositoryResult<Option<SceneGraph>> {
        self.loads.lock().unwrap().push(project_id.clone());
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.models.lock().unwrap().get(project_id).cloned())
    }

    async fn save(&self, project_id: &ProjectId, graph: &SceneGraph) -> RepositoryResult<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((project_id.clone(), graph.clone()));

        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("repository crashed while saving {}", project_id);
        }

        let active = self.active_saves.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_saves.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let failure = self.failures.lock().unwrap().pop_front();
        let result = match failure {
            Some(error) => Err(error),
            None => {
                self.models
                    .lock()
                    .unwrap()
                    .insert(project_id.clone(), graph.clone());
                Ok(())
            }
        };

        self.active_saves.fetch_sub(1, Ordering::SeqCst);
        self.finished.send_modify(|done| *done += 1);
        result
    }
}

pub struct Harness {
    pub store: SceneStore,
    pub repository: Arc<RecordingRepository>,
    pub view: Arc<EditorViewState>,
    pub handle: SceneSyncHandle,
}

pub fn mount(repository: RecordingRepository) -> Harness {
    mount_with(repository, AutosaveConfig::default())
}

pub fn mount_with(repository: RecordingRepository, config: AutosaveConfig) -> Harness {
    let store = SceneStore::new();
    let repository = Arc::new(repository);
    let view = Arc::new(EditorViewState::new());
    let handle = SceneSync::mount(store.clone(), repository.clone(), view.clone(), config)
        .expect("valid config");
    Harness {
        store,
        repository,
        view,
        handle,
    }
}

impl Harness {
    pub async fn open(&self, project: &str) {
        self.handle.activate(project).await.unwrap();
        self.handle.wait_until_settled().await.unwrap();
    }
}

/// A site with one building holding one level
pub fn site_scene() -> SceneGraph {
    SceneGraph::from_nodes(
        vec![
            Node::new("site", NodeKind::Site).with_children(vec!["b1".into()]),
            Node::new("b1", NodeKind::Building)
                .with_parent("site")
                .with_children(vec!["l1".into()]),
            Node::new("l1", NodeKind::Level).with_parent("b1"),
        ],
        vec!["site".into()],
    )
}

pub fn single_node_scene(id: &str) -> SceneGraph {
    SceneGraph::from_nodes(vec![Node::new(id, NodeKind::Site)], vec![id.into()])
}

pub fn wall(id: &str) -> Node {
    Node::new(id, NodeKind::Wall)
}

pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
