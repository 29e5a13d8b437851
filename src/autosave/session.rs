use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{AutosaveConfig, SavePolicy};
use super::coordinator::{AutosaveCoordinator, Observation, SaveFollowUp};
use super::exit_flush::ExitFlush;
use super::lifecycle::{LifecycleController, Transition};
use super::types::{
    Activation, ActivationOutcome, FlushDispatch, FlushReason, InFlightSave, SaveTicket,
    SyncCommand, SyncStatus, TaskEvent,
};
use crate::errors::{RepositoryError, RepositoryResult, SyncError, SyncResult};
use crate::project::ProjectId;
use crate::repository::ModelRepository;
use crate::scene::{SceneFingerprint, SceneGraph, SceneStore, StoreChange, StoreSubscription};
use crate::view_state::ViewState;

enum Flow {
    Continue,
    Stop,
}

/// Single-task actor that owns the project lifecycle and the autosave
/// session of the active project.
///
/// Everything that decides state runs on this task; only repository calls
/// are spawned, and they report back through an internal event channel.
pub struct SceneSync {
    store: SceneStore,
    subscription: StoreSubscription,
    repository: Arc<dyn ModelRepository>,
    view_state: Arc<dyn ViewState>,
    policy: SavePolicy,
    lifecycle: LifecycleController,
    session: Option<AutosaveCoordinator>,
    /// Saves and flushes still running, across activations, oldest first
    in_flight: HashMap<ProjectId, Vec<InFlightSave>>,
    exit_flush: ExitFlush,
    command_rx: mpsc::Receiver<SyncCommand>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    events_rx: mpsc::UnboundedReceiver<TaskEvent>,
    status: watch::Sender<SyncStatus>,
    successful_saves: u64,
    failed_saves: u64,
}

impl SceneSync {
    /// Start the actor on the current tokio runtime.
    ///
    /// Mount once per store: two mounted actors would both save every edit.
    pub fn mount(
        store: SceneStore,
        repository: Arc<dyn ModelRepository>,
        view_state: Arc<dyn ViewState>,
        config: AutosaveConfig,
    ) -> SyncResult<SceneSyncHandle> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SyncStatus::inactive());

        let exit_flush = ExitFlush::new(
            Arc::clone(&repository),
            config.flush_timeout(),
            events_tx.clone(),
        );

        let actor = Self {
            subscription: store.subscribe(),
            store,
            repository,
            view_state,
            policy: config.save_policy(),
            lifecycle: LifecycleController::new(),
            session: None,
            in_flight: HashMap::new(),
            exit_flush,
            command_rx,
            events_tx,
            events_rx,
            status,
            successful_saves: 0,
            failed_saves: 0,
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        info!(
            debounce_ms = config.debounce_ms,
            max_retries = config.max_retries,
            "Scene sync mounted"
        );
        Ok(SceneSyncHandle {
            command_tx,
            status: status_rx,
        })
    }

    async fn run(mut self) {
        debug!("Scene sync event loop started");

        loop {
            let deadline = self.session.as_ref().and_then(|session| session.deadline());

            tokio::select! {
                biased;

                change = self.subscription.changed() => match change {
                    Some(change) => self.on_store_change(change),
                    None => {
                        warn!("Scene store closed, stopping scene sync");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.on_task_event(event),
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if let Flow::Stop = self.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        debug!("All scene sync handles dropped");
                        self.catch_up_with_store();
                        self.teardown(FlushReason::Unmount);
                        break;
                    }
                },
                _ = sleep_until_deadline(deadline) => self.on_deadline(),
            }

            self.publish_status();
        }

        self.publish_status();
        debug!("Scene sync event loop ended");
    }

    fn handle_command(&mut self, command: SyncCommand) -> Flow {
        // Edits made before the command was sent must count towards its flush.
        self.catch_up_with_store();

        // Status goes out before the reply so callers never observe the
        // state from before their own command.
        match command {
            SyncCommand::SetActiveProject {
                project_id,
                response,
            } => {
                let activation = self.activate(project_id);
                self.publish_status();
                let _ = response.send(activation);
                Flow::Continue
            }
            SyncCommand::PageUnload { response } => {
                let dispatch = self.flush(FlushReason::PageUnload);
                self.publish_status();
                let _ = response.send(dispatch);
                Flow::Continue
            }
            SyncCommand::Unmount { response } => {
                info!("Unmounting scene sync");
                let dispatch = self.teardown(FlushReason::Unmount);
                self.publish_status();
                let _ = response.send(dispatch);
                Flow::Stop
            }
        }
    }

    fn catch_up_with_store(&mut self) {
        if let Some(change) = self.subscription.pending() {
            self.on_store_change(change);
        }
    }

    fn activate(&mut self, target: Option<ProjectId>) -> Activation {
        match self.lifecycle.request(target) {
            Transition::Unchanged => Activation {
                outcome: ActivationOutcome::Unchanged,
                flush: FlushDispatch::Clean,
            },
            Transition::Deactivate => {
                let flush = self.teardown(FlushReason::ProjectSwitch);
                self.store.clear_scene();
                info!("No active project");
                Activation {
                    outcome: ActivationOutcome::Deactivated,
                    flush,
                }
            }
            Transition::Switch {
                project_id,
                generation,
            } => {
                // Flush reads the outgoing scene, so it must run before the clear.
                let flush = self.teardown(FlushReason::ProjectSwitch);
                self.session = Some(AutosaveCoordinator::new(
                    project_id.clone(),
                    generation,
                    self.policy,
                ));
                self.store.clear_scene();

                info!(project = %project_id, generation, "Loading project scene");
                self.spawn_load(project_id.clone(), generation);
                Activation {
                    outcome: ActivationOutcome::Loading(project_id),
                    flush,
                }
            }
        }
    }

    /// Close the current session, flushing it if dirty.
    fn teardown(&mut self, reason: FlushReason) -> FlushDispatch {
        let Some(mut session) = self.session.take() else {
            return FlushDispatch::Clean;
        };
        debug!(project = %session.project_id(), "Closing autosave session");
        match session.flush_ticket() {
            Some(ticket) => self.dispatch_flush(ticket, reason),
            None => {
                debug!(project = %session.project_id(), "Nothing to flush on {}", reason);
                FlushDispatch::Clean
            }
        }
    }

    fn flush(&mut self, reason: FlushReason) -> FlushDispatch {
        let Some(session) = self.session.as_mut() else {
            return FlushDispatch::Clean;
        };
        match session.flush_ticket() {
            Some(ticket) => self.dispatch_flush(ticket, reason),
            None => {
                debug!(project = %session.project_id(), "Nothing to flush on {}", reason);
                FlushDispatch::Clean
            }
        }
    }

    /// Start a flush, queued behind whatever is still running for the project.
    fn dispatch_flush(&mut self, ticket: SaveTicket, reason: FlushReason) -> FlushDispatch {
        let running = self.in_flight.entry(ticket.project_id.clone()).or_default();
        let after = running.last().map(|earlier| earlier.done.clone());
        let (handle, done) =
            self.exit_flush
                .dispatch(ticket.clone(), self.store.snapshot(), reason, after);
        running.push(InFlightSave { ticket, done });
        FlushDispatch::Dispatched(handle)
    }

    /// Drop a finished save or flush; true once nothing is left for its project.
    fn release_in_flight(&mut self, ticket: &SaveTicket) -> bool {
        let Some(running) = self.in_flight.get_mut(&ticket.project_id) else {
            return true;
        };
        running.retain(|entry| &entry.ticket != ticket);
        if running.is_empty() {
            self.in_flight.remove(&ticket.project_id);
            return true;
        }
        false
    }

    fn on_store_change(&mut self, change: StoreChange) {
        // Read before `observed` so the populate's own update is absorbed.
        let suppressed = self.lifecycle.is_suppressing();

        if let Some(session) = self.session.as_mut() {
            let fingerprint = match change.graph.fingerprint() {
                Ok(fingerprint) => Some(fingerprint),
                Err(err) => {
                    warn!(revision = %change.revision, "Failed to fingerprint scene: {}", err);
                    None
                }
            };

            match session.observe(fingerprint, suppressed, Instant::now()) {
                Observation::Changed => debug!(
                    project = %session.project_id(),
                    revision = %change.revision,
                    "Scene changed, save scheduled"
                ),
                Observation::Absorbed => debug!(
                    project = %session.project_id(),
                    revision = %change.revision,
                    "Scene update absorbed during load"
                ),
                Observation::Unchanged => {}
            }
        }

        if self.lifecycle.observed(change.revision) {
            debug!(revision = %change.revision, "Project scene settled");
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_due(now) {
            return;
        }

        if let Some(running) = self
            .in_flight
            .get(session.project_id())
            .and_then(|running| running.last())
        {
            debug!(running = %running.ticket, "Earlier save still running, queueing behind it");
            session.wait_for_earlier_save();
            return;
        }

        let Some(ticket) = session.begin_save() else {
            return;
        };
        let snapshot = self.store.snapshot();
        let done = self.spawn_save(ticket.clone(), snapshot);
        self.in_flight
            .entry(ticket.project_id.clone())
            .or_default()
            .push(InFlightSave { ticket, done });
    }

    fn on_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::LoadFinished {
                project_id,
                generation,
                outcome,
            } => self.on_load_finished(project_id, generation, outcome),
            TaskEvent::SaveFinished { ticket, outcome } => self.on_save_finished(ticket, outcome),
            TaskEvent::FlushFinished {
                ticket,
                fingerprint,
                success,
            } => self.on_flush_finished(ticket, fingerprint, success),
        }
    }

    fn on_flush_finished(
        &mut self,
        ticket: SaveTicket,
        fingerprint: Option<SceneFingerprint>,
        success: bool,
    ) {
        let idle = self.release_in_flight(&ticket);
        if success {
            self.successful_saves += 1;
        } else {
            self.failed_saves += 1;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.project_id() != &ticket.project_id {
            return;
        }
        if success {
            session.flush_succeeded(&ticket, fingerprint);
        }
        if idle {
            session.earlier_save_finished(Instant::now());
        }
    }

    fn on_load_finished(
        &mut self,
        project_id: ProjectId,
        generation: u64,
        outcome: RepositoryResult<Option<SceneGraph>>,
    ) {
        if !self.lifecycle.accepts_load(&project_id, generation) {
            debug!(project = %project_id, generation, "Discarding stale load result");
            return;
        }

        let revision = match outcome {
            Ok(Some(graph)) => {
                let dangling = graph.dangling_references();
                if !dangling.is_empty() {
                    warn!(
                        project = %project_id,
                        count = dangling.len(),
                        "Loaded scene has dangling references"
                    );
                    for reference in &dangling {
                        debug!(project = %project_id, "Dangling reference: {}", reference);
                    }
                }

                info!(project = %project_id, nodes = graph.len(), "Project scene loaded");
                self.store.set_scene(graph.nodes, graph.root_node_ids)
            }
            Ok(None) => {
                info!(project = %project_id, "No saved scene, starting empty");
                self.store.clear_scene()
            }
            Err(err) => {
                warn!(
                    project = %project_id,
                    code = err.code(),
                    "Failed to load scene, starting empty: {}",
                    err
                );
                self.store.clear_scene()
            }
        };

        // The store is populated first so a selection never points past it.
        self.view_state.reset_after_load(&self.store.snapshot());
        self.lifecycle.populated(revision);
    }

    fn on_save_finished(&mut self, ticket: SaveTicket, outcome: RepositoryResult<()>) {
        let idle = self.release_in_flight(&ticket);

        match &outcome {
            Ok(()) => self.successful_saves += 1,
            Err(err) => {
                self.failed_saves += 1;
                warn!(ticket = %ticket, code = err.code(), "Save failed: {}", err);
            }
        }

        let now = Instant::now();
        let Some(session) = self.session.as_mut() else {
            debug!(ticket = %ticket, "Save finished with no active project");
            return;
        };

        if !session.owns(&ticket) {
            if session.project_id() == &ticket.project_id {
                debug!(ticket = %ticket, "Save from an earlier activation finished");
                if idle {
                    session.earlier_save_finished(now);
                }
            } else {
                debug!(ticket = %ticket, "Discarding stale save result");
            }
            return;
        }

        match session.save_finished(&outcome, now) {
            SaveFollowUp::Done => info!(ticket = %ticket, "Scene saved"),
            SaveFollowUp::FollowUp => {
                debug!(ticket = %ticket, "Edits arrived during save, follow-up scheduled")
            }
            SaveFollowUp::Retry { attempt, delay } => {
                info!(ticket = %ticket, attempt, "Retrying save in {:?}", delay)
            }
            SaveFollowUp::GaveUp => {
                warn!(ticket = %ticket, "Giving up on save until the next edit")
            }
        }
    }

    fn spawn_load(&self, project_id: ProjectId, generation: u64) {
        let repository = Arc::clone(&self.repository);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let load = {
                let project_id = project_id.clone();
                tokio::spawn(async move { repository.load(&project_id).await })
            };
            // A panicking repository still has to end the load.
            let outcome = load.await.unwrap_or_else(|err| {
                Err(RepositoryError::Transient(format!("load task failed: {}", err)))
            });
            let _ = events.send(TaskEvent::LoadFinished {
                project_id,
                generation,
                outcome,
            });
        });
    }

    fn spawn_save(&self, ticket: SaveTicket, snapshot: Arc<SceneGraph>) -> watch::Receiver<bool> {
        let repository = Arc::clone(&self.repository);
        let events = self.events_tx.clone();
        let (done_tx, done_rx) = watch::channel(false);
        debug!(ticket = %ticket, nodes = snapshot.len(), "Saving scene");

        tokio::spawn(async move {
            let save = {
                let project_id = ticket.project_id.clone();
                tokio::spawn(async move { repository.save(&project_id, &snapshot).await })
            };
            let outcome = save.await.unwrap_or_else(|err| {
                Err(RepositoryError::Transient(format!("save task failed: {}", err)))
            });
            let _ = done_tx.send(true);
            let _ = events.send(TaskEvent::SaveFinished { ticket, outcome });
        });
        done_rx
    }

    fn publish_status(&self) {
        let status = SyncStatus {
            lifecycle: self.lifecycle.state().clone(),
            autosave: self.session.as_ref().map(|session| session.phase_kind()),
            dirty: self.session.as_ref().is_some_and(|session| session.is_dirty()),
            in_flight_saves: self.in_flight.values().map(Vec::len).sum(),
            successful_saves: self.successful_saves,
            failed_saves: self.failed_saves,
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to the mounted scene-sync actor
#[derive(Clone)]
pub struct SceneSyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    status: watch::Receiver<SyncStatus>,
}

impl SceneSyncHandle {
    /// Switch to `project_id`, or deactivate with `None`.
    ///
    /// Returns once the switch has started; the load completes in the
    /// background (see [`wait_until_settled`](Self::wait_until_settled)).
    pub async fn set_active_project(&self, project_id: Option<ProjectId>) -> SyncResult<Activation> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::SetActiveProject {
            project_id,
            response: tx,
        })
        .await?;
        rx.await
            .map_err(|_| SyncError::unavailable("response channel closed"))
    }

    pub async fn activate(&self, project_id: impl Into<ProjectId>) -> SyncResult<Activation> {
        self.set_active_project(Some(project_id.into())).await
    }

    pub async fn deactivate(&self) -> SyncResult<Activation> {
        self.set_active_project(None).await
    }

    /// Flush unsaved edits because the host is about to go away.
    pub async fn page_unload(&self) -> SyncResult<FlushDispatch> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::PageUnload { response: tx }).await?;
        rx.await
            .map_err(|_| SyncError::unavailable("response channel closed"))
    }

    /// Flush and stop the actor. Other clones of the handle stop working.
    pub async fn unmount(self) -> SyncResult<FlushDispatch> {
        let (tx, rx) = oneshot::channel();
        self.send(SyncCommand::Unmount { response: tx }).await?;
        rx.await
            .map_err(|_| SyncError::unavailable("response channel closed"))
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub async fn wait_for_status<F>(&self, predicate: F) -> SyncResult<SyncStatus>
    where
        F: FnMut(&SyncStatus) -> bool,
    {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::unavailable("scene sync stopped"))?;
        Ok(matched.clone())
    }

    /// Wait until the active project has loaded and edits count again.
    pub async fn wait_until_settled(&self) -> SyncResult<SyncStatus> {
        self.wait_for_status(SyncStatus::is_settled).await
    }

    async fn send(&self, command: SyncCommand) -> SyncResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::unavailable("scene sync actor stopped"))
    }
}
