use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use super::types::{FlushReason, SaveTicket, TaskEvent};
use crate::repository::ModelRepository;
use crate::scene::SceneGraph;

/// Best-effort last save when the editor is going away.
///
/// The request runs as a detached task bounded by a timeout, so it outlives
/// the session that dispatched it and never blocks the caller. Failures are
/// logged and swallowed.
pub(crate) struct ExitFlush {
    repository: Arc<dyn ModelRepository>,
    timeout: Duration,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl ExitFlush {
    pub fn new(
        repository: Arc<dyn ModelRepository>,
        timeout: Duration,
        events: mpsc::UnboundedSender<TaskEvent>,
    ) -> Self {
        Self {
            repository,
            timeout,
            events,
        }
    }

    /// Send `snapshot` for `ticket.project_id` in the background.
    ///
    /// With `after` set, the request is held until that earlier save for the
    /// same project has returned, so the older state can never land last. The
    /// timeout covers the wait and the save together. The returned receiver
    /// flips once this flush has stopped touching the repository.
    pub fn dispatch(
        &self,
        ticket: SaveTicket,
        snapshot: Arc<SceneGraph>,
        reason: FlushReason,
        after: Option<watch::Receiver<bool>>,
    ) -> (JoinHandle<bool>, watch::Receiver<bool>) {
        let repository = Arc::clone(&self.repository);
        let events = self.events.clone();
        let timeout = self.timeout;
        let fingerprint = snapshot.fingerprint().ok();
        let (done_tx, done_rx) = watch::channel(false);

        info!(
            ticket = %ticket,
            nodes = snapshot.len(),
            queued = after.is_some(),
            "Flushing unsaved scene on {}",
            reason
        );

        let handle = tokio::spawn(async move {
            let deadline = Instant::now() + timeout;
            let ready = match after {
                Some(earlier) => wait_for_earlier(earlier, deadline).await,
                None => true,
            };
            let success = if ready {
                save_before(repository, &ticket, snapshot, deadline, timeout).await
            } else {
                warn!(
                    ticket = %ticket,
                    "Flush timed out after {:?} waiting for an earlier save",
                    timeout
                );
                false
            };

            let _ = done_tx.send(true);
            // The actor may already be gone (unmount); that is fine.
            let _ = events.send(TaskEvent::FlushFinished {
                ticket,
                fingerprint,
                success,
            });
            success
        });
        (handle, done_rx)
    }
}

async fn wait_for_earlier(mut earlier: watch::Receiver<bool>, deadline: Instant) -> bool {
    // A closed channel means the earlier task is gone, which counts as done.
    let waited = tokio::time::timeout_at(deadline, earlier.wait_for(|done| *done))
        .await
        .is_ok();
    waited
}

async fn save_before(
    repository: Arc<dyn ModelRepository>,
    ticket: &SaveTicket,
    snapshot: Arc<SceneGraph>,
    deadline: Instant,
    timeout: Duration,
) -> bool {
    let mut save = {
        let project_id = ticket.project_id.clone();
        tokio::spawn(async move { repository.save(&project_id, &snapshot).await })
    };

    match tokio::time::timeout_at(deadline, &mut save).await {
        Ok(Ok(Ok(()))) => {
            info!(ticket = %ticket, "Flush saved");
            true
        }
        Ok(Ok(Err(err))) => {
            warn!(ticket = %ticket, code = err.code(), "Flush failed: {}", err);
            false
        }
        Ok(Err(err)) => {
            warn!(ticket = %ticket, "Flush task failed: {}", err);
            false
        }
        Err(_) => {
            save.abort();
            warn!(ticket = %ticket, "Flush timed out after {:?}", timeout);
            false
        }
    }
}
