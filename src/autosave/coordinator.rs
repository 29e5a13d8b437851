use std::time::Duration;
use tokio::time::Instant;

use super::config::SavePolicy;
use super::types::{AutosavePhaseKind, SaveTicket};
use crate::errors::RepositoryError;
use crate::project::ProjectId;
use crate::scene::SceneFingerprint;

/// Where one project's autosave stands.
///
/// ```text
/// Idle --change--> Scheduled --deadline--> Saving --done--> Idle
///                      ^                     |
///                      |                   change
///                      |                     v
///                      +------done------ PendingQueued
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutosavePhase {
    Idle,
    Scheduled { deadline: Instant },
    Saving,
    /// A change arrived while a save was in flight; exactly one follow-up
    /// will be scheduled when it completes.
    PendingQueued,
}

impl AutosavePhase {
    pub fn kind(&self) -> AutosavePhaseKind {
        match self {
            AutosavePhase::Idle => AutosavePhaseKind::Idle,
            AutosavePhase::Scheduled { .. } => AutosavePhaseKind::Scheduled,
            AutosavePhase::Saving => AutosavePhaseKind::Saving,
            AutosavePhase::PendingQueued => AutosavePhaseKind::PendingQueued,
        }
    }
}

/// How a store update was classified
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Same tree as last observed
    Unchanged,
    /// Tree changed during a load; baseline advanced, nothing scheduled
    Absorbed,
    /// Genuine edit
    Changed,
}

/// What happens after a save completes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFollowUp {
    /// Saved state is current
    Done,
    /// Edits arrived mid-save; one more save scheduled
    FollowUp,
    Retry { attempt: u32, delay: Duration },
    /// Failed and not retrying; state stays dirty until the next edit or flush
    GaveUp,
}

/// Debounce, coalescing and in-flight exclusivity for one project activation.
///
/// Pure state machine: it never touches the store or the repository. The
/// scene-sync actor feeds it store fingerprints, deadline expiries and save
/// completions, and performs the I/O it asks for.
#[derive(Debug)]
pub struct AutosaveCoordinator {
    project_id: ProjectId,
    generation: u64,
    policy: SavePolicy,
    phase: AutosavePhase,
    baseline: Option<SceneFingerprint>,
    dirty: bool,
    failed_attempts: u32,
    next_sequence: u64,
    in_flight: Option<SaveTicket>,
}

impl AutosaveCoordinator {
    pub fn new(project_id: ProjectId, generation: u64, policy: SavePolicy) -> Self {
        Self {
            project_id,
            generation,
            policy,
            phase: AutosavePhase::Idle,
            baseline: None,
            dirty: false,
            failed_attempts: 0,
            next_sequence: 0,
            in_flight: None,
        }
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> AutosavePhase {
        self.phase
    }

    pub fn phase_kind(&self) -> AutosavePhaseKind {
        self.phase.kind()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            AutosavePhase::Scheduled { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Classify a store update.
    ///
    /// A `None` fingerprint (the tree could not be encoded) always counts as
    /// a change.
    pub fn observe(
        &mut self,
        fingerprint: Option<SceneFingerprint>,
        suppressed: bool,
        now: Instant,
    ) -> Observation {
        if fingerprint.is_some() && fingerprint == self.baseline {
            return Observation::Unchanged;
        }
        self.baseline = fingerprint;

        if suppressed {
            return Observation::Absorbed;
        }

        self.dirty = true;
        self.failed_attempts = 0;
        self.phase = match self.phase {
            AutosavePhase::Idle | AutosavePhase::Scheduled { .. } => AutosavePhase::Scheduled {
                deadline: now + self.policy.debounce,
            },
            AutosavePhase::Saving | AutosavePhase::PendingQueued => AutosavePhase::PendingQueued,
        };
        Observation::Changed
    }

    /// Deadline reached: move to `Saving` and hand out the ticket for the save.
    pub fn begin_save(&mut self) -> Option<SaveTicket> {
        if !matches!(self.phase, AutosavePhase::Scheduled { .. }) {
            return None;
        }
        let ticket = self.next_ticket();
        self.in_flight = Some(ticket.clone());
        self.phase = AutosavePhase::Saving;
        Some(ticket)
    }

    pub fn owns(&self, ticket: &SaveTicket) -> bool {
        self.in_flight.as_ref() == Some(ticket)
    }

    /// Record the completion of this coordinator's in-flight save.
    pub fn save_finished(
        &mut self,
        outcome: &Result<(), RepositoryError>,
        now: Instant,
    ) -> SaveFollowUp {
        debug_assert!(
            matches!(
                self.phase,
                AutosavePhase::Saving | AutosavePhase::PendingQueued
            ),
            "save completed while {:?}",
            self.phase
        );
        self.in_flight = None;
        let queued = self.phase == AutosavePhase::PendingQueued;

        match outcome {
            Ok(()) => {
                self.failed_attempts = 0;
                if queued {
                    self.schedule_after(now, self.policy.debounce);
                    SaveFollowUp::FollowUp
                } else {
                    self.dirty = false;
                    self.phase = AutosavePhase::Idle;
                    SaveFollowUp::Done
                }
            }
            Err(_) if queued => {
                self.schedule_after(now, self.policy.debounce);
                SaveFollowUp::FollowUp
            }
            Err(err) if err.is_retryable() && self.failed_attempts < self.policy.max_retries => {
                self.failed_attempts += 1;
                let delay = self.policy.retry_delay(self.failed_attempts);
                self.schedule_after(now, delay);
                SaveFollowUp::Retry {
                    attempt: self.failed_attempts,
                    delay,
                }
            }
            Err(_) => {
                self.phase = AutosavePhase::Idle;
                SaveFollowUp::GaveUp
            }
        }
    }

    /// The deadline passed while a save for this project from an earlier
    /// activation is still running: queue behind it instead of overlapping.
    pub fn wait_for_earlier_save(&mut self) {
        if matches!(self.phase, AutosavePhase::Scheduled { .. }) {
            self.phase = AutosavePhase::PendingQueued;
        }
    }

    /// The earlier activation's save completed; its result says nothing
    /// about this activation's state.
    pub fn earlier_save_finished(&mut self, now: Instant) {
        if self.phase == AutosavePhase::PendingQueued && self.in_flight.is_none() {
            self.schedule_after(now, self.policy.debounce);
        }
    }

    /// Ticket for an exit flush, or `None` when there is nothing to save.
    ///
    /// A pending deadline is cancelled: the flush carries the same or newer
    /// state.
    pub fn flush_ticket(&mut self) -> Option<SaveTicket> {
        if !self.dirty {
            return None;
        }
        if matches!(self.phase, AutosavePhase::Scheduled { .. }) {
            self.phase = AutosavePhase::Idle;
        }
        Some(self.next_ticket())
    }

    /// A flush of `fingerprint` succeeded; clean if nothing changed since.
    pub fn flush_succeeded(&mut self, ticket: &SaveTicket, fingerprint: Option<SceneFingerprint>) {
        if ticket.generation != self.generation || ticket.project_id != self.project_id {
            return;
        }
        if fingerprint.is_some() && fingerprint == self.baseline && self.phase == AutosavePhase::Idle {
            self.dirty = false;
            self.failed_attempts = 0;
        }
    }

    fn schedule_after(&mut self, now: Instant, delay: Duration) {
        self.phase = AutosavePhase::Scheduled {
            deadline: now + delay,
        };
    }

    fn next_ticket(&mut self) -> SaveTicket {
        self.next_sequence += 1;
        SaveTicket {
            project_id: self.project_id.clone(),
            generation: self.generation,
            sequence: self.next_sequence,
        }
    }
}
