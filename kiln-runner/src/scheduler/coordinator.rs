//! Run coordinator
//!
//! Keeps at most one active run per run group. Admitting a new run for a
//! group cancels the run it supersedes; cancellation is cooperative and is
//! observed by the variant tasks at their stage boundaries.

use kiln_core::domain::run::{RunGroup, RunStatus};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Admission of one run into its group
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: Uuid,
    pub group: RunGroup,
    seq: u64,
    token: CancellationToken,
}

impl RunTicket {
    /// Cancellation signal shared by all variant tasks of the run
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
struct ActiveRun {
    run_id: Uuid,
    seq: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    active: HashMap<RunGroup, ActiveRun>,
    last_status: HashMap<RunGroup, RunStatus>,
}

/// One-active-run-per-group coordinator
#[derive(Debug, Default)]
pub struct RunCoordinator {
    state: Mutex<State>,
}

impl RunCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new run for `group`, cancelling the active one if any
    ///
    /// Admission order is arrival order: of two runs admitted for the same
    /// group, the later one always wins.
    pub fn admit(&self, group: RunGroup) -> RunTicket {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        state.next_seq += 1;
        let seq = state.next_seq;
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();

        let previous = state.active.insert(
            group.clone(),
            ActiveRun {
                run_id,
                seq,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            info!(
                "Run {} supersedes run {} in group {}",
                run_id, previous.run_id, group
            );
            previous.token.cancel();
        }

        state.last_status.insert(group.clone(), RunStatus::Running);
        debug!("Admitted run {} (#{}) for group {}", run_id, seq, group);

        RunTicket {
            run_id,
            group,
            seq,
            token,
        }
    }

    /// Records the terminal status of a run and frees its slot
    ///
    /// A superseded run never clears the slot of its successor.
    pub fn finish(&self, ticket: &RunTicket, status: RunStatus) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let is_current = state
            .active
            .get(&ticket.group)
            .is_some_and(|active| active.seq == ticket.seq);

        if is_current {
            state.active.remove(&ticket.group);
            state.last_status.insert(ticket.group.clone(), status);
        }

        debug!(
            "Run {} in group {} finished: {}{}",
            ticket.run_id,
            ticket.group,
            status,
            if is_current { "" } else { " (superseded)" }
        );
    }

    /// Status of the latest run in `group`
    pub fn status(&self, group: &RunGroup) -> RunStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_status.get(group).copied().unwrap_or(RunStatus::Idle)
    }

    /// Run currently active in `group`
    pub fn active_run(&self, group: &RunGroup) -> Option<Uuid> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active.get(group).map(|active| active.run_id)
    }

    /// Number of groups with an active run
    pub fn active_runs(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active.len()
    }
}
