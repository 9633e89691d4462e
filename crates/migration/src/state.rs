//! The migration aggregate: phase, plan, cursor and log.
//!
//! `MigrationState` is persisted as a whole after every mutation, so every
//! transition here is a plain synchronous method. Guards return `DomainError`
//! and leave the state untouched when they refuse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catbridge_catalog::{LocalProduct, names_match};
use catbridge_core::{DomainError, DomainResult, RemoteId, SessionId};

use crate::log::{LogBuffer, MigrationLog};
use crate::task::MigrationTask;

/// Coarse-grained state of the migration.
///
/// `Idle` is both the initial state and "plan ready, awaiting start"; the two
/// are told apart by whether `tasks` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationPhase {
    Idle,
    Analyzing,
    Resolving,
    Migrating,
    Paused,
    Done,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Idle => "IDLE",
            MigrationPhase::Analyzing => "ANALYZING",
            MigrationPhase::Resolving => "RESOLVING",
            MigrationPhase::Migrating => "MIGRATING",
            MigrationPhase::Paused => "PAUSED",
            MigrationPhase::Done => "DONE",
        }
    }
}

impl core::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local unit with no remote counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UomConflict {
    pub local_uom: String,
    /// `None` until the operator maps it to a remote unit (existing or newly created).
    pub resolved_remote_id: Option<RemoteId>,
}

impl UomConflict {
    pub fn unresolved(local_uom: impl Into<String>) -> Self {
        Self {
            local_uom: local_uom.into(),
            resolved_remote_id: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_remote_id.is_some()
    }
}

/// What the state machine does after a failed task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Retry the same task; `attempt` is the retry number (1-based).
    Retry { attempt: u32 },
    /// Retry budget spent: task failed, migration paused.
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    pub id: SessionId,
    pub phase: MigrationPhase,
    /// 0..=100
    pub progress: u8,
    pub uom_conflicts: Vec<UomConflict>,
    pub tasks: Vec<MigrationTask>,
    pub logs: LogBuffer,
    pub current_task_index: usize,
    pub last_updated: DateTime<Utc>,
    /// Catalog captured by the last analysis, kept until a plan is built from it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalog: Vec<LocalProduct>,
}

impl MigrationState {
    pub fn fresh(log_capacity: usize) -> Self {
        Self {
            id: SessionId::new(),
            phase: MigrationPhase::Idle,
            progress: 0,
            uom_conflicts: Vec::new(),
            tasks: Vec::new(),
            logs: LogBuffer::with_capacity(log_capacity),
            current_task_index: 0,
            last_updated: Utc::now(),
            catalog: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn log(&mut self, entry: MigrationLog) {
        self.logs.push(entry);
        self.touch();
    }

    pub fn is_plan_ready(&self) -> bool {
        self.phase == MigrationPhase::Idle && !self.tasks.is_empty()
    }

    pub fn current_task(&self) -> Option<&MigrationTask> {
        self.tasks.get(self.current_task_index)
    }

    pub fn unresolved_conflicts(&self) -> Vec<&str> {
        self.uom_conflicts
            .iter()
            .filter(|c| !c.is_resolved())
            .map(|c| c.local_uom.as_str())
            .collect()
    }

    /// Resolution chosen for a local unit, if it was ever in conflict.
    pub fn unit_resolution(&self, local_uom: &str) -> Option<RemoteId> {
        self.uom_conflicts
            .iter()
            .find(|c| names_match(&c.local_uom, local_uom))
            .and_then(|c| c.resolved_remote_id)
    }

    /// IDLE/RESOLVING/PAUSED/DONE → ANALYZING, discarding the previous run.
    pub fn begin_analysis(&mut self, catalog: Vec<LocalProduct>) -> DomainResult<()> {
        match self.phase {
            MigrationPhase::Idle
            | MigrationPhase::Resolving
            | MigrationPhase::Paused
            | MigrationPhase::Done => {}
            other => {
                return Err(DomainError::invariant(format!(
                    "cannot start analysis while {other}"
                )));
            }
        }

        self.phase = MigrationPhase::Analyzing;
        self.tasks.clear();
        self.logs.clear();
        self.uom_conflicts.clear();
        self.progress = 0;
        self.current_task_index = 0;
        self.catalog = catalog;
        self.touch();
        Ok(())
    }

    /// ANALYZING → IDLE with nothing retained.
    pub fn abort_analysis(&mut self) {
        self.phase = MigrationPhase::Idle;
        self.tasks.clear();
        self.uom_conflicts.clear();
        self.catalog.clear();
        self.touch();
    }

    /// ANALYZING → RESOLVING.
    pub fn await_resolution(&mut self, conflicts: Vec<UomConflict>) {
        self.phase = MigrationPhase::Resolving;
        self.uom_conflicts = conflicts;
        self.touch();
    }

    /// → IDLE with a ready plan.
    pub fn install_plan(&mut self, tasks: Vec<MigrationTask>) {
        self.phase = MigrationPhase::Idle;
        self.tasks = tasks;
        self.current_task_index = 0;
        self.progress = 0;
        self.catalog.clear();
        self.touch();
    }

    pub fn resolve_conflict(&mut self, local_uom: &str, remote_id: RemoteId) -> DomainResult<()> {
        if self.phase != MigrationPhase::Resolving {
            return Err(DomainError::invariant(format!(
                "no conflicts to resolve while {}",
                self.phase
            )));
        }

        let conflict = self
            .uom_conflicts
            .iter_mut()
            .find(|c| names_match(&c.local_uom, local_uom))
            .ok_or_else(|| DomainError::not_found(format!("no conflict for unit '{local_uom}'")))?;

        conflict.resolved_remote_id = Some(remote_id);
        self.touch();
        Ok(())
    }

    /// Guard for leaving RESOLVING: every conflict must have a resolution.
    pub fn ensure_resolved(&self) -> DomainResult<()> {
        if self.phase != MigrationPhase::Resolving {
            return Err(DomainError::invariant(format!(
                "not resolving conflicts (phase is {})",
                self.phase
            )));
        }

        let open = self.unresolved_conflicts();
        if !open.is_empty() {
            return Err(DomainError::validation(format!(
                "unresolved units: {}",
                open.join(", ")
            )));
        }
        Ok(())
    }

    /// IDLE(plan ready) → MIGRATING, or PAUSED → MIGRATING.
    ///
    /// Returns `true` when resuming. On resume the cursor is kept and a failed
    /// task under it gets a fresh retry budget.
    pub fn start(&mut self) -> DomainResult<bool> {
        let resumed = match self.phase {
            MigrationPhase::Idle if !self.tasks.is_empty() => false,
            MigrationPhase::Paused => {
                if let Some(task) = self.tasks.get_mut(self.current_task_index) {
                    task.reset_for_resume();
                }
                true
            }
            MigrationPhase::Idle => {
                return Err(DomainError::invariant("no migration plan to run"));
            }
            other => {
                return Err(DomainError::invariant(format!(
                    "cannot start migration while {other}"
                )));
            }
        };

        self.phase = MigrationPhase::Migrating;
        self.touch();
        Ok(resumed)
    }

    /// MIGRATING → PAUSED.
    pub fn pause(&mut self) -> DomainResult<()> {
        if self.phase != MigrationPhase::Migrating {
            return Err(DomainError::invariant(format!(
                "cannot pause while {}",
                self.phase
            )));
        }
        self.phase = MigrationPhase::Paused;
        self.touch();
        Ok(())
    }

    /// Move the cursor past the current task.
    pub fn advance(&mut self) {
        if self.current_task_index < self.tasks.len() {
            self.current_task_index += 1;
        }
        self.recompute_progress();
        self.touch();
    }

    pub fn record_success(&mut self, remote_id: Option<RemoteId>) {
        if let Some(task) = self.tasks.get_mut(self.current_task_index) {
            task.mark_success(remote_id);
        }
        self.advance();
    }

    /// Apply a failed attempt of the current task.
    ///
    /// While `retries < max_retries` the retry counter is bumped and the cursor
    /// stays put. Afterwards the task is marked failed and the whole migration
    /// pauses.
    pub fn record_failure(&mut self, error: &str, max_retries: u32) -> FailureOutcome {
        let Some(task) = self.tasks.get_mut(self.current_task_index) else {
            return FailureOutcome::Exhausted;
        };

        let outcome = if task.retries < max_retries {
            task.retries += 1;
            task.error = Some(error.to_string());
            FailureOutcome::Retry {
                attempt: task.retries,
            }
        } else {
            task.mark_failed(error);
            self.phase = MigrationPhase::Paused;
            FailureOutcome::Exhausted
        };

        self.touch();
        outcome
    }

    /// MIGRATING → DONE.
    pub fn complete(&mut self) {
        self.phase = MigrationPhase::Done;
        self.progress = 100;
        self.touch();
    }

    pub fn recompute_progress(&mut self) {
        self.progress = if self.tasks.is_empty() {
            100
        } else {
            let ratio = self.current_task_index as f64 / self.tasks.len() as f64;
            (ratio * 100.0).round().clamp(0.0, 100.0) as u8
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;
    use crate::task::TaskStatus;

    fn planned_state(n: usize) -> MigrationState {
        let mut state = MigrationState::fresh(50);
        let tasks = (0..n).map(|i| MigrationTask::attribute(format!("A{i}"))).collect();
        state.install_plan(tasks);
        state
    }

    #[test]
    fn fresh_state_is_idle_without_plan() {
        let state = MigrationState::fresh(10);
        assert_eq!(state.phase, MigrationPhase::Idle);
        assert!(!state.is_plan_ready());
        assert_eq!(state.logs.capacity(), 10);
    }

    #[test]
    fn analysis_clears_previous_run() {
        let mut state = planned_state(2);
        state.log(MigrationLog::new(LogLevel::Info, "old"));
        state.current_task_index = 1;

        state.begin_analysis(vec![]).unwrap();
        assert_eq!(state.phase, MigrationPhase::Analyzing);
        assert!(state.tasks.is_empty());
        assert!(state.logs.is_empty());
        assert_eq!(state.current_task_index, 0);
    }

    #[test]
    fn analysis_is_refused_while_migrating() {
        let mut state = planned_state(1);
        state.start().unwrap();
        assert!(state.begin_analysis(vec![]).is_err());
        assert_eq!(state.phase, MigrationPhase::Migrating);
    }

    #[test]
    fn resolution_guard_refuses_with_open_conflicts() {
        let mut state = MigrationState::fresh(10);
        state.begin_analysis(vec![]).unwrap();
        state.await_resolution(vec![UomConflict::unresolved("rolls")]);

        assert!(state.ensure_resolved().is_err());
        assert_eq!(state.phase, MigrationPhase::Resolving);

        state.resolve_conflict("ROLLS", 42).unwrap();
        assert!(state.ensure_resolved().is_ok());
        assert_eq!(state.unit_resolution("rolls"), Some(42));
    }

    #[test]
    fn resolving_unknown_unit_is_not_found() {
        let mut state = MigrationState::fresh(10);
        state.begin_analysis(vec![]).unwrap();
        state.await_resolution(vec![UomConflict::unresolved("rolls")]);

        match state.resolve_conflict("furlong", 1).unwrap_err() {
            DomainError::NotFound(_) => {}
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn start_requires_a_plan() {
        let mut state = MigrationState::fresh(10);
        assert!(state.start().is_err());

        let mut state = planned_state(1);
        assert_eq!(state.start().unwrap(), false);
        assert_eq!(state.phase, MigrationPhase::Migrating);
    }

    #[test]
    fn success_advances_cursor_and_progress() {
        let mut state = planned_state(3);
        state.start().unwrap();

        state.record_success(Some(10));
        assert_eq!(state.current_task_index, 1);
        assert_eq!(state.progress, 33);
        assert_eq!(state.tasks[0].status, TaskStatus::Success);

        state.record_success(Some(11));
        assert_eq!(state.progress, 67);
    }

    #[test]
    fn failure_retries_then_pauses() {
        let mut state = planned_state(2);
        state.start().unwrap();

        for attempt in 1..=3 {
            assert_eq!(
                state.record_failure("boom", 3),
                FailureOutcome::Retry { attempt }
            );
            assert_eq!(state.phase, MigrationPhase::Migrating);
        }

        assert_eq!(state.record_failure("boom", 3), FailureOutcome::Exhausted);
        assert_eq!(state.phase, MigrationPhase::Paused);
        assert_eq!(state.current_task_index, 0);
        assert_eq!(state.tasks[0].status, TaskStatus::Failed);
        assert_eq!(state.tasks[0].retries, 3);
        assert_eq!(state.tasks[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn resume_resets_failed_task_under_cursor() {
        let mut state = planned_state(2);
        state.start().unwrap();
        for _ in 0..4 {
            state.record_failure("boom", 3);
        }

        assert_eq!(state.start().unwrap(), true);
        assert_eq!(state.phase, MigrationPhase::Migrating);
        assert_eq!(state.tasks[0].status, TaskStatus::Pending);
        assert_eq!(state.tasks[0].retries, 0);
    }

    #[test]
    fn pause_only_from_migrating() {
        let mut state = planned_state(1);
        assert!(state.pause().is_err());
        state.start().unwrap();
        state.pause().unwrap();
        assert_eq!(state.phase, MigrationPhase::Paused);
    }

    #[test]
    fn empty_plan_progress_is_complete() {
        let mut state = MigrationState::fresh(10);
        state.recompute_progress();
        assert_eq!(state.progress, 100);
    }
}
