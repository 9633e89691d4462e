//! The migration engine: drives `MigrationState` against a remote catalog.
//!
//! Every operation locks the state, applies a pure transition, appends to the
//! user-visible log and persists the whole snapshot before returning. Remote
//! calls are made without holding the state lock, so `state()` and
//! `pause_migration()` stay responsive while a task is in flight.
//!
//! Locks are taken in the order tick gate, state, caches. The tick gate
//! serializes task execution with the operations that rebuild the caches or
//! replace the plan (start/resume, analysis); reset does not wait for it and
//! the in-flight result is discarded instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value as JsonValue, json};
use tokio::sync::{Mutex, MutexGuard};

use catbridge_catalog::{
    LocalProduct, RemoteAttribute, RemoteAttributeValue, RemoteUnit, distinct_uoms, names_match,
};
use catbridge_core::{DomainError, RemoteId, SessionId};
use catbridge_migration::snapshot;
use catbridge_migration::{
    FailureOutcome, LogLevel, MigrationLog, MigrationPhase, MigrationState, MigrationTask,
    PlanBuilder, RemoteCaches, STATE_KEY, SnapshotError, TemplatePolicy, analyze,
};

use crate::engine::config::EngineConfig;
use crate::engine::executor::TaskExecutor;
use crate::remote::{CatalogClient, RemoteError};
use crate::store::{StateStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("reset must be confirmed")]
    ConfirmationRequired,
    #[error("unresolved unit conflicts: {}", .0.join(", "))]
    UnresolvedConflicts(Vec<String>),
}

/// What one scheduling tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The task under the cursor succeeded; the cursor moved.
    Advanced,
    /// The task failed and will be retried after the delay.
    Retry(Duration),
    /// The task under the cursor was already settled; the cursor moved.
    Skipped,
    /// The result was dropped because the session was reset or the cursor moved.
    Discarded,
    /// Retries exhausted; the migration is paused.
    Halted,
    /// All tasks done.
    Done,
    /// Not migrating (idle, paused, ...).
    Inactive,
    /// Another tick or worker loop is already running.
    Busy,
}

/// Clears an in-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct RemoteMetadata {
    attributes: Vec<RemoteAttribute>,
    values: Vec<RemoteAttributeValue>,
    units: Vec<RemoteUnit>,
    template_names: Vec<String>,
}

pub struct MigrationEngine {
    client: Arc<dyn CatalogClient>,
    store: Arc<dyn StateStore>,
    config: EngineConfig,
    state: Mutex<MigrationState>,
    caches: Mutex<RemoteCaches>,
    tick_gate: Mutex<()>,
    worker_armed: AtomicBool,
}

impl MigrationEngine {
    /// Load the persisted state (or start fresh) and build the engine.
    ///
    /// A snapshot that cannot be decoded is discarded with a warning. A run
    /// interrupted mid-flight comes back PAUSED; an interrupted analysis comes
    /// back IDLE.
    pub async fn load(
        client: Arc<dyn CatalogClient>,
        store: Arc<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut state = match store.load(STATE_KEY).await? {
            Some(blob) => match snapshot::decode(&blob) {
                Ok(state) => state,
                Err(err) => {
                    tracing::warn!(error = %err, "discarding persisted migration state");
                    let mut fresh = MigrationState::fresh(config.log_capacity);
                    push_log(
                        &mut fresh,
                        MigrationLog::new(LogLevel::Warn, format!("Persisted state discarded: {err}")),
                    );
                    fresh
                }
            },
            None => MigrationState::fresh(config.log_capacity),
        };

        match state.phase {
            MigrationPhase::Migrating => {
                state.phase = MigrationPhase::Paused;
                push_log(
                    &mut state,
                    MigrationLog::new(
                        LogLevel::Warn,
                        "Migration was interrupted; resume to continue",
                    ),
                );
            }
            MigrationPhase::Analyzing => {
                state.abort_analysis();
                push_log(
                    &mut state,
                    MigrationLog::new(LogLevel::Warn, "Analysis was interrupted; run it again"),
                );
            }
            _ => {}
        }

        tracing::info!(
            session = %state.id,
            phase = %state.phase,
            tasks = state.tasks.len(),
            cursor = state.current_task_index,
            "migration engine loaded"
        );

        let engine = Self {
            client,
            store,
            config,
            state: Mutex::new(state),
            caches: Mutex::new(RemoteCaches::new()),
            tick_gate: Mutex::new(()),
            worker_armed: AtomicBool::new(false),
        };
        {
            let state = engine.state.lock().await;
            engine.persist(&state).await?;
        }
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> MigrationState {
        self.state.lock().await.clone()
    }

    /// Remote units known to the engine, for mapping conflicting local units.
    ///
    /// Fetched from the remote when the caches are cold.
    pub async fn remote_units(&self) -> Result<Vec<RemoteUnit>, EngineError> {
        if !self.caches.lock().await.is_loaded() {
            self.refresh_caches().await?;
        }
        Ok(self.caches.lock().await.units().to_vec())
    }

    async fn persist(&self, state: &MigrationState) -> Result<(), EngineError> {
        let blob = snapshot::encode(state)?;
        self.store.save(STATE_KEY, &blob).await?;
        Ok(())
    }

    async fn fetch_metadata(&self, with_templates: bool) -> Result<RemoteMetadata, RemoteError> {
        let attributes = self.client.fetch_attributes().await?;
        let values = self.client.fetch_attribute_values().await?;
        let units = self.client.fetch_units().await?;
        let template_names = if with_templates {
            self.client.fetch_template_names().await?
        } else {
            Vec::new()
        };
        Ok(RemoteMetadata {
            attributes,
            values,
            units,
            template_names,
        })
    }

    async fn refresh_caches(&self) -> Result<(), RemoteError> {
        let with_templates = self.config.template_policy == TemplatePolicy::SkipExisting;
        let metadata = self.fetch_metadata(with_templates).await?;
        prime_caches(&mut *self.caches.lock().await, metadata);
        Ok(())
    }

    fn plan_builder(&self, caches: &RemoteCaches) -> PlanBuilder {
        PlanBuilder::new(self.config.template_policy)
            .with_existing_templates(caches.template_names().to_vec())
    }

    /// IDLE/RESOLVING/PAUSED/DONE → ANALYZING → RESOLVING or IDLE(plan ready).
    pub async fn run_analysis(&self, products: Vec<LocalProduct>) -> Result<(), EngineError> {
        for product in &products {
            product.validate()?;
        }

        // A task still in flight from a paused run lands before the plan is replaced.
        let _gate = self.tick_gate.lock().await;

        let session = {
            let mut state = self.state.lock().await;
            state.begin_analysis(products)?;
            let count = state.catalog.len();
            push_log(
                &mut state,
                MigrationLog::new(LogLevel::Info, format!("Analysis started for {count} products")),
            );
            self.persist(&state).await?;
            state.id
        };

        let fetched = self.refresh_caches().await;

        let mut state = self.state.lock().await;
        if state.id != session || state.phase != MigrationPhase::Analyzing {
            tracing::warn!(session = %session, "analysis result discarded; state changed meanwhile");
            return Ok(());
        }

        if let Err(err) = fetched {
            state.abort_analysis();
            push_log(
                &mut state,
                MigrationLog::new(LogLevel::Error, format!("Failed to fetch remote metadata: {err}")),
            );
            self.persist(&state).await?;
            return Err(err.into());
        }

        let caches = self.caches.lock().await;
        let uoms = distinct_uoms(&state.catalog);
        let conflicts = analyze(&uoms, caches.units());

        if conflicts.is_empty() {
            let tasks = self
                .plan_builder(&caches)
                .build(&state.catalog, &caches.attributes(), &caches.values());
            install_plan(&mut state, tasks);
        } else {
            let names: Vec<String> = conflicts.iter().map(|c| c.local_uom.clone()).collect();
            state.await_resolution(conflicts);
            push_log(
                &mut state,
                MigrationLog::new(
                    LogLevel::Warn,
                    format!("{} unit(s) need a decision: {}", names.len(), names.join(", ")),
                )
                .with_details(json!({ "units": names })),
            );
        }

        self.persist(&state).await
    }

    /// Map a conflicting local unit to an existing remote unit.
    pub async fn resolve_conflict(&self, local_uom: &str, unit_id: RemoteId) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.resolve_conflict(local_uom, unit_id)?;
        push_log(
            &mut state,
            MigrationLog::new(
                LogLevel::Info,
                format!("Unit '{local_uom}' mapped to remote unit {unit_id}"),
            ),
        );
        self.persist(&state).await
    }

    /// Create a remote unit named after the local one and map the conflict to it.
    pub async fn create_new_unit(&self, local_uom: &str) -> Result<RemoteUnit, EngineError> {
        let session = {
            let state = self.state.lock().await;
            if state.phase != MigrationPhase::Resolving {
                return Err(DomainError::invariant(format!(
                    "no conflicts to resolve while {}",
                    state.phase
                ))
                .into());
            }
            let known = state
                .uom_conflicts
                .iter()
                .any(|c| names_match(&c.local_uom, local_uom));
            if !known {
                return Err(DomainError::not_found(format!("no conflict for unit '{local_uom}'")).into());
            }
            state.id
        };

        let name = local_uom.trim().to_string();
        let id = match self.client.create_unit(&name).await {
            Ok(id) => id,
            Err(err) => {
                let mut state = self.state.lock().await;
                if state.id == session {
                    push_log(
                        &mut state,
                        MigrationLog::new(LogLevel::Error, format!("Failed to create unit '{name}': {err}")),
                    );
                    self.persist(&state).await?;
                }
                return Err(err.into());
            }
        };

        let unit = RemoteUnit { id, name };
        self.caches.lock().await.insert_unit(unit.clone());

        let mut state = self.state.lock().await;
        if state.id != session {
            return Err(DomainError::invariant("migration was reset while the unit was created").into());
        }
        state.resolve_conflict(local_uom, id)?;
        push_log(
            &mut state,
            MigrationLog::new(
                LogLevel::Success,
                format!("Created remote unit '{}' ({id})", unit.name),
            ),
        );
        self.persist(&state).await?;
        Ok(unit)
    }

    /// RESOLVING → IDLE(plan ready) once every conflict is resolved.
    pub async fn finish_resolution(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            if let Err(err) = state.ensure_resolved() {
                if state.phase != MigrationPhase::Resolving {
                    return Err(err.into());
                }
                let open: Vec<String> = state
                    .unresolved_conflicts()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                push_log(
                    &mut state,
                    MigrationLog::new(
                        LogLevel::Warn,
                        format!("Cannot build the plan yet; unresolved units: {}", open.join(", ")),
                    ),
                );
                self.persist(&state).await?;
                return Err(EngineError::UnresolvedConflicts(open));
            }
        }

        // Caches are empty after a restart in RESOLVING.
        if !self.caches.lock().await.is_loaded() {
            self.refresh_caches().await?;
        }

        let mut state = self.state.lock().await;
        state.ensure_resolved()?;
        let caches = self.caches.lock().await;
        let tasks = self
            .plan_builder(&caches)
            .build(&state.catalog, &caches.attributes(), &caches.values());
        install_plan(&mut state, tasks);
        self.persist(&state).await
    }

    /// IDLE(plan ready) → MIGRATING, or resume PAUSED → MIGRATING.
    ///
    /// Only transitions; call `run` (usually spawned) to execute the plan.
    /// Waits for a task still in flight from before a pause, then rebuilds the
    /// caches from remote metadata plus the tasks that succeeded so far.
    /// Returns `true` when resuming.
    pub async fn start_migration(&self) -> Result<bool, EngineError> {
        let _gate = self.tick_gate.lock().await;

        {
            let state = self.state.lock().await;
            let startable = state.is_plan_ready() || state.phase == MigrationPhase::Paused;
            if !startable {
                let reason = if state.phase == MigrationPhase::Idle {
                    "no migration plan to run".to_string()
                } else {
                    format!("cannot start migration while {}", state.phase)
                };
                return Err(DomainError::invariant(reason).into());
            }
        }

        let with_templates = self.config.template_policy == TemplatePolicy::SkipExisting;
        let metadata = match self.fetch_metadata(with_templates).await {
            Ok(metadata) => metadata,
            Err(err) => {
                let mut state = self.state.lock().await;
                push_log(
                    &mut state,
                    MigrationLog::new(LogLevel::Error, format!("Failed to load remote metadata: {err}")),
                );
                self.persist(&state).await?;
                return Err(err.into());
            }
        };

        let mut state = self.state.lock().await;
        {
            let mut caches = self.caches.lock().await;
            prime_caches(&mut caches, metadata);
            caches.overlay_completed(&state.tasks);
        }

        let resumed = state.start()?;
        let message = if resumed {
            format!(
                "Migration resumed at task {}/{}",
                state.current_task_index + 1,
                state.tasks.len()
            )
        } else {
            format!("Migration started: {} tasks", state.tasks.len())
        };
        push_log(&mut state, MigrationLog::new(LogLevel::Info, message));
        self.persist(&state).await?;
        Ok(resumed)
    }

    /// MIGRATING → PAUSED; a task already in flight still completes.
    pub async fn pause_migration(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.pause()?;
        push_log(&mut state, MigrationLog::new(LogLevel::Warn, "Migration paused"));
        self.persist(&state).await
    }

    /// Any state → fresh IDLE with a new session id.
    pub async fn reset_migration(&self, confirm: bool) -> Result<SessionId, EngineError> {
        if !confirm {
            return Err(EngineError::ConfirmationRequired);
        }

        let (previous, session) = {
            let mut state = self.state.lock().await;
            let previous = state.id;
            *state = MigrationState::fresh(self.config.log_capacity);
            push_log(&mut state, MigrationLog::new(LogLevel::Info, "Migration reset"));
            self.persist(&state).await?;
            (previous, state.id)
        };

        // Waits for an in-flight task, whose result is then discarded.
        self.caches.lock().await.clear();

        tracing::info!(previous = %previous, session = %session, "migration reset");
        Ok(session)
    }

    /// The log buffer as a JSON document.
    pub async fn export_logs(&self) -> JsonValue {
        let state = self.state.lock().await;
        let logs: Vec<&MigrationLog> = state.logs.iter().collect();
        json!({
            "sessionId": state.id,
            "phase": state.phase,
            "exportedAt": Utc::now(),
            "logs": logs,
        })
    }

    /// Advance the migration by at most one task.
    ///
    /// Returns `Busy` without waiting if a task is already executing or a
    /// start/analysis holds the gate.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        let Ok(_gate) = self.tick_gate.try_lock() else {
            return Ok(TickOutcome::Busy);
        };
        self.step().await
    }

    /// One tick; the caller holds the tick gate.
    async fn step(&self) -> Result<TickOutcome, EngineError> {
        let (session, cursor, task, conflicts) = {
            let mut state = self.state.lock().await;
            if state.phase != MigrationPhase::Migrating {
                return Ok(TickOutcome::Inactive);
            }

            let cursor = state.current_task_index;
            let Some(task) = state.current_task().cloned() else {
                self.complete(state).await?;
                return Ok(TickOutcome::Done);
            };

            if task.is_settled() {
                state.advance();
                self.persist(&state).await?;
                return Ok(TickOutcome::Skipped);
            }

            (state.id, cursor, task, state.uom_conflicts.clone())
        };

        tracing::debug!(task = %task.id, cursor, "executing task");
        let result = {
            let mut caches = self.caches.lock().await;
            TaskExecutor::new(self.client.as_ref(), &self.config)
                .execute(&task, &mut caches, &conflicts)
                .await
        };

        let mut state = self.state.lock().await;
        if state.id != session || state.current_task_index != cursor {
            tracing::warn!(task = %task.id, "task result discarded; state changed while in flight");
            return Ok(TickOutcome::Discarded);
        }

        let outcome = match result {
            Ok(remote_id) => {
                state.record_success(remote_id);
                let entry = MigrationLog::new(
                    LogLevel::Success,
                    format!("Created {} '{}'", task.kind().as_str(), task.name),
                )
                .with_details(json!({ "taskId": task.id, "remoteId": remote_id }));
                push_log(&mut state, entry);
                TickOutcome::Advanced
            }
            Err(err) => {
                let error = err.to_string();
                match state.record_failure(&error, self.config.max_retries) {
                    FailureOutcome::Retry { attempt } => {
                        push_log(
                            &mut state,
                            MigrationLog::new(
                                LogLevel::Warn,
                                format!(
                                    "'{}' failed (retry {attempt}/{}): {error}",
                                    task.name, self.config.max_retries
                                ),
                            ),
                        );
                        TickOutcome::Retry(self.config.task_retry_policy().delay_for_attempt(attempt))
                    }
                    FailureOutcome::Exhausted => {
                        push_log(
                            &mut state,
                            MigrationLog::new(
                                LogLevel::Error,
                                format!("'{}' failed permanently: {error}; migration paused", task.name),
                            )
                            .with_details(json!({ "taskId": task.id })),
                        );
                        TickOutcome::Halted
                    }
                }
            }
        };

        self.persist(&state).await?;
        Ok(outcome)
    }

    /// MIGRATING → DONE under the same guard that saw the cursor past the plan.
    async fn complete(&self, mut state: MutexGuard<'_, MigrationState>) -> Result<(), EngineError> {
        state.complete();
        let count = state.tasks.len();
        push_log(
            &mut state,
            MigrationLog::new(LogLevel::Success, format!("Migration complete: {count} tasks")),
        );
        self.persist(&state).await?;
        drop(state);

        if let Err(err) = self.client.refresh_catalog().await {
            tracing::warn!(error = %err, "catalog refresh after migration failed");
        }
        Ok(())
    }

    /// Worker loop: tick until done, paused or halted, sleeping for throttle
    /// and retry delays in between. Returns the final tick outcome, or `Busy`
    /// if another loop is already running.
    pub async fn run(&self) -> Result<TickOutcome, EngineError> {
        loop {
            let Some(armed) = FlightGuard::acquire(&self.worker_armed) else {
                return Ok(TickOutcome::Busy);
            };
            let outcome = self.drive().await;
            drop(armed);

            // A resume that raced with this loop winding down saw it still armed.
            if matches!(outcome, Ok(TickOutcome::Inactive))
                && self.state.lock().await.phase == MigrationPhase::Migrating
            {
                continue;
            }
            return outcome;
        }
    }

    async fn drive(&self) -> Result<TickOutcome, EngineError> {
        loop {
            // Waits out a start or analysis instead of reporting `Busy`.
            let outcome = {
                let _gate = self.tick_gate.lock().await;
                self.step().await?
            };
            match outcome {
                TickOutcome::Advanced => {
                    if !self.config.throttle.is_zero() {
                        tokio::time::sleep(self.config.throttle).await;
                    }
                }
                TickOutcome::Retry(delay) => tokio::time::sleep(delay).await,
                TickOutcome::Skipped | TickOutcome::Discarded => tokio::task::yield_now().await,
                outcome @ (TickOutcome::Done
                | TickOutcome::Halted
                | TickOutcome::Inactive
                | TickOutcome::Busy) => return Ok(outcome),
            }
        }
    }
}

fn prime_caches(caches: &mut RemoteCaches, metadata: RemoteMetadata) {
    caches.prime(metadata.attributes, metadata.values, metadata.units);
    caches.set_template_names(metadata.template_names);
    tracing::debug!(
        attributes = caches.attribute_count(),
        values = caches.value_count(),
        units = caches.units().len(),
        "remote caches primed"
    );
}

fn install_plan(state: &mut MigrationState, tasks: Vec<MigrationTask>) {
    let count = tasks.len();
    state.install_plan(tasks);
    push_log(
        state,
        MigrationLog::new(LogLevel::Success, format!("Plan ready: {count} tasks")),
    );
}

/// Append to the user-visible log and mirror the entry to tracing.
fn push_log(state: &mut MigrationState, entry: MigrationLog) {
    match entry.level {
        LogLevel::Info => tracing::info!(session = %state.id, "{}", entry.message),
        LogLevel::Success => tracing::info!(session = %state.id, outcome = "success", "{}", entry.message),
        LogLevel::Warn => tracing::warn!(session = %state.id, "{}", entry.message),
        LogLevel::Error => tracing::error!(session = %state.id, "{}", entry.message),
    }
    state.log(entry);
}

impl core::fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
