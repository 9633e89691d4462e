//! Migration engine: the pure half.
//!
//! Everything here is deterministic and IO-free:
//! - `analyzer`: unit-of-measure conflict detection
//! - `plan`: dependency-ordered task plan building
//! - `state`: the persisted aggregate and its transitions
//! - `cache`: identity-keyed caches of remote metadata
//! - `snapshot`: versioned persistence codec
//! - `policy`: retry/backoff timing
//!
//! The async worker that drives remote calls lives in `catbridge-infra`.

pub mod analyzer;
pub mod cache;
pub mod log;
pub mod plan;
pub mod policy;
pub mod snapshot;
pub mod state;
pub mod task;

pub use analyzer::{UNIT_SYNONYMS, analyze, exact_unit, heuristic_unit};
pub use cache::RemoteCaches;
pub use log::{DEFAULT_LOG_CAPACITY, LogBuffer, LogLevel, MigrationLog};
pub use plan::{PlanBuilder, TemplatePolicy};
pub use policy::{BackoffStrategy, RetryPolicy};
pub use snapshot::{SCHEMA_VERSION, STATE_KEY, SnapshotError};
pub use state::{FailureOutcome, MigrationPhase, MigrationState, UomConflict};
pub use task::{MigrationTask, TaskId, TaskKind, TaskPayload, TaskStatus};
