//! Migration engine: configuration, task executor and the state machine that
//! drives them.

pub mod config;
pub mod executor;
pub mod machine;

pub use config::EngineConfig;
pub use executor::TaskExecutor;
pub use machine::{EngineError, MigrationEngine, TickOutcome};
