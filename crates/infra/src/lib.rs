//! Infrastructure layer: remote catalog clients, state stores, configuration
//! and the async migration engine.

pub mod config;
pub mod engine;
pub mod remote;
pub mod store;


pub use config::Settings;
pub use engine::{EngineConfig, EngineError, MigrationEngine, TickOutcome};
pub use remote::{CatalogClient, InMemoryCatalog, OdooCatalogClient, OdooConfig, RemoteError};
pub use store::{InMemoryStateStore, SqliteStateStore, StateStore, StoreError};
