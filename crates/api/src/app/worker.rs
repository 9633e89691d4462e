use std::sync::Arc;

use tokio::task::JoinHandle;

use catbridge_infra::{MigrationEngine, TickOutcome};

/// Run the migration loop in the background until it stops.
///
/// A second spawn while a loop is running returns at once (`Busy`).
pub fn spawn(engine: Arc<MigrationEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match engine.run().await {
            Ok(TickOutcome::Busy) => tracing::debug!("migration worker already running"),
            Ok(outcome) => tracing::info!(?outcome, "migration worker stopped"),
            Err(e) => tracing::error!(error = %e, "migration worker failed"),
        }
    })
}
