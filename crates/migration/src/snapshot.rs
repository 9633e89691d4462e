//! Versioned persistence codec for `MigrationState`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::MigrationState;

/// Key the state blob is stored under.
pub const STATE_KEY: &str = "migration_state";

/// Bump on any incompatible change to the persisted shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot schema version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    state: &'a MigrationState,
}

#[derive(Deserialize)]
struct Envelope {
    schema_version: u32,
    state: serde_json::Value,
}

pub fn encode(state: &MigrationState) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(&SnapshotRef {
        schema_version: SCHEMA_VERSION,
        state,
    })?)
}

/// Decode a blob written by `encode`.
///
/// The version is checked before the state itself is parsed, so an old blob
/// reports a mismatch rather than a field error.
pub fn decode(blob: &str) -> Result<MigrationState, SnapshotError> {
    let envelope: Envelope = serde_json::from_str(blob)?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: envelope.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_value(envelope.state)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, MigrationLog};
    use crate::task::MigrationTask;

    #[test]
    fn encoded_state_decodes_back() {
        let mut state = MigrationState::fresh(20);
        state.install_plan(vec![MigrationTask::attribute("Width")]);
        state.log(MigrationLog::new(LogLevel::Info, "plan ready"));

        let blob = encode(&state).unwrap();
        assert!(blob.contains("\"schema_version\":1"));

        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn other_version_is_rejected() {
        let blob = r#"{"schema_version": 0, "state": {"anything": true}}"#;
        match decode(blob).unwrap_err() {
            SnapshotError::VersionMismatch { found, expected } => {
                assert_eq!(found, 0);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("Expected VersionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode("not json"), Err(SnapshotError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"schema_version": 1, "state": {"phase": "IDLE"}}"#),
            Err(SnapshotError::Malformed(_))
        ));
    }
}
