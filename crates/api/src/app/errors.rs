use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use catbridge_core::DomainError;
use catbridge_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    match err {
        EngineError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        EngineError::Domain(DomainError::InvalidId(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", msg)
        }
        EngineError::Domain(DomainError::NotFound(msg)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", msg)
        }
        EngineError::Domain(DomainError::InvariantViolation(msg)) => {
            json_error(StatusCode::CONFLICT, "invalid_state", msg)
        }
        EngineError::UnresolvedConflicts(units) => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "unresolved_conflicts",
                "message": format!("unresolved unit conflicts: {}", units.join(", ")),
                "units": units,
            })),
        )
            .into_response(),
        EngineError::ConfirmationRequired => json_error(
            StatusCode::BAD_REQUEST,
            "confirmation_required",
            "reset must be confirmed with {\"confirm\": true}",
        ),
        EngineError::Remote(e) => json_error(StatusCode::BAD_GATEWAY, "remote_error", e.to_string()),
        EngineError::Store(e) => {
            tracing::error!(error = %e, "state store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        EngineError::Snapshot(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "snapshot_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
