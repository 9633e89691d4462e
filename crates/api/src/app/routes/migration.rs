use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use catbridge_infra::MigrationEngine;

use crate::app::{dto, errors, worker};

pub fn router() -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/analysis", post(run_analysis))
        .route("/units", get(list_units))
        .route("/conflicts/resolve", post(resolve_conflict))
        .route("/conflicts/create-unit", post(create_unit))
        .route("/conflicts/finish", post(finish_resolution))
        .route("/start", post(start_migration))
        .route("/pause", post(pause_migration))
        .route("/reset", post(reset_migration))
        .route("/logs", get(export_logs))
}

pub async fn get_state(Extension(engine): Extension<Arc<MigrationEngine>>) -> axum::response::Response {
    (StatusCode::OK, Json(engine.state().await)).into_response()
}

pub async fn run_analysis(
    Extension(engine): Extension<Arc<MigrationEngine>>,
    Json(body): Json<dto::AnalysisRequest>,
) -> axum::response::Response {
    if let Err(e) = engine.run_analysis(body.products).await {
        return errors::engine_error_to_response(e);
    }
    (StatusCode::OK, Json(engine.state().await)).into_response()
}

pub async fn list_units(Extension(engine): Extension<Arc<MigrationEngine>>) -> axum::response::Response {
    match engine.remote_units().await {
        Ok(units) => (StatusCode::OK, Json(units)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn resolve_conflict(
    Extension(engine): Extension<Arc<MigrationEngine>>,
    Json(body): Json<dto::ResolveConflictRequest>,
) -> axum::response::Response {
    if let Err(e) = engine.resolve_conflict(&body.local_uom, body.unit_id).await {
        return errors::engine_error_to_response(e);
    }
    (StatusCode::OK, Json(engine.state().await)).into_response()
}

pub async fn create_unit(
    Extension(engine): Extension<Arc<MigrationEngine>>,
    Json(body): Json<dto::CreateUnitRequest>,
) -> axum::response::Response {
    match engine.create_new_unit(&body.local_uom).await {
        Ok(unit) => (StatusCode::CREATED, Json(unit)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn finish_resolution(
    Extension(engine): Extension<Arc<MigrationEngine>>,
) -> axum::response::Response {
    if let Err(e) = engine.finish_resolution().await {
        return errors::engine_error_to_response(e);
    }
    (StatusCode::OK, Json(engine.state().await)).into_response()
}

/// Start or resume, then hand the plan to the background worker.
pub async fn start_migration(
    Extension(engine): Extension<Arc<MigrationEngine>>,
) -> axum::response::Response {
    let resumed = match engine.start_migration().await {
        Ok(resumed) => resumed,
        Err(e) => return errors::engine_error_to_response(e),
    };

    worker::spawn(engine.clone());

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "resumed": resumed })),
    )
        .into_response()
}

pub async fn pause_migration(
    Extension(engine): Extension<Arc<MigrationEngine>>,
) -> axum::response::Response {
    if let Err(e) = engine.pause_migration().await {
        return errors::engine_error_to_response(e);
    }
    (StatusCode::OK, Json(engine.state().await)).into_response()
}

pub async fn reset_migration(
    Extension(engine): Extension<Arc<MigrationEngine>>,
    Json(body): Json<dto::ResetRequest>,
) -> axum::response::Response {
    match engine.reset_migration(body.confirm).await {
        Ok(session) => (
            StatusCode::OK,
            Json(serde_json::json!({ "sessionId": session })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// The log buffer as a downloadable JSON file.
pub async fn export_logs(Extension(engine): Extension<Arc<MigrationEngine>>) -> axum::response::Response {
    let export = engine.export_logs().await;
    let filename = format!(
        "attachment; filename=\"migration-logs-{}.json\"",
        export["sessionId"].as_str().unwrap_or("session")
    );

    (
        StatusCode::OK,
        [(header::CONTENT_DISPOSITION, filename)],
        Json(export),
    )
        .into_response()
}
