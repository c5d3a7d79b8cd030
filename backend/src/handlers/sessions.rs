// src/handlers/sessions.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::session_definition::{SessionDefinitionPayload, SessionDefinitionResponse},
    qcm::definitions,
    state::AppState,
};

/// Lists every session definition, inactive ones included.
/// Admin only.
pub async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let definitions = state.store.list_definitions().await?;
    let body: Vec<SessionDefinitionResponse> = definitions.iter().map(SessionDefinitionResponse::from).collect();
    Ok(Json(body))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let definition = definitions::get(state.store.as_ref(), id).await?;
    Ok(Json(SessionDefinitionResponse::from(&definition)))
}

/// Creates a session definition after validation and a dry-run draw.
/// Admin only.
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionDefinitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let definition = definitions::create(state.store.as_ref(), state.clock.as_ref(), &payload).await?;
    Ok((StatusCode::CREATED, Json(SessionDefinitionResponse::from(&definition))))
}

/// Replaces a session definition. Running attempts are unaffected.
/// Admin only.
pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SessionDefinitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let definition = definitions::update(state.store.as_ref(), state.clock.as_ref(), id, &payload).await?;
    Ok(Json(SessionDefinitionResponse::from(&definition)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    definitions::delete(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
