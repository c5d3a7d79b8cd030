// src/handlers/qcm.rs

//! Candidate routes. The candidate id always comes from the token.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::attempt::RecordAnswerRequest,
    state::AppState,
    utils::jwt::Candidate,
};

/// Active sessions with their status for the caller.
pub async fn list_sessions(
    State(state): State<AppState>,
    candidate: Candidate,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.runner().list_sessions(candidate.id).await?))
}

/// Starts the caller's attempt. 409 with the existing attempt if there is one.
pub async fn start_attempt(
    State(state): State<AppState>,
    candidate: Candidate,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.runner().start(candidate.id, session_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_attempt(
    State(state): State<AppState>,
    candidate: Candidate,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.runner().get_attempt(candidate.id, attempt_id).await?))
}

pub async fn record_answer(
    State(state): State<AppState>,
    candidate: Candidate,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        state
            .runner()
            .record_answer(candidate.id, attempt_id, &payload)
            .await?,
    ))
}

/// Submits the attempt. Repeating it returns the stored result.
pub async fn submit_attempt(
    State(state): State<AppState>,
    candidate: Candidate,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.runner().submit(candidate.id, attempt_id).await?))
}

pub async fn attempt_details(
    State(state): State<AppState>,
    candidate: Candidate,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.runner().details(candidate.id, attempt_id).await?))
}

pub async fn list_results(
    State(state): State<AppState>,
    candidate: Candidate,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.runner().results(candidate.id).await?))
}
