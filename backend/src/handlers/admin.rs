// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::question::{CreateQuestionRequest, QuestionListParams},
    qcm::bank,
    state::AppState,
};

/// Lists bank questions, answer key included.
/// Admin only. Filters: `categories`, `difficulties` (comma separated), `offset`, `limit`,
/// `include_inactive`.
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = bank::parse_filter(&params)?;
    let include_inactive = params.include_inactive.unwrap_or(false);
    let questions = state
        .store
        .list_questions(&filter, include_inactive, bank::page(&params))
        .await?;
    Ok(Json(questions))
}

pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let question = state
        .store
        .get_question(id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;
    Ok(Json(question))
}

/// Creates a new question.
/// Admin only.
pub async fn create_question(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank::create_question(state.store.as_ref(), state.clock.as_ref(), &payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// Imports a JSON array of questions, all or nothing.
/// Admin only.
pub async fn import_questions(
    State(state): State<AppState>,
    Json(payload): Json<Vec<CreateQuestionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let questions = bank::import_questions(state.store.as_ref(), state.clock.as_ref(), &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "imported": questions.len(),
            "ids": questions.iter().map(|q| q.id).collect::<Vec<_>>(),
        })),
    ))
}

/// Replaces a question.
/// Admin only.
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank::update_question(state.store.as_ref(), state.clock.as_ref(), id, &payload).await?;
    Ok(Json(question))
}

/// Deactivates a question. It stays readable for attempts that drew it.
/// Admin only.
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    bank::delete_question(state.store.as_ref(), state.clock.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Per-difficulty counts of the (optionally filtered) bank.
pub async fn question_stats(
    State(state): State<AppState>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = bank::parse_filter(&params)?;
    Ok(Json(bank::bank_stats(state.store.as_ref(), &filter).await?))
}

pub async fn overview(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(bank::overview(state.store.as_ref()).await?))
}
