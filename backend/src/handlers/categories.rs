// src/handlers/categories.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::category::{CategoryListParams, CategoryPayload},
    qcm::categories,
    state::AppState,
};

/// Active categories with their question counts.
/// Any authenticated user.
pub async fn list_active(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(categories::list(state.store.as_ref(), false).await?))
}

/// Admin listing, `?include_inactive=true` to see hidden ones.
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<CategoryListParams>,
) -> Result<impl IntoResponse, AppError> {
    let include_inactive = params.include_inactive.unwrap_or(false);
    Ok(Json(categories::list(state.store.as_ref(), include_inactive).await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(categories::get(state.store.as_ref(), id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> Result<impl IntoResponse, AppError> {
    let category = categories::create(state.store.as_ref(), state.clock.as_ref(), &payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryPayload>,
) -> Result<impl IntoResponse, AppError> {
    let category = categories::update(state.store.as_ref(), state.clock.as_ref(), id, &payload).await?;
    Ok(Json(category))
}

/// Refused with 409 while questions are filed under the category.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    categories::delete(state.store.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
