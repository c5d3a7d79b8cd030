// src/qcm/categories.rs

//! Registry of question categories. Questions name their category; the
//! registry adds display metadata and counts on top of those names.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, FieldError},
    models::{
        category::{Category, CategoryPayload, CategoryResponse},
        question::normalize_category,
    },
    store::QcmStore,
    utils::{clock::Clock, html::clean_optional},
};

fn not_found() -> AppError {
    AppError::NotFound("Category not found".to_string())
}

fn build(
    payload: &CategoryPayload,
    id: Uuid,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Category, AppError> {
    payload.validate()?;
    let name = normalize_category(&payload.name).ok_or_else(|| {
        AppError::Validation(vec![FieldError::new("name", "length", "Name is empty.")])
    })?;

    Ok(Category {
        id,
        name,
        slug: payload.slug.clone(),
        description: clean_optional(payload.description.as_deref()),
        color: payload.color.clone(),
        display_order: payload.display_order.unwrap_or(0),
        is_active: payload.is_active.unwrap_or(true),
        created_at,
        updated_at: now,
    })
}

fn with_count(category: Category, counts: &BTreeMap<String, i64>) -> CategoryResponse {
    CategoryResponse {
        question_count: counts.get(&category.name).copied().unwrap_or(0),
        category,
    }
}

/// Categories by display order, each with its number of active questions.
pub async fn list(store: &dyn QcmStore, include_inactive: bool) -> Result<Vec<CategoryResponse>, AppError> {
    let counts = store.count_by_category().await?;
    Ok(store
        .list_categories(include_inactive)
        .await?
        .into_iter()
        .map(|c| with_count(c, &counts))
        .collect())
}

pub async fn get(store: &dyn QcmStore, id: Uuid) -> Result<CategoryResponse, AppError> {
    let category = store.get_category(id).await?.ok_or_else(not_found)?;
    let counts = store.count_by_category().await?;
    Ok(with_count(category, &counts))
}

/// Name and slug must both be free.
pub async fn create(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    payload: &CategoryPayload,
) -> Result<Category, AppError> {
    let now = clock.now();
    let category = build(payload, Uuid::new_v4(), now, now)?;
    store.insert_category(&category).await?;
    tracing::info!("Category '{}' created", category.name);
    Ok(category)
}

/// Full replacement. A category still holding questions keeps its name,
/// since questions refer to it by name.
pub async fn update(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    id: Uuid,
    payload: &CategoryPayload,
) -> Result<Category, AppError> {
    let existing = store.get_category(id).await?.ok_or_else(not_found)?;
    let category = build(payload, id, existing.created_at, clock.now())?;

    if category.name != existing.name {
        let in_use = store.count_questions_in_category(&existing.name).await?;
        if in_use > 0 {
            return Err(AppError::Conflict(format!(
                "Category '{}' holds {} questions and cannot be renamed",
                existing.name, in_use
            )));
        }
    }

    if !store.update_category(&category).await? {
        return Err(not_found());
    }
    tracing::info!("Category {} updated", id);
    Ok(category)
}

/// Refused while any question, active or not, is filed under it.
pub async fn delete(store: &dyn QcmStore, id: Uuid) -> Result<(), AppError> {
    let category = store.get_category(id).await?.ok_or_else(not_found)?;
    let in_use = store.count_questions_in_category(&category.name).await?;
    if in_use > 0 {
        return Err(AppError::Conflict(format!(
            "Category '{}' holds {} questions; reassign or delete them first",
            category.name, in_use
        )));
    }
    if !store.delete_category(id).await? {
        return Err(not_found());
    }
    tracing::info!("Category '{}' deleted", category.name);
    Ok(())
}
