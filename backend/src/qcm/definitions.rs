// src/qcm/definitions.rs

//! Validation and persistence of session definitions.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, FieldError, field_errors},
    models::{
        question::{Difficulty, QuestionFilter, normalize_category},
        session_definition::{DrawRule, SessionDefinition, SessionDefinitionPayload},
    },
    qcm::sampler,
    store::QcmStore,
    utils::{
        clock::Clock,
        html::{clean_html, clean_optional},
    },
};

pub const MAX_QUESTIONS: u32 = 100;

/// Checks the payload and derives the draw rule. Every problem is reported,
/// field-level ones first.
pub fn validate(payload: &SessionDefinitionPayload) -> Result<DrawRule, Vec<FieldError>> {
    let mut errors = match payload.validate() {
        Ok(()) => Vec::new(),
        Err(e) => field_errors(&e),
    };

    if payload.end_at <= payload.start_at {
        errors.push(FieldError::new(
            "end_at",
            "window_order",
            "End date must be after start date.",
        ));
    }

    let filter = filter_of(payload);
    let rule = match (payload.distribution, payload.total_questions) {
        (Some(distribution), _) if distribution.total() == 0 => {
            errors.push(FieldError::new(
                "distribution",
                "empty_distribution",
                "Distribution must request at least one question.",
            ));
            None
        }
        (Some(distribution), total) => {
            for (difficulty, n) in distribution.buckets() {
                if n > MAX_QUESTIONS {
                    errors.push(FieldError::new(
                        format!("distribution.{}", difficulty),
                        "too_many",
                        format!("At most {} {} questions, got {}.", MAX_QUESTIONS, difficulty, n),
                    ));
                }
                if !filter.allows_difficulty(difficulty) {
                    errors.push(FieldError::new(
                        "distribution",
                        "difficulty_filtered_out",
                        format!("Distribution asks for {} questions excluded by the difficulty filter.", difficulty),
                    ));
                }
            }
            if let Some(total) = total.filter(|t| *t != distribution.total()) {
                tracing::debug!(
                    "total_questions {} replaced by distribution sum {}",
                    total,
                    distribution.total()
                );
            }
            Some(DrawRule::Distribution(distribution))
        }
        (None, Some(count)) if count > 0 => Some(DrawRule::Flat { count }),
        (None, _) => {
            errors.push(FieldError::new(
                "total_questions",
                "required",
                "Provide a positive total_questions or a distribution.",
            ));
            None
        }
    };

    if let Some(rule) = rule.filter(|r| r.total_questions() > MAX_QUESTIONS) {
        errors.push(FieldError::new(
            "total_questions",
            "too_many",
            format!(
                "At most {} questions per session, got {}.",
                MAX_QUESTIONS,
                rule.total_questions()
            ),
        ));
    }

    match rule {
        Some(rule) if errors.is_empty() => Ok(rule),
        _ => Err(errors),
    }
}

/// Categories normalized like question labels, deduplicated difficulties.
/// Empty lists mean no restriction.
fn filter_of(payload: &SessionDefinitionPayload) -> QuestionFilter {
    let categories = payload
        .categories
        .as_ref()
        .map(|cs| {
            let mut cs: Vec<String> = cs.iter().filter_map(|c| normalize_category(c)).collect();
            cs.sort();
            cs.dedup();
            cs
        })
        .filter(|cs| !cs.is_empty());

    let difficulties = payload
        .difficulties
        .as_ref()
        .map(|ds| {
            Difficulty::ALL
                .into_iter()
                .filter(|d| ds.contains(d))
                .collect::<Vec<_>>()
        })
        .filter(|ds| !ds.is_empty());

    QuestionFilter {
        categories,
        difficulties,
    }
}

fn build(
    payload: &SessionDefinitionPayload,
    id: Uuid,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SessionDefinition, AppError> {
    let rule = validate(payload).map_err(AppError::Validation)?;

    let title = clean_html(payload.title.trim());
    if title.is_empty() {
        return Err(AppError::Validation(vec![FieldError::new(
            "title",
            "empty_after_sanitize",
            "Title is empty.",
        )]));
    }

    Ok(SessionDefinition {
        id,
        title,
        description: clean_optional(payload.description.as_deref()),
        start_at: payload.start_at,
        end_at: payload.end_at,
        time_per_question_minutes: payload.time_per_question_minutes,
        // In 0..=100 once validated.
        passing_score_percent: payload.passing_score_percent.clamp(0, 100) as u8,
        rule,
        filter: filter_of(payload),
        is_active: payload.is_active.unwrap_or(true),
        created_at,
        updated_at: now,
    })
}

/// The sampler's feasibility check against the bank as it is right now.
async fn dry_run(store: &dyn QcmStore, definition: &SessionDefinition) -> Result<(), AppError> {
    let counts = store.count_by_difficulty(&definition.filter).await?;
    sampler::check_feasible(&definition.rule, &counts).map_err(|e| {
        tracing::info!("Definition '{}' rejected: {}", definition.title, e);
        AppError::InsufficientQuestions(e)
    })
}

pub async fn create(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    payload: &SessionDefinitionPayload,
) -> Result<SessionDefinition, AppError> {
    let now = clock.now();
    let definition = build(payload, Uuid::new_v4(), now, now)?;
    dry_run(store, &definition).await?;

    store.insert_definition(&definition).await?;
    tracing::info!(
        "Session definition {} '{}' created ({} questions)",
        definition.id,
        definition.title,
        definition.total_questions()
    );
    Ok(definition)
}

/// Replaces the whole definition. Attempts already drawn keep their snapshot.
pub async fn update(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    id: Uuid,
    payload: &SessionDefinitionPayload,
) -> Result<SessionDefinition, AppError> {
    let existing = get(store, id).await?;
    let definition = build(payload, id, existing.created_at, clock.now())?;
    dry_run(store, &definition).await?;

    if !store.update_definition(&definition).await? {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    tracing::info!("Session definition {} updated", id);
    Ok(definition)
}

pub async fn get(store: &dyn QcmStore, id: Uuid) -> Result<SessionDefinition, AppError> {
    store
        .get_definition(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

/// Refused once any attempt exists; deactivate the definition instead.
pub async fn delete(store: &dyn QcmStore, id: Uuid) -> Result<(), AppError> {
    let attempts = store.count_attempts_for_definition(id).await?;
    if attempts > 0 {
        return Err(AppError::Conflict(format!(
            "Session has {} attempts; deactivate it instead",
            attempts
        )));
    }
    if !store.delete_definition(id).await? {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    tracing::info!("Session definition {} deleted", id);
    Ok(())
}
