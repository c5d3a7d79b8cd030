// src/qcm/bank.rs

//! Admin side of the question bank.

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, FieldError, field_errors},
    models::{
        question::{
            BankStatsResponse, CreateQuestionRequest, Question, QuestionFilter, QuestionListParams,
            normalize_category,
        },
        stats::{AdminStatsResponse, SessionAttempts},
    },
    qcm::scorer::round1,
    store::{Page, QcmStore},
    utils::{
        clock::Clock,
        html::{clean_html, clean_optional},
    },
};

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;
pub const MAX_IMPORT_SIZE: usize = 1000;

pub fn page(params: &QuestionListParams) -> Page {
    Page {
        offset: params.offset.unwrap_or(0).max(0),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    }
}

pub fn parse_filter(params: &QuestionListParams) -> Result<QuestionFilter, AppError> {
    params.filter().map_err(AppError::BadRequest)
}

/// Validates and sanitizes a request into a question.
/// Sanitizing can empty a field (a lone `<script>`), which is checked last.
/// The category is a label, not markup: it is only trimmed.
fn build_question(
    req: &CreateQuestionRequest,
    id: Uuid,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Question, Vec<FieldError>> {
    if let Err(errors) = req.validate() {
        return Err(field_errors(&errors));
    }

    let question = Question {
        id,
        text: clean_html(req.text.trim()),
        options: req.options.iter().map(|o| clean_html(o.trim())).collect(),
        correct_index: req.correct_index,
        difficulty: req.difficulty,
        category: req.category.as_deref().and_then(normalize_category),
        explanation: clean_optional(req.explanation.as_deref()),
        points: req.points.unwrap_or_else(|| req.difficulty.default_points()),
        is_active: req.is_active.unwrap_or(is_active),
        created_at,
        updated_at: now,
    };

    let mut errors = Vec::new();
    if question.text.is_empty() {
        errors.push(FieldError::new("text", "empty_after_sanitize", "Question text is empty."));
    }
    if question.options.iter().any(|o| o.is_empty()) {
        errors.push(FieldError::new(
            "options",
            "empty_after_sanitize",
            "Options cannot be empty.",
        ));
    }

    if errors.is_empty() { Ok(question) } else { Err(errors) }
}

pub async fn create_question(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    req: &CreateQuestionRequest,
) -> Result<Question, AppError> {
    let now = clock.now();
    let question = build_question(req, Uuid::new_v4(), true, now, now).map_err(AppError::Validation)?;

    store.insert_questions(std::slice::from_ref(&question)).await?;
    tracing::info!("Question {} created ({})", question.id, question.difficulty);
    Ok(question)
}

/// Validates every item first, then inserts all of them or none.
/// Errors are reported per item as `items[i].field`.
pub async fn import_questions(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    reqs: &[CreateQuestionRequest],
) -> Result<Vec<Question>, AppError> {
    if reqs.is_empty() {
        return Err(AppError::BadRequest("Nothing to import".to_string()));
    }
    if reqs.len() > MAX_IMPORT_SIZE {
        return Err(AppError::BadRequest(format!(
            "At most {} questions per import",
            MAX_IMPORT_SIZE
        )));
    }

    let now = clock.now();
    let mut questions = Vec::with_capacity(reqs.len());
    let mut errors = Vec::new();

    for (i, req) in reqs.iter().enumerate() {
        match build_question(req, Uuid::new_v4(), true, now, now) {
            Ok(q) => questions.push(q),
            Err(item_errors) => errors.extend(item_errors.into_iter().map(|e| FieldError {
                field: format!("items[{}].{}", i, e.field),
                ..e
            })),
        }
    }

    if !errors.is_empty() {
        tracing::warn!("Bulk import rejected: {} invalid fields", errors.len());
        return Err(AppError::Validation(errors));
    }

    store.insert_questions(&questions).await?;
    tracing::info!("Imported {} questions", questions.len());
    Ok(questions)
}

/// Full replacement. Attempts keep the points they snapshotted at draw time.
pub async fn update_question(
    store: &dyn QcmStore,
    clock: &dyn Clock,
    id: Uuid,
    req: &CreateQuestionRequest,
) -> Result<Question, AppError> {
    let existing = store
        .get_question(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let question = build_question(req, id, existing.is_active, existing.created_at, clock.now())
        .map_err(AppError::Validation)?;

    if !store.update_question(&question).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }
    tracing::info!("Question {} updated", id);
    Ok(question)
}

/// Soft delete: the question leaves every future draw and the bank counts,
/// while attempts that drew it keep its text, key and explanation.
pub async fn delete_question(store: &dyn QcmStore, clock: &dyn Clock, id: Uuid) -> Result<(), AppError> {
    if !store.deactivate_question(id, clock.now()).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }
    tracing::info!("Question {} deactivated", id);
    Ok(())
}

pub async fn bank_stats(store: &dyn QcmStore, filter: &QuestionFilter) -> Result<BankStatsResponse, AppError> {
    let counts = store.count_by_difficulty(filter).await?;
    Ok(BankStatsResponse {
        total: counts.total(),
        counts,
    })
}

pub async fn overview(store: &dyn QcmStore) -> Result<AdminStatsResponse, AppError> {
    let by_difficulty = store.count_by_difficulty(&QuestionFilter::default()).await?;
    let by_category = store.count_by_category().await?;
    let definitions = store.list_definitions().await?;
    let totals = store.attempt_totals().await?;

    let mut attempts_by_session: Vec<SessionAttempts> = definitions
        .iter()
        .map(|d| SessionAttempts {
            session_id: d.id,
            title: d.title.clone(),
            attempts: totals.per_definition.get(&d.id).copied().unwrap_or(0),
        })
        .collect();
    attempts_by_session.sort_by(|a, b| a.title.cmp(&b.title).then(a.session_id.cmp(&b.session_id)));

    let (average_score, pass_rate) = if totals.closed > 0 {
        let closed = totals.closed as f64;
        (
            Some(round1(totals.score_sum / closed)),
            Some(round1(totals.passed as f64 / closed * 100.0)),
        )
    } else {
        (None, None)
    };

    Ok(AdminStatsResponse {
        total_questions: by_difficulty.total(),
        questions_by_difficulty: by_difficulty,
        questions_by_category: by_category,
        total_sessions: definitions.len() as i64,
        total_attempts: totals.total,
        closed_attempts: totals.closed,
        average_score,
        pass_rate,
        attempts_by_session,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{models::question::Difficulty, store::MemoryStore, utils::clock::ManualClock};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap())
    }

    fn request(text: &str, difficulty: Difficulty) -> CreateQuestionRequest {
        CreateQuestionRequest {
            text: text.to_string(),
            options: vec!["3".to_string(), "4".to_string(), "5".to_string()],
            correct_index: 1,
            difficulty,
            category: Some("Maths".to_string()),
            explanation: None,
            points: None,
            is_active: None,
        }
    }

    #[tokio::test]
    async fn points_default_to_the_difficulty_weight() {
        let store = MemoryStore::new();
        let q = create_question(&store, &clock(), &request("2 + 2?", Difficulty::Hard))
            .await
            .unwrap();
        assert_eq!(q.points, 3);
        assert_eq!(store.get_question(q.id).await.unwrap(), Some(q));
    }

    #[tokio::test]
    async fn text_is_sanitized_before_storage() {
        let store = MemoryStore::new();
        let q = create_question(
            &store,
            &clock(),
            &request("2 + 2?<script>steal()</script>", Difficulty::Easy),
        )
        .await
        .unwrap();
        assert_eq!(q.text, "2 + 2?");
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let store = MemoryStore::new();
        let mut broken = request("broken", Difficulty::Easy);
        broken.correct_index = 7;

        let reqs = vec![request("ok", Difficulty::Easy), broken];
        let err = import_questions(&store, &clock(), &reqs).await.unwrap_err();

        match err {
            AppError::Validation(errors) => {
                assert!(errors.iter().all(|e| e.field.starts_with("items[1].")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.count_by_difficulty(&QuestionFilter::default()).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn update_keeps_creation_time() {
        let store = MemoryStore::new();
        let clock = clock();
        let q = create_question(&store, &clock, &request("v1", Difficulty::Easy))
            .await
            .unwrap();

        clock.advance(chrono::Duration::hours(1));
        let updated = update_question(&store, &clock, q.id, &request("v2", Difficulty::Medium))
            .await
            .unwrap();

        assert_eq!(updated.created_at, q.created_at);
        assert!(updated.updated_at > q.updated_at);
        assert_eq!(updated.difficulty, Difficulty::Medium);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            delete_question(&store, &clock(), Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn categories_are_stored_as_typed() {
        let store = MemoryStore::new();
        let mut req = request("Budget?", Difficulty::Easy);
        req.category = Some("  R&D <interne> ".to_string());
        let q = create_question(&store, &clock(), &req).await.unwrap();
        assert_eq!(q.category.as_deref(), Some("R&D <interne>"));

        let filter = QuestionListParams {
            categories: Some("R&D <interne>".to_string()),
            ..Default::default()
        };
        let stats = bank_stats(&store, &parse_filter(&filter).unwrap()).await.unwrap();
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn deleted_questions_leave_the_pool_but_stay_readable() {
        let store = MemoryStore::new();
        let clock = clock();
        let q = create_question(&store, &clock, &request("2 + 2?", Difficulty::Easy))
            .await
            .unwrap();

        delete_question(&store, &clock, q.id).await.unwrap();

        let stats = bank_stats(&store, &QuestionFilter::default()).await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(store.questions_by_filter(&QuestionFilter::default()).await.unwrap().is_empty());
        let kept = store.get_question(q.id).await.unwrap().unwrap();
        assert!(!kept.is_active);
        assert_eq!(kept.text, "2 + 2?");

        // Reactivated by a full update that says so.
        let mut req = request("2 + 2?", Difficulty::Easy);
        req.is_active = Some(true);
        let back = update_question(&store, &clock, q.id, &req).await.unwrap();
        assert!(back.is_active);
        assert_eq!(bank_stats(&store, &QuestionFilter::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn update_without_flag_keeps_a_question_inactive() {
        let store = MemoryStore::new();
        let clock = clock();
        let q = create_question(&store, &clock, &request("v1", Difficulty::Easy))
            .await
            .unwrap();
        delete_question(&store, &clock, q.id).await.unwrap();

        let updated = update_question(&store, &clock, q.id, &request("v2", Difficulty::Easy))
            .await
            .unwrap();
        assert!(!updated.is_active);
    }

    #[tokio::test]
    async fn overview_keeps_sessions_with_the_same_title_apart() {
        use crate::models::session_definition::{DrawRule, SessionDefinition};

        let store = MemoryStore::new();
        let now = clock().now();
        for _ in 0..2 {
            store
                .insert_definition(&SessionDefinition {
                    id: Uuid::new_v4(),
                    title: "Logique".to_string(),
                    description: None,
                    start_at: now,
                    end_at: now + chrono::Duration::hours(1),
                    time_per_question_minutes: 1,
                    passing_score_percent: 50,
                    rule: DrawRule::Flat { count: 1 },
                    filter: QuestionFilter::default(),
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let stats = overview(&store).await.unwrap();
        assert_eq!(stats.attempts_by_session.len(), 2);
        assert!(stats.attempts_by_session.iter().all(|s| s.title == "Logique"));
        assert_ne!(
            stats.attempts_by_session[0].session_id,
            stats.attempts_by_session[1].session_id
        );
    }

    #[test]
    fn page_size_is_capped() {
        let params = QuestionListParams {
            limit: Some(10_000),
            offset: Some(-4),
            ..Default::default()
        };
        assert_eq!(page(&params), Page { offset: 0, limit: MAX_PAGE_SIZE });
        assert_eq!(page(&QuestionListParams::default()).limit, DEFAULT_PAGE_SIZE);
    }
}
