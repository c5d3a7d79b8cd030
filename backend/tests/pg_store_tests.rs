// tests/pg_store_tests.rs

//! Runs against a real Postgres when `DATABASE_URL` is set, and is skipped
//! otherwise. Every test works under its own category and fresh ids, so the
//! database can be shared and reused between runs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use qcm_backend::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptClosure, AttemptStatus, RecordAnswerRequest, RecordedAnswer},
        category::CategoryPayload,
        question::{CreateQuestionRequest, QuestionFilter},
        session_definition::{SessionDefinition, SessionDefinitionPayload},
    },
    notify::LogNotifier,
    qcm::{bank, categories, definitions, runner::AttemptRunner},
    store::{CloseOutcome, PgStore, QcmStore, StoreError},
    utils::clock::{Clock, ManualClock},
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
}

/// Connects and migrates, or returns `None` when no database is configured.
async fn pg_store() -> Option<PgStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store tests");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(PgStore::new(pool))
}

/// A category label nobody else uses, so pools stay private to one test.
fn private_category() -> String {
    format!("pg-{}", Uuid::new_v4().simple())
}

/// Candidate ids are shared across runs; pick a fresh one per test.
fn fresh_candidate() -> i64 {
    (Uuid::new_v4().as_u128() % 1_000_000_000) as i64 + 1
}

/// Seeds `n` easy questions under `category`; option 0 is always right.
async fn seed(store: &PgStore, clock: &ManualClock, category: &str, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let req: CreateQuestionRequest = serde_json::from_value(json!({
            "text": format!("Question {} #{}", category, i),
            "options": ["Oui", "Non", "Peut-être"],
            "correct_index": 0,
            "difficulty": "easy",
            "category": category,
        }))
        .unwrap();
        ids.push(bank::create_question(store, clock, &req).await.unwrap().id);
    }
    ids
}

async fn session(store: &PgStore, clock: &ManualClock, category: &str, easy: u32) -> SessionDefinition {
    let payload: SessionDefinitionPayload = serde_json::from_value(json!({
        "title": format!("Session {}", category),
        "start_at": t0(),
        "end_at": t0() + Duration::hours(2),
        "time_per_question_minutes": 2,
        "passing_score_percent": 50,
        "distribution": { "easy": easy },
        "categories": [category],
    }))
    .unwrap();
    definitions::create(store, clock, &payload).await.unwrap()
}

fn completed_at(at: DateTime<Utc>) -> impl Fn(&Attempt) -> AttemptClosure + Send + Sync {
    move |attempt| AttemptClosure {
        status: AttemptStatus::Completed,
        submitted_at: Some(at),
        score_percent: attempt.answers.len() as f64,
        correct_count: attempt.answers.len() as i32,
        passed: true,
        time_spent_seconds: attempt.time_spent_until(at),
    }
}

#[tokio::test]
async fn racing_starts_share_one_attempt() {
    let Some(store) = pg_store().await else { return };
    let clock = ManualClock::new(t0() + Duration::minutes(5));
    let category = private_category();
    seed(&store, &clock, &category, 4).await;
    let definition = session(&store, &clock, &category, 3).await;

    let notifier = LogNotifier;
    let runner = AttemptRunner::new(&store, &clock, &notifier);
    let candidate = fresh_candidate();

    let (a, b, c, d) = tokio::join!(
        runner.start(candidate, definition.id),
        runner.start(candidate, definition.id),
        runner.start(candidate, definition.id),
        runner.start(candidate, definition.id),
    );

    let mut created = Vec::new();
    let mut rejected = Vec::new();
    for result in [a, b, c, d] {
        match result {
            Ok(view) => created.push(view.id),
            Err(AppError::AlreadyStarted(view)) => rejected.push(view.id),
            Err(other) => panic!("unexpected start error: {:?}", other),
        }
    }
    assert_eq!(created.len(), 1);
    assert_eq!(rejected.len(), 3);
    assert!(rejected.iter().all(|id| *id == created[0]));

    let stored = store
        .find_attempt(candidate, definition.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, created[0]);
    assert_eq!(stored.drawn.len(), 3);
    assert_eq!(store.count_attempts_for_definition(definition.id).await.unwrap(), 1);
}

#[tokio::test]
async fn answers_are_upserted_until_close() {
    let Some(store) = pg_store().await else { return };
    let clock = ManualClock::new(t0() + Duration::minutes(5));
    let category = private_category();
    seed(&store, &clock, &category, 2).await;
    let definition = session(&store, &clock, &category, 2).await;

    let notifier = LogNotifier;
    let runner = AttemptRunner::new(&store, &clock, &notifier);
    let candidate = fresh_candidate();
    let view = runner.start(candidate, definition.id).await.unwrap();
    let question_id = view.questions[0].id;

    for option_index in [2, 0] {
        let req = RecordAnswerRequest { question_id, option_index };
        runner.record_answer(candidate, view.id, &req).await.unwrap();
    }
    let stored = store.get_attempt(view.id).await.unwrap().unwrap();
    assert_eq!(stored.answers.len(), 1);
    assert_eq!(stored.answers[&question_id].option_index, 0);

    clock.advance(Duration::seconds(90));
    let submitted = runner.submit(candidate, view.id).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Completed);
    assert_eq!(submitted.correct_count, Some(1));
    assert_eq!(submitted.time_spent_seconds, Some(90));

    let late = RecordedAnswer {
        option_index: 1,
        answered_at: clock.now(),
    };
    assert!(store.record_answer(view.id, question_id, late).await.unwrap().is_none());
    let after = store.get_attempt(view.id).await.unwrap().unwrap();
    assert_eq!(after.answers[&question_id].option_index, 0);
}

#[tokio::test]
async fn first_close_wins() {
    let Some(store) = pg_store().await else { return };
    let clock = ManualClock::new(t0() + Duration::minutes(5));
    let category = private_category();
    seed(&store, &clock, &category, 2).await;
    let definition = session(&store, &clock, &category, 2).await;

    let notifier = LogNotifier;
    let runner = AttemptRunner::new(&store, &clock, &notifier);
    let view = runner.start(fresh_candidate(), definition.id).await.unwrap();

    let early = completed_at(t0() + Duration::minutes(6));
    let later = completed_at(t0() + Duration::minutes(7));
    let (first, second) = tokio::join!(
        store.close_attempt(view.id, &early),
        store.close_attempt(view.id, &later),
    );
    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];
    let closed: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, CloseOutcome::Closed(_)))
        .collect();
    assert_eq!(closed.len(), 1);

    let winner = closed[0].clone().into_attempt();
    let again = store.close_attempt(view.id, &later).await.unwrap().unwrap();
    let CloseOutcome::AlreadyClosed(stored) = again else {
        panic!("a closed attempt was closed again");
    };
    assert_eq!(stored.submitted_at, winner.submitted_at);
    assert_eq!(stored.time_spent_seconds, winner.time_spent_seconds);
    assert!(store.close_attempt(Uuid::new_v4(), &later).await.unwrap().is_none());

    let totals = store.attempt_totals().await.unwrap();
    assert_eq!(totals.per_definition.get(&definition.id), Some(&1));
    assert!(totals.closed >= 1);
    assert!(totals.passed >= 1);
}

#[tokio::test]
async fn deactivated_questions_leave_the_pool() {
    let Some(store) = pg_store().await else { return };
    let clock = ManualClock::new(t0());
    let category = private_category();
    let ids = seed(&store, &clock, &category, 3).await;

    bank::delete_question(&store, &clock, ids[0]).await.unwrap();

    let filter = QuestionFilter {
        categories: Some(vec![category.clone()]),
        difficulties: None,
    };
    let pool = store.questions_by_filter(&filter).await.unwrap();
    assert_eq!(pool.len(), 2);
    assert!(pool.iter().all(|q| q.id != ids[0]));
    assert_eq!(store.count_by_difficulty(&filter).await.unwrap().easy, 2);

    let kept = store.get_question(ids[0]).await.unwrap().unwrap();
    assert!(!kept.is_active);
    assert_eq!(store.count_questions_in_category(&category).await.unwrap(), 3);
}

#[tokio::test]
async fn category_names_and_slugs_are_unique() {
    let Some(store) = pg_store().await else { return };
    let clock = ManualClock::new(t0());
    let name = private_category();

    let payload: CategoryPayload = serde_json::from_value(json!({
        "name": name,
        "slug": name,
        "color": "#112233",
    }))
    .unwrap();
    let created = categories::create(&store, &clock, &payload).await.unwrap();
    assert!(matches!(
        categories::create(&store, &clock, &payload).await,
        Err(AppError::Conflict(_))
    ));

    let mut twin = created.clone();
    twin.id = Uuid::new_v4();
    twin.name = format!("{} bis", name);
    assert!(matches!(
        store.insert_category(&twin).await,
        Err(StoreError::Duplicate(_))
    ));

    seed(&store, &clock, &name, 1).await;
    assert!(matches!(
        categories::delete(&store, created.id).await,
        Err(AppError::Conflict(_))
    ));
}
