// src/store/mod.rs

//! Persistence of questions, session definitions and attempts.
//!
//! Two backends implement [`QcmStore`]: PostgreSQL for deployments and an
//! in-memory store for local runs and tests.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        attempt::{Attempt, AttemptClosure, DrawnQuestion, NewAttempt, RecordedAnswer},
        category::Category,
        question::{DifficultyCounts, Question, QuestionFilter},
        session_definition::SessionDefinition,
    },
    qcm::sampler::InsufficientQuestions,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate: {0}")]
    Duplicate(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

/// Chooses the questions of a new attempt from the filtered pool.
pub type DrawFn<'a> = dyn Fn(&[Question]) -> Result<Vec<DrawnQuestion>, InsufficientQuestions> + Send + Sync + 'a;

/// Result of the atomic read-bank-then-write-attempt step.
#[derive(Debug, Clone)]
pub enum DrawOutcome {
    Created(Attempt),
    /// Another call already holds the (candidate, definition) slot.
    AlreadyStarted(Attempt),
    /// The bank can no longer satisfy the rule. Nothing was written.
    Infeasible(InsufficientQuestions),
}

/// Scores an attempt as it stands when the store closes it.
pub type CloseFn<'a> = dyn Fn(&Attempt) -> AttemptClosure + Send + Sync + 'a;

#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// This call moved the attempt out of `in_progress`.
    Closed(Attempt),
    /// Someone else closed it first; their result stands.
    AlreadyClosed(Attempt),
}

impl CloseOutcome {
    pub fn into_attempt(self) -> Attempt {
        match self {
            CloseOutcome::Closed(a) | CloseOutcome::AlreadyClosed(a) => a,
        }
    }
}

/// Aggregates over attempts for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptTotals {
    pub total: i64,
    pub closed: i64,
    pub passed: i64,
    pub score_sum: f64,
    pub per_definition: BTreeMap<Uuid, i64>,
}

#[async_trait]
pub trait QcmStore: Send + Sync {
    // Question bank. Pools, counts and draws only see active questions;
    // reads by id see every question.

    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        include_inactive: bool,
        page: Page,
    ) -> StoreResult<Vec<Question>>;
    async fn questions_by_filter(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>>;
    async fn questions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Question>>;
    async fn get_question(&self, id: Uuid) -> StoreResult<Option<Question>>;
    async fn count_by_difficulty(&self, filter: &QuestionFilter) -> StoreResult<DifficultyCounts>;
    async fn count_by_category(&self) -> StoreResult<BTreeMap<String, i64>>;
    /// All-or-nothing.
    async fn insert_questions(&self, questions: &[Question]) -> StoreResult<()>;
    async fn update_question(&self, question: &Question) -> StoreResult<bool>;
    async fn deactivate_question(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    // Category registry

    async fn list_categories(&self, include_inactive: bool) -> StoreResult<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>>;
    /// Fails with [`StoreError::Duplicate`] on a taken name or slug.
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    /// Fails with [`StoreError::Duplicate`] on a taken name or slug.
    async fn update_category(&self, category: &Category) -> StoreResult<bool>;
    async fn delete_category(&self, id: Uuid) -> StoreResult<bool>;
    /// Questions filed under `name`, inactive ones included.
    async fn count_questions_in_category(&self, name: &str) -> StoreResult<i64>;

    // Session definitions

    async fn list_definitions(&self) -> StoreResult<Vec<SessionDefinition>>;
    async fn get_definition(&self, id: Uuid) -> StoreResult<Option<SessionDefinition>>;
    async fn insert_definition(&self, definition: &SessionDefinition) -> StoreResult<()>;
    async fn update_definition(&self, definition: &SessionDefinition) -> StoreResult<bool>;
    async fn delete_definition(&self, id: Uuid) -> StoreResult<bool>;

    // Attempts

    /// Reads the pool matching `filter`, runs `draw` on it and writes the
    /// attempt, as one atomic step. At most one attempt exists per
    /// (candidate, definition); a losing racer gets the winner's attempt back.
    async fn create_attempt(
        &self,
        new: NewAttempt,
        filter: &QuestionFilter,
        draw: &DrawFn<'_>,
    ) -> StoreResult<DrawOutcome>;

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<Attempt>>;
    async fn find_attempt(&self, candidate_id: i64, definition_id: Uuid) -> StoreResult<Option<Attempt>>;
    async fn attempts_for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<Attempt>>;
    async fn count_attempts_for_definition(&self, definition_id: Uuid) -> StoreResult<i64>;

    /// Upserts one answer while the attempt is still in progress.
    /// Returns `None` when the attempt is closed or unknown.
    async fn record_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        answer: RecordedAnswer,
    ) -> StoreResult<Option<Attempt>>;

    /// Closes an in-progress attempt with the closure `score` computes from
    /// it. Scoring and writing are one atomic step, so no answer can land in
    /// between. A closed attempt is returned unchanged: the first closure
    /// wins and is never overwritten. `None` when the attempt is unknown.
    async fn close_attempt(&self, attempt_id: Uuid, score: &CloseFn<'_>) -> StoreResult<Option<CloseOutcome>>;

    async fn attempt_totals(&self) -> StoreResult<AttemptTotals>;
}

pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", what, detail))
}
