// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{
        attempt::{Attempt, NewAttempt, RecordedAnswer},
        category::Category,
        question::{DifficultyCounts, Question, QuestionFilter},
        session_definition::SessionDefinition,
    },
    store::{
        AttemptTotals, CloseFn, CloseOutcome, DrawFn, DrawOutcome, Page, QcmStore, StoreError, StoreResult,
    },
};

#[derive(Debug, Default)]
struct Tables {
    questions: BTreeMap<Uuid, Question>,
    categories: BTreeMap<Uuid, Category>,
    definitions: BTreeMap<Uuid, SessionDefinition>,
    attempts: BTreeMap<Uuid, Attempt>,
    /// Uniqueness index on (candidate, definition).
    attempt_slots: HashMap<(i64, Uuid), Uuid>,
}

/// Process-local store. Every operation runs under one lock, which makes the
/// draw-and-write of an attempt atomic with respect to bank edits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &Question, b: &Question) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id))
}

impl Tables {
    /// Active questions matching `filter`, the pool every draw and count uses.
    fn pool<'a>(&'a self, filter: &'a QuestionFilter) -> impl Iterator<Item = &'a Question> + 'a {
        self.questions
            .values()
            .filter(move |q| q.is_active && filter.matches(q))
    }

    /// Name and slug are unique across the registry.
    fn check_category_unique(&self, category: &Category) -> StoreResult<()> {
        for other in self.categories.values().filter(|c| c.id != category.id) {
            if other.name == category.name {
                return Err(StoreError::Duplicate(format!("category name '{}'", category.name)));
            }
            if other.slug == category.slug {
                return Err(StoreError::Duplicate(format!("category slug '{}'", category.slug)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QcmStore for MemoryStore {
    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        include_inactive: bool,
        page: Page,
    ) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| (include_inactive || q.is_active) && filter.matches(q))
            .cloned()
            .collect();
        questions.sort_by(newest_first);
        Ok(questions
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect())
    }

    async fn questions_by_filter(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(tables.pool(filter).cloned().collect())
    }

    async fn questions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.questions.get(id).cloned())
            .collect())
    }

    async fn get_question(&self, id: Uuid) -> StoreResult<Option<Question>> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn count_by_difficulty(&self, filter: &QuestionFilter) -> StoreResult<DifficultyCounts> {
        let tables = self.tables.read().await;
        let mut counts = DifficultyCounts::default();
        for q in tables.pool(filter) {
            counts.add(q.difficulty, 1);
        }
        Ok(counts)
    }

    async fn count_by_category(&self) -> StoreResult<BTreeMap<String, i64>> {
        let tables = self.tables.read().await;
        let mut counts = BTreeMap::new();
        let all = QuestionFilter::default();
        for category in tables.pool(&all).filter_map(|q| q.category.as_ref()) {
            *counts.entry(category.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_questions(&self, questions: &[Question]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        for q in questions {
            tables.questions.insert(q.id, q.clone());
        }
        Ok(())
    }

    async fn update_question(&self, question: &Question) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.questions.get_mut(&question.id) {
            Some(existing) => {
                *existing = Question {
                    created_at: existing.created_at,
                    ..question.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_question(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.questions.get_mut(&id) {
            Some(question) => {
                question.is_active = false;
                question.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_categories(&self, include_inactive: bool) -> StoreResult<Vec<Category>> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| include_inactive || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.display_order.cmp(&b.display_order).then(a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.check_category_unique(category)?;
        tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&category.id) {
            return Ok(false);
        }
        tables.check_category_unique(category)?;
        if let Some(existing) = tables.categories.get_mut(&category.id) {
            *existing = Category {
                created_at: existing.created_at,
                ..category.clone()
            };
        }
        Ok(true)
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.categories.remove(&id).is_some())
    }

    async fn count_questions_in_category(&self, name: &str) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .filter(|q| q.category.as_deref() == Some(name))
            .count() as i64)
    }

    async fn list_definitions(&self) -> StoreResult<Vec<SessionDefinition>> {
        let tables = self.tables.read().await;
        let mut definitions: Vec<SessionDefinition> = tables.definitions.values().cloned().collect();
        definitions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(definitions)
    }

    async fn get_definition(&self, id: Uuid) -> StoreResult<Option<SessionDefinition>> {
        Ok(self.tables.read().await.definitions.get(&id).cloned())
    }

    async fn insert_definition(&self, definition: &SessionDefinition) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .definitions
            .insert(definition.id, definition.clone());
        Ok(())
    }

    async fn update_definition(&self, definition: &SessionDefinition) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.definitions.get_mut(&definition.id) {
            Some(existing) => {
                *existing = SessionDefinition {
                    created_at: existing.created_at,
                    ..definition.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_definition(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.definitions.remove(&id).is_some())
    }

    async fn create_attempt(
        &self,
        new: NewAttempt,
        filter: &QuestionFilter,
        draw: &DrawFn<'_>,
    ) -> StoreResult<DrawOutcome> {
        let mut tables = self.tables.write().await;

        let slot = (new.candidate_id, new.session_definition_id);
        if let Some(existing) = tables
            .attempt_slots
            .get(&slot)
            .and_then(|id| tables.attempts.get(id))
        {
            return Ok(DrawOutcome::AlreadyStarted(existing.clone()));
        }

        let pool: Vec<Question> = tables.pool(filter).cloned().collect();

        let drawn = match draw(&pool) {
            Ok(drawn) => drawn,
            Err(insufficient) => return Ok(DrawOutcome::Infeasible(insufficient)),
        };

        let attempt = new.into_attempt(drawn);
        tables.attempt_slots.insert(slot, attempt.id);
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok(DrawOutcome::Created(attempt))
    }

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<Attempt>> {
        Ok(self.tables.read().await.attempts.get(&id).cloned())
    }

    async fn find_attempt(&self, candidate_id: i64, definition_id: Uuid) -> StoreResult<Option<Attempt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempt_slots
            .get(&(candidate_id, definition_id))
            .and_then(|id| tables.attempts.get(id))
            .cloned())
    }

    async fn attempts_for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<Attempt>> {
        let tables = self.tables.read().await;
        let mut attempts: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.candidate_id == candidate_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(attempts)
    }

    async fn count_attempts_for_definition(&self, definition_id: Uuid) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .filter(|a| a.session_definition_id == definition_id)
            .count() as i64)
    }

    async fn record_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        answer: RecordedAnswer,
    ) -> StoreResult<Option<Attempt>> {
        let mut tables = self.tables.write().await;
        match tables.attempts.get_mut(&attempt_id) {
            Some(attempt) if !attempt.status.is_closed() => {
                attempt.answers.insert(question_id, answer);
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn close_attempt(&self, attempt_id: Uuid, score: &CloseFn<'_>) -> StoreResult<Option<CloseOutcome>> {
        let mut tables = self.tables.write().await;
        let Some(attempt) = tables.attempts.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if attempt.status.is_closed() {
            return Ok(Some(CloseOutcome::AlreadyClosed(attempt.clone())));
        }

        let closure = score(attempt);
        attempt.status = closure.status;
        attempt.submitted_at = closure.submitted_at;
        attempt.score_percent = Some(closure.score_percent);
        attempt.correct_count = Some(closure.correct_count);
        attempt.passed = Some(closure.passed);
        attempt.time_spent_seconds = Some(closure.time_spent_seconds);
        Ok(Some(CloseOutcome::Closed(attempt.clone())))
    }

    async fn attempt_totals(&self) -> StoreResult<AttemptTotals> {
        let tables = self.tables.read().await;
        let mut totals = AttemptTotals::default();
        for attempt in tables.attempts.values() {
            totals.total += 1;
            *totals
                .per_definition
                .entry(attempt.session_definition_id)
                .or_insert(0) += 1;
            if attempt.status.is_closed() {
                totals.closed += 1;
                totals.score_sum += attempt.score_percent.unwrap_or(0.0);
                if attempt.passed == Some(true) {
                    totals.passed += 1;
                }
            }
        }
        Ok(totals)
    }
}
