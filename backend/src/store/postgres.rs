// src/store/postgres.rs

use std::{collections::BTreeMap, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, PgPool, Postgres, QueryBuilder,
    postgres::PgPoolOptions,
    types::Json,
};
use uuid::Uuid;

use crate::{
    models::{
        attempt::{Attempt, AttemptStatus, DrawnQuestion, NewAttempt, RecordedAnswer},
        category::Category,
        question::{Difficulty, DifficultyCounts, Question, QuestionFilter},
        session_definition::{Distribution, DrawRule, SessionDefinition},
    },
    store::{
        AttemptTotals, CloseFn, CloseOutcome, DrawFn, DrawOutcome, Page, QcmStore, StoreError, StoreResult,
        corrupt,
    },
};

const QUESTION_COLUMNS: &str =
    "id, text, options, correct_index, difficulty, category, explanation, points, is_active, created_at, updated_at";

const CATEGORY_COLUMNS: &str = "id, name, slug, description, color, display_order, is_active, created_at, updated_at";

const DEFINITION_COLUMNS: &str = "id, title, description, start_at, end_at, time_per_question_minutes, passing_score_percent, \
     total_questions, distribution, categories, difficulties, is_active, created_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, candidate_id, session_definition_id, drawn_questions, started_at, time_limit_minutes, \
     passing_score_percent, submitted_at, answers, score_percent, correct_count, passed, time_spent_seconds, status";

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    text: String,
    options: Json<Vec<String>>,
    correct_index: i32,
    difficulty: String,
    category: Option<String>,
    explanation: Option<String>,
    points: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            text: row.text,
            options: row.options.0,
            correct_index: row.correct_index,
            difficulty: Difficulty::from_str(&row.difficulty).map_err(|e| corrupt("question", e))?,
            category: row.category,
            explanation: row.explanation,
            points: row.points,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DefinitionRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    time_per_question_minutes: i32,
    passing_score_percent: i16,
    total_questions: i32,
    distribution: Option<Json<Distribution>>,
    categories: Option<Json<Vec<String>>>,
    difficulties: Option<Json<Vec<Difficulty>>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DefinitionRow> for SessionDefinition {
    type Error = StoreError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        let total = u32::try_from(row.total_questions).map_err(|e| corrupt("session definition", e))?;
        Ok(SessionDefinition {
            id: row.id,
            title: row.title,
            description: row.description,
            start_at: row.start_at,
            end_at: row.end_at,
            time_per_question_minutes: u32::try_from(row.time_per_question_minutes)
                .map_err(|e| corrupt("session definition", e))?,
            passing_score_percent: u8::try_from(row.passing_score_percent)
                .map_err(|e| corrupt("session definition", e))?,
            rule: DrawRule::from_parts(total, row.distribution.map(|d| d.0)),
            filter: QuestionFilter {
                categories: row.categories.map(|c| c.0),
                difficulties: row.difficulties.map(|d| d.0),
            },
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    candidate_id: i64,
    session_definition_id: Uuid,
    drawn_questions: Json<Vec<DrawnQuestion>>,
    started_at: DateTime<Utc>,
    time_limit_minutes: i32,
    passing_score_percent: i16,
    submitted_at: Option<DateTime<Utc>>,
    answers: Json<BTreeMap<Uuid, RecordedAnswer>>,
    score_percent: Option<f64>,
    correct_count: Option<i32>,
    passed: Option<bool>,
    time_spent_seconds: Option<i64>,
    status: String,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            candidate_id: row.candidate_id,
            session_definition_id: row.session_definition_id,
            drawn: row.drawn_questions.0,
            started_at: row.started_at,
            time_limit_minutes: u32::try_from(row.time_limit_minutes).map_err(|e| corrupt("attempt", e))?,
            passing_score_percent: u8::try_from(row.passing_score_percent).map_err(|e| corrupt("attempt", e))?,
            submitted_at: row.submitted_at,
            answers: row.answers.0,
            score_percent: row.score_percent,
            correct_count: row.correct_count,
            passed: row.passed,
            time_spent_seconds: row.time_spent_seconds,
            status: AttemptStatus::from_str(&row.status).map_err(|e| corrupt("attempt", e))?,
        })
    }
}

#[derive(FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    color: Option<String>,
    display_order: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            color: row.color,
            display_order: row.display_order,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Unique index hits on the category registry become `Duplicate`.
fn category_write_error(err: sqlx::Error, category: &Category) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(format!(
            "category name '{}' or slug '{}'",
            category.name, category.slug
        )),
        _ => StoreError::Database(err),
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Appends the WHERE clause of a bank filter. Empty lists do not restrict.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &QuestionFilter, active_only: bool) {
    builder.push(" WHERE TRUE");
    if active_only {
        builder.push(" AND is_active");
    }
    if let Some(categories) = filter.categories.as_ref().filter(|c| !c.is_empty()) {
        builder.push(" AND category = ANY(");
        builder.push_bind(categories.clone());
        builder.push(")");
    }
    if let Some(difficulties) = filter.difficulties.as_ref().filter(|d| !d.is_empty()) {
        let names: Vec<String> = difficulties.iter().map(|d| d.as_str().to_string()).collect();
        builder.push(" AND difficulty = ANY(");
        builder.push_bind(names);
        builder.push(")");
    }
}

/// PostgreSQL-backed store. Relies on the unique index over
/// (candidate_id, session_definition_id) to serialize racing starts.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with a few retries, for databases that come up after us.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let mut retry_count = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
            {
                Ok(pool) => return Ok(Self::new(pool)),
                Err(e) => {
                    retry_count += 1;
                    if retry_count > 5 {
                        return Err(e);
                    }
                    tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl QcmStore for PgStore {
    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        include_inactive: bool,
        page: Page,
    ) -> StoreResult<Vec<Question>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM qcm_questions", QUESTION_COLUMNS));
        push_filter(&mut builder, filter, !include_inactive);
        builder.push(" ORDER BY created_at DESC, id LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn questions_by_filter(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM qcm_questions", QUESTION_COLUMNS));
        push_filter(&mut builder, filter, true);
        builder.push(" ORDER BY id");

        let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn questions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_questions WHERE id = ANY($1)",
            QUESTION_COLUMNS
        ))
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_question(&self, id: Uuid) -> StoreResult<Option<Question>> {
        let row: Option<QuestionRow> = sqlx::query_as(&format!("SELECT {} FROM qcm_questions WHERE id = $1", QUESTION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Question::try_from).transpose()
    }

    async fn count_by_difficulty(&self, filter: &QuestionFilter) -> StoreResult<DifficultyCounts> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT difficulty, COUNT(*) FROM qcm_questions");
        push_filter(&mut builder, filter, true);
        builder.push(" GROUP BY difficulty");

        let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&self.pool).await?;
        let mut counts = DifficultyCounts::default();
        for (difficulty, n) in rows {
            let difficulty = Difficulty::from_str(&difficulty).map_err(|e| corrupt("question", e))?;
            counts.add(difficulty, n);
        }
        Ok(counts)
    }

    async fn count_by_category(&self) -> StoreResult<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) FROM qcm_questions WHERE is_active AND category IS NOT NULL GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn insert_questions(&self, questions: &[Question]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for q in questions {
            sqlx::query(
                r#"
                INSERT INTO qcm_questions
                (id, text, options, correct_index, difficulty, category, explanation, points, is_active,
                 created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(q.id)
            .bind(&q.text)
            .bind(Json(&q.options))
            .bind(q.correct_index)
            .bind(q.difficulty.as_str())
            .bind(&q.category)
            .bind(&q.explanation)
            .bind(q.points)
            .bind(q.is_active)
            .bind(q.created_at)
            .bind(q.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_question(&self, q: &Question) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qcm_questions SET
                text = $2, options = $3, correct_index = $4, difficulty = $5,
                category = $6, explanation = $7, points = $8, is_active = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(q.id)
        .bind(&q.text)
        .bind(Json(&q.options))
        .bind(q.correct_index)
        .bind(q.difficulty.as_str())
        .bind(&q.category)
        .bind(&q.explanation)
        .bind(q.points)
        .bind(q.is_active)
        .bind(q.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_question(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE qcm_questions SET is_active = FALSE, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_categories(&self, include_inactive: bool) -> StoreResult<Vec<Category>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_categories WHERE is_active OR $1 ORDER BY display_order, name",
            CATEGORY_COLUMNS
        ))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        let row: Option<CategoryRow> =
            sqlx::query_as(&format!("SELECT {} FROM qcm_categories WHERE id = $1", CATEGORY_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Category::from))
    }

    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO qcm_categories
            (id, name, slug, description, color, display_order, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.slug)
        .bind(&c.description)
        .bind(&c.color)
        .bind(c.display_order)
        .bind(c.is_active)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| category_write_error(e, c))?;
        Ok(())
    }

    async fn update_category(&self, c: &Category) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qcm_categories SET
                name = $2, slug = $3, description = $4, color = $5,
                display_order = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(c.id)
        .bind(&c.name)
        .bind(&c.slug)
        .bind(&c.description)
        .bind(&c.color)
        .bind(c.display_order)
        .bind(c.is_active)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| category_write_error(e, c))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM qcm_categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_questions_in_category(&self, name: &str) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qcm_questions WHERE category = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_definitions(&self) -> StoreResult<Vec<SessionDefinition>> {
        let rows: Vec<DefinitionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_session_definitions ORDER BY created_at DESC, id",
            DEFINITION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_definition(&self, id: Uuid) -> StoreResult<Option<SessionDefinition>> {
        let row: Option<DefinitionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_session_definitions WHERE id = $1",
            DEFINITION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionDefinition::try_from).transpose()
    }

    async fn insert_definition(&self, d: &SessionDefinition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO qcm_session_definitions
            (id, title, description, start_at, end_at, time_per_question_minutes, passing_score_percent,
             total_questions, distribution, categories, difficulties, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(d.id)
        .bind(&d.title)
        .bind(&d.description)
        .bind(d.start_at)
        .bind(d.end_at)
        .bind(d.time_per_question_minutes as i32)
        .bind(i16::from(d.passing_score_percent))
        .bind(d.total_questions() as i32)
        .bind(d.rule.distribution().map(Json))
        .bind(d.filter.categories.as_ref().map(Json))
        .bind(d.filter.difficulties.as_ref().map(Json))
        .bind(d.is_active)
        .bind(d.created_at)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_definition(&self, d: &SessionDefinition) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qcm_session_definitions SET
                title = $2, description = $3, start_at = $4, end_at = $5,
                time_per_question_minutes = $6, passing_score_percent = $7,
                total_questions = $8, distribution = $9, categories = $10, difficulties = $11,
                is_active = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(d.id)
        .bind(&d.title)
        .bind(&d.description)
        .bind(d.start_at)
        .bind(d.end_at)
        .bind(d.time_per_question_minutes as i32)
        .bind(i16::from(d.passing_score_percent))
        .bind(d.total_questions() as i32)
        .bind(d.rule.distribution().map(Json))
        .bind(d.filter.categories.as_ref().map(Json))
        .bind(d.filter.difficulties.as_ref().map(Json))
        .bind(d.is_active)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_definition(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM qcm_session_definitions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_attempt(
        &self,
        new: NewAttempt,
        filter: &QuestionFilter,
        draw: &DrawFn<'_>,
    ) -> StoreResult<DrawOutcome> {
        if let Some(existing) = self.find_attempt(new.candidate_id, new.session_definition_id).await? {
            return Ok(DrawOutcome::AlreadyStarted(existing));
        }

        let mut tx = self.pool.begin().await?;

        // FOR SHARE: a concurrent deactivation of a pool question waits for
        // this transaction, so the paper is drawn from a bank that stays put.
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM qcm_questions", QUESTION_COLUMNS));
        push_filter(&mut builder, filter, true);
        builder.push(" ORDER BY id FOR SHARE");
        let rows: Vec<QuestionRow> = builder.build_query_as().fetch_all(&mut *tx).await?;
        let pool: Vec<Question> = convert_all(rows)?;

        let drawn = match draw(&pool) {
            Ok(drawn) => drawn,
            Err(insufficient) => {
                tx.rollback().await?;
                return Ok(DrawOutcome::Infeasible(insufficient));
            }
        };

        let attempt = new.into_attempt(drawn);
        let inserted = sqlx::query(
            r#"
            INSERT INTO qcm_attempts
            (id, candidate_id, session_definition_id, drawn_questions, started_at,
             time_limit_minutes, passing_score_percent, answers, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, '{}'::jsonb, 'in_progress')
            ON CONFLICT (candidate_id, session_definition_id) DO NOTHING
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.candidate_id)
        .bind(attempt.session_definition_id)
        .bind(Json(&attempt.drawn))
        .bind(attempt.started_at)
        .bind(attempt.time_limit_minutes as i32)
        .bind(i16::from(attempt.passing_score_percent))
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Lost the race: hand back the winner's attempt, never a second draw.
            tx.rollback().await?;
            return match self.find_attempt(attempt.candidate_id, attempt.session_definition_id).await? {
                Some(winner) => Ok(DrawOutcome::AlreadyStarted(winner)),
                None => Err(StoreError::Corrupt(format!(
                    "attempt slot for candidate {} taken but not readable",
                    attempt.candidate_id
                ))),
            };
        }

        tx.commit().await?;
        Ok(DrawOutcome::Created(attempt))
    }

    async fn get_attempt(&self, id: Uuid) -> StoreResult<Option<Attempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!("SELECT {} FROM qcm_attempts WHERE id = $1", ATTEMPT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn find_attempt(&self, candidate_id: i64, definition_id: Uuid) -> StoreResult<Option<Attempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_attempts WHERE candidate_id = $1 AND session_definition_id = $2",
            ATTEMPT_COLUMNS
        ))
        .bind(candidate_id)
        .bind(definition_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn attempts_for_candidate(&self, candidate_id: i64) -> StoreResult<Vec<Attempt>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_attempts WHERE candidate_id = $1 ORDER BY started_at DESC",
            ATTEMPT_COLUMNS
        ))
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn count_attempts_for_definition(&self, definition_id: Uuid) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM qcm_attempts WHERE session_definition_id = $1")
            .bind(definition_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn record_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        answer: RecordedAnswer,
    ) -> StoreResult<Option<Attempt>> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            r#"
            UPDATE qcm_attempts
            SET answers = answers || jsonb_build_object($2::text, $3::jsonb)
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .bind(question_id.to_string())
        .bind(Json(answer))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn close_attempt(&self, attempt_id: Uuid, score: &CloseFn<'_>) -> StoreResult<Option<CloseOutcome>> {
        let mut tx = self.pool.begin().await?;

        // FOR UPDATE: answer upserts on this row wait, then see it closed.
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM qcm_attempts WHERE id = $1 FOR UPDATE",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let current = Attempt::try_from(row)?;
        if current.status.is_closed() {
            tx.rollback().await?;
            return Ok(Some(CloseOutcome::AlreadyClosed(current)));
        }

        let closure = score(&current);
        let row: AttemptRow = sqlx::query_as(&format!(
            r#"
            UPDATE qcm_attempts
            SET status = $2, submitted_at = $3, score_percent = $4, correct_count = $5, passed = $6,
                time_spent_seconds = $7
            WHERE id = $1
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .bind(closure.status.as_str())
        .bind(closure.submitted_at)
        .bind(closure.score_percent)
        .bind(closure.correct_count)
        .bind(closure.passed)
        .bind(closure.time_spent_seconds)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(CloseOutcome::Closed(Attempt::try_from(row)?)))
    }

    async fn attempt_totals(&self) -> StoreResult<AttemptTotals> {
        let (total, closed, passed, score_sum): (i64, i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status <> 'in_progress'),
                COUNT(*) FILTER (WHERE status <> 'in_progress' AND passed),
                COALESCE(SUM(score_percent) FILTER (WHERE status <> 'in_progress'), 0)::DOUBLE PRECISION
            FROM qcm_attempts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let per_definition: Vec<(Uuid, i64)> =
            sqlx::query_as("SELECT session_definition_id, COUNT(*) FROM qcm_attempts GROUP BY session_definition_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(AttemptTotals {
            total,
            closed,
            passed,
            score_sum,
            per_definition: per_definition.into_iter().collect(),
        })
    }
}
