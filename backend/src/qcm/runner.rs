// src/qcm/runner.rs

//! Candidate-side lifecycle of an attempt.
//!
//! Every read goes through [`AttemptRunner::refresh`], which closes an
//! in-progress attempt whose deadline has passed. Closing is conditional in
//! the store, so whichever of submit and expiry lands first is final.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        attempt::{
            Attempt, AttemptClosure, AttemptDetails, AttemptResult, AttemptStatus, AttemptView,
            CandidateSessionSummary, NewAttempt, QuestionCorrection, RecordAnswerRequest, RecordedAnswer,
            SessionStatus,
        },
        question::{PublicQuestion, Question},
        session_definition::{SessionDefinition, SessionDefinitionResponse},
    },
    notify::{CandidateEvent, Notifier},
    qcm::{
        sampler::{self, seed_for_attempt},
        scorer,
        status::{self, AttemptState},
    },
    store::{CloseOutcome, DrawOutcome, QcmStore},
    utils::clock::Clock,
};

pub struct AttemptRunner<'a> {
    store: &'a dyn QcmStore,
    clock: &'a dyn Clock,
    notifier: &'a dyn Notifier,
}

fn attempt_not_found() -> AppError {
    AppError::NotFound("Attempt not found".to_string())
}

fn session_not_found() -> AppError {
    AppError::NotFound("Session not found".to_string())
}

/// Builds the candidate view. Questions missing from the bank are left out
/// of `questions` but still count in `total_questions`. Deactivated ones
/// are still in the bank and show as usual.
pub fn view(attempt: &Attempt, bank: &HashMap<Uuid, Question>, now: DateTime<Utc>) -> AttemptView {
    let deadline = attempt.deadline();
    let remaining_seconds = if attempt.status.is_closed() {
        0
    } else {
        (deadline - now).num_seconds().max(0)
    };

    AttemptView {
        id: attempt.id,
        session_definition_id: attempt.session_definition_id,
        status: attempt.status,
        started_at: attempt.started_at,
        deadline,
        remaining_seconds,
        submitted_at: attempt.submitted_at,
        questions: attempt
            .drawn
            .iter()
            .filter_map(|d| bank.get(&d.question_id))
            .map(|q| PublicQuestion {
                points: attempt
                    .drawn
                    .iter()
                    .find(|d| d.question_id == q.id)
                    .map_or(q.points, |d| d.points),
                ..PublicQuestion::from(q)
            })
            .collect(),
        answers: attempt
            .answers
            .iter()
            .map(|(id, a)| (*id, a.option_index))
            .collect(),
        total_questions: attempt.drawn.len(),
        score_percent: attempt.score_percent,
        correct_count: attempt.correct_count,
        passed: attempt.passed,
        time_spent_seconds: attempt.time_spent_seconds,
    }
}

impl<'a> AttemptRunner<'a> {
    pub fn new(store: &'a dyn QcmStore, clock: &'a dyn Clock, notifier: &'a dyn Notifier) -> Self {
        Self { store, clock, notifier }
    }

    async fn bank_for(&self, attempt: &Attempt) -> Result<HashMap<Uuid, Question>, AppError> {
        let questions = self.store.questions_by_ids(&attempt.question_ids()).await?;
        Ok(questions.into_iter().map(|q| (q.id, q)).collect())
    }

    async fn view_of(&self, attempt: &Attempt) -> Result<AttemptView, AppError> {
        let bank = self.bank_for(attempt).await?;
        Ok(view(attempt, &bank, self.clock.now()))
    }

    /// Loads an attempt owned by `candidate_id`. Somebody else's attempt is
    /// reported as missing.
    async fn owned_attempt(&self, candidate_id: i64, attempt_id: Uuid) -> Result<Attempt, AppError> {
        match self.store.get_attempt(attempt_id).await? {
            Some(attempt) if attempt.candidate_id == candidate_id => Ok(attempt),
            _ => Err(attempt_not_found()),
        }
    }

    async fn active_definition(&self, definition_id: Uuid) -> Result<SessionDefinition, AppError> {
        match self.store.get_definition(definition_id).await? {
            Some(definition) if definition.is_active => Ok(definition),
            _ => Err(session_not_found()),
        }
    }

    async fn notify(&self, candidate_id: i64, event: CandidateEvent) {
        if let Err(e) = self.notifier.notify(candidate_id, &event).await {
            tracing::warn!("Notification to candidate {} dropped: {}", candidate_id, e);
        }
    }

    /// Scores and closes an in-progress attempt. The store scores the answers
    /// it holds at the moment of closing, and only those recorded up to the
    /// deadline count. If another call closed it first, that result stands.
    async fn close(
        &self,
        attempt: Attempt,
        status: AttemptStatus,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<Attempt, AppError> {
        // Drawn ids never change, so the bank can be read ahead of the close.
        let bank = self.bank_for(&attempt).await?;
        let closed_at = submitted_at.unwrap_or_else(|| attempt.deadline());
        let score = |current: &Attempt| {
            let outcome = scorer::score(current, &bank, current.deadline());
            AttemptClosure {
                status,
                submitted_at,
                score_percent: outcome.score_percent,
                correct_count: outcome.correct_count,
                passed: outcome.passed,
                time_spent_seconds: current.time_spent_until(closed_at),
            }
        };

        let closed = match self.store.close_attempt(attempt.id, &score).await? {
            Some(CloseOutcome::Closed(closed)) => closed,
            Some(CloseOutcome::AlreadyClosed(closed)) => return Ok(closed),
            None => return Err(attempt_not_found()),
        };

        let score_percent = closed.score_percent.unwrap_or(0.0);
        let passed = closed.passed.unwrap_or(false);
        tracing::info!(
            "Attempt {} {} with {}% ({} correct, passed: {})",
            closed.id,
            status,
            score_percent,
            closed.correct_count.unwrap_or(0),
            passed
        );
        let title = self
            .store
            .get_definition(closed.session_definition_id)
            .await?
            .map(|d| d.title)
            .unwrap_or_default();
        self.notify(
            closed.candidate_id,
            CandidateEvent::AttemptClosed {
                attempt_id: closed.id,
                session_title: title,
                status,
                score_percent,
                passed,
            },
        )
        .await;
        Ok(closed)
    }

    /// Materializes expiry when the deadline has passed.
    async fn refresh(&self, attempt: Attempt) -> Result<Attempt, AppError> {
        if status::needs_expiry(self.clock.now(), &attempt) {
            self.close(attempt, AttemptStatus::Expired, None).await
        } else {
            Ok(attempt)
        }
    }

    /// Active sessions with the status this candidate sees right now.
    pub async fn list_sessions(&self, candidate_id: i64) -> Result<Vec<CandidateSessionSummary>, AppError> {
        let definitions = self.store.list_definitions().await?;
        let mut attempts: HashMap<Uuid, Attempt> = self
            .store
            .attempts_for_candidate(candidate_id)
            .await?
            .into_iter()
            .map(|a| (a.session_definition_id, a))
            .collect();

        let mut summaries = Vec::new();
        for definition in definitions.into_iter().filter(|d| d.is_active) {
            let attempt = match attempts.remove(&definition.id) {
                Some(a) => Some(self.refresh(a).await?),
                None => None,
            };

            let now = self.clock.now();
            let mut status = status::resolve(now, definition.window(), attempt.as_ref().map(AttemptState::from));

            // An open session the bank can no longer serve is shown as locked.
            if status == SessionStatus::Available && attempt.is_none() {
                let counts = self.store.count_by_difficulty(&definition.filter).await?;
                if let Err(e) = sampler::check_feasible(&definition.rule, &counts) {
                    tracing::warn!("Session {} cannot be drawn: {}", definition.id, e);
                    status = SessionStatus::Locked;
                }
            }

            summaries.push(CandidateSessionSummary {
                id: definition.id,
                total_questions: definition.total_questions(),
                total_duration_minutes: definition.total_duration_minutes(),
                title: definition.title,
                description: definition.description,
                start_at: definition.start_at,
                end_at: definition.end_at,
                time_per_question_minutes: definition.time_per_question_minutes,
                passing_score_percent: definition.passing_score_percent,
                status,
                attempt_id: attempt.as_ref().map(|a| a.id),
                score_percent: attempt.as_ref().and_then(|a| a.score_percent),
                passed: attempt.as_ref().and_then(|a| a.passed),
            });
        }

        summaries.sort_by(|a, b| a.start_at.cmp(&b.start_at).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    /// Draws and persists a new attempt.
    ///
    /// An existing attempt (including one created by a concurrent call) comes
    /// back as `AlreadyStarted`. A bank that can no longer satisfy the rule
    /// locks the session instead of handing out a shorter quiz.
    pub async fn start(&self, candidate_id: i64, definition_id: Uuid) -> Result<AttemptView, AppError> {
        let definition = self.active_definition(definition_id).await?;

        if let Some(existing) = self.store.find_attempt(candidate_id, definition_id).await? {
            let existing = self.refresh(existing).await?;
            return Err(AppError::AlreadyStarted(Box::new(self.view_of(&existing).await?)));
        }

        let now = self.clock.now();
        if status::resolve(now, definition.window(), None) != SessionStatus::Available {
            return Err(AppError::SessionLocked(definition_id));
        }

        let new = NewAttempt {
            id: Uuid::new_v4(),
            candidate_id,
            session_definition_id: definition_id,
            started_at: now,
            time_per_question_minutes: definition.time_per_question_minutes,
            passing_score_percent: definition.passing_score_percent,
        };
        let seed = seed_for_attempt(new.id);
        let rule = definition.rule;
        let draw = move |pool: &[Question]| sampler::draw(&rule, pool, seed);

        match self.store.create_attempt(new, &definition.filter, &draw).await? {
            DrawOutcome::Created(attempt) => {
                tracing::info!(
                    "Candidate {} started attempt {} on session {} ({} questions, {} min)",
                    candidate_id,
                    attempt.id,
                    definition_id,
                    attempt.drawn.len(),
                    attempt.time_limit_minutes
                );
                self.notify(
                    candidate_id,
                    CandidateEvent::AttemptStarted {
                        attempt_id: attempt.id,
                        session_title: definition.title,
                    },
                )
                .await;
                self.view_of(&attempt).await
            }
            DrawOutcome::AlreadyStarted(winner) => {
                let winner = self.refresh(winner).await?;
                Err(AppError::AlreadyStarted(Box::new(self.view_of(&winner).await?)))
            }
            DrawOutcome::Infeasible(e) => {
                tracing::warn!("Session {} locked at draw time: {}", definition_id, e);
                Err(AppError::SessionLocked(definition_id))
            }
        }
    }

    pub async fn get_attempt(&self, candidate_id: i64, attempt_id: Uuid) -> Result<AttemptView, AppError> {
        let attempt = self.owned_attempt(candidate_id, attempt_id).await?;
        let attempt = self.refresh(attempt).await?;
        self.view_of(&attempt).await
    }

    /// Upserts one answer. Late or closed attempts are refused.
    pub async fn record_answer(
        &self,
        candidate_id: i64,
        attempt_id: Uuid,
        req: &RecordAnswerRequest,
    ) -> Result<AttemptView, AppError> {
        let attempt = self.owned_attempt(candidate_id, attempt_id).await?;
        let attempt = self.refresh(attempt).await?;
        if attempt.status.is_closed() {
            return Err(AppError::Conflict(format!("Attempt is {}", attempt.status)));
        }

        if !attempt.contains_question(req.question_id) {
            return Err(AppError::BadRequest(
                "Question is not part of this attempt".to_string(),
            ));
        }
        // A question missing from the bank takes any index and scores 0.
        let in_bounds = match self.store.get_question(req.question_id).await? {
            Some(question) => question.has_option(req.option_index),
            None => req.option_index >= 0,
        };
        if !in_bounds {
            return Err(AppError::BadRequest("Option index out of range".to_string()));
        }

        let answer = RecordedAnswer {
            option_index: req.option_index,
            answered_at: self.clock.now(),
        };
        let updated = self
            .store
            .record_answer(attempt_id, req.question_id, answer)
            .await?
            .ok_or_else(|| AppError::Conflict("Attempt is no longer in progress".to_string()))?;

        tracing::debug!("Attempt {} answered {}", attempt_id, req.question_id);
        self.view_of(&updated).await
    }

    /// Closes the attempt as completed. Allowed past the deadline as long as
    /// nothing closed it yet; late answers are ignored by the scorer. On a
    /// closed attempt this returns the stored result unchanged.
    pub async fn submit(&self, candidate_id: i64, attempt_id: Uuid) -> Result<AttemptView, AppError> {
        let attempt = self.owned_attempt(candidate_id, attempt_id).await?;
        if attempt.status.is_closed() {
            tracing::debug!("Attempt {} already {}, submit ignored", attempt_id, attempt.status);
            return self.view_of(&attempt).await;
        }

        let now = self.clock.now();
        let closed = self.close(attempt, AttemptStatus::Completed, Some(now)).await?;
        self.view_of(&closed).await
    }

    /// Closed attempts of the candidate, newest first.
    pub async fn results(&self, candidate_id: i64) -> Result<Vec<AttemptResult>, AppError> {
        let titles: BTreeMap<Uuid, String> = self
            .store
            .list_definitions()
            .await?
            .into_iter()
            .map(|d| (d.id, d.title))
            .collect();

        let mut results = Vec::new();
        for attempt in self.store.attempts_for_candidate(candidate_id).await? {
            let attempt = self.refresh(attempt).await?;
            if !attempt.status.is_closed() {
                continue;
            }
            results.push(AttemptResult {
                attempt_id: attempt.id,
                session_definition_id: attempt.session_definition_id,
                session_title: titles
                    .get(&attempt.session_definition_id)
                    .cloned()
                    .unwrap_or_default(),
                status: attempt.status,
                started_at: attempt.started_at,
                submitted_at: attempt.submitted_at,
                total_questions: attempt.drawn.len(),
                correct_count: attempt.correct_count,
                score_percent: attempt.score_percent,
                passed: attempt.passed,
                time_spent_seconds: attempt.time_spent_seconds,
            });
        }
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(results)
    }

    /// Correction of a closed attempt: answer key, explanation and outcome
    /// per question.
    pub async fn details(&self, candidate_id: i64, attempt_id: Uuid) -> Result<AttemptDetails, AppError> {
        let attempt = self.owned_attempt(candidate_id, attempt_id).await?;
        let attempt = self.refresh(attempt).await?;
        if !attempt.status.is_closed() {
            return Err(AppError::BadRequest(
                "Correction is available once the attempt is closed".to_string(),
            ));
        }

        let definition = self
            .store
            .get_definition(attempt.session_definition_id)
            .await?
            .ok_or_else(session_not_found)?;
        let bank = self.bank_for(&attempt).await?;
        let cutoff = attempt.deadline();

        let questions = attempt
            .drawn
            .iter()
            .map(|drawn| {
                let question = bank.get(&drawn.question_id);
                let selected = attempt
                    .answers
                    .get(&drawn.question_id)
                    .filter(|a| a.answered_at <= cutoff)
                    .map(|a| a.option_index);
                let is_correct = matches!(
                    (question, selected),
                    (Some(q), Some(index)) if q.is_correct(index)
                );
                QuestionCorrection {
                    question_id: drawn.question_id,
                    text: question.map(|q| q.text.clone()),
                    options: question.map(|q| q.options.clone()).unwrap_or_default(),
                    selected_index: selected,
                    correct_index: question.map(|q| q.correct_index),
                    explanation: question.and_then(|q| q.explanation.clone()),
                    is_correct,
                    points: drawn.points,
                    earned_points: if is_correct { drawn.points } else { 0 },
                }
            })
            .collect();

        Ok(AttemptDetails {
            attempt: view(&attempt, &bank, self.clock.now()),
            session: SessionDefinitionResponse::from(&definition),
            questions,
        })
    }
}
