// src/models/attempt.rs

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    question::PublicQuestion,
    session_definition::{SessionDefinitionResponse, minutes},
};

/// Persisted status of an attempt. `Completed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Expired,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Expired => "expired",
        }
    }

    pub fn is_closed(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "expired" => Ok(AttemptStatus::Expired),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// One drawn question with its point value captured at draw time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnQuestion {
    pub question_id: Uuid,
    pub points: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub option_index: i32,
    pub answered_at: DateTime<Utc>,
}

/// One candidate's timed instantiation of a session definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub candidate_id: i64,
    pub session_definition_id: Uuid,
    /// Ordered, fixed at creation.
    pub drawn: Vec<DrawnQuestion>,
    pub started_at: DateTime<Utc>,
    pub time_limit_minutes: u32,
    pub passing_score_percent: u8,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answers: BTreeMap<Uuid, RecordedAnswer>,
    pub score_percent: Option<f64>,
    pub correct_count: Option<i32>,
    pub passed: Option<bool>,
    /// Seconds between start and close, capped at the time limit.
    pub time_spent_seconds: Option<i64>,
    pub status: AttemptStatus,
}

impl Attempt {
    /// Server-side deadline. Never derived from anything the client reports.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + minutes(self.time_limit_minutes)
    }

    pub fn contains_question(&self, question_id: Uuid) -> bool {
        self.drawn.iter().any(|d| d.question_id == question_id)
    }

    pub fn question_ids(&self) -> Vec<Uuid> {
        self.drawn.iter().map(|d| d.question_id).collect()
    }

    /// Time spent if the attempt closed at `closed_at`.
    pub fn time_spent_until(&self, closed_at: DateTime<Utc>) -> i64 {
        (closed_at.min(self.deadline()) - self.started_at).num_seconds().max(0)
    }
}

/// Everything the store needs to persist a fresh attempt, minus the draw.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub id: Uuid,
    pub candidate_id: i64,
    pub session_definition_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub time_per_question_minutes: u32,
    pub passing_score_percent: u8,
}

impl NewAttempt {
    pub fn into_attempt(self, drawn: Vec<DrawnQuestion>) -> Attempt {
        let time_limit_minutes = drawn.len() as u32 * self.time_per_question_minutes;
        Attempt {
            id: self.id,
            candidate_id: self.candidate_id,
            session_definition_id: self.session_definition_id,
            drawn,
            started_at: self.started_at,
            time_limit_minutes,
            passing_score_percent: self.passing_score_percent,
            submitted_at: None,
            answers: BTreeMap::new(),
            score_percent: None,
            correct_count: None,
            passed: None,
            time_spent_seconds: None,
            status: AttemptStatus::InProgress,
        }
    }
}

/// Final outcome written when an attempt closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptClosure {
    pub status: AttemptStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score_percent: f64,
    pub correct_count: i32,
    pub passed: bool,
    pub time_spent_seconds: i64,
}

/// Candidate-facing view of an attempt. The answer key is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    pub id: Uuid,
    pub session_definition_id: Uuid,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub questions: Vec<PublicQuestion>,
    pub answers: BTreeMap<Uuid, i32>,
    pub total_questions: usize,
    pub score_percent: Option<f64>,
    pub correct_count: Option<i32>,
    pub passed: Option<bool>,
    pub time_spent_seconds: Option<i64>,
}

/// Session lifecycle status as seen by one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Locked,
    Available,
    Completed,
    Expired,
}

/// One row of the candidate's session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSessionSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub total_questions: u32,
    pub time_per_question_minutes: u32,
    pub total_duration_minutes: u32,
    pub passing_score_percent: u8,
    pub status: SessionStatus,
    pub attempt_id: Option<Uuid>,
    pub score_percent: Option<f64>,
    pub passed: Option<bool>,
}

/// Closed attempt as listed in the candidate's results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_id: Uuid,
    pub session_definition_id: Uuid,
    pub session_title: String,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub total_questions: usize,
    pub correct_count: Option<i32>,
    pub score_percent: Option<f64>,
    pub passed: Option<bool>,
    pub time_spent_seconds: Option<i64>,
}

/// Per-question line of the correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCorrection {
    pub question_id: Uuid,
    /// `None` when the question was deleted from the bank after the draw.
    pub text: Option<String>,
    pub options: Vec<String>,
    pub selected_index: Option<i32>,
    pub correct_index: Option<i32>,
    pub explanation: Option<String>,
    pub is_correct: bool,
    pub points: i32,
    pub earned_points: i32,
}

/// Correction of a closed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetails {
    pub attempt: AttemptView,
    pub session: SessionDefinitionResponse,
    pub questions: Vec<QuestionCorrection>,
}

#[derive(Debug, Deserialize)]
pub struct RecordAnswerRequest {
    pub question_id: Uuid,
    pub option_index: i32,
}
