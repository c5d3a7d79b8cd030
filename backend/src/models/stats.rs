// src/models/stats.rs

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::question::DifficultyCounts;

/// Attempt count of one session definition.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAttempts {
    pub session_id: Uuid,
    pub title: String,
    pub attempts: i64,
}

/// Global QCM figures for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AdminStatsResponse {
    pub total_questions: i64,
    pub questions_by_difficulty: DifficultyCounts,
    pub questions_by_category: BTreeMap<String, i64>,
    pub total_sessions: i64,
    pub total_attempts: i64,
    pub closed_attempts: i64,
    /// Average over closed attempts, one decimal. `None` when nothing is closed yet.
    pub average_score: Option<f64>,
    pub pass_rate: Option<f64>,
    /// One line per definition, sorted by title.
    pub attempts_by_session: Vec<SessionAttempts>,
}
