// src/models/session_definition.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::question::{Difficulty, QuestionFilter};

/// Number of questions to draw per difficulty level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Distribution {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

impl Distribution {
    pub fn get(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    /// Saturates instead of wrapping; anything that large fails validation anyway.
    pub fn total(&self) -> u32 {
        self.easy.saturating_add(self.medium).saturating_add(self.hard)
    }

    /// Non-empty buckets in easy, medium, hard order.
    pub fn buckets(&self) -> impl Iterator<Item = (Difficulty, u32)> + '_ {
        Difficulty::ALL
            .into_iter()
            .map(|d| (d, self.get(d)))
            .filter(|(_, n)| *n > 0)
    }
}

/// How questions are drawn for each attempt of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRule {
    /// Uniform sample of `count` questions from the whole filtered pool.
    Flat { count: u32 },
    /// Per-difficulty quotas; the total is the sum of the buckets.
    Distribution(Distribution),
}

impl DrawRule {
    pub fn total_questions(&self) -> u32 {
        match self {
            DrawRule::Flat { count } => *count,
            DrawRule::Distribution(d) => d.total(),
        }
    }

    pub fn distribution(&self) -> Option<Distribution> {
        match self {
            DrawRule::Flat { .. } => None,
            DrawRule::Distribution(d) => Some(*d),
        }
    }

    /// Inverse of (`total_questions`, `distribution`), as stored.
    pub fn from_parts(total_questions: u32, distribution: Option<Distribution>) -> Self {
        match distribution {
            Some(d) => DrawRule::Distribution(d),
            None => DrawRule::Flat {
                count: total_questions,
            },
        }
    }
}

/// A reusable exam template. Attempts snapshot what they need from it,
/// so edits never reach back into attempts already drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDefinition {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub time_per_question_minutes: u32,
    pub passing_score_percent: u8,
    pub rule: DrawRule,
    pub filter: QuestionFilter,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionDefinition {
    pub fn total_questions(&self) -> u32 {
        self.rule.total_questions()
    }

    /// Derived from the canonical fields on every call, never stored.
    pub fn total_duration_minutes(&self) -> u32 {
        self.total_questions() * self.time_per_question_minutes
    }

    pub fn window(&self) -> Window {
        Window {
            start_at: self.start_at,
            end_at: self.end_at,
        }
    }
}

/// Opening window of a definition, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now <= self.end_at
    }
}

/// Minutes as a chrono duration.
pub fn minutes(n: u32) -> Duration {
    Duration::minutes(i64::from(n))
}

/// Admin payload for create and update. Update replaces the whole definition.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SessionDefinitionPayload {
    #[validate(custom(function = validate_title))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 240, message = "Time per question must be between 1 and 240 minutes."))]
    pub time_per_question_minutes: u32,
    #[validate(range(min = 0, max = 100, message = "Passing score must be between 0 and 100."))]
    pub passing_score_percent: i32,
    pub total_questions: Option<u32>,
    pub distribution: Option<Distribution>,
    pub categories: Option<Vec<String>>,
    pub difficulties: Option<Vec<Difficulty>>,
    pub is_active: Option<bool>,
}

/// The stored title is the trimmed one, so that is what gets measured.
fn validate_title(title: &str) -> Result<(), validator::ValidationError> {
    let len = title.trim().chars().count();
    if (1..=200).contains(&len) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("length")
            .with_message("Title length must be between 1 and 200 characters.".into()))
    }
}

/// Admin view: stored fields plus the derived totals.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDefinitionResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub time_per_question_minutes: u32,
    pub passing_score_percent: u8,
    pub total_questions: u32,
    pub total_duration_minutes: u32,
    pub distribution: Option<Distribution>,
    pub categories: Option<Vec<String>>,
    pub difficulties: Option<Vec<Difficulty>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionDefinition> for SessionDefinitionResponse {
    fn from(d: &SessionDefinition) -> Self {
        Self {
            id: d.id,
            title: d.title.clone(),
            description: d.description.clone(),
            start_at: d.start_at,
            end_at: d.end_at,
            time_per_question_minutes: d.time_per_question_minutes,
            passing_score_percent: d.passing_score_percent,
            total_questions: d.total_questions(),
            total_duration_minutes: d.total_duration_minutes(),
            distribution: d.rule.distribution(),
            categories: d.filter.categories.clone(),
            difficulties: d.filter.difficulties.clone(),
            is_active: d.is_active,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_rejects_unknown_buckets() {
        let ok: Distribution = serde_json::from_str(r#"{"easy": 2, "medium": 1}"#).unwrap();
        assert_eq!(ok.total(), 3);
        assert_eq!(ok.hard, 0);

        let bad = serde_json::from_str::<Distribution>(r#"{"easy": 2, "expert": 1}"#);
        assert!(bad.is_err());

        let negative = serde_json::from_str::<Distribution>(r#"{"easy": -1}"#);
        assert!(negative.is_err());
    }

    #[test]
    fn huge_buckets_do_not_overflow_the_total() {
        let d: Distribution = serde_json::from_str(r#"{"easy": 4294967295, "medium": 1}"#).unwrap();
        assert_eq!(d.total(), u32::MAX);
    }

    #[test]
    fn blank_titles_are_rejected() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title("  Logique ").is_ok());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn buckets_skip_empty_levels() {
        let d = Distribution {
            easy: 2,
            medium: 0,
            hard: 4,
        };
        let buckets: Vec<_> = d.buckets().collect();
        assert_eq!(buckets, vec![(Difficulty::Easy, 2), (Difficulty::Hard, 4)]);
    }
}
