// src/models/question.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Difficulty level of a bank question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Conventional point weight for a question of this difficulty.
    pub fn default_points(self) -> i32 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// A question of the shared bank, answer key included.
/// Only ever serialized on admin routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,

    /// The text content of the question.
    pub text: String,

    /// Ordered list of options. The position is what candidates answer with.
    pub options: Vec<String>,

    /// Index into `options` of the single correct option.
    pub correct_index: i32,

    pub difficulty: Difficulty,

    /// Category label (e.g. "Maths", "IA", "R&D"), stored as plain trimmed
    /// text so filters compare against exactly what the admin typed.
    pub category: Option<String>,

    /// Explanation shown in the correction once an attempt is closed.
    pub explanation: Option<String>,

    pub points: i32,

    /// Deactivated questions are never drawn again but stay readable for
    /// the attempts that already hold them.
    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Question {
    pub fn is_correct(&self, option_index: i32) -> bool {
        self.correct_index == option_index
    }

    pub fn has_option(&self, option_index: i32) -> bool {
        option_index >= 0 && (option_index as usize) < self.options.len()
    }
}

/// Candidate-facing DTO (excludes the answer key and the explanation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub text: String,
    pub options: Vec<String>,
    pub points: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            points: q.points,
        }
    }
}

/// DTO for creating (or fully replacing) a question.
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = validate_correct_index))]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    pub correct_index: i32,
    pub difficulty: Difficulty,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(length(max = 4000))]
    pub explanation: Option<String>,
    /// Falls back to the difficulty's conventional weight.
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    /// Defaults to active on create, and to the current flag on update.
    pub is_active: Option<bool>,
}

/// Trims a category label. Blank labels mean "no category".
pub fn normalize_category(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_options"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn validate_correct_index(req: &CreateQuestionRequest) -> Result<(), validator::ValidationError> {
    if req.correct_index < 0 || req.correct_index as usize >= req.options.len() {
        return Err(validator::ValidationError::new("correct_index_out_of_bounds"));
    }
    Ok(())
}

/// Pool restriction shared by bank reads, stats and session definitions.
/// An absent or empty list means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionFilter {
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub difficulties: Option<Vec<Difficulty>>,
}

impl QuestionFilter {
    pub fn matches(&self, q: &Question) -> bool {
        let category_ok = match self.categories.as_deref() {
            None | Some([]) => true,
            Some(categories) => q
                .category
                .as_ref()
                .is_some_and(|c| categories.iter().any(|wanted| wanted == c)),
        };
        let difficulty_ok = match self.difficulties.as_deref() {
            None | Some([]) => true,
            Some(difficulties) => difficulties.contains(&q.difficulty),
        };
        category_ok && difficulty_ok
    }

    pub fn allows_difficulty(&self, difficulty: Difficulty) -> bool {
        match self.difficulties.as_deref() {
            None | Some([]) => true,
            Some(difficulties) => difficulties.contains(&difficulty),
        }
    }

    /// Same filter with the difficulty restriction replaced by a single level.
    pub fn with_difficulty(&self, difficulty: Difficulty) -> Self {
        Self {
            categories: self.categories.clone(),
            difficulties: Some(vec![difficulty]),
        }
    }
}

/// Query string of the admin listing and the stats route.
/// Comma separated lists, e.g. `?categories=Maths,IA&difficulties=easy`.
#[derive(Debug, Default, Deserialize)]
pub struct QuestionListParams {
    pub categories: Option<String>,
    pub difficulties: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    /// Listing only. Stats and draws always count active questions.
    pub include_inactive: Option<bool>,
}

impl QuestionListParams {
    pub fn filter(&self) -> Result<QuestionFilter, String> {
        let categories = self.categories.as_deref().map(|raw| {
            raw.split(',')
                .filter_map(normalize_category)
                .collect::<Vec<_>>()
        });
        let difficulties = match self.difficulties.as_deref() {
            Some(raw) => Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Difficulty::from_str)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(QuestionFilter {
            categories,
            difficulties,
        })
    }
}

/// Number of bank questions per difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyCounts {
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
}

impl DifficultyCounts {
    pub fn get(&self, difficulty: Difficulty) -> i64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn add(&mut self, difficulty: Difficulty, n: i64) {
        match difficulty {
            Difficulty::Easy => self.easy += n,
            Difficulty::Medium => self.medium += n,
            Difficulty::Hard => self.hard += n,
        }
    }

    pub fn total(&self) -> i64 {
        self.easy + self.medium + self.hard
    }
}

#[derive(Debug, Serialize)]
pub struct BankStatsResponse {
    pub counts: DifficultyCounts,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: &[&str], correct_index: i32) -> CreateQuestionRequest {
        CreateQuestionRequest {
            text: "What is 2 + 2?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_index,
            difficulty: Difficulty::Easy,
            category: Some("Maths".to_string()),
            explanation: None,
            points: None,
            is_active: None,
        }
    }

    #[test]
    fn correct_index_must_be_within_options() {
        assert!(request(&["3", "4"], 1).validate().is_ok());
        assert!(request(&["3", "4"], 2).validate().is_err());
        assert!(request(&["3", "4"], -1).validate().is_err());
    }

    #[test]
    fn needs_two_options() {
        assert!(request(&["4"], 0).validate().is_err());
    }

    #[test]
    fn filter_params_parse_comma_lists() {
        let params = QuestionListParams {
            categories: Some("Maths, IA".to_string()),
            difficulties: Some("easy,hard".to_string()),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert_eq!(
            filter.categories,
            Some(vec!["Maths".to_string(), "IA".to_string()])
        );
        assert_eq!(
            filter.difficulties,
            Some(vec![Difficulty::Easy, Difficulty::Hard])
        );

        let bad = QuestionListParams {
            difficulties: Some("impossible".to_string()),
            ..Default::default()
        };
        assert!(bad.filter().is_err());
    }

    #[test]
    fn category_labels_keep_special_characters() {
        assert_eq!(normalize_category("  R&D "), Some("R&D".to_string()));
        assert_eq!(normalize_category("   "), None);

        let params = QuestionListParams {
            categories: Some("R&D,<Logique>".to_string()),
            ..Default::default()
        };
        assert_eq!(
            params.filter().unwrap().categories,
            Some(vec!["R&D".to_string(), "<Logique>".to_string()])
        );
    }
}
