// src/qcm/scorer.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{attempt::Attempt, question::Question};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreOutcome {
    pub score_percent: f64,
    pub correct_count: i32,
    pub passed: bool,
}

/// Rounds a percentage to one decimal.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Weighted percentage of an attempt.
///
/// Only answers recorded at or before `cutoff` count. A drawn question missing
/// from `bank` scores 0 but keeps its snapshotted points in the denominator.
pub fn score(attempt: &Attempt, bank: &HashMap<Uuid, Question>, cutoff: DateTime<Utc>) -> ScoreOutcome {
    let mut earned: i64 = 0;
    let mut possible: i64 = 0;
    let mut correct_count = 0;

    for drawn in &attempt.drawn {
        possible += i64::from(drawn.points);

        let Some(answer) = attempt.answers.get(&drawn.question_id) else {
            continue;
        };
        if answer.answered_at > cutoff {
            continue;
        }
        match bank.get(&drawn.question_id) {
            Some(question) if question.is_correct(answer.option_index) => {
                earned += i64::from(drawn.points);
                correct_count += 1;
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    "Question {} of attempt {} no longer exists, scored as incorrect",
                    drawn.question_id,
                    attempt.id
                );
            }
        }
    }

    let score_percent = if possible == 0 {
        0.0
    } else {
        round1(earned as f64 / possible as f64 * 100.0)
    };

    ScoreOutcome {
        score_percent,
        correct_count,
        passed: score_percent >= f64::from(attempt.passing_score_percent),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;

    use super::*;
    use crate::{
        models::{
            attempt::{AttemptStatus, DrawnQuestion, RecordedAnswer},
            question::Difficulty,
        },
        qcm::sampler::tests::question,
    };

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600, 0).unwrap()
    }

    /// Five questions weighted 1, 1, 2, 2, 3; correct option is always 0.
    fn fixture(passing: u8) -> (Attempt, HashMap<Uuid, Question>) {
        let levels = [
            Difficulty::Easy,
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Medium,
            Difficulty::Hard,
        ];
        let questions: Vec<Question> = levels.into_iter().map(question).collect();
        let attempt = Attempt {
            id: Uuid::new_v4(),
            candidate_id: 1,
            session_definition_id: Uuid::new_v4(),
            drawn: questions
                .iter()
                .map(|q| DrawnQuestion {
                    question_id: q.id,
                    points: q.points,
                })
                .collect(),
            started_at: start(),
            time_limit_minutes: 10,
            passing_score_percent: passing,
            submitted_at: None,
            answers: BTreeMap::new(),
            score_percent: None,
            correct_count: None,
            passed: None,
            time_spent_seconds: None,
            status: AttemptStatus::InProgress,
        };
        let bank = questions.into_iter().map(|q| (q.id, q)).collect();
        (attempt, bank)
    }

    fn answer(attempt: &mut Attempt, index: usize, option: i32, at: DateTime<Utc>) {
        let id = attempt.drawn[index].question_id;
        attempt.answers.insert(
            id,
            RecordedAnswer {
                option_index: option,
                answered_at: at,
            },
        );
    }

    #[test]
    fn scenario_c_weighted_score() {
        let (mut attempt, bank) = fixture(70);
        let at = start() + Duration::minutes(1);
        answer(&mut attempt, 0, 1, at); // wrong
        answer(&mut attempt, 2, 0, at);
        answer(&mut attempt, 3, 0, at);
        answer(&mut attempt, 4, 0, at);

        let outcome = score(&attempt, &bank, attempt.deadline());
        assert_eq!(outcome.score_percent, 77.8);
        assert_eq!(outcome.correct_count, 3);
        assert!(outcome.passed);

        attempt.passing_score_percent = 78;
        assert!(!score(&attempt, &bank, attempt.deadline()).passed);
        attempt.passing_score_percent = 77;
        assert!(score(&attempt, &bank, attempt.deadline()).passed);
    }

    #[test]
    fn deleted_question_counts_in_denominator_only() {
        let (mut attempt, mut bank) = fixture(50);
        let at = start() + Duration::minutes(1);
        for i in 0..5 {
            answer(&mut attempt, i, 0, at);
        }
        bank.remove(&attempt.drawn[4].question_id);

        let outcome = score(&attempt, &bank, attempt.deadline());
        // 6 of 9 points.
        assert_eq!(outcome.score_percent, 66.7);
        assert_eq!(outcome.correct_count, 4);
    }

    #[test]
    fn answers_after_cutoff_are_unanswered() {
        let (mut attempt, bank) = fixture(50);
        let deadline = attempt.deadline();
        answer(&mut attempt, 4, 0, deadline);
        answer(&mut attempt, 3, 0, deadline + Duration::seconds(1));

        let outcome = score(&attempt, &bank, deadline);
        assert_eq!(outcome.score_percent, 33.3);
        assert_eq!(outcome.correct_count, 1);
    }

    #[test]
    fn order_of_answers_does_not_matter() {
        let (base, bank) = fixture(50);
        let at = start() + Duration::minutes(2);

        let mut forward = base.clone();
        for (i, option) in [(0, 0), (1, 2), (2, 0), (4, 1)] {
            answer(&mut forward, i, option, at);
        }
        let mut backward = base.clone();
        for (i, option) in [(4, 1), (2, 0), (1, 2), (0, 0)] {
            answer(&mut backward, i, option, at);
        }

        assert_eq!(
            score(&forward, &bank, forward.deadline()),
            score(&backward, &bank, backward.deadline())
        );
    }

    #[test]
    fn nothing_answered_scores_zero() {
        let (attempt, bank) = fixture(0);
        let outcome = score(&attempt, &bank, attempt.deadline());
        assert_eq!(outcome.score_percent, 0.0);
        // A zero passing score is always met.
        assert!(outcome.passed);
    }
}
