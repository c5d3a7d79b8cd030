// src/qcm/sampler.rs

//! Random draw of an attempt's questions.
//!
//! Each requested difficulty bucket is sampled without replacement from the
//! pool restricted to that level, the buckets are concatenated, and the final
//! order is shuffled so a question's position says nothing about its level.
//! The RNG is seeded from the attempt id: the same attempt id over the same
//! pool always yields the same paper.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use uuid::Uuid;

use crate::models::{
    attempt::DrawnQuestion,
    question::{Difficulty, DifficultyCounts, Question},
    session_definition::DrawRule,
};

/// A bucket of the pool holds fewer questions than the rule asks for.
/// `difficulty` is `None` for a flat draw over the whole filtered pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "not enough {} questions: requested {requested}, available {available}",
    .difficulty.map_or("eligible", |d| d.as_str())
)]
pub struct InsufficientQuestions {
    pub difficulty: Option<Difficulty>,
    pub requested: u32,
    pub available: i64,
}

pub fn seed_for_attempt(attempt_id: Uuid) -> u64 {
    let (hi, lo) = attempt_id.as_u64_pair();
    hi ^ lo
}

/// Feasibility of `rule` against per-difficulty counts of the filtered pool.
/// Reports the first deficient bucket in easy, medium, hard order.
pub fn check_feasible(rule: &DrawRule, counts: &DifficultyCounts) -> Result<(), InsufficientQuestions> {
    match rule {
        DrawRule::Flat { count } => {
            if counts.total() < i64::from(*count) {
                return Err(InsufficientQuestions {
                    difficulty: None,
                    requested: *count,
                    available: counts.total(),
                });
            }
        }
        DrawRule::Distribution(distribution) => {
            for (difficulty, requested) in distribution.buckets() {
                let available = counts.get(difficulty);
                if available < i64::from(requested) {
                    return Err(InsufficientQuestions {
                        difficulty: Some(difficulty),
                        requested,
                        available,
                    });
                }
            }
        }
    }
    Ok(())
}

fn count_pool(pool: &[&Question]) -> DifficultyCounts {
    let mut counts = DifficultyCounts::default();
    for q in pool {
        counts.add(q.difficulty, 1);
    }
    counts
}

/// Partial Fisher–Yates: the first `n` slots end up a uniform sample.
fn take_random<'a>(rng: &mut StdRng, mut items: Vec<&'a Question>, n: usize) -> Vec<&'a Question> {
    for i in 0..n {
        let j = rng.random_range(i..items.len());
        items.swap(i, j);
    }
    items.truncate(n);
    items
}

/// Draws the questions of one attempt from an already filtered pool.
pub fn draw(rule: &DrawRule, pool: &[Question], seed: u64) -> Result<Vec<DrawnQuestion>, InsufficientQuestions> {
    // Storage order is not guaranteed; the seed alone must decide the paper.
    let mut ordered: Vec<&Question> = pool.iter().collect();
    ordered.sort_by_key(|q| q.id);
    ordered.dedup_by_key(|q| q.id);

    check_feasible(rule, &count_pool(&ordered))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut selected: Vec<&Question> = Vec::with_capacity(rule.total_questions() as usize);

    match rule {
        DrawRule::Flat { count } => {
            selected.extend(take_random(&mut rng, ordered, *count as usize));
        }
        DrawRule::Distribution(distribution) => {
            for (difficulty, requested) in distribution.buckets() {
                let bucket: Vec<&Question> = ordered
                    .iter()
                    .copied()
                    .filter(|q| q.difficulty == difficulty)
                    .collect();
                selected.extend(take_random(&mut rng, bucket, requested as usize));
            }
        }
    }

    selected.shuffle(&mut rng);

    Ok(selected
        .into_iter()
        .map(|q| DrawnQuestion {
            question_id: q.id,
            points: q.points,
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::*;
    use crate::models::session_definition::Distribution;

    pub(crate) fn question(difficulty: Difficulty) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: format!("{} question", difficulty),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            correct_index: 0,
            difficulty,
            category: Some("IA".to_string()),
            explanation: None,
            points: difficulty.default_points(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pool(easy: usize, medium: usize, hard: usize) -> Vec<Question> {
        let mut pool = Vec::new();
        pool.extend((0..easy).map(|_| question(Difficulty::Easy)));
        pool.extend((0..medium).map(|_| question(Difficulty::Medium)));
        pool.extend((0..hard).map(|_| question(Difficulty::Hard)));
        pool
    }

    fn by_id(pool: &[Question]) -> std::collections::HashMap<Uuid, Difficulty> {
        pool.iter().map(|q| (q.id, q.difficulty)).collect()
    }

    #[test]
    fn distribution_draws_exact_bucket_counts() {
        let pool = pool(6, 5, 4);
        let levels = by_id(&pool);
        let rule = DrawRule::Distribution(Distribution {
            easy: 3,
            medium: 5,
            hard: 2,
        });

        for seed in 0..50 {
            let drawn = draw(&rule, &pool, seed).unwrap();
            assert_eq!(drawn.len(), 10);

            let mut counts = DifficultyCounts::default();
            for d in &drawn {
                counts.add(levels[&d.question_id], 1);
            }
            assert_eq!(counts, DifficultyCounts { easy: 3, medium: 5, hard: 2 });

            let unique: HashSet<_> = drawn.iter().map(|d| d.question_id).collect();
            assert_eq!(unique.len(), drawn.len(), "drawn without replacement");
        }
    }

    #[test]
    fn scenario_a_two_easy_one_medium() {
        let pool = pool(3, 2, 0);
        let levels = by_id(&pool);
        let rule = DrawRule::Distribution(Distribution {
            easy: 2,
            medium: 1,
            hard: 0,
        });

        let drawn = draw(&rule, &pool, 42).unwrap();
        assert_eq!(drawn.len(), 3);
        let easy = drawn.iter().filter(|d| levels[&d.question_id] == Difficulty::Easy).count();
        let medium = drawn.iter().filter(|d| levels[&d.question_id] == Difficulty::Medium).count();
        assert_eq!((easy, medium), (2, 1));
    }

    #[test]
    fn under_supplied_bucket_is_named() {
        let pool = pool(10, 1, 10);
        let rule = DrawRule::Distribution(Distribution {
            easy: 2,
            medium: 3,
            hard: 1,
        });

        let err = draw(&rule, &pool, 7).unwrap_err();
        assert_eq!(
            err,
            InsufficientQuestions {
                difficulty: Some(Difficulty::Medium),
                requested: 3,
                available: 1,
            }
        );
        assert_eq!(err.to_string(), "not enough medium questions: requested 3, available 1");
    }

    #[test]
    fn flat_draw_ignores_difficulty() {
        let pool = pool(1, 1, 3);
        let drawn = draw(&DrawRule::Flat { count: 5 }, &pool, 3).unwrap();
        assert_eq!(drawn.len(), 5);

        let err = draw(&DrawRule::Flat { count: 6 }, &pool, 3).unwrap_err();
        assert_eq!(err.difficulty, None);
        assert_eq!(err.available, 5);
    }

    #[test]
    fn same_seed_same_paper_regardless_of_pool_order() {
        let pool = pool(8, 8, 8);
        let mut reversed = pool.clone();
        reversed.reverse();
        let rule = DrawRule::Distribution(Distribution {
            easy: 3,
            medium: 3,
            hard: 3,
        });

        let attempt_id = Uuid::new_v4();
        let first = draw(&rule, &pool, seed_for_attempt(attempt_id)).unwrap();
        let second = draw(&rule, &reversed, seed_for_attempt(attempt_id)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn drawn_points_are_snapshotted_from_the_pool() {
        let mut pool = pool(0, 0, 2);
        pool[0].points = 7;
        let drawn = draw(&DrawRule::Flat { count: 2 }, &pool, 1).unwrap();
        let total: i32 = drawn.iter().map(|d| d.points).sum();
        assert_eq!(total, 7 + 3);
    }

    #[test]
    fn feasibility_uses_counts_only() {
        let counts = DifficultyCounts { easy: 3, medium: 2, hard: 0 };
        let ok = DrawRule::Distribution(Distribution { easy: 2, medium: 1, hard: 0 });
        assert!(check_feasible(&ok, &counts).is_ok());

        let short = DrawRule::Distribution(Distribution { easy: 2, medium: 1, hard: 1 });
        assert_eq!(
            check_feasible(&short, &counts).unwrap_err().difficulty,
            Some(Difficulty::Hard)
        );
    }
}
