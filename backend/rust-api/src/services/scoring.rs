use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::curriculum::Progress;
use crate::models::quiz::{Question, WeakTopic};

/// Number of weak topics copied into a curriculum's focus areas.
pub const FOCUS_AREA_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub correct_count: usize,
    pub total: usize,
    /// `100 * correct / total`, not rounded.
    pub score: f64,
    /// Sorted by `wrong_count` descending; equal counts keep the order in
    /// which the topic was first missed.
    pub weak_topics: Vec<WeakTopic>,
}

/// How a new quiz result is folded into the curriculum's progress summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressPolicy {
    /// Replace progress with the latest score and `total_quizzes = 1`.
    #[default]
    Overwrite,
    /// Replace the score but count attempts.
    Accumulate,
}

impl ProgressPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Some(Self::Overwrite),
            "accumulate" => Some(Self::Accumulate),
            _ => None,
        }
    }
}

/// Scores a submission against a quiz.
///
/// Answers are matched to questions by position only. Any index that is not
/// the question's correct index counts as a miss, including indices outside
/// the question's option list. Range checks against the global 0..=3 bound
/// happen at the request boundary, not here.
pub fn score_submission(
    questions: &[Question],
    submission: &[u8],
) -> Result<ScoreResult, CoreError> {
    if submission.len() != questions.len() {
        return Err(CoreError::LengthMismatch {
            expected: questions.len(),
            actual: submission.len(),
        });
    }
    if questions.is_empty() {
        return Err(CoreError::EmptyQuiz);
    }

    let mut correct_count = 0usize;
    let mut weak_topics: Vec<WeakTopic> = Vec::new();
    let mut topic_index: HashMap<&str, usize> = HashMap::new();

    for (question, &answer) in questions.iter().zip(submission) {
        if answer == question.correct_answer {
            correct_count += 1;
            continue;
        }

        match topic_index.get(question.topic.as_str()) {
            Some(&idx) => weak_topics[idx].wrong_count += 1,
            None => {
                topic_index.insert(question.topic.as_str(), weak_topics.len());
                weak_topics.push(WeakTopic {
                    topic: question.topic.clone(),
                    wrong_count: 1,
                });
            }
        }
    }

    // sort_by is stable, so ties stay in first-miss order
    weak_topics.sort_by(|a, b| b.wrong_count.cmp(&a.wrong_count));

    let total = questions.len();
    Ok(ScoreResult {
        correct_count,
        total,
        score: 100.0 * correct_count as f64 / total as f64,
        weak_topics,
    })
}

pub fn focus_areas(weak_topics: &[WeakTopic]) -> Vec<WeakTopic> {
    weak_topics.iter().take(FOCUS_AREA_LIMIT).cloned().collect()
}

pub fn recommendation(weak_topics: &[WeakTopic]) -> String {
    if weak_topics.is_empty() {
        return "Great job! You've mastered this curriculum.".to_string();
    }
    let topics: Vec<&str> = weak_topics
        .iter()
        .take(FOCUS_AREA_LIMIT)
        .map(|t| t.topic.as_str())
        .collect();
    format!("Focus on: {}", topics.join(", "))
}

pub fn next_progress(previous: Option<&Progress>, score: f64, policy: ProgressPolicy) -> Progress {
    let total_quizzes = match policy {
        ProgressPolicy::Overwrite => 1,
        ProgressPolicy::Accumulate => previous.map(|p| p.total_quizzes).unwrap_or(0) + 1,
    };
    Progress {
        score,
        total_quizzes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(topic: &str, correct: u8) -> Question {
        Question {
            question: format!("Question about {}", topic),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: correct,
            topic: topic.to_string(),
        }
    }

    #[test]
    fn all_correct_scores_hundred_with_no_weak_topics() {
        let questions = vec![question("A", 0), question("B", 3)];
        let result = score_submission(&questions, &[0, 3]).unwrap();

        assert_eq!(result.correct_count, 2);
        assert_eq!(result.score, 100.0);
        assert!(result.weak_topics.is_empty());
    }

    #[test]
    fn all_wrong_aggregates_misses_per_topic() {
        let questions = vec![question("A", 0), question("B", 0), question("A", 0)];
        let result = score_submission(&questions, &[1, 1, 1]).unwrap();

        assert_eq!(result.score, 0.0);
        assert_eq!(
            result.weak_topics,
            vec![
                WeakTopic {
                    topic: "A".into(),
                    wrong_count: 2
                },
                WeakTopic {
                    topic: "B".into(),
                    wrong_count: 1
                },
            ]
        );
    }

    #[test]
    fn score_is_exact_division_without_rounding() {
        let questions = vec![question("A", 0), question("B", 1), question("C", 2)];
        let result = score_submission(&questions, &[0, 0, 0]).unwrap();

        assert_eq!(result.correct_count, 1);
        assert_eq!(result.score, 100.0 * 1.0 / 3.0);
    }

    #[test]
    fn correct_plus_misses_equals_question_count() {
        let questions = vec![
            question("A", 0),
            question("B", 1),
            question("A", 2),
            question("C", 3),
            question("B", 0),
        ];
        let result = score_submission(&questions, &[0, 2, 2, 0, 1]).unwrap();
        let misses: u32 = result.weak_topics.iter().map(|t| t.wrong_count).sum();

        assert_eq!(result.correct_count + misses as usize, questions.len());
        assert_eq!(
            result.score,
            100.0 * result.correct_count as f64 / questions.len() as f64
        );
    }

    #[test]
    fn ties_keep_first_miss_order() {
        let questions = vec![question("Zeta", 0), question("Alpha", 0), question("Mid", 0)];
        let result = score_submission(&questions, &[1, 1, 1]).unwrap();
        let topics: Vec<&str> = result.weak_topics.iter().map(|t| t.topic.as_str()).collect();

        assert_eq!(topics, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let questions = vec![question("A", 0), question("B", 0)];

        assert_eq!(
            score_submission(&questions, &[0]),
            Err(CoreError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(matches!(
            score_submission(&questions, &[0, 0, 0]),
            Err(CoreError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_quiz_is_rejected() {
        assert_eq!(score_submission(&[], &[]), Err(CoreError::EmptyQuiz));
    }

    #[test]
    fn index_beyond_option_list_counts_as_wrong() {
        let mut short = question("A", 1);
        short.options.truncate(2);
        let result = score_submission(&[short], &[3]).unwrap();

        assert_eq!(result.correct_count, 0);
        assert_eq!(result.weak_topics[0].wrong_count, 1);
    }

    #[test]
    fn scoring_is_deterministic() {
        let questions = vec![question("A", 0), question("B", 1), question("C", 2)];
        let first = score_submission(&questions, &[3, 3, 3]).unwrap();
        let second = score_submission(&questions, &[3, 3, 3]).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn focus_areas_and_recommendation_use_top_three() {
        let weak: Vec<WeakTopic> = ["a", "b", "c", "d"]
            .iter()
            .map(|t| WeakTopic {
                topic: t.to_string(),
                wrong_count: 1,
            })
            .collect();

        assert_eq!(focus_areas(&weak).len(), 3);
        assert_eq!(recommendation(&weak), "Focus on: a, b, c");
        assert_eq!(
            recommendation(&[]),
            "Great job! You've mastered this curriculum."
        );
    }

    #[test]
    fn progress_policy_controls_quiz_counter() {
        let previous = Progress {
            score: 40.0,
            total_quizzes: 4,
        };

        let overwritten = next_progress(Some(&previous), 80.0, ProgressPolicy::Overwrite);
        assert_eq!(overwritten.total_quizzes, 1);
        assert_eq!(overwritten.score, 80.0);

        let accumulated = next_progress(Some(&previous), 80.0, ProgressPolicy::Accumulate);
        assert_eq!(accumulated.total_quizzes, 5);

        assert_eq!(
            next_progress(None, 10.0, ProgressPolicy::Accumulate).total_quizzes,
            1
        );
        assert_eq!(
            ProgressPolicy::parse("Accumulate"),
            Some(ProgressPolicy::Accumulate)
        );
        assert_eq!(ProgressPolicy::parse("sum"), None);
    }
}
