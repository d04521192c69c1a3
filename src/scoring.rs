// src/scoring.rs

//! Quiz scoring and ranking.
//!
//! Everything here is a pure function of an already loaded quiz and its
//! answers. Loading (and the NotFound case for a missing quiz) is the
//! caller's job, see `handlers::stats`.

use std::collections::HashMap;

use serde::Serialize;

/// Answer key for a single question.
#[derive(Debug, Clone)]
pub struct QuestionKey {
    pub id: i64,
    /// Every option id that belongs to this question.
    pub option_ids: Vec<i64>,
    /// `None` marks the question as unscorable (e.g. an opinion poll).
    pub correct_option_id: Option<i64>,
}

/// Answer key for a whole quiz.
#[derive(Debug, Clone, Default)]
pub struct QuizKey {
    pub questions: Vec<QuestionKey>,
}

impl QuizKey {
    /// Builds the key from `(question_id, option_id, is_correct)` rows.
    ///
    /// Rows are expected in question/option position order. If a question has
    /// several options flagged correct, the first one is used.
    pub fn from_rows<I>(question_ids: &[i64], option_rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64, bool)>,
    {
        let mut questions: Vec<QuestionKey> = question_ids
            .iter()
            .map(|&id| QuestionKey {
                id,
                option_ids: Vec::new(),
                correct_option_id: None,
            })
            .collect();
        let index: HashMap<i64, usize> = question_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        for (question_id, option_id, is_correct) in option_rows {
            let Some(&i) = index.get(&question_id) else {
                continue;
            };
            let question = &mut questions[i];
            question.option_ids.push(option_id);
            if is_correct && question.correct_option_id.is_none() {
                question.correct_option_id = Some(option_id);
            }
        }

        Self { questions }
    }

    pub fn total_questions(&self) -> u32 {
        self.questions.len() as u32
    }
}

/// One submitted answer as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedAnswer {
    pub user_id: i64,
    pub question_id: i64,
    pub option_id: i64,
}

/// Derived per-user score. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub user_id: i64,
    pub correct_count: u32,
    pub total_questions: u32,
    pub percentage: u32,
    pub rank: u32,
}

/// Ranking plus the optional record for a specifically requested user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub records: Vec<ScoreRecord>,
    pub requested: Option<ScoreRecord>,
}

/// Rounds `correct / total * 100` to the nearest integer, half away from zero.
/// Returns 0 for an empty quiz.
pub fn percentage(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (correct, total) = (u64::from(correct), u64::from(total));
    ((correct * 200 + total) / (total * 2)) as u32
}

/// Computes per-user scores and a competition ranking (1, 1, 3, ...).
///
/// Users keep the order in which they first appear in `answers` when their
/// percentages tie. Only the first answer of a user to a question counts; if
/// that answer names an option outside the question it counts as wrong.
pub fn compute_scores(quiz: &QuizKey, answers: &[SubmittedAnswer]) -> Vec<ScoreRecord> {
    let total = quiz.total_questions();
    let questions: HashMap<i64, &QuestionKey> =
        quiz.questions.iter().map(|q| (q.id, q)).collect();

    // (user_id, answered question ids, correct count) in encounter order
    let mut users: Vec<(i64, Vec<i64>, u32)> = Vec::new();
    let mut slot: HashMap<i64, usize> = HashMap::new();

    for answer in answers {
        let i = *slot.entry(answer.user_id).or_insert_with(|| {
            users.push((answer.user_id, Vec::new(), 0));
            users.len() - 1
        });
        let (_, answered, correct) = &mut users[i];

        let Some(question) = questions.get(&answer.question_id) else {
            tracing::warn!(
                user_id = answer.user_id,
                question_id = answer.question_id,
                "Skipping answer for a question outside the quiz"
            );
            continue;
        };
        // The first answer to a question claims it, even when malformed
        if answered.contains(&answer.question_id) {
            continue;
        }
        answered.push(answer.question_id);

        if !question.option_ids.contains(&answer.option_id) {
            tracing::warn!(
                user_id = answer.user_id,
                question_id = answer.question_id,
                option_id = answer.option_id,
                "Skipping answer with an option outside its question"
            );
            continue;
        }

        if question.correct_option_id == Some(answer.option_id) {
            *correct += 1;
        }
    }

    let mut records: Vec<ScoreRecord> = users
        .into_iter()
        .map(|(user_id, _, correct_count)| ScoreRecord {
            user_id,
            correct_count,
            total_questions: total,
            percentage: percentage(correct_count, total),
            rank: 0,
        })
        .collect();

    // sort_by is stable, so ties keep encounter order
    records.sort_by(|a, b| b.percentage.cmp(&a.percentage));
    assign_ranks(&mut records);
    records
}

/// Competition ranking over records already sorted by descending percentage.
fn assign_ranks(records: &mut [ScoreRecord]) {
    let mut previous: Option<u32> = None;
    let mut rank = 0;
    for (position, record) in records.iter_mut().enumerate() {
        if previous != Some(record.percentage) {
            rank = position as u32 + 1;
            previous = Some(record.percentage);
        }
        record.rank = rank;
    }
}

/// Computes the ranking and, when `requested_user` is given, that user's record.
///
/// A requested user without any answer gets a zero record ranked after every
/// participant.
pub fn rank_quiz(
    quiz: &QuizKey,
    answers: &[SubmittedAnswer],
    requested_user: Option<i64>,
) -> Ranking {
    let records = compute_scores(quiz, answers);

    let requested = requested_user.map(|user_id| {
        records
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned()
            .unwrap_or(ScoreRecord {
                user_id,
                correct_count: 0,
                total_questions: quiz.total_questions(),
                percentage: 0,
                rank: records.len() as u32 + 1,
            })
    });

    Ranking { records, requested }
}
