// src/handlers/stats.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use sqlx::{FromRow, SqlitePool};

use crate::{
    error::AppError,
    handlers::{course::require_member, quiz::{fetch_questions, fetch_quiz}},
    models::{
        quiz::{OptionRow, QuestionRow},
        stats::{
            OptionCountRow, OptionStats, QuestionStats, QuizStatistics, RankingEntry,
            RankingParams, RankingResponse,
        },
    },
    scoring::{QuizKey, SubmittedAnswer, rank_quiz},
    utils::jwt::Claims,
};

#[derive(FromRow)]
struct AnswerTuple {
    user_id: i64,
    question_id: i64,
    option_id: i64,
}

#[derive(FromRow)]
struct UsernameRow {
    id: i64,
    username: String,
}

/// Loads the quiz, its answers, and runs the scoring engine.
/// Recomputed from scratch on every call.
async fn build_ranking(
    pool: &SqlitePool,
    quiz_id: i64,
    caller_id: i64,
    requested_user: Option<i64>,
) -> Result<RankingResponse, AppError> {
    let quiz = fetch_quiz(pool, quiz_id).await?;
    require_member(pool, quiz.course_id, caller_id).await?;

    let (questions, options) = fetch_questions(pool, quiz_id).await?;
    let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let key = QuizKey::from_rows(
        &question_ids,
        options.iter().map(|o| (o.question_id, o.id, o.is_correct)),
    );

    // Submission order is the tie-break order
    let answers: Vec<SubmittedAnswer> = sqlx::query_as::<_, AnswerTuple>(
        "SELECT user_id, question_id, option_id FROM answers WHERE quiz_id = $1 ORDER BY id",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|a| SubmittedAnswer {
        user_id: a.user_id,
        question_id: a.question_id,
        option_id: a.option_id,
    })
    .collect();

    let ranking = rank_quiz(&key, &answers, requested_user);

    let user_ids: HashSet<i64> = ranking.records.iter().map(|r| r.user_id).collect();
    let usernames = fetch_usernames(pool, &user_ids).await?;

    let entries: Vec<RankingEntry> = ranking
        .records
        .into_iter()
        .map(|r| RankingEntry {
            username: usernames.get(&r.user_id).cloned(),
            user_id: r.user_id,
            correct_count: r.correct_count,
            total_questions: r.total_questions,
            percentage: r.percentage,
            rank: r.rank,
        })
        .collect();

    Ok(RankingResponse {
        total_participants: entries.len(),
        ranking: entries,
        requested_user_ranking: ranking.requested,
    })
}

async fn fetch_usernames(
    pool: &SqlitePool,
    user_ids: &HashSet<i64>,
) -> Result<HashMap<i64, String>, AppError> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    // Use QueryBuilder for dynamic IN clause
    let mut query_builder =
        sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT id, username FROM users WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in user_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows: Vec<UsernameRow> = query_builder.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(|r| (r.id, r.username)).collect())
}

/// Ranking of a quiz. `?user_id=` additionally returns that user's record.
pub async fn get_ranking(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Query(params): Query<RankingParams>,
) -> Result<impl IntoResponse, AppError> {
    let response = build_ranking(&pool, quiz_id, claims.user_id()?, params.user_id).await?;
    Ok(Json(response))
}

/// Ranking of a quiz with the caller as the requested user.
pub async fn get_my_ranking(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let response = build_ranking(&pool, quiz_id, user_id, Some(user_id)).await?;
    Ok(Json(response))
}

/// Per question answer distribution. `reveal` adds the correctness flags.
fn build_question_stats(
    questions: Vec<QuestionRow>,
    options: Vec<OptionRow>,
    counts: &[OptionCountRow],
    reveal: bool,
) -> Vec<QuestionStats> {
    let count_of: HashMap<(i64, i64), i64> = counts
        .iter()
        .map(|c| ((c.question_id, c.option_id), c.count))
        .collect();

    let mut by_question: HashMap<i64, Vec<OptionStats>> = HashMap::new();
    for option in options {
        let count = count_of
            .get(&(option.question_id, option.id))
            .copied()
            .unwrap_or(0);
        by_question
            .entry(option.question_id)
            .or_default()
            .push(OptionStats {
                option_id: option.id,
                content: option.content,
                count,
                is_correct: reveal.then_some(option.is_correct),
            });
    }

    questions
        .into_iter()
        .map(|q| {
            let options = by_question.remove(&q.id).unwrap_or_default();
            QuestionStats {
                question_id: q.id,
                content: q.content,
                respondents: options.iter().map(|o| o.count).sum(),
                options,
            }
        })
        .collect()
}

/// Answer distribution of a quiz. Staff also see which option is correct.
pub async fn get_statistics(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let role = require_member(&pool, quiz.course_id, claims.user_id()?).await?;

    let (questions, options) = fetch_questions(&pool, quiz_id).await?;

    let counts = sqlx::query_as::<_, OptionCountRow>(
        r#"
        SELECT question_id, option_id, COUNT(*) AS count
        FROM answers
        WHERE quiz_id = $1
        GROUP BY question_id, option_id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(&pool)
    .await?;

    let participants: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM answers WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&pool)
            .await?;

    Ok(Json(QuizStatistics {
        quiz_id,
        participants,
        questions: build_question_stats(questions, options, &counts, role.is_staff()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64) -> QuestionRow {
        QuestionRow {
            id,
            position: id,
            content: format!("Q{}", id),
        }
    }

    fn option(id: i64, question_id: i64, is_correct: bool) -> OptionRow {
        OptionRow {
            id,
            question_id,
            position: id,
            content: format!("O{}", id),
            is_correct,
        }
    }

    fn count(question_id: i64, option_id: i64, count: i64) -> OptionCountRow {
        OptionCountRow {
            question_id,
            option_id,
            count,
        }
    }

    #[test]
    fn test_distribution() {
        let stats = build_question_stats(
            vec![question(1), question(2)],
            vec![option(11, 1, true), option(12, 1, false), option(21, 2, false)],
            &[count(1, 11, 3), count(1, 12, 1)],
            true,
        );

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].respondents, 4);
        assert_eq!(stats[0].options[0].count, 3);
        assert_eq!(stats[0].options[0].is_correct, Some(true));
        assert_eq!(stats[1].respondents, 0);
        assert_eq!(stats[1].options[0].count, 0);
    }

    #[test]
    fn test_stray_counts_and_hidden_flags() {
        let stats = build_question_stats(
            vec![question(1)],
            vec![option(11, 1, true), option(12, 1, false)],
            // option 21 is not part of question 1
            &[count(1, 11, 2), count(1, 21, 5)],
            false,
        );

        assert_eq!(stats[0].respondents, 2);
        assert!(stats[0].options.iter().all(|o| o.is_correct.is_none()));
    }
}
