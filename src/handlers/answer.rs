// src/handlers/answer.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    handlers::{course::require_member, quiz::fetch_quiz},
    models::answer::{Answer, SubmitAnswerRequest},
    utils::jwt::Claims,
};

/// Submits the caller's answer to one question of a running quiz.
///
/// The first answer per (user, question) wins. Retrying returns the stored
/// answer with 200 instead of 201, even if the retry picked another option.
pub async fn submit_answer(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    require_member(&pool, quiz.course_id, user_id).await?;

    if !quiz.is_active_at(Utc::now()) {
        return Err(AppError::BadRequest("Quiz is not accepting answers".to_string()));
    }

    // The option must belong to the question, and the question to this quiz
    let valid: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT o.id
        FROM options o
        JOIN questions q ON q.id = o.question_id
        WHERE o.id = $1 AND q.id = $2 AND q.quiz_id = $3
        "#,
    )
    .bind(req.option_id)
    .bind(req.question_id)
    .bind(quiz_id)
    .fetch_optional(&pool)
    .await?;

    if valid.is_none() {
        return Err(AppError::BadRequest(
            "Option does not belong to a question of this quiz".to_string(),
        ));
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO answers (user_id, quiz_id, question_id, option_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT(user_id, question_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .bind(req.question_id)
    .bind(req.option_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store answer: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .rows_affected()
        > 0;

    let answer = sqlx::query_as::<_, Answer>(
        r#"
        SELECT id, user_id, quiz_id, question_id, option_id, created_at
        FROM answers
        WHERE user_id = $1 AND question_id = $2
        "#,
    )
    .bind(user_id)
    .bind(req.question_id)
    .fetch_one(&pool)
    .await?;

    if inserted {
        tracing::debug!(quiz_id, user_id, question_id = req.question_id, "Answer stored");
        Ok((StatusCode::CREATED, Json(answer)))
    } else {
        tracing::debug!(
            quiz_id,
            user_id,
            question_id = req.question_id,
            "Duplicate answer, returning the stored one"
        );
        Ok((StatusCode::OK, Json(answer)))
    }
}

/// Lists the caller's own answers for a quiz.
pub async fn list_my_answers(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    require_member(&pool, quiz.course_id, user_id).await?;

    let answers = sqlx::query_as::<_, Answer>(
        r#"
        SELECT id, user_id, quiz_id, question_id, option_id, created_at
        FROM answers
        WHERE quiz_id = $1 AND user_id = $2
        ORDER BY id
        "#,
    )
    .bind(quiz_id)
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(answers))
}
