// src/handlers/quiz.rs

use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

use crate::{
    error::AppError,
    generator::{QuizGenerator, clamp_question_count},
    handlers::course::{require_member, require_staff},
    models::quiz::{
        CreateQuizRequest, GenerateQuizRequest, OptionRow, OptionView, QuestionRow, QuestionView,
        Quiz, QuizDetail, QuizSummary, StartQuizRequest,
    },
    utils::{html::clean_text, jwt::Claims},
};

/// Loads a quiz or fails with 404.
pub(crate) async fn fetch_quiz(pool: &SqlitePool, quiz_id: i64) -> Result<Quiz, AppError> {
    sqlx::query_as::<_, Quiz>(
        r#"
        SELECT id, course_id, title, created_by, start_time, end_time, created_at
        FROM quizzes
        WHERE id = $1
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Questions and options of a quiz, both in position order.
pub(crate) async fn fetch_questions(
    pool: &SqlitePool,
    quiz_id: i64,
) -> Result<(Vec<QuestionRow>, Vec<OptionRow>), AppError> {
    let questions = sqlx::query_as::<_, QuestionRow>(
        "SELECT id, position, content FROM questions WHERE quiz_id = $1 ORDER BY position, id",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    let options = sqlx::query_as::<_, OptionRow>(
        r#"
        SELECT o.id, o.question_id, o.position, o.content, o.is_correct
        FROM options o
        JOIN questions q ON q.id = o.question_id
        WHERE q.quiz_id = $1
        ORDER BY q.position, q.id, o.position, o.id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok((questions, options))
}

/// Creates a quiz with all its questions and options in one transaction.
/// Organizers and speakers only.
pub async fn create_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    require_staff(&pool, course_id, user_id).await?;

    let title = clean_text(&payload.title);
    if title.is_empty() {
        return Err(AppError::BadRequest("Quiz title cannot be empty".to_string()));
    }

    let mut tx = pool.begin().await?;

    let quiz_id: i64 = sqlx::query_scalar(
        "INSERT INTO quizzes (course_id, title, created_by) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(course_id)
    .bind(&title)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    for (q_pos, question) in payload.questions.iter().enumerate() {
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (quiz_id, position, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(quiz_id)
        .bind(q_pos as i64)
        .bind(clean_text(&question.content))
        .fetch_one(&mut *tx)
        .await?;

        let mut query_builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "INSERT INTO options (question_id, position, content, is_correct) ",
        );
        query_builder.push_values(question.options.iter().enumerate(), |mut b, (o_pos, option)| {
            b.push_bind(question_id)
                .push_bind(o_pos as i64)
                .push_bind(clean_text(&option.content))
                .push_bind(option.is_correct);
        });
        query_builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;

    tracing::info!(
        quiz_id,
        course_id,
        questions = payload.questions.len(),
        "Quiz created"
    );
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": quiz_id, "title": title })),
    ))
}

#[derive(FromRow)]
struct QuizListRow {
    id: i64,
    course_id: i64,
    title: String,
    created_by: i64,
    start_time: Option<chrono::DateTime<Utc>>,
    end_time: Option<chrono::DateTime<Utc>>,
    created_at: Option<chrono::DateTime<Utc>>,
    question_count: i64,
}

/// Lists the quizzes of a course, newest first.
pub async fn list_course_quizzes(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_member(&pool, course_id, claims.user_id()?).await?;

    let rows = sqlx::query_as::<_, QuizListRow>(
        r#"
        SELECT
            z.id, z.course_id, z.title, z.created_by, z.start_time, z.end_time, z.created_at,
            (SELECT COUNT(*) FROM questions q WHERE q.quiz_id = z.id) AS question_count
        FROM quizzes z
        WHERE z.course_id = $1
        ORDER BY z.id DESC
        "#,
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    let now = Utc::now();
    let quizzes: Vec<QuizSummary> = rows
        .into_iter()
        .map(|row| {
            let quiz = Quiz {
                id: row.id,
                course_id: row.course_id,
                title: row.title,
                created_by: row.created_by,
                start_time: row.start_time,
                end_time: row.end_time,
                created_at: row.created_at,
            };
            QuizSummary {
                id: quiz.id,
                is_active: quiz.is_active_at(now),
                title: quiz.title,
                start_time: quiz.start_time,
                end_time: quiz.end_time,
                question_count: row.question_count,
            }
        })
        .collect();

    Ok(Json(quizzes))
}

/// Returns a quiz with its questions.
///
/// Audience members only see which option is correct once the quiz has ended.
pub async fn get_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    let role = require_member(&pool, quiz.course_id, claims.user_id()?).await?;

    let now = Utc::now();
    let ended = quiz.end_time.is_some_and(|end| end <= now);
    let reveal = role.is_staff() || ended;

    let (questions, options) = fetch_questions(&pool, quiz_id).await?;

    let mut by_question: HashMap<i64, Vec<OptionView>> = HashMap::new();
    for option in options {
        by_question
            .entry(option.question_id)
            .or_default()
            .push(OptionView {
                id: option.id,
                content: option.content,
                is_correct: reveal.then_some(option.is_correct),
            });
    }

    let questions = questions
        .into_iter()
        .map(|q| QuestionView {
            options: by_question.remove(&q.id).unwrap_or_default(),
            id: q.id,
            position: q.position,
            content: q.content,
        })
        .collect();

    Ok(Json(QuizDetail {
        is_active: quiz.is_active_at(now),
        quiz,
        questions,
    }))
}

/// Opens the activation window now, optionally closing it after `duration_seconds`.
pub async fn start_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<StartQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    require_staff(&pool, quiz.course_id, claims.user_id()?).await?;

    let now = Utc::now();
    if quiz.is_active_at(now) {
        return Err(AppError::Conflict("Quiz is already running".to_string()));
    }

    let end_time = payload.duration_seconds.map(|s| now + Duration::seconds(s));

    sqlx::query("UPDATE quizzes SET start_time = $1, end_time = $2 WHERE id = $3")
        .bind(now)
        .bind(end_time)
        .bind(quiz_id)
        .execute(&pool)
        .await?;

    tracing::info!(quiz_id, ?end_time, "Quiz started");
    Ok(Json(fetch_quiz(&pool, quiz_id).await?))
}

/// Closes the activation window now.
pub async fn stop_quiz(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = fetch_quiz(&pool, quiz_id).await?;
    require_staff(&pool, quiz.course_id, claims.user_id()?).await?;

    let now = Utc::now();
    if quiz.start_time.is_none() {
        return Err(AppError::BadRequest("Quiz has not been started".to_string()));
    }
    if !quiz.is_active_at(now) {
        return Ok(Json(quiz));
    }

    sqlx::query("UPDATE quizzes SET end_time = $1 WHERE id = $2")
        .bind(now)
        .bind(quiz_id)
        .execute(&pool)
        .await?;

    tracing::info!(quiz_id, "Quiz stopped");
    Ok(Json(fetch_quiz(&pool, quiz_id).await?))
}

/// Asks the AI generator for draft questions. Nothing is stored; the drafts
/// have the shape of `CreateQuizRequest::questions`.
pub async fn generate_questions(
    State(pool): State<SqlitePool>,
    State(generator): State<Arc<dyn QuizGenerator>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<GenerateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    require_staff(&pool, course_id, claims.user_id()?).await?;

    let count = clamp_question_count(payload.question_count);
    let questions = generator.generate(payload.topic.trim(), count).await?;

    tracing::info!(course_id, generated = questions.len(), "Generated quiz draft");
    Ok(Json(serde_json::json!({
        "topic": payload.topic,
        "questions": questions,
    })))
}
