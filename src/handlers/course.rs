// src/handlers/course.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::course::{
        AddSpeakerRequest, Course, CourseRole, CourseView, CreateCourseRequest,
        JoinCourseRequest, MemberCourseRow, MemberEntry,
    },
    utils::{
        html::clean_text,
        join_code::{generate_join_code, normalize_join_code},
        jwt::Claims,
    },
};

/// Join code collisions are astronomically rare; give up after a few.
const JOIN_CODE_ATTEMPTS: usize = 5;

/// Returns the caller's role in a course, or `None` if not a member.
pub(crate) async fn member_role(
    pool: &SqlitePool,
    course_id: i64,
    user_id: i64,
) -> Result<Option<CourseRole>, AppError> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM course_members WHERE course_id = $1 AND user_id = $2",
    )
    .bind(course_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(role.as_deref().and_then(CourseRole::parse))
}

/// Fails with 404 if the course does not exist and 403 if the caller is not a member.
pub(crate) async fn require_member(
    pool: &SqlitePool,
    course_id: i64,
    user_id: i64,
) -> Result<CourseRole, AppError> {
    match member_role(pool, course_id, user_id).await? {
        Some(role) => Ok(role),
        None => {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM courses WHERE id = $1")
                .bind(course_id)
                .fetch_optional(pool)
                .await?;
            match exists {
                Some(_) => Err(AppError::Forbidden(
                    "You are not a member of this course".to_string(),
                )),
                None => Err(AppError::NotFound("Course not found".to_string())),
            }
        }
    }
}

/// Like `require_member`, but only organizers and speakers pass.
pub(crate) async fn require_staff(
    pool: &SqlitePool,
    course_id: i64,
    user_id: i64,
) -> Result<CourseRole, AppError> {
    let role = require_member(pool, course_id, user_id).await?;
    if !role.is_staff() {
        return Err(AppError::Forbidden(
            "Only organizers and speakers can do this".to_string(),
        ));
    }
    Ok(role)
}

async fn fetch_course(pool: &SqlitePool, course_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        "SELECT id, name, description, join_code, organizer_id, created_at FROM courses WHERE id = $1",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Creates a course and makes the caller its organizer.
///
/// A fresh join code is generated; on the (unlikely) unique collision the
/// insert is retried with a new code.
pub async fn create_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let name = clean_text(&payload.name);
    if name.is_empty() {
        return Err(AppError::BadRequest("Course name cannot be empty".to_string()));
    }
    let description = payload.description.as_deref().map(clean_text);

    let mut tx = pool.begin().await?;

    let mut course = None;
    for _ in 0..JOIN_CODE_ATTEMPTS {
        let result = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (name, description, join_code, organizer_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, join_code, organizer_id, created_at
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(generate_join_code())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await;

        match result {
            Ok(created) => {
                course = Some(created);
                break;
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!("Join code collision, retrying");
            }
            Err(e) => {
                tracing::error!("Failed to create course: {:?}", e);
                return Err(AppError::from(e));
            }
        }
    }
    let course = course.ok_or(AppError::InternalServerError(
        "Could not allocate a unique join code".to_string(),
    ))?;

    sqlx::query("INSERT INTO course_members (course_id, user_id, role) VALUES ($1, $2, 'organizer')")
        .bind(course.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(course_id = course.id, user_id, "Course created");
    Ok((
        StatusCode::CREATED,
        Json(CourseView::new(course, CourseRole::Organizer)),
    ))
}

/// Lists every course the caller belongs to, newest first.
pub async fn list_my_courses(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows = sqlx::query_as::<_, MemberCourseRow>(
        r#"
        SELECT c.id, c.name, c.description, c.join_code, c.organizer_id, c.created_at, m.role
        FROM courses c
        JOIN course_members m ON m.course_id = c.id
        WHERE m.user_id = $1
        ORDER BY c.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let courses: Vec<CourseView> = rows
        .into_iter()
        .filter_map(|row| {
            let role = CourseRole::parse(&row.role)?;
            let course = Course {
                id: row.id,
                name: row.name,
                description: row.description,
                join_code: row.join_code,
                organizer_id: row.organizer_id,
                created_at: row.created_at,
            };
            Some(CourseView::new(course, role))
        })
        .collect();

    Ok(Json(courses))
}

/// Course details for members.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let role = require_member(&pool, course_id, claims.user_id()?).await?;
    let course = fetch_course(&pool, course_id).await?;

    Ok(Json(CourseView::new(course, role)))
}

/// Joins a course as audience with its join code.
/// Joining twice keeps the existing membership (and role).
pub async fn join_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<JoinCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;
    let code = normalize_join_code(&payload.join_code);

    let course = sqlx::query_as::<_, Course>(
        "SELECT id, name, description, join_code, organizer_id, created_at FROM courses WHERE join_code = $1",
    )
    .bind(&code)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("No course with this join code".to_string()))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO course_members (course_id, user_id, role)
        VALUES ($1, $2, 'audience')
        ON CONFLICT(course_id, user_id) DO NOTHING
        "#,
    )
    .bind(course.id)
    .bind(user_id)
    .execute(&pool)
    .await?
    .rows_affected();

    let role = member_role(&pool, course.id, user_id)
        .await?
        .ok_or(AppError::InternalServerError("Membership vanished".to_string()))?;

    if inserted > 0 {
        tracing::info!(course_id = course.id, user_id, "User joined course");
        Ok((StatusCode::CREATED, Json(CourseView::new(course, role))))
    } else {
        Ok((StatusCode::OK, Json(CourseView::new(course, role))))
    }
}

/// Makes an existing user a speaker of the course. Organizer only.
pub async fn add_speaker(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<AddSpeakerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let role = require_member(&pool, course_id, claims.user_id()?).await?;
    if role != CourseRole::Organizer {
        return Err(AppError::Forbidden(
            "Only the organizer can add speakers".to_string(),
        ));
    }

    let speaker_id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
        .bind(&payload.username)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound(format!(
            "User '{}' not found",
            payload.username
        )))?;

    if member_role(&pool, course_id, speaker_id).await? == Some(CourseRole::Organizer) {
        return Err(AppError::Conflict(
            "The organizer cannot be made a speaker".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO course_members (course_id, user_id, role)
        VALUES ($1, $2, 'speaker')
        ON CONFLICT(course_id, user_id) DO UPDATE SET role = 'speaker'
        "#,
    )
    .bind(course_id)
    .bind(speaker_id)
    .execute(&pool)
    .await?;

    tracing::info!(course_id, speaker_id, "Speaker added");
    Ok(Json(serde_json::json!({
        "course_id": course_id,
        "user_id": speaker_id,
        "role": CourseRole::Speaker,
    })))
}

/// Lists the members of a course. Staff only.
pub async fn list_members(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&pool, course_id, claims.user_id()?).await?;

    let members = sqlx::query_as::<_, MemberEntry>(
        r#"
        SELECT m.user_id, u.username, m.role, m.joined_at
        FROM course_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.course_id = $1
        ORDER BY CASE m.role WHEN 'organizer' THEN 0 WHEN 'speaker' THEN 1 ELSE 2 END, u.username
        "#,
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(members))
}
