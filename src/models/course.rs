// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A member's role inside one course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseRole {
    Organizer,
    Speaker,
    Audience,
}

impl CourseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseRole::Organizer => "organizer",
            CourseRole::Speaker => "speaker",
            CourseRole::Audience => "audience",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "organizer" => Some(CourseRole::Organizer),
            "speaker" => Some(CourseRole::Speaker),
            "audience" => Some(CourseRole::Audience),
            _ => None,
        }
    }

    /// Organizers and speakers run quizzes and see answer keys.
    pub fn is_staff(&self) -> bool {
        matches!(self, CourseRole::Organizer | CourseRole::Speaker)
    }
}

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub join_code: String,
    pub organizer_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Course as seen by one member. `join_code` is only shown to staff.
#[derive(Debug, Serialize)]
pub struct CourseView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    pub organizer_id: i64,
    pub role: CourseRole,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CourseView {
    pub fn new(course: Course, role: CourseRole) -> Self {
        Self {
            id: course.id,
            name: course.name,
            description: course.description,
            join_code: role.is_staff().then_some(course.join_code),
            organizer_id: course.organizer_id,
            role,
            created_at: course.created_at,
        }
    }
}

/// Row of `courses` joined with the caller's membership.
#[derive(Debug, FromRow)]
pub struct MemberCourseRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub join_code: String,
    pub organizer_id: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub role: String,
}

/// Aggregated member entry, joined from `course_members` and `users`.
#[derive(Debug, Serialize, FromRow)]
pub struct MemberEntry {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub joined_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

/// DTO for joining a course as audience.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinCourseRequest {
    #[validate(length(min = 1, max = 16))]
    pub join_code: String,
}

/// DTO for promoting a user to speaker.
#[derive(Debug, Deserialize, Validate)]
pub struct AddSpeakerRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
}
