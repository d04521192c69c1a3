// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'quizzes' table in the database.
///
/// Questions and options are immutable once created; only the activation
/// window (`start_time`, `end_time`) changes.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub created_by: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Quiz {
    /// A quiz accepts answers once started and until its end time passes.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => start <= now && now < end,
            (Some(start), None) => start <= now,
            (None, _) => false,
        }
    }
}

/// List item returned by `GET /api/courses/{id}/quizzes`.
#[derive(Debug, Serialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub question_count: i64,
}

/// Row of the 'questions' table.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub position: i64,
    pub content: String,
}

/// Row of the 'options' table.
#[derive(Debug, Clone, FromRow)]
pub struct OptionRow {
    pub id: i64,
    pub question_id: i64,
    pub position: i64,
    pub content: String,
    pub is_correct: bool,
}

#[derive(Debug, Serialize)]
pub struct OptionView {
    pub id: i64,
    pub content: String,
    /// Only sent to staff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub position: i64,
    pub content: String,
    pub options: Vec<OptionView>,
}

/// Full quiz as returned by `GET /api/quizzes/{id}`.
#[derive(Debug, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub is_active: bool,
    pub questions: Vec<QuestionView>,
}

/// DTO for one option of a new question.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateOptionRequest {
    #[validate(length(min = 1, max = 500))]
    pub content: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for one new question.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(length(min = 2, max = 10), custom(function = validate_options), nested)]
    pub options: Vec<CreateOptionRequest>,
}

/// DTO for creating a quiz with its questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 50), nested)]
    pub questions: Vec<CreateQuestionRequest>,
}

/// Zero correct options is a poll question; more than one is rejected.
fn validate_options(options: &[CreateOptionRequest]) -> Result<(), validator::ValidationError> {
    if options.iter().filter(|o| o.is_correct).count() > 1 {
        return Err(validator::ValidationError::new("multiple_correct_options"));
    }
    Ok(())
}

/// DTO for opening the activation window.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartQuizRequest {
    /// Open-ended when omitted.
    #[validate(range(min = 1, max = 86_400))]
    pub duration_seconds: Option<i64>,
}

/// DTO for asking the AI generator for draft questions.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateQuizRequest {
    #[validate(length(min = 1, max = 500))]
    pub topic: String,
    pub question_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn quiz(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Quiz {
        Quiz {
            id: 1,
            course_id: 1,
            title: "Quiz".to_string(),
            created_by: 1,
            start_time: start,
            end_time: end,
            created_at: None,
        }
    }

    fn option(is_correct: bool) -> CreateOptionRequest {
        CreateOptionRequest {
            content: "x".to_string(),
            is_correct,
        }
    }

    #[test]
    fn test_activation_window() {
        let now = Utc::now();
        let hour = Duration::hours(1);

        assert!(!quiz(None, None).is_active_at(now));
        assert!(quiz(Some(now - hour), None).is_active_at(now));
        assert!(quiz(Some(now - hour), Some(now + hour)).is_active_at(now));
        assert!(!quiz(Some(now - hour), Some(now)).is_active_at(now));
        assert!(!quiz(Some(now + hour), None).is_active_at(now));
    }

    #[test]
    fn test_question_validation() {
        let ok = CreateQuestionRequest {
            content: "2 + 2?".to_string(),
            options: vec![option(true), option(false)],
        };
        assert!(ok.validate().is_ok());

        let poll = CreateQuestionRequest {
            content: "Favourite colour?".to_string(),
            options: vec![option(false), option(false)],
        };
        assert!(poll.validate().is_ok());

        let two_correct = CreateQuestionRequest {
            content: "?".to_string(),
            options: vec![option(true), option(true)],
        };
        assert!(two_correct.validate().is_err());

        let single_option = CreateQuestionRequest {
            content: "?".to_string(),
            options: vec![option(true)],
        };
        assert!(single_option.validate().is_err());
    }
}
