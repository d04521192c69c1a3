// src/models/stats.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::scoring::ScoreRecord;

/// Query string of the ranking endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RankingParams {
    pub user_id: Option<i64>,
}

/// One ranking line, a `ScoreRecord` plus the username.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: i64,
    pub username: Option<String>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub percentage: u32,
    pub rank: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingResponse {
    pub ranking: Vec<RankingEntry>,
    pub requested_user_ranking: Option<ScoreRecord>,
    pub total_participants: usize,
}

/// `(question_id, option_id, count)` aggregated from 'answers'.
#[derive(Debug, Clone, FromRow)]
pub struct OptionCountRow {
    pub question_id: i64,
    pub option_id: i64,
    pub count: i64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OptionStats {
    pub option_id: i64,
    pub content: String,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct QuestionStats {
    pub question_id: i64,
    pub content: String,
    pub respondents: i64,
    pub options: Vec<OptionStats>,
}

#[derive(Debug, Serialize)]
pub struct QuizStatistics {
    pub quiz_id: i64,
    pub participants: i64,
    pub questions: Vec<QuestionStats>,
}
