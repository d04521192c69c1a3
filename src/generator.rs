// src/generator.rs

//! AI assisted quiz drafting.
//!
//! Staff ask for N questions on a topic; the upstream LLM answers with (more or
//! less) JSON which is turned into `CreateQuestionRequest` drafts. Drafts are
//! never stored here, the speaker reviews them and posts them as a quiz.

use std::{sync::{Arc, LazyLock}, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    config::{Config, MAX_GENERATED_QUESTIONS},
    error::AppError,
    models::quiz::{CreateOptionRequest, CreateQuestionRequest},
    utils::html::clean_text,
};

pub const DEFAULT_QUESTION_COUNT: u32 = 5;

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions for a classroom. \
Reply with a JSON array only. Every element is an object with the keys \
\"question\" (string), \"options\" (array of 4 strings) and \"answer\" \
(zero-based index of the correct option).";

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"));

/// Candidate starts of a JSON array embedded in prose.
static ARRAY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*[\[{]").expect("valid array regex"));

/// Source of draft quiz questions.
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(
        &self,
        topic: &str,
        question_count: u32,
    ) -> Result<Vec<CreateQuestionRequest>, AppError>;
}

/// Picks the generator for the configured environment.
pub fn from_config(config: &Config) -> Arc<dyn QuizGenerator> {
    match &config.ai_api_url {
        Some(url) => {
            tracing::info!("AI quiz generation enabled (model {})", config.ai_model);
            Arc::new(OpenAiGenerator::new(
                url.clone(),
                config.ai_api_key.clone(),
                config.ai_model.clone(),
            ))
        }
        None => {
            tracing::info!("AI_API_URL not set, quiz generation disabled");
            Arc::new(DisabledGenerator)
        }
    }
}

/// Used when no upstream is configured.
pub struct DisabledGenerator;

#[async_trait]
impl QuizGenerator for DisabledGenerator {
    async fn generate(&self, _: &str, _: u32) -> Result<Vec<CreateQuestionRequest>, AppError> {
        Err(AppError::ServiceUnavailable(
            "Quiz generation is not configured".to_string(),
        ))
    }
}

/// Client for an OpenAI compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiGenerator {
    pub fn new(api_url: String, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to a default HTTP client without timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            client,
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl QuizGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        topic: &str,
        question_count: u32,
    ) -> Result<Vec<CreateQuestionRequest>, AppError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(topic, question_count) },
            ],
        });

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("AI request failed: {:?}", e);
            AppError::BadGateway("AI service unreachable".to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BadGateway(format!(
                "AI service answered with status {}",
                status
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::BadGateway(format!("Malformed AI response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::BadGateway("AI response had no choices".to_string()))?;

        let mut questions = parse_generated_questions(&content)?;
        questions.truncate(question_count as usize);
        Ok(questions)
    }
}

pub fn clamp_question_count(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_QUESTION_COUNT)
        .clamp(1, MAX_GENERATED_QUESTIONS)
}

fn user_prompt(topic: &str, question_count: u32) -> String {
    format!(
        "Write {} questions about the following topic: {}",
        question_count, topic
    )
}

/// `answer` as models emit it: an index, the option text, or an option letter.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Index(usize),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(alias = "content", alias = "text")]
    question: String,
    options: Vec<String>,
    #[serde(alias = "correct", alias = "correct_index", alias = "answer_index")]
    answer: RawAnswer,
}

impl RawQuestion {
    fn correct_index(&self) -> Option<usize> {
        match &self.answer {
            RawAnswer::Index(i) => Some(*i),
            RawAnswer::Text(text) => {
                let text = text.trim();
                if let Some(i) = self
                    .options
                    .iter()
                    .position(|o| o.trim().eq_ignore_ascii_case(text))
                {
                    return Some(i);
                }
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) if letter.is_ascii_alphabetic() => {
                        Some((letter.to_ascii_uppercase() as u8 - b'A') as usize)
                    }
                    _ => None,
                }
            }
        }
    }

    fn into_request(self) -> Option<CreateQuestionRequest> {
        let correct = self.correct_index()?;
        let content = clean_text(&self.question);
        if content.is_empty() || !(2..=10).contains(&self.options.len()) || correct >= self.options.len() {
            return None;
        }

        let options = self
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| CreateOptionRequest {
                content: clean_text(o),
                is_correct: i == correct,
            })
            .collect::<Vec<_>>();
        if options.iter().any(|o| o.content.is_empty()) {
            return None;
        }

        Some(CreateQuestionRequest { content, options })
    }
}

/// Accepts a bare array or an object with a `questions` array.
fn question_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// Parses the first JSON value at the start of `text`, ignoring what follows.
fn leading_json(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// Keeps the items that have the expected shape.
fn usable_questions(items: Vec<Value>) -> Vec<CreateQuestionRequest> {
    let total = items.len();
    let questions: Vec<CreateQuestionRequest> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawQuestion>(item).ok())
        .filter_map(RawQuestion::into_request)
        .collect();

    if questions.len() < total {
        tracing::warn!(
            "Dropped {} malformed generated question(s)",
            total - questions.len()
        );
    }
    questions
}

/// Turns the model's text into validated question drafts.
///
/// Tries strict JSON first (after removing a Markdown code fence), then falls
/// back to every array of objects embedded in the text, in order, until one
/// yields usable questions. Items that do not have the expected shape are
/// dropped.
pub fn parse_generated_questions(content: &str) -> Result<Vec<CreateQuestionRequest>, AppError> {
    let unfenced = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str())
        .trim();

    let mut found_list = false;

    if let Some(items) = serde_json::from_str::<Value>(unfenced)
        .ok()
        .and_then(question_items)
    {
        found_list = true;
        let questions = usable_questions(items);
        if !questions.is_empty() {
            return Ok(questions);
        }
    } else {
        tracing::debug!("AI response is not plain JSON, trying array extraction");
        for start in ARRAY_START.find_iter(content) {
            let Some(items) = leading_json(&content[start.start()..]).and_then(question_items)
            else {
                continue;
            };
            found_list = true;
            let questions = usable_questions(items);
            if !questions.is_empty() {
                return Ok(questions);
            }
        }
    }

    if !found_list {
        return Err(AppError::BadGateway(
            "AI response did not contain a question list".to_string(),
        ));
    }
    Err(AppError::BadGateway(
        "AI response contained no usable questions".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correct_of(q: &CreateQuestionRequest) -> Option<usize> {
        q.options.iter().position(|o| o.is_correct)
    }

    #[test]
    fn test_plain_array() {
        let text = r#"[{"question": "2 + 2?", "options": ["3", "4", "5", "6"], "answer": 1}]"#;
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "2 + 2?");
        assert_eq!(questions[0].options.len(), 4);
        assert_eq!(correct_of(&questions[0]), Some(1));
    }

    #[test]
    fn test_wrapped_object_in_code_fence() {
        let text = "```json\n{\"questions\": [{\"question\": \"Capital of France?\", \
                    \"options\": [\"Paris\", \"Rome\"], \"answer\": \"Paris\"}]}\n```";
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(correct_of(&questions[0]), Some(0));
    }

    #[test]
    fn test_array_extracted_from_prose() {
        let text = "Sure! Here are your questions:\n\
                    [{\"question\": \"Borrow checker?\", \"options\": [\"a\", \"b\", \"c\"], \"answer\": \"C\"}]\n\
                    Good luck with the class.";
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(correct_of(&questions[0]), Some(2));
    }

    #[test]
    fn test_single_letter_option_text_matches_before_letter() {
        let text = r#"[{"question": "Which variable?", "options": ["x", "y", "z"], "answer": "x"}]"#;
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(correct_of(&questions[0]), Some(0));
    }

    #[test]
    fn test_letter_answer_when_no_option_matches() {
        let text = r#"[{"question": "Pick", "options": ["one", "two"], "answer": "b"}]"#;
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(correct_of(&questions[0]), Some(1));
    }

    #[test]
    fn test_bracketed_prose_before_array() {
        let text = "Here are [3] questions [see below]: \
                    [{\"question\": \"Move?\", \"options\": [\"yes\", \"no\"], \"answer\": 0}] \
                    and a footnote [1].";
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "Move?");
    }

    #[test]
    fn test_client_builds_with_timeout_settings() {
        let generator = OpenAiGenerator::new(
            "http://127.0.0.1:9/v1/chat/completions".to_string(),
            None,
            "test".to_string(),
        );
        assert_eq!(generator.model, "test");
        assert!(generator.api_key.is_none());
    }

    #[test]
    fn test_malformed_items_dropped() {
        let text = r#"[
            {"question": "ok?", "options": ["yes", "no"], "answer": 0},
            {"question": "one option", "options": ["only"], "answer": 0},
            {"question": "bad index", "options": ["a", "b"], "answer": 5},
            {"options": ["a", "b"], "answer": 0}
        ]"#;
        let questions = parse_generated_questions(text).unwrap();

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "ok?");
    }

    #[test]
    fn test_no_list_is_upstream_error() {
        assert!(matches!(
            parse_generated_questions("I cannot help with that."),
            Err(AppError::BadGateway(_))
        ));
        assert!(matches!(
            parse_generated_questions("[]"),
            Err(AppError::BadGateway(_))
        ));
    }

    #[test]
    fn test_clamp_question_count() {
        assert_eq!(clamp_question_count(None), DEFAULT_QUESTION_COUNT);
        assert_eq!(clamp_question_count(Some(0)), 1);
        assert_eq!(clamp_question_count(Some(500)), MAX_GENERATED_QUESTIONS);
    }

    #[tokio::test]
    async fn test_disabled_generator() {
        let result = DisabledGenerator.generate("rust", 3).await;
        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
    }
}
