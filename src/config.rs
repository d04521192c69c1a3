// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Hard upper bound on questions the AI generator is asked for.
pub const MAX_GENERATED_QUESTIONS: u32 = 20;

/// Length of a course join code.
pub const JOIN_CODE_LENGTH: usize = 6;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    /// OpenAI-compatible chat completions endpoint. Generation is disabled when unset.
    pub ai_api_url: Option<String>,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quizpoll.db?mode=rwc".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let ai_api_url = env::var("AI_API_URL").ok().filter(|v| !v.is_empty());
        let ai_api_key = env::var("AI_API_KEY").ok().filter(|v| !v.is_empty());
        let ai_model = env::var("AI_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            ai_api_url,
            ai_api_key,
            ai_model,
        }
    }
}
