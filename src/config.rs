// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Items drawn per subject pool when assembling a mock exam.
pub const MOCK_ITEMS_PER_SUBJECT: i64 = 150;

/// Nominal mock-exam duration reported to clients. Enforcement is client-side.
pub const MOCK_TOTAL_TIME_SECONDS: u64 = 3 * 60 * 60;

/// Lifetime of a signed exam token (quiz or mock). Generous on purpose:
/// the server never enforces the exam clock.
pub const EXAM_TOKEN_TTL_SECONDS: u64 = 6 * 60 * 60;

/// Lifetime of the short-lived tokens in the OTP and password-reset flows.
pub const PENDING_TOKEN_TTL_SECONDS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub users_database_url: String,
    pub questions_database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub brevo_api_key: String,
    pub sender_email: String,
    pub sender_name: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let users_database_url =
            env::var("USERS_DATABASE_URL").expect("USERS_DATABASE_URL must be set");

        let questions_database_url =
            env::var("QUESTIONS_DATABASE_URL").expect("QUESTIONS_DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let brevo_api_key = env::var("BREVO_API_KEY").expect("BREVO_API_KEY must be set");

        let sender_email = env::var("SENDER_EMAIL").expect("SENDER_EMAIL must be set");

        let sender_name =
            env::var("SENDER_NAME").unwrap_or_else(|_| "Exam Reviewer".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();
        let admin_email = env::var("ADMIN_EMAIL").ok();

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            users_database_url,
            questions_database_url,
            jwt_secret,
            jwt_expiration,
            brevo_api_key,
            sender_email,
            sender_name,
            admin_username,
            admin_password,
            admin_email,
            rust_log,
        }
    }
}
