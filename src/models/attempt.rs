// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use validator::Validate;

use crate::models::question::{PublicQuestion, Subject};

/// Represents the 'attempts' table in the users store.
///
/// A denormalized snapshot of one completed quiz or mock exam: username and
/// major are copied from the user at attempt time. Rows are append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub student_id: i64,
    pub username: String,
    pub major: Option<String>,
    pub subject: String,
    pub score: f64,
    pub max_score: f64,
    pub date_taken: chrono::DateTime<chrono::Utc>,
    pub duration_seconds: Option<i64>,
}

/// DTO for starting a quiz.
#[derive(Debug, Deserialize, Validate)]
pub struct StartQuizRequest {
    pub subject: Subject,
    #[validate(range(min = 1, max = 100, message = "Items must be between 1 and 100."))]
    pub items: u32,
}

/// DTO for a freshly generated paper (quiz or mock exam).
///
/// `exam_token` carries the displayed question ids and the issue time, signed;
/// the client must echo it on submit. No exam state is kept on the server.
#[derive(Debug, Serialize)]
pub struct PaperResponse {
    pub questions: Vec<PublicQuestion>,
    pub exam_token: String,
    pub total_items: usize,
    /// Nominal time allowance in seconds; enforcement is client-side only.
    pub total_time_seconds: Option<u64>,
}

/// DTO for submitting answers.
///
/// Keys of `answers` are question ids; values are choice letters.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub exam_token: String,
    pub answers: HashMap<i64, String>,
}

/// Per-question outcome echoed back after scoring.
#[derive(Debug, Serialize)]
pub struct AnswerReview {
    pub question_text: String,
    pub selected: Option<String>,
    /// Correct letter, uppercased for display.
    pub correct: String,
    pub is_correct: bool,
    pub choices: HashMap<String, String>,
}

/// DTO for a scored submission.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub subject: String,
    pub score: i64,
    pub total_questions: usize,
    /// "MM:SS" taken, when the exam token carried a usable start time.
    pub time_taken: Option<String>,
    pub results: Vec<AnswerReview>,
    /// False when scoring succeeded but the attempt row could not be saved.
    pub attempt_saved: bool,
    pub message: String,
}
