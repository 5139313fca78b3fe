// src/handlers/mock.rs

use std::str::FromStr;

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{
    config::{EXAM_TOKEN_TTL_SECONDS, MOCK_ITEMS_PER_SUBJECT, MOCK_TOTAL_TIME_SECONDS},
    error::AppError,
    handlers::quiz::{
        elapsed_since, format_duration, questions_by_ids, random_questions, save_attempt,
        score_answers,
    },
    models::{
        attempt::{PaperResponse, ScoreResponse, SubmitRequest},
        question::{PublicQuestion, Subject},
    },
    state::AppState,
    utils::jwt::{Claims, EXAM_KIND_MOCK, sign_exam_token, verify_exam_token},
};

/// Attempt rows for mock exams carry this label instead of a subject tag.
pub(crate) const MOCK_SUBJECT_LABEL: &str = "Mock Exam";

/// Starts a mock exam.
///
/// Aggregates three pools at a fixed item count each: general education,
/// professional education, and the examinee's registered major. A major that
/// is not a recognized specialization tag contributes an empty pool.
/// The 3-hour allowance is reported, not enforced.
pub async fn start_mock(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let major = sqlx::query_scalar::<_, Option<String>>("SELECT major FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.users)
        .await?
        .flatten();

    let mut pools = vec![Subject::GenEd, Subject::ProfEd];
    if let Some(subject) = major.as_deref().and_then(|m| Subject::from_str(m).ok()) {
        if subject.is_specialization() {
            pools.push(subject);
        }
    }

    let mut questions = Vec::new();
    for subject in pools {
        let drawn =
            random_questions(&state.questions, subject, MOCK_ITEMS_PER_SUBJECT).await?;
        tracing::debug!("Mock pool {}: drew {} questions", subject, drawn.len());
        questions.extend(drawn);
    }

    if questions.is_empty() {
        return Err(AppError::NotFound(
            "No questions available for the mock exam.".to_string(),
        ));
    }

    // The token carries the start time only. Mock submission scores whatever
    // ids arrive; it deliberately does not check them against the displayed
    // set (see DESIGN.md).
    let exam_token = sign_exam_token(
        user_id,
        EXAM_KIND_MOCK,
        None,
        Vec::new(),
        &state.config.jwt_secret,
        EXAM_TOKEN_TTL_SECONDS,
    )?;

    let total_items = questions.len();
    Ok(Json(PaperResponse {
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
        exam_token,
        total_items,
        total_time_seconds: Some(MOCK_TOTAL_TIME_SECONDS),
    }))
}

/// Submits a mock exam and scores it.
///
/// Unlike quiz submission, the submitted id set is taken at face value.
pub async fn submit_mock(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let exam = verify_exam_token(
        &payload.exam_token,
        &state.config.jwt_secret,
        EXAM_KIND_MOCK,
        user_id,
    )?;

    let submitted_ids: Vec<i64> = payload.answers.keys().copied().collect();
    if submitted_ids.is_empty() {
        return Err(AppError::BadRequest(
            "No answers were submitted.".to_string(),
        ));
    }

    let questions = questions_by_ids(&state.questions, &submitted_ids).await?;
    if questions.is_empty() {
        return Err(AppError::BadRequest(
            "No answers were submitted.".to_string(),
        ));
    }

    let (score, results) = score_answers(&questions, &payload.answers);
    let total_questions = questions.len();

    let duration_seconds = elapsed_since(exam.iat);
    let attempt_saved = save_attempt(
        &state.users,
        user_id,
        MOCK_SUBJECT_LABEL,
        score,
        total_questions,
        duration_seconds,
    )
    .await;

    let message = if attempt_saved {
        format!(
            "Mock Exam submitted! You scored {} out of {}.",
            score, total_questions
        )
    } else {
        "Mock Exam submission recorded, but failed to save to history.".to_string()
    };

    Ok(Json(ScoreResponse {
        subject: MOCK_SUBJECT_LABEL.to_string(),
        score,
        total_questions,
        time_taken: duration_seconds.map(format_duration),
        results,
        attempt_saved,
        message,
    }))
}
