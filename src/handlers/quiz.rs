// src/handlers/quiz.rs

use std::collections::{HashMap, HashSet};

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::{
    config::EXAM_TOKEN_TTL_SECONDS,
    error::AppError,
    models::{
        attempt::{AnswerReview, PaperResponse, ScoreResponse, StartQuizRequest, SubmitRequest},
        question::{PublicQuestion, Question, Subject},
    },
    state::AppState,
    utils::jwt::{Claims, EXAM_KIND_QUIZ, sign_exam_token, verify_exam_token},
};

/// Fetches `limit` random questions for one subject.
/// `ORDER BY RANDOM()` keeps the sampling in the database; there is no seed
/// control.
pub(crate) async fn random_questions(
    pool: &SqlitePool,
    subject: Subject,
    limit: i64,
) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, subject, question_text, choice_a, choice_b, choice_c, choice_d, correct_answer
        FROM questions
        WHERE subject = ?
        ORDER BY RANDOM()
        LIMIT ?
        "#,
    )
    .bind(subject)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch questions for {}: {:?}", subject, e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(questions)
}

/// Fetches questions by id, in no particular order.
pub(crate) async fn questions_by_ids(
    pool: &SqlitePool,
    ids: &[i64],
) -> Result<Vec<Question>, AppError> {
    let mut query_builder = QueryBuilder::<Sqlite>::new(
        "SELECT id, subject, question_text, choice_a, choice_b, choice_c, choice_d, correct_answer \
         FROM questions WHERE id IN (",
    );

    let mut separated = query_builder.separated(",");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let questions: Vec<Question> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(questions)
}

/// Scores a set of answers against the fetched questions.
///
/// Comparison is case-insensitive and exact-match only; a missing, empty or
/// non-matching answer scores zero for that question.
pub(crate) fn score_answers(
    questions: &[Question],
    answers: &HashMap<i64, String>,
) -> (i64, Vec<AnswerReview>) {
    let mut score = 0;
    let mut results = Vec::with_capacity(questions.len());

    for q in questions {
        let selected = answers.get(&q.id).filter(|a| !a.is_empty()).cloned();
        let is_correct = selected
            .as_deref()
            .map(|a| a.eq_ignore_ascii_case(&q.correct_answer))
            .unwrap_or(false);

        if is_correct {
            score += 1;
        }

        results.push(AnswerReview {
            question_text: q.question_text.clone(),
            selected,
            correct: q.correct_answer.to_uppercase(),
            is_correct,
            choices: HashMap::from([
                ("A".to_string(), q.choice_a.clone()),
                ("B".to_string(), q.choice_b.clone()),
                ("C".to_string(), q.choice_c.clone()),
                ("D".to_string(), q.choice_d.clone()),
            ]),
        });
    }

    (score, results)
}

/// Formats a duration as MM:SS for the results view.
pub(crate) fn format_duration(seconds: i64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Seconds elapsed since the exam token was issued, if the clock cooperates.
pub(crate) fn elapsed_since(iat: usize) -> Option<i64> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs() as i64;
    let elapsed = now - iat as i64;
    (elapsed >= 0).then_some(elapsed)
}

/// Persists one attempt row. The users store and the questions store share no
/// transaction, so this can fail after scoring succeeded; the caller degrades
/// the response instead of discarding the score.
pub(crate) async fn save_attempt(
    pool: &SqlitePool,
    student_id: i64,
    subject: &str,
    score: i64,
    max_score: usize,
    duration_seconds: Option<i64>,
) -> bool {
    let student = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT username, major FROM users WHERE id = ?",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await;

    let (username, major) = match student {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::error!("Attempt save failed: user {} not found", student_id);
            return false;
        }
        Err(e) => {
            tracing::error!("Attempt save failed: {:?}", e);
            return false;
        }
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO attempts
        (student_id, username, major, subject, score, max_score, date_taken, duration_seconds)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(student_id)
    .bind(&username)
    .bind(&major)
    .bind(subject)
    .bind(score as f64)
    .bind(max_score as f64)
    .bind(chrono::Utc::now())
    .bind(duration_seconds)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to save attempt: {:?}", e);
            false
        }
    }
}

/// Starts a quiz: samples N random questions for the chosen subject.
///
/// The response carries the questions (answers withheld) and a signed exam
/// token embedding the displayed question ids and the issue time. The token
/// must be echoed on submit.
pub async fn start_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let questions =
        random_questions(&state.questions, payload.subject, payload.items as i64).await?;

    if questions.is_empty() {
        return Err(AppError::NotFound(
            "No questions available for this subject.".to_string(),
        ));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();

    let exam_token = sign_exam_token(
        user_id,
        EXAM_KIND_QUIZ,
        Some(payload.subject),
        question_ids,
        &state.config.jwt_secret,
        EXAM_TOKEN_TTL_SECONDS,
    )?;

    let total_items = questions.len();
    Ok(Json(PaperResponse {
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
        exam_token,
        total_items,
        total_time_seconds: None,
    }))
}

/// Submits a quiz and scores it.
///
/// The submitted question-id set must equal the displayed-id set carried by
/// the exam token; any mismatch aborts scoring. The attempt is persisted
/// append-only; a persistence failure degrades the response rather than
/// erroring.
pub async fn submit_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let exam = verify_exam_token(
        &payload.exam_token,
        &state.config.jwt_secret,
        EXAM_KIND_QUIZ,
        user_id,
    )?;

    let displayed: HashSet<i64> = exam.question_ids.iter().copied().collect();
    let submitted: HashSet<i64> = payload.answers.keys().copied().collect();

    if displayed != submitted {
        return Err(AppError::BadRequest(
            "Question mismatch detected. Scoring aborted.".to_string(),
        ));
    }

    let questions = questions_by_ids(&state.questions, &exam.question_ids).await?;

    // The bank may have shrunk between start and submit (admin batch delete).
    if questions.len() != displayed.len() {
        return Err(AppError::BadRequest(
            "Question mismatch detected. Scoring aborted.".to_string(),
        ));
    }

    let (score, results) = score_answers(&questions, &payload.answers);
    let total_questions = questions.len();

    let subject = exam
        .subject
        .map(|s| s.to_string())
        .unwrap_or_else(|| "quiz".to_string());

    let duration_seconds = elapsed_since(exam.iat);
    let attempt_saved = save_attempt(
        &state.users,
        user_id,
        &subject,
        score,
        total_questions,
        duration_seconds,
    )
    .await;

    let message = if attempt_saved {
        format!(
            "Quiz submitted! You scored {} out of {}.",
            score, total_questions
        )
    } else {
        "Quiz submission recorded, but failed to save to history.".to_string()
    };

    Ok(Json(ScoreResponse {
        subject,
        score,
        total_questions,
        time_taken: duration_seconds.map(format_duration),
        results,
        attempt_saved,
        message,
    }))
}
