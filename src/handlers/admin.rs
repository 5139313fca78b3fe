// src/handlers/admin.rs

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use axum::{
    Json,
    extract::{Multipart, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    error::AppError,
    import::{ParseOutcome, csv::parse_csv, docx::parse_docx},
    models::{attempt::Attempt, question::{Question, Subject}, user::StudentResponse},
    state::AppState,
};

/// Lists all student accounts (admins excluded).
/// Admin only.
pub async fn list_students(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let students = sqlx::query_as::<_, StudentResponse>(
        r#"
        SELECT id, username, email, cellphone, major
        FROM users
        WHERE is_admin = 0
        ORDER BY id
        "#,
    )
    .fetch_all(&state.users)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list students: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(students))
}

/// Lists every recorded attempt, newest first.
/// Admin only.
pub async fn list_attempts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, student_id, username, major, subject, score, max_score,
               date_taken, duration_seconds
        FROM attempts
        ORDER BY date_taken DESC
        "#,
    )
    .fetch_all(&state.users)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Lists the whole question bank, grouped by subject tag.
/// Every subject appears in the response, empty or not.
/// Admin only.
pub async fn list_questions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, subject, question_text, choice_a, choice_b, choice_c, choice_d, correct_answer
        FROM questions
        ORDER BY subject, id
        "#,
    )
    .fetch_all(&state.questions)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let mut by_subject: BTreeMap<&'static str, Vec<Question>> = Subject::ALL
        .iter()
        .map(|s| (s.as_str(), Vec::new()))
        .collect();

    for q in questions {
        by_subject.entry(q.subject.as_str()).or_default().push(q);
    }

    Ok(Json(by_subject))
}

/// Bulk-imports questions from an uploaded `.csv` or `.docx` file.
///
/// Multipart fields: `file` (the upload) and `subject_tag` (one of the fixed
/// enumeration). Question text already present in the bank, or repeated
/// within the batch, is skipped as a duplicate and never inserted twice.
/// Admin only.
pub async fn upload_questions(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut subject_tag: Option<String> = None;
    let mut file_name: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("subject_tag") => {
                subject_tag = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?,
                );
            }
            Some("file") => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let subject = subject_tag
        .as_deref()
        .and_then(|t| Subject::from_str(t).ok())
        .ok_or(AppError::BadRequest(
            "Upload failed: Missing file or invalid subject.".to_string(),
        ))?;

    let (file_name, file_data) = match (file_name, file_data) {
        (Some(name), Some(data)) if !name.is_empty() => (name, data),
        _ => {
            return Err(AppError::BadRequest(
                "Upload failed: Missing file or invalid subject.".to_string(),
            ));
        }
    };

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    let outcome: ParseOutcome = match extension.as_deref() {
        Some("csv") => parse_csv(&file_data)?,
        Some("docx") => parse_docx(&file_data)?,
        _ => {
            return Err(AppError::BadRequest(
                "Upload failed: File type not allowed (must be CSV or DOCX).".to_string(),
            ));
        }
    };

    let mut inserted = 0usize;
    let mut duplicates = 0usize;
    let mut seen_in_batch: HashSet<String> = HashSet::new();

    let mut tx = state.questions.begin().await?;

    for q in &outcome.questions {
        if !seen_in_batch.insert(q.question_text.clone()) {
            duplicates += 1;
            continue;
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM questions WHERE question_text = ?",
        )
        .bind(&q.question_text)
        .fetch_one(&mut *tx)
        .await?;

        if existing > 0 {
            duplicates += 1;
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO questions
            (subject, question_text, choice_a, choice_b, choice_c, choice_d, correct_answer)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subject)
        .bind(&q.question_text)
        .bind(&q.choice_a)
        .bind(&q.choice_b)
        .bind(&q.choice_c)
        .bind(&q.choice_d)
        .bind(&q.correct_answer)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert question: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        inserted += 1;
    }

    tx.commit().await?;

    let mut message = format!(
        "Processed {} rows. Added {} new questions.",
        inserted + duplicates,
        inserted
    );
    if duplicates > 0 {
        message.push_str(&format!(" ({} duplicates skipped.)", duplicates));
    }

    tracing::info!(
        "Imported {} questions under '{}' ({} duplicates, {} malformed rows)",
        inserted,
        subject,
        duplicates,
        outcome.skipped
    );

    Ok(Json(serde_json::json!({
        "subject": subject,
        "added": inserted,
        "duplicates_skipped": duplicates,
        "rows_skipped": outcome.skipped,
        "warnings": outcome.warnings,
        "message": message,
    })))
}

/// DTO for batch deletion.
#[derive(Debug, Deserialize)]
pub struct DeleteQuestionsRequest {
    pub ids: Vec<i64>,
}

/// Deletes a batch of questions by id.
/// Admin only.
pub async fn delete_questions(
    State(state): State<AppState>,
    Json(payload): Json<DeleteQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.ids.is_empty() {
        return Err(AppError::BadRequest(
            "No questions were selected for deletion.".to_string(),
        ));
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new("DELETE FROM questions WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in &payload.ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let result = query_builder
        .build()
        .execute(&state.questions)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete questions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(serde_json::json!({
        "deleted": result.rows_affected(),
        "message": format!("Successfully deleted {} question(s).", result.rows_affected()),
    })))
}
