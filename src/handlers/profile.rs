use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{error::AppError, models::attempt::Attempt, state::AppState, utils::jwt::Claims};

/// List the current student's attempt history, newest first.
pub async fn list_my_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let attempts = sqlx::query_as::<_, Attempt>(
        r#"
        SELECT id, student_id, username, major, subject, score, max_score,
               date_taken, duration_seconds
        FROM attempts
        WHERE student_id = ?
        ORDER BY date_taken DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&state.users)
    .await?;

    Ok(Json(attempts))
}
