// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::PENDING_TOKEN_TTL_SECONDS,
    error::AppError,
    models::user::{
        ForgotPasswordRequest, LoginRequest, RegisterRequest, ResendOtpRequest, ResetOtpRequest,
        SetPasswordRequest, User, VerifyOtpRequest,
    },
    state::AppState,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{
            ROLE_ADMIN, ROLE_STUDENT, SCOPE_AUTH, SCOPE_OTP, SCOPE_RESET, SCOPE_SET_PASSWORD,
            sign_token, verify_scoped,
        },
        otp::generate_otp,
    },
};

const USER_COLUMNS: &str =
    "id, username, email, password, cellphone, major, is_admin, otp_code";

async fn fetch_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

fn role_of(user: &User) -> &'static str {
    if user.is_admin { ROLE_ADMIN } else { ROLE_STUDENT }
}

/// Generates a fresh OTP, stores it on the user record and emails it.
/// A failed send is a hard failure: the caller surfaces it and the user must
/// retry; there is no queue and no backoff.
async fn issue_and_send_otp(state: &AppState, user: &User) -> Result<(), AppError> {
    let code = generate_otp();

    sqlx::query("UPDATE users SET otp_code = ? WHERE id = ?")
        .bind(&code)
        .bind(user.id)
        .execute(&state.users)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store OTP: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    state.mailer.send_otp(&user.email, &user.username, &code).await
}

/// Compares a submitted code to the stored one; clears the stored code on
/// success. A cleared code never matches again.
async fn verify_user_otp(
    pool: &SqlitePool,
    user: &User,
    submitted: &str,
) -> Result<bool, AppError> {
    let matches = match &user.otp_code {
        Some(stored) => stored == submitted,
        None => false,
    };

    if matches {
        sqlx::query("UPDATE users SET otp_code = NULL WHERE id = ?")
            .bind(user.id)
            .execute(pool)
            .await?;
    }

    Ok(matches)
}

/// Registers a new student account.
///
/// Hashes the password using Argon2 before storing it.
/// Duplicate usernames and duplicate emails are rejected separately, with
/// distinct messages.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.password != payload.confirm_password {
        return Err(AppError::BadRequest(
            "Passwords do not match. Please try again.".to_string(),
        ));
    }

    let username_taken =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(&payload.username)
            .fetch_one(&state.users)
            .await?;
    if username_taken > 0 {
        return Err(AppError::Conflict(
            "Username already exists. Please choose a different one.".to_string(),
        ));
    }

    let email_taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&payload.email)
        .fetch_one(&state.users)
        .await?;
    if email_taken > 0 {
        return Err(AppError::Conflict(
            "Email already registered. Please use a different email.".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO users (username, email, password, cellphone, major)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&payload.username)
    .bind(&payload.email)
    .bind(&hashed_password)
    .bind(&payload.cellphone)
    .bind(&payload.major)
    .fetch_one(&state.users)
    .await
    .map_err(|e| {
        tracing::error!("Failed to register user: {:?}", e);
        AppError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "username": payload.username,
            "message": format!("Registration successful! Welcome, {}!", payload.username),
        })),
    ))
}

/// First login step: verifies credentials, issues an OTP and emails it.
///
/// Returns a short-lived pending token (scope 'otp'); no API access is
/// granted until the code is verified.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(&payload.username)
    .fetch_optional(&state.users)
    .await
    .map_err(|e| {
        tracing::error!("Login DB error: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let user = user.ok_or(AppError::AuthError(
        "Invalid username or password.".to_string(),
    ))?;

    let is_valid = verify_password(&payload.password, &user.password)?;
    if !is_valid {
        return Err(AppError::AuthError(
            "Invalid username or password.".to_string(),
        ));
    }

    issue_and_send_otp(&state, &user).await?;

    let pending_token = sign_token(
        user.id,
        role_of(&user),
        SCOPE_OTP,
        &state.config.jwt_secret,
        PENDING_TOKEN_TTL_SECONDS,
    )?;

    Ok(Json(json!({
        "pending_token": pending_token,
        "message": "OTP sent to your email. Please check your inbox.",
    })))
}

/// Second login step: checks the submitted code against the stored one.
///
/// On success the stored code is cleared and a full bearer token is issued.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_scoped(&payload.pending_token, &state.config.jwt_secret, SCOPE_OTP)
        .map_err(|_| AppError::AuthError("Session expired. Please log in again.".to_string()))?;

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let user = fetch_user_by_id(&state.users, user_id)
        .await?
        .ok_or(AppError::NotFound(
            "User not found. Please log in again.".to_string(),
        ))?;

    if !verify_user_otp(&state.users, &user, &payload.otp_code).await? {
        return Err(AppError::AuthError(
            "Invalid or expired OTP. Please try again.".to_string(),
        ));
    }

    let token = sign_token(
        user.id,
        role_of(&user),
        SCOPE_AUTH,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "is_admin": user.is_admin,
        "message": format!("Welcome back, {}!", user.username),
    })))
}

/// Re-issues the pending OTP and emails it again.
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_scoped(&payload.pending_token, &state.config.jwt_secret, SCOPE_OTP)
        .map_err(|_| AppError::AuthError("Session expired. Please log in again.".to_string()))?;

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let user = fetch_user_by_id(&state.users, user_id)
        .await?
        .ok_or(AppError::NotFound(
            "User not found. Please log in again.".to_string(),
        ))?;

    issue_and_send_otp(&state, &user).await?;

    Ok(Json(json!({
        "message": "OTP resent to your email. Please check your inbox.",
    })))
}

/// Starts a password reset: issues an OTP to the account email.
///
/// Returns a pending reset token (scope 'reset') gating the verify step.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(&payload.email)
    .fetch_optional(&state.users)
    .await?
    .ok_or(AppError::NotFound(
        "Email not found. Please try again.".to_string(),
    ))?;

    issue_and_send_otp(&state, &user).await?;

    let reset_token = sign_token(
        user.id,
        role_of(&user),
        SCOPE_RESET,
        &state.config.jwt_secret,
        PENDING_TOKEN_TTL_SECONDS,
    )?;

    Ok(Json(json!({
        "reset_token": reset_token,
        "message": "OTP sent to your email. Please check your inbox.",
    })))
}

/// Verifies the password-reset OTP.
///
/// On success, returns a short-lived token (scope 'set_password') that allows
/// the password change.
pub async fn reset_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResetOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_scoped(&payload.reset_token, &state.config.jwt_secret, SCOPE_RESET)
        .map_err(|_| AppError::AuthError("Invalid session. Please try again.".to_string()))?;

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let user = fetch_user_by_id(&state.users, user_id)
        .await?
        .ok_or(AppError::NotFound(
            "User not found. Please log in again.".to_string(),
        ))?;

    if !verify_user_otp(&state.users, &user, &payload.otp_code).await? {
        return Err(AppError::AuthError(
            "Invalid or expired OTP. Please try again.".to_string(),
        ));
    }

    let token = sign_token(
        user.id,
        role_of(&user),
        SCOPE_SET_PASSWORD,
        &state.config.jwt_secret,
        PENDING_TOKEN_TTL_SECONDS,
    )?;

    Ok(Json(json!({
        "token": token,
        "message": "OTP verified. Please set your new password.",
    })))
}

/// Final reset step: stores the new password hash.
pub async fn set_password(
    State(state): State<AppState>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_scoped(&payload.token, &state.config.jwt_secret, SCOPE_SET_PASSWORD)
        .map_err(|_| {
            AppError::AuthError("Access denied. Please verify OTP first.".to_string())
        })?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.password != payload.confirm_password {
        return Err(AppError::BadRequest(
            "Passwords do not match or are empty. Please try again.".to_string(),
        ));
    }

    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let hashed = hash_password(&payload.password)?;

    let result = sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(user_id)
        .execute(&state.users)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "User not found. Please log in again.".to_string(),
        ));
    }

    Ok(Json(json!({
        "message": "Password reset successful! You can now log in with your new password.",
    })))
}
