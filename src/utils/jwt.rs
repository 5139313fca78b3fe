// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::question::Subject, state::AppState};

/// Full bearer token: grants access to the API.
pub const SCOPE_AUTH: &str = "auth";
/// Credentials verified, OTP pending. Grants nothing but verify/resend.
pub const SCOPE_OTP: &str = "otp";
/// Password-reset OTP pending.
pub const SCOPE_RESET: &str = "reset";
/// Reset OTP verified; allows one password change while the token lives.
pub const SCOPE_SET_PASSWORD: &str = "set_password";

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STUDENT: &str = "student";

pub const EXAM_KIND_QUIZ: &str = "quiz";
pub const EXAM_KIND_MOCK: &str = "mock";

/// JWT Claims structure for user tokens.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role ('student' or 'admin').
    pub role: String,
    /// Which stage of the auth flow this token belongs to.
    pub scope: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Claims for a signed exam token. The displayed question ids and the issue
/// time travel with the client instead of living in server-side session
/// state.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExamClaims {
    pub sub: String,
    /// "quiz" or "mock".
    pub kind: String,
    pub subject: Option<Subject>,
    pub question_ids: Vec<i64>,
    /// Issue time, used to derive the attempt duration on submit.
    pub iat: usize,
    pub exp: usize,
}

fn unix_now() -> Result<usize, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize)
}

/// Signs a user token with the given scope.
pub fn sign_token(
    id: i64,
    role: &str,
    scope: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        scope: scope.to_owned(),
        exp: unix_now()? + expiration_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a user token.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Verifies a user token and requires a specific scope.
/// A pending-OTP token presented where a bearer token is expected (or the
/// other way round) is rejected.
pub fn verify_scoped(token: &str, secret: &str, scope: &str) -> Result<Claims, AppError> {
    let claims = verify_token(token, secret)?;
    if claims.scope != scope {
        return Err(AppError::AuthError("Invalid token".to_string()));
    }
    Ok(claims)
}

/// Signs an exam token carrying the displayed question ids.
pub fn sign_exam_token(
    user_id: i64,
    kind: &str,
    subject: Option<Subject>,
    question_ids: Vec<i64>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let iat = unix_now()?;
    let claims = ExamClaims {
        sub: user_id.to_string(),
        kind: kind.to_owned(),
        subject,
        question_ids,
        iat,
        exp: iat + expiration_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies an exam token of the expected kind and ownership.
pub fn verify_exam_token(
    token: &str,
    secret: &str,
    kind: &str,
    user_id: i64,
) -> Result<ExamClaims, AppError> {
    let token_data = decode::<ExamClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid or expired exam token".to_string()))?;

    let claims = token_data.claims;
    if claims.kind != kind || claims.sub != user_id.to_string() {
        return Err(AppError::AuthError(
            "Invalid or expired exam token".to_string(),
        ));
    }
    Ok(claims)
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// Only full bearer tokens (scope 'auth') pass; pending OTP/reset tokens do
/// not grant access. If valid, injects `Claims` into the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_scoped(token, &state.config.jwt_secret, SCOPE_AUTH) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`. Checks if the injected `Claims` has
/// the 'admin' role. If not, returns 403 Forbidden.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if claims.role != ROLE_ADMIN {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
