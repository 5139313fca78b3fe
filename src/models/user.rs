// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the users store.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Unique email address, the OTP delivery target.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub cellphone: String,

    /// Declared major/specialization. Drives the third mock-exam pool.
    pub major: Option<String>,

    pub is_admin: bool,

    /// Pending one-time passcode. Cleared on successful verification.
    #[serde(skip)]
    pub otp_code: Option<String>,
}

/// Student row exposed to the admin listing (no credential material).
#[derive(Debug, Serialize, FromRow)]
pub struct StudentResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub cellphone: String,
    pub major: Option<String>,
}

/// DTO for registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(min = 4, max = 128))]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 50, message = "Cellphone is required."))]
    pub cellphone: String,
    #[validate(length(min = 1, max = 50, message = "Major is required."))]
    pub major: String,
}

/// DTO for the first login step (credentials check, triggers the OTP email).
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for the second login step.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub pending_token: String,
    pub otp_code: String,
}

/// DTO for requesting a fresh OTP while one is pending.
#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub pending_token: String,
}

/// DTO for starting a password reset.
#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

/// DTO for verifying the password-reset OTP.
#[derive(Debug, Deserialize)]
pub struct ResetOtpRequest {
    pub reset_token: String,
    pub otp_code: String,
}

/// DTO for the final password-reset step.
#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    pub token: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    pub confirm_password: String,
}
