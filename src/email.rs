// src/email.rs

use async_trait::async_trait;
use serde_json::json;

use crate::{config::Config, error::AppError};

const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

/// Outbound transactional email.
///
/// One concern, one seam: OTP delivery. Tests plug in a capturing double.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a one-time passcode to the given recipient.
    /// A send failure is a hard failure for the caller; there is no retry.
    async fn send_otp(&self, to_email: &str, to_name: &str, code: &str) -> Result<(), AppError>;
}

/// Brevo (transactional email API) implementation.
pub struct BrevoMailer {
    client: reqwest::Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl BrevoMailer {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.brevo_api_key.clone(),
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
        }
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    async fn send_otp(&self, to_email: &str, to_name: &str, code: &str) -> Result<(), AppError> {
        let html_content = format!(
            "<html>\
               <body>\
                 <h2>OTP Verification</h2>\
                 <p>Hello {to_name},</p>\
                 <h1>{code}</h1>\
                 <p>This code is valid for 5 minutes.</p>\
               </body>\
             </html>"
        );

        let body = json!({
            "sender": { "email": self.sender_email, "name": self.sender_name },
            "to": [{ "email": to_email, "name": to_name }],
            "subject": "Your OTP Code",
            "htmlContent": html_content,
        });

        let response = self
            .client
            .post(BREVO_SEND_URL)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Brevo request failed: {}", e);
                AppError::ServiceUnavailable(
                    "Failed to send OTP email. Please try again later.".to_string(),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::error!("Brevo rejected the email ({}): {}", status, detail);
            return Err(AppError::ServiceUnavailable(
                "Failed to send OTP email. Please try again later.".to_string(),
            ));
        }

        tracing::info!("OTP email sent to {}", to_email);
        Ok(())
    }
}
