//! Email configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Email configuration (Resend)
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Resend API key
    pub resend_api_key: SecretString,

    /// From email address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// From name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Receives dispute alerts
    #[serde(default = "default_operations_email")]
    pub operations_email: String,
}

impl EmailConfig {
    /// Get formatted "From" header value
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    /// Validate email configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.resend_api_key.expose_secret();
        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("RESEND_API_KEY"));
        }
        if !api_key.starts_with("re_") {
            return Err(ValidationError::InvalidResendKey);
        }
        if !self.from_email.contains('@') {
            return Err(ValidationError::InvalidFromEmail);
        }
        if !self.operations_email.contains('@') {
            return Err(ValidationError::InvalidOperationsEmail);
        }
        Ok(())
    }
}

fn default_from_email() -> String {
    "noreply@coursepay.dev".to_string()
}

fn default_from_name() -> String {
    "Course Enrollment".to_string()
}

fn default_operations_email() -> String {
    "billing-ops@coursepay.dev".to_string()
}
