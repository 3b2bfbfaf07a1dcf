//! Input validation utilities
//!
//! Validation runs in the handlers before any workflow logic; invalid input
//! never reaches the registration store. Failures use a framework-style
//! envelope (`{"message", "errors"}`, HTTP 422) distinct from the workflow
//! error envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Accumulated field validation errors
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: BTreeMap<&'static str, Vec<String>>,
    first_message: Option<String>,
}

impl ValidationErrors {
    /// Record a failed rule for a field
    pub fn add(&mut self, field: &'static str, message: String) {
        if self.first_message.is_none() {
            self.first_message = Some(message.clone());
        }
        self.errors.entry(field).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok when no rule failed, Err(self) otherwise
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        let message = self
            .first_message
            .unwrap_or_else(|| "The given data was invalid".to_string());

        let body = Json(json!({
            "message": message,
            "errors": self.errors,
        }));

        (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
    }
}

/// Validate email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.chars().count() > 255 {
        return Err("Email must be at most 255 characters".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Email must be a valid email address".to_string());
    }

    Ok(())
}

/// Validate registration password: 8-32 characters, at least one letter and one digit
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let length = password.chars().count();
    if !(8..=32).contains(&length) {
        return Err("Password must be between 8 and 32 characters".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

/// Validate nickname: 1-10 characters
pub fn validate_nickname(nickname: &str) -> Result<(), String> {
    if nickname.is_empty() {
        return Err("Nickname is required".to_string());
    }

    if nickname.chars().count() > 10 {
        return Err("Nickname must be at most 10 characters".to_string());
    }

    Ok(())
}

/// Validate verification code shape: exactly 6 digits
pub fn validate_code(code: &str) -> Result<(), String> {
    if code.is_empty() {
        return Err("Verification code is required".to_string());
    }

    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err("Verification code must be 6 digits".to_string());
    }

    Ok(())
}

/// Validate the send-code request body
pub fn validate_send_code(
    email: &str,
    password: &str,
    nickname: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Err(message) = validate_email(email) {
        errors.add("email", message);
    }
    if let Err(message) = validate_password(password) {
        errors.add("password", message);
    }
    if let Err(message) = validate_nickname(nickname) {
        errors.add("nickname", message);
    }

    errors.into_result()
}

/// Validate the resend-code request body
pub fn validate_resend_code(email: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Err(message) = validate_email(email) {
        errors.add("email", message);
    }

    errors.into_result()
}

/// Validate the verify request body
pub fn validate_verify_code(email: &str, code: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if let Err(message) = validate_email(email) {
        errors.add("email", message);
    }
    if let Err(message) = validate_code(code) {
        errors.add("code", message);
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user.name+tag@sub.example.co.jp").is_ok());
    }

    #[test]
    fn test_invalid_email() {
        assert!(validate_email("").is_err());
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("user@").is_err());
        let long_local = "a".repeat(244);
        assert!(validate_email(&format!("{}@example.com", long_local)).is_err());
    }

    #[test]
    fn test_valid_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("a2345678").is_ok());
    }

    #[test]
    fn test_invalid_password() {
        assert!(validate_password("").is_err());
        assert!(validate_password("short1").is_err());
        assert!(validate_password(&format!("{}1", "a".repeat(32))).is_err());
        // Letters only / digits only
        assert!(validate_password("abcdefgh").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn test_nickname_length_counts_chars() {
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("Nick").is_ok());
        // Multibyte characters count as one character each
        assert!(validate_nickname(&"あ".repeat(10)).is_ok());
        assert!(validate_nickname(&"あ".repeat(11)).is_err());
    }

    #[test]
    fn test_code_shape() {
        assert!(validate_code("000000").is_ok());
        assert!(validate_code("123456").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("12345").is_err());
        assert!(validate_code("1234567").is_err());
        assert!(validate_code("12345a").is_err());
    }

    #[test]
    fn test_send_code_collects_all_field_errors() {
        let errors = validate_send_code("bad", "short", "").unwrap_err();
        assert!(!errors.is_empty());
        assert_eq!(errors.errors.len(), 3);
    }
}
