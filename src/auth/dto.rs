use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

/// Collapse runs of whitespace and trim, matching the input normalization
/// the API has always applied to display names.
pub(crate) fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn validate_name(name: &str, errors: &mut Vec<String>) {
    let len = name.chars().count();
    if !(3..=255).contains(&len) {
        errors.push("name must be between 3 and 255 characters".into());
    }
}

pub(crate) fn validate_password(password: &str, errors: &mut Vec<String>) {
    if password.len() < 6 {
        errors.push("password must be at least 6 characters".into());
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    #[serde(default)]
    pub marketing_allowed: bool,
}

impl RegisterRequest {
    /// Normalizes in place, then reports every field failure at once.
    pub fn validate(&mut self) -> Result<(), ApiError> {
        self.name = normalize_name(&self.name);
        self.email = self.email.trim().to_lowercase();

        let mut errors = Vec::new();
        validate_name(&self.name, &mut errors);
        if !is_valid_email(&self.email) {
            errors.push("email is not valid".into());
        }
        validate_password(&self.password, &mut errors);
        if self.password != self.password_confirmation {
            errors.push("passwords do not match".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub credential: String,
    #[serde(default)]
    pub marketing_allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForgotRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

impl PasswordResetRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        validate_password(&self.password, &mut errors);
        if self.password != self.password_confirmation {
            errors.push("passwords do not match".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Response returned after register, login and Google login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Value,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(name: &str, email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            password_confirmation: confirm.into(),
            marketing_allowed: false,
        }
    }

    #[test]
    fn register_normalizes_email_and_name() {
        let mut req = register("Ana   Pérez", " Ana@Example.com ", "secret1", "secret1");
        req.validate().expect("valid");
        assert_eq!(req.email, "ana@example.com");
        assert_eq!(req.name, "Ana Pérez");
    }

    #[test]
    fn register_rejects_mismatched_confirmation() {
        let mut req = register("Ana Pérez", "ana@example.com", "secret1", "other11");
        let err = req.validate().unwrap_err();
        match err {
            ApiError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("do not match")))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn register_collects_all_failures() {
        let mut req = register("ab", "nope", "123", "456");
        match req.validate().unwrap_err() {
            ApiError::Validation(errors) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn email_regex_accepts_common_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("ana.perez+tag@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example@example.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn six_char_password_passes() {
        let mut errors = Vec::new();
        validate_password("secret", &mut errors);
        assert!(errors.is_empty());
        validate_password("12345", &mut errors);
        assert_eq!(errors.len(), 1);
    }
}
