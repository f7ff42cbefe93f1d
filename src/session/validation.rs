//! Local checks run before any credential leaves the device.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, FieldViolation, Result};

/// Minimum password length accepted by the login form.
pub const MIN_LOGIN_PASSWORD_LEN: usize = 6;

/// Minimum password length accepted when choosing a new password.
pub const MIN_NEW_PASSWORD_LEN: usize = 8;

/// Characters that satisfy the "special character" password rule.
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*";

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^\S+@\S+\.\S+$").ok())
        .as_ref()
}

/// Whether `email` looks like an address.
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_some_and(|re| re.is_match(email.trim()))
}

fn email_violation(email: &str) -> Option<FieldViolation> {
    if email.trim().is_empty() {
        Some(FieldViolation::new("email", "Email is required"))
    } else if !is_valid_email(email) {
        Some(FieldViolation::new("email", "Email is invalid"))
    } else {
        None
    }
}

/// Validate login input.
pub fn validate_login(email: &str, password: &str) -> Result<()> {
    let mut violations: Vec<FieldViolation> = email_violation(email).into_iter().collect();
    if password.is_empty() {
        violations.push(FieldViolation::new("password", "Password is required"));
    } else if password.chars().count() < MIN_LOGIN_PASSWORD_LEN {
        violations.push(FieldViolation::new(
            "password",
            format!("Password must be at least {MIN_LOGIN_PASSWORD_LEN} characters"),
        ));
    }
    into_result(violations)
}

/// Validate an email on its own (password reset request).
pub fn validate_email(email: &str) -> Result<()> {
    into_result(email_violation(email).into_iter().collect())
}

/// Validate a newly chosen password.
pub fn validate_new_password(password: &str) -> Result<()> {
    let mut violations = Vec::new();
    if password.chars().count() < MIN_NEW_PASSWORD_LEN {
        violations.push(FieldViolation::new(
            "password",
            format!("Min {MIN_NEW_PASSWORD_LEN} characters required"),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push(FieldViolation::new("password", "One uppercase required"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push(FieldViolation::new("password", "One lowercase required"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push(FieldViolation::new("password", "One number required"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        violations.push(FieldViolation::new("password", "One special char required"));
    }
    into_result(violations)
}

fn into_result(violations: Vec<FieldViolation>) -> Result<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(violations))
    }
}
