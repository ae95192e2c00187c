use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Validates an email taken from a path or query parameter.
///
/// Request bodies are checked by `garde`; this covers values that never pass
/// through a DTO.
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || email.len() > 254 {
        return Err(AppError::Validation(
            "Email must be between 1 and 254 characters".to_string(),
        ));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Email cannot contain whitespace".to_string()));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(AppError::Validation(format!("Invalid email: {}", email))),
    }
}

/// Parses a record identifier from a path segment.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {} id: {}", what, raw)))
}

/// Parses an optional status filter; an empty value counts as absent.
pub fn parse_status<T>(raw: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value.parse().map(Some).map_err(AppError::Validation),
        None => Ok(None),
    }
}
