//! Common validation utilities.

use chrono::{DateTime, Utc};
use validator::ValidationError;

/// Maximum length of a broadcast message, in characters.
pub const BROADCAST_CONTENT_MAX_CHARS: usize = 1000;

/// Maximum length of a direct message, in characters.
pub const DIRECT_CONTENT_MAX_CHARS: usize = 500;

/// Maximum age, in days, a rule may look back over.
pub const MAX_TIME_WINDOW_DAYS: i32 = 365;

/// Validates message content against an upper bound.
///
/// Content made only of whitespace counts as empty. Length is measured in
/// characters, not bytes, so multi-byte text is not penalised.
pub fn validate_message_content(content: &str, max_chars: usize) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        let mut err = ValidationError::new("content_empty");
        err.message = Some("Message content cannot be empty".into());
        return Err(err);
    }

    if content.chars().count() > max_chars {
        let mut err = ValidationError::new("content_too_long");
        err.message = Some(format!("Message content cannot exceed {} characters", max_chars).into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a required text field is not blank.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value cannot be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that an expiry timestamp lies in the future.
pub fn validate_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if expires_at > now {
        Ok(())
    } else {
        let mut err = ValidationError::new("expiry_past");
        err.message = Some("Expiry must be in the future".into());
        Err(err)
    }
}

/// Validates that a look-back window is between 1 and 365 days.
pub fn validate_time_window_days(days: i32) -> Result<(), ValidationError> {
    if (1..=MAX_TIME_WINDOW_DAYS).contains(&days) {
        Ok(())
    } else {
        let mut err = ValidationError::new("time_window_range");
        err.message = Some("Time window must be between 1 and 365 days".into());
        Err(err)
    }
}

/// Truncates text to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
