//! Free-text input normalisation.

use crate::error::ValidationError;

/// Trim `value` and check it against `max` characters.
///
/// Empty input is allowed; callers that require a value check
/// `is_empty()` on the result.
pub fn bounded_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(bounded_text("details", "  flat tyre ", 50).unwrap(), "flat tyre");
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert!(bounded_text("details", "ñandú", 5).is_ok());
        assert!(bounded_text("details", "ñandús", 5).is_err());
    }
}
