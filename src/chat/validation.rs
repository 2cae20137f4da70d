//! Input checks run before any external write.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));

/// MIME types accepted for recruiter attachments.
pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Require a non-blank value. Returns it trimmed.
pub fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(trimmed)
}

/// Require a non-blank, email-shaped value. Returns it trimmed.
pub fn email(value: &str) -> Result<&str, ValidationError> {
    let trimmed = required("email", value)?;
    if !EMAIL_SHAPE.is_match(trimmed) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(trimmed)
}

/// Free-text input must be a question: non-blank and ending with `?`.
pub fn question(value: &str) -> Result<&str, ValidationError> {
    let trimmed = required("question", value)?;
    if !trimmed.ends_with('?') {
        return Err(ValidationError::NotAQuestion);
    }
    Ok(trimmed)
}

pub fn attachment_type(mime: &str) -> Result<(), ValidationError> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    if ALLOWED_ATTACHMENT_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFileType {
            mime: mime.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Ada ").unwrap(), "Ada");
        assert_eq!(
            required("name", "   ").unwrap_err(),
            ValidationError::Required { field: "name" }
        );
    }

    #[test]
    fn email_shape() {
        assert_eq!(email(" test@example.com ").unwrap(), "test@example.com");
        for bad in ["", "test", "test@", "test@example", "a b@example.com", "@example.com"] {
            assert!(email(bad).is_err(), "{bad:?} should be rejected");
        }
        assert_eq!(email("").unwrap_err(), ValidationError::Required { field: "email" });
    }

    #[test]
    fn questions_must_end_with_question_mark() {
        assert_eq!(question("What stack do you use? ").unwrap(), "What stack do you use?");
        assert_eq!(question("Tell me more").unwrap_err(), ValidationError::NotAQuestion);
        assert_eq!(question("?!").unwrap_err(), ValidationError::NotAQuestion);
        assert!(matches!(question("  "), Err(ValidationError::Required { .. })));
    }

    #[test]
    fn attachment_whitelist() {
        assert!(attachment_type("application/pdf").is_ok());
        assert!(attachment_type("application/msword").is_ok());
        assert!(
            attachment_type(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            )
            .is_ok()
        );
        assert!(attachment_type("Application/PDF; charset=binary").is_ok());
        assert!(attachment_type("image/png").is_err());
        assert!(attachment_type("text/plain").is_err());
    }
}
