use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

pub const MAX_NAME_LEN: usize = 100;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid email address.")]
    Email,

    #[error("Please enter your full name")]
    MissingName,

    #[error("Full name must be at most {MAX_NAME_LEN} characters")]
    NameTooLong,

    #[error("Date of birth must be between {min} and {max}")]
    DateOfBirth { min: NaiveDate, max: NaiveDate },
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn email(email: &str) -> Result<&str, ValidationError> {
    let email = email.trim();
    if is_valid_email(email) {
        Ok(email)
    } else {
        Err(ValidationError::Email)
    }
}

/// Trims the name; empty or oversized names are rejected.
pub fn full_name(name: &str) -> Result<&str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(name)
}

pub fn date_of_birth(dob: NaiveDate, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let min = NaiveDate::from_ymd_opt(1900, 1, 1).expect("1900-01-01 is a valid date");
    if dob < min || dob > today {
        return Err(ValidationError::DateOfBirth { min, max: today });
    }
    Ok(dob)
}
