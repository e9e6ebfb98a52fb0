use chrono::NaiveDate;

use super::{max_len, optional, required, ValidationError};
use crate::db::models::registration::{Registration, STATUS_COMPLETED, STATUS_PENDING};

const NAME_MAX: usize = 100;

/// Dates travel as `YYYY-MM-DD`.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ValidationError::new("E010", field, format!("'{}' is not a valid YYYY-MM-DD date", value))
    })
}

pub fn validate_date_of_birth(value: &str, today: NaiveDate) -> Result<(), ValidationError> {
    let dob = parse_date("date_of_birth", value)?;
    if dob > today {
        return Err(ValidationError::new("E011", "date_of_birth", "cannot be in the future"));
    }
    if today.years_since(dob).unwrap_or(0) > 130 {
        return Err(ValidationError::new("E012", "date_of_birth", "is implausibly old"));
    }
    Ok(())
}

pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::new("E020", "email", format!("'{}' is not a valid email address", value));
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.len() < 3
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || value.chars().any(char::is_whitespace)
        || domain.contains('@')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Digits plus common separators; 10 to 15 digits in total.
pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.');
    if !value.chars().all(allowed) {
        return Err(ValidationError::new("E030", "phone", "contains invalid characters"));
    }
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if !(10..=15).contains(&digits) {
        return Err(ValidationError::new("E031", "phone", "must contain 10 to 15 digits"));
    }
    Ok(())
}

pub fn validate_health_card(value: &str) -> Result<(), ValidationError> {
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ') {
        return Err(ValidationError::new("E040", "health_card", "may contain letters, digits, spaces and dashes only"));
    }
    max_len("health_card", value, 20)
}

pub fn validate_status(value: &str) -> Result<(), ValidationError> {
    match value {
        STATUS_PENDING | STATUS_COMPLETED => Ok(()),
        _ => Err(ValidationError::new(
            "E050",
            "status",
            format!("must be one of: {}, {}", STATUS_PENDING, STATUS_COMPLETED),
        )),
    }
}

/// Normalise blank fields and check every populated field.
pub fn normalize_and_validate(mut r: Registration, today: NaiveDate) -> Result<Registration, ValidationError> {
    r.first_name = required("first_name", &r.first_name)?;
    max_len("first_name", &r.first_name, NAME_MAX)?;

    r.last_name = optional(r.last_name);
    if let Some(ref v) = r.last_name {
        max_len("last_name", v, NAME_MAX)?;
    }
    r.date_of_birth = optional(r.date_of_birth);
    if let Some(ref v) = r.date_of_birth {
        validate_date_of_birth(v, today)?;
    }
    r.email = optional(r.email).map(|e| e.to_lowercase());
    if let Some(ref v) = r.email {
        validate_email(v)?;
    }
    r.phone = optional(r.phone);
    if let Some(ref v) = r.phone {
        validate_phone(v)?;
    }
    r.health_card = optional(r.health_card).map(|h| h.to_uppercase());
    if let Some(ref v) = r.health_card {
        validate_health_card(v)?;
    }
    r.gender = optional(r.gender);
    r.address = optional(r.address);
    r.city = optional(r.city);
    r.postal_code = optional(r.postal_code).map(|p| p.to_uppercase());
    r.language = optional(r.language);
    r.disposition = optional(r.disposition);
    r.referral_site = optional(r.referral_site);
    r.physician = optional(r.physician);
    validate_status(&r.status)?;
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_date_format() {
        assert!(parse_date("test_date", "2026-02-28").is_ok());
        assert_eq!(parse_date("test_date", "2026-02-30").unwrap_err().code, "E010");
        assert_eq!(parse_date("test_date", "28/02/2026").unwrap_err().code, "E010");
    }

    #[test]
    fn test_date_of_birth_bounds() {
        assert!(validate_date_of_birth("1985-07-04", today()).is_ok());
        assert!(validate_date_of_birth("2026-10-16", today()).is_ok());
        assert_eq!(validate_date_of_birth("2026-10-17", today()).unwrap_err().code, "E011");
        assert_eq!(validate_date_of_birth("1850-01-01", today()).unwrap_err().code, "E012");
    }

    #[test]
    fn test_email() {
        assert!(validate_email("client@example.org").is_ok());
        assert!(validate_email("client@localhost").is_err());
        assert!(validate_email("@example.org").is_err());
        assert!(validate_email("client example@x.org").is_err());
        assert!(validate_email("no-at-sign").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("(416) 555-0199").is_ok());
        assert!(validate_phone("+1 416 555 0199").is_ok());
        assert_eq!(validate_phone("555-0199").unwrap_err().code, "E031");
        assert_eq!(validate_phone("416-555-01x9").unwrap_err().code, "E030");
    }

    #[test]
    fn test_health_card() {
        assert!(validate_health_card("1234-567-890-AB").is_ok());
        assert!(validate_health_card("1234_567").is_err());
        assert!(validate_health_card("123456789012345678901").is_err());
    }
}
