use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::{ApiError, FieldError};

pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const ROLES: [&str; 4] = ["admin", "family", "medical", "elderly"];
pub const BLOOD_TYPES: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];
pub const THEMES: [&str; 3] = ["light", "dark", "auto"];
pub const LANGUAGES: [&str; 2] = ["id", "en"];

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid username pattern"));
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\+62|62|0)[0-9]{9,12}$").expect("valid phone pattern"));

pub fn is_valid_username(username: &str) -> bool {
    username.chars().count() >= MIN_USERNAME_LENGTH && USERNAME_RE.is_match(username)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 100 && EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
}

pub fn is_valid_role(role: &str) -> bool {
    ROLES.contains(&role)
}

pub fn is_valid_blood_type(blood_type: &str) -> bool {
    BLOOD_TYPES.contains(&blood_type)
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| value.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Comma separated dose times such as `08:00, 20:00`.
pub fn is_valid_time_list(value: &str) -> bool {
    !value.trim().is_empty() && value.split(',').all(|t| parse_time(t).is_some())
}

/// Collects field errors and turns them into a single 400.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, ok: bool, field: &str, message: &str) -> Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Present and not blank.
    pub fn required(self, value: Option<&str>, field: &str, message: &str) -> Self {
        let ok = value.is_some_and(|v| !v.trim().is_empty());
        self.check(ok, field, message)
    }

    /// Only checked when the value is present.
    pub fn optional<T: ?Sized>(
        self,
        value: Option<&T>,
        rule: impl Fn(&T) -> bool,
        field: &str,
        message: &str,
    ) -> Self {
        let ok = value.is_none_or(|v| rule(v));
        self.check(ok, field, message)
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`); use with `#[serde(default, deserialize_with = ...)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Blank strings clear a nullable column.
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[test]
    fn usernames() {
        assert!(is_valid_username("budi_01"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("budi santoso"));
        assert!(!is_valid_username("budi-s"));
    }

    #[test]
    fn phones_follow_indonesian_format() {
        assert!(is_valid_phone("081234567890"));
        assert!(is_valid_phone("+6281234567890"));
        assert!(is_valid_phone("6281234567890"));
        assert!(!is_valid_phone("6281234567"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("+1 555 1234"));
    }

    #[test]
    fn emails_and_enums() {
        assert!(is_valid_email("siti@example.com"));
        assert!(!is_valid_email("siti@"));
        assert!(is_valid_role("medical"));
        assert!(!is_valid_role("lansia"));
        assert!(is_valid_blood_type("AB-"));
        assert!(!is_valid_blood_type("C+"));
    }

    #[test]
    fn dates_accept_iso_timestamps() {
        let expected = NaiveDate::from_ymd_opt(1950, 3, 17);
        assert_eq!(parse_date("1950-03-17"), expected);
        assert_eq!(parse_date("1950-03-17T00:00:00.000Z"), expected);
        assert_eq!(parse_date("17/03/1950"), None);
    }

    #[test]
    fn times_and_time_lists() {
        assert_eq!(parse_time("08:30"), NaiveTime::from_hms_opt(8, 30, 0));
        assert_eq!(parse_time("20:15:00"), NaiveTime::from_hms_opt(20, 15, 0));
        assert_eq!(parse_time("25:00"), None);
        assert!(is_valid_time_list("08:00, 14:00,20:00"));
        assert!(!is_valid_time_list("08:00, siang"));
        assert!(!is_valid_time_list(" "));
    }

    #[test]
    fn validator_collects_every_failure() {
        let result = Validator::new()
            .required(Some(" "), "fullName", "Nama lengkap harus diisi")
            .check(is_valid_password("123"), "password", "Password minimal 6 karakter")
            .optional(Some("abc"), is_valid_phone, "phone", "Format nomor telepon tidak valid")
            .optional(None::<&str>, is_valid_phone, "other", "unused")
            .finish();

        match result {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["fullName", "password", "phone"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        phone: Option<Option<String>>,
    }

    #[test]
    fn double_option_tells_null_from_absent() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"phone":null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"phone":"0812345678"}"#).unwrap();

        assert_eq!(absent.phone, None);
        assert_eq!(null.phone, Some(None));
        assert_eq!(set.phone, Some(Some("0812345678".to_string())));
    }
}
