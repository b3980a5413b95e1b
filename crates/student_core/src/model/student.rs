//! Student domain model.
//!
//! # Responsibility
//! - Define the canonical student record.
//! - Convert timestamps to and from their stored epoch-millisecond form.
//!
//! # Invariants
//! - `id` is `None` until the store assigns one, and never changes after.
//! - Field values are not validated here; the store enforces constraints
//!   when staged changes are flushed.
//! - Every column except `enrolled_date` is nullable, so every field is an
//!   `Option`; `None` is written as NULL.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::error::ComponentRange;
use time::{Date, Month, OffsetDateTime};

/// Store-assigned primary key.
pub type StudentId = i64;

/// Canonical student record.
///
/// `Student::default()` is a fully unset record; the store fills `id` and
/// `enrolled_date` and stores NULL for the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Assigned by the store on insert.
    pub id: Option<StudentId>,
    pub name: Option<String>,
    /// Unique across all records when set, at most 55 characters.
    pub email: Option<String>,
    /// Accepted range is 1..=12 when set.
    pub grade: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub birthday: Option<OffsetDateTime>,
    /// Left as `None` to let the store fill in the insert time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub enrolled_date: Option<OffsetDateTime>,
}

impl Student {
    /// Creates a transient record with no birthday and a store-side
    /// enrollment default.
    pub fn new(name: impl Into<String>, email: impl Into<String>, grade: i64) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            email: Some(email.into()),
            grade: Some(grade),
            birthday: None,
            enrolled_date: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_grade(mut self, grade: i64) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn with_birthday(mut self, birthday: OffsetDateTime) -> Self {
        self.birthday = Some(birthday);
        self
    }

    pub fn with_enrolled_date(mut self, enrolled_date: OffsetDateTime) -> Self {
        self.enrolled_date = Some(enrolled_date);
        self
    }

    /// Returns whether the store has assigned this record an id.
    pub fn is_persistent(&self) -> bool {
        self.id.is_some()
    }
}

impl Display for Student {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Student {}:{},Grade {}",
            OrNone(self.id.as_ref()),
            OrNone(self.name.as_ref()),
            OrNone(self.grade.as_ref())
        )
    }
}

/// Renders an unset field as `None`.
struct OrNone<T>(Option<T>);

impl<T: Display> Display for OrNone<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => write!(f, "{value}"),
            None => f.write_str("None"),
        }
    }
}

/// Midnight UTC on the given calendar day.
pub fn calendar_date(year: i32, month: u8, day: u8) -> Result<OffsetDateTime, ComponentRange> {
    let month = Month::try_from(month)?;
    Ok(Date::from_calendar_date(year, month, day)?
        .midnight()
        .assume_utc())
}

/// Converts a timestamp into epoch milliseconds, truncating sub-millisecond
/// precision.
pub fn timestamp_to_millis(value: OffsetDateTime) -> i64 {
    value.unix_timestamp() * 1000 + i64::from(value.millisecond())
}

/// Converts stored epoch milliseconds back into a UTC timestamp.
pub fn timestamp_from_millis(millis: i64) -> Result<OffsetDateTime, ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::{calendar_date, timestamp_from_millis, timestamp_to_millis, Student};

    #[test]
    fn millis_conversion_handles_pre_epoch_dates() {
        let birthday = calendar_date(1879, 3, 14).unwrap();
        let millis = timestamp_to_millis(birthday);
        assert!(millis < 0);
        assert_eq!(timestamp_from_millis(millis).unwrap(), birthday);
    }

    #[test]
    fn calendar_date_rejects_invalid_month() {
        assert!(calendar_date(1912, 13, 1).is_err());
    }

    #[test]
    fn unset_fields_display_as_none() {
        let student = Student::default().with_name("Anonymous");
        assert_eq!(student.to_string(), "Student None:Anonymous,Grade None");
    }
}
