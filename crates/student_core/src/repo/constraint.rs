//! Classification of SQLite constraint failures.
//!
//! SQLite reports constraint failures as extended result codes plus a message
//! such as `UNIQUE constraint failed: students.email` or
//! `CHECK constraint failed: grade_between_1_and_12`. Key violations only name
//! the column, so the constraint name is looked up in the schema descriptor.

use crate::db::schema::TableSchema;
use rusqlite::{ffi, ErrorCode};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
    NotNull,
    Other,
}

impl ConstraintKind {
    fn from_extended_code(code: i32) -> Self {
        match code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::PrimaryKey,
            ffi::SQLITE_CONSTRAINT_UNIQUE => Self::Unique,
            ffi::SQLITE_CONSTRAINT_CHECK => Self::Check,
            ffi::SQLITE_CONSTRAINT_NOTNULL => Self::NotNull,
            _ => Self::Other,
        }
    }
}

impl Display for ConstraintKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique",
            Self::Check => "check",
            Self::NotNull => "not null",
            Self::Other => "constraint",
        };
        f.write_str(name)
    }
}

/// A write rejected by a store constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    /// Declared constraint name, when it can be resolved.
    pub constraint: Option<String>,
    /// Message reported by SQLite.
    pub message: String,
}

impl Display for ConstraintViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.constraint {
            Some(name) => write!(f, "{} violation on `{name}`: {}", self.kind, self.message),
            None => write!(f, "{} violation: {}", self.kind, self.message),
        }
    }
}

/// Returns the violation carried by `err`, or `None` for other failures.
pub(crate) fn classify(err: &rusqlite::Error, schema: &TableSchema) -> Option<ConstraintViolation> {
    let rusqlite::Error::SqliteFailure(failure, message) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }

    let kind = ConstraintKind::from_extended_code(failure.extended_code);
    let message = message.clone().unwrap_or_else(|| failure.to_string());
    let constraint = constraint_name(kind, &message, schema);
    Some(ConstraintViolation {
        kind,
        constraint,
        message,
    })
}

fn constraint_name(kind: ConstraintKind, message: &str, schema: &TableSchema) -> Option<String> {
    let (_, detail) = message.split_once("constraint failed: ")?;
    match kind {
        ConstraintKind::Check => Some(detail.trim().to_string()),
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
            let qualified = detail.split(',').next()?.trim();
            let column = qualified.rsplit('.').next()?;
            schema
                .key_constraint_on(column)
                .map(|constraint| constraint.name().to_string())
        }
        ConstraintKind::NotNull | ConstraintKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{constraint_name, ConstraintKind};
    use crate::db::schema::student_schema;

    #[test]
    fn unique_failures_resolve_to_declared_name() {
        let schema = student_schema();
        assert_eq!(
            constraint_name(
                ConstraintKind::Unique,
                "UNIQUE constraint failed: students.email",
                &schema
            )
            .as_deref(),
            Some("unique_email")
        );
        assert_eq!(
            constraint_name(
                ConstraintKind::PrimaryKey,
                "UNIQUE constraint failed: students.id",
                &schema
            )
            .as_deref(),
            Some("id_pk")
        );
    }

    #[test]
    fn check_failures_carry_their_own_name() {
        let schema = student_schema();
        assert_eq!(
            constraint_name(
                ConstraintKind::Check,
                "CHECK constraint failed: grade_between_1_and_12",
                &schema
            )
            .as_deref(),
            Some("grade_between_1_and_12")
        );
        assert!(constraint_name(ConstraintKind::Other, "boom", &schema).is_none());
    }
}
