//! Column handles and dynamically typed field values.

use super::builder::{AssignedValue, Assignment, CompareOp, Direction, Order, Predicate};
use crate::db::schema::ColumnType;
use crate::model::student::timestamp_to_millis;
use rusqlite::types::Value;
use std::fmt::{Display, Formatter};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One column of the `students` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudentColumn {
    Id,
    Name,
    Email,
    Grade,
    Birthday,
    EnrolledDate,
}

impl StudentColumn {
    /// All columns in table order.
    pub const ALL: [Self; 6] = [
        Self::Id,
        Self::Name,
        Self::Email,
        Self::Grade,
        Self::Birthday,
        Self::EnrolledDate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Grade => "grade",
            Self::Birthday => "birthday",
            Self::EnrolledDate => "enrolled_date",
        }
    }

    pub fn kind(self) -> ColumnType {
        match self {
            Self::Id | Self::Grade => ColumnType::Integer,
            Self::Name | Self::Email => ColumnType::Text,
            Self::Birthday | Self::EnrolledDate => ColumnType::Timestamp,
        }
    }

    pub fn eq(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<FieldValue>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    /// SQL `LIKE` match; `%` and `_` are wildcards, ASCII case-insensitive.
    pub fn like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: self,
            pattern: pattern.into(),
        }
    }

    pub fn asc(self) -> Order {
        Order {
            column: self,
            direction: Direction::Asc,
        }
    }

    pub fn desc(self) -> Order {
        Order {
            column: self,
            direction: Direction::Desc,
        }
    }

    pub fn set(self, value: impl Into<FieldValue>) -> Assignment {
        Assignment {
            column: self,
            value: AssignedValue::Set(value.into()),
        }
    }

    /// `column = column + delta`, evaluated by the store.
    pub fn increment_by(self, delta: i64) -> Assignment {
        Assignment {
            column: self,
            value: AssignedValue::Increment(delta),
        }
    }

    fn compare(self, op: CompareOp, value: impl Into<FieldValue>) -> Predicate {
        Predicate::Compare {
            column: self,
            op,
            value: value.into(),
        }
    }
}

impl Display for StudentColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single column value, as bound into or read out of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    /// Column type this value fits, `None` for `Null`.
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(ColumnType::Integer),
            Self::Text(_) => Some(ColumnType::Text),
            Self::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::Integer(*value),
            Self::Text(value) => Value::Text(value.clone()),
            Self::Timestamp(value) => Value::Integer(timestamp_to_millis(*value)),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::Timestamp(value) => {
                let formatted = value.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
                f.write_str(&formatted)
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
