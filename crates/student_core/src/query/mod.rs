//! Typed query descriptions over the `students` table.
//!
//! # Responsibility
//! - Describe filters, ordering, limits, projections, aggregates and bulk
//!   update expressions as plain values.
//! - Render those values to SQL with positional bind parameters.
//!
//! # Invariants
//! - A `StudentQuery` does nothing until a session executes it.
//! - Type errors (e.g. `LIKE` on an integer column) are reported before any
//!   SQL reaches the store.
//! - Predicates combine with `AND` only.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod builder;
mod column;

pub use builder::{
    AssignedValue, Aggregate, Assignment, CompareOp, Direction, Order, Predicate, ProjectedRow,
    StudentQuery,
};
pub use column::{FieldValue, StudentColumn};

use crate::db::schema::ColumnType;

pub type QueryResult<T> = Result<T, QueryError>;

/// Error raised while turning a query description into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Operand type does not fit the column.
    TypeMismatch {
        column: StudentColumn,
        expected: ColumnType,
        found: &'static str,
    },
    /// The primary key cannot be reassigned.
    ImmutableColumn(StudentColumn),
    /// A projection must name at least one column.
    EmptyProjection,
    /// A bulk update must carry at least one assignment.
    EmptyUpdate,
    /// Ordering, limit or offset given to a bulk operation.
    UnsupportedModifier { operation: &'static str },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "column `{column}` expects {expected} operands, got {found}"
            ),
            Self::ImmutableColumn(column) => write!(f, "column `{column}` cannot be updated"),
            Self::EmptyProjection => write!(f, "projection must select at least one column"),
            Self::EmptyUpdate => write!(f, "bulk update requires at least one assignment"),
            Self::UnsupportedModifier { operation } => write!(
                f,
                "{operation} cannot be combined with order_by, limit or offset"
            ),
        }
    }
}

impl Error for QueryError {}
