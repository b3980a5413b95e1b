//! Student record store.
//!
//! Defines the `students` schema with its constraints and a session-based
//! data access layer (insert, bulk insert, filter, order, aggregate, update,
//! delete) over SQLite.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;

pub use db::schema::{create_schema, student_schema, TableSchema};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::student::{calendar_date, Student, StudentId};
pub use query::{
    Aggregate, Assignment, FieldValue, Order, Predicate, ProjectedRow, QueryError, StudentColumn,
    StudentQuery,
};
pub use repo::student_repo::{RepoError, RepoResult, SqliteStudentRepository, StudentRepository};
pub use repo::{ConstraintKind, ConstraintViolation};
pub use session::{CommitSummary, Session, SessionError, SessionId, SessionResult, StudentStore};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
