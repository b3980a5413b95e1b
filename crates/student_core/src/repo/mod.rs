//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define record-level data access contracts for students.
//! - Isolate SQLite query details from session orchestration.
//!
//! # Invariants
//! - Constraint failures are reported as `RepoError::Constraint` with the
//!   declared constraint name, never as opaque driver errors.
//! - Repository calls do not manage transactions; the caller does.

mod constraint;
pub mod student_repo;

pub use constraint::{ConstraintKind, ConstraintViolation};
