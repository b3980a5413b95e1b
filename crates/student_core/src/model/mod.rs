//! Domain model for the student store.
//!
//! # Responsibility
//! - Define the record shape shared by repository, session and callers.
//!
//! # Invariants
//! - A record without an id is transient; the store assigns ids on insert.

pub mod student;
