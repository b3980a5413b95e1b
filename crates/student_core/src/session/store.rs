//! Owner of the connection and schema descriptor.

use super::Session;
use crate::db::schema::{ensure_schema, student_schema, TableSchema};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::repo::student_repo::RepoResult;
use rusqlite::Connection;
use std::path::Path;

/// Student store bound to one SQLite connection.
///
/// Sessions borrow the store mutably, so only one can be open at a time.
/// Dropping the store closes the connection; an in-memory store loses its
/// contents at that point.
pub struct StudentStore {
    conn: Connection,
    schema: TableSchema,
}

impl StudentStore {
    /// Transient store whose contents do not outlive the value.
    pub fn open_in_memory() -> DbResult<Self> {
        let schema = student_schema();
        let conn = open_db_in_memory(&schema)?;
        Ok(Self { conn, schema })
    }

    /// File-backed store; reopening an existing store file is idempotent.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let schema = student_schema();
        let conn = open_db(path, &schema)?;
        Ok(Self { conn, schema })
    }

    /// Wraps an already-open connection, creating or verifying `schema`.
    pub fn from_connection(mut conn: Connection, schema: TableSchema) -> DbResult<Self> {
        ensure_schema(&mut conn, &schema)?;
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Opens a working session.
    pub fn session(&mut self) -> RepoResult<Session<'_>> {
        Session::new(&self.conn, &self.schema)
    }
}
