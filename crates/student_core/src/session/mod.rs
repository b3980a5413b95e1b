//! Unit-of-work session over the student repository.
//!
//! # Responsibility
//! - Stage inserts, updates and deletes in memory until flush/commit.
//! - Run queries and store-side bulk statements inside one transaction.
//! - Release the transaction on commit, rollback, close or drop.
//!
//! # Invariants
//! - A transaction is opened lazily on first use.
//! - Queries flush staged changes first, so this session sees its own
//!   uncommitted writes; other connections do not.
//! - A failed flush leaves nothing of that flush applied and blocks the
//!   session until `rollback` is called.

mod store;

pub use store::StudentStore;

use crate::db::schema::TableSchema;
use crate::db::DbError;
use crate::model::student::{Student, StudentId};
use crate::query::{
    Aggregate, Assignment, FieldValue, ProjectedRow, QueryError, StudentColumn, StudentQuery,
};
use crate::repo::student_repo::{
    RepoError, RepoResult, SqliteStudentRepository, StudentRepository,
};
use crate::repo::ConstraintViolation;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Correlation id attached to every log line of a session.
pub type SessionId = Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    Repo(RepoError),
    /// An earlier flush failed; only `rollback` or `close` are accepted.
    PendingRollback { cause: String },
}

impl SessionError {
    /// Returns the constraint violation behind this error, if any.
    pub fn constraint_violation(&self) -> Option<&ConstraintViolation> {
        match self {
            Self::Repo(err) => err.constraint_violation(),
            Self::PendingRollback { .. } => None,
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::PendingRollback { cause } => write!(
                f,
                "session transaction was invalidated by a failed flush ({cause}); roll back first"
            ),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::PendingRollback { .. } => None,
        }
    }
}

impl From<RepoError> for SessionError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<QueryError> for SessionError {
    fn from(value: QueryError) -> Self {
        Self::Repo(RepoError::Query(value))
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::Db(DbError::Sqlite(value)))
    }
}

/// Rows written since the current transaction began.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Ids assigned to records staged with `add`; bulk inserts are not listed.
    pub inserted_ids: Vec<StudentId>,
    pub inserted: usize,
    /// Includes rows touched by `update_where`.
    pub updated: usize,
    /// Includes rows removed by `delete_where`.
    pub deleted: usize,
}

impl CommitSummary {
    fn absorb(&mut self, other: Self) {
        self.inserted_ids.extend(other.inserted_ids);
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

#[derive(Debug)]
enum StagedChange {
    Insert(Student),
    BulkInsert(Vec<Student>),
    Update(Student),
    Delete(StudentId),
}

impl StagedChange {
    fn record_count(&self) -> usize {
        match self {
            Self::BulkInsert(batch) => batch.len(),
            Self::Insert(_) | Self::Update(_) | Self::Delete(_) => 1,
        }
    }
}

/// Working session bound to one connection.
///
/// Obtain one from [`StudentStore::session`], which also guarantees that no
/// other session shares the connection.
pub struct Session<'conn> {
    id: SessionId,
    conn: &'conn Connection,
    repo: SqliteStudentRepository<'conn>,
    pending: Vec<StagedChange>,
    written: CommitSummary,
    in_transaction: bool,
    failed: Option<String>,
}

impl<'conn> Session<'conn> {
    /// Opens a session over a connection that carries `schema`.
    pub fn new(conn: &'conn Connection, schema: &'conn TableSchema) -> RepoResult<Self> {
        let repo = SqliteStudentRepository::try_new(conn, schema)?;
        let id = Uuid::new_v4();
        debug!("event=session_open module=session status=ok session_id={id}");
        Ok(Self {
            id,
            conn,
            repo,
            pending: Vec::new(),
            written: CommitSummary::default(),
            in_transaction: false,
            failed: None,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Number of records held in staged changes.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(StagedChange::record_count).sum()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Stages one insert. Constraint checks happen at flush.
    pub fn add(&mut self, student: Student) -> SessionResult<()> {
        self.ensure_usable()?;
        self.pending.push(StagedChange::Insert(student));
        Ok(())
    }

    /// Stages a batch insert flushed through one cached statement.
    ///
    /// Generated ids are not reported for bulk inserts.
    pub fn add_all(&mut self, students: impl IntoIterator<Item = Student>) -> SessionResult<()> {
        self.ensure_usable()?;
        let batch = students.into_iter().collect::<Vec<_>>();
        if !batch.is_empty() {
            self.pending.push(StagedChange::BulkInsert(batch));
        }
        Ok(())
    }

    /// Stages a full rewrite of a fetched record.
    pub fn update(&mut self, student: Student) -> SessionResult<()> {
        self.ensure_usable()?;
        if student.id.is_none() {
            return Err(RepoError::MissingPrimaryKey.into());
        }
        self.pending.push(StagedChange::Update(student));
        Ok(())
    }

    /// Stages removal of a fetched record.
    pub fn delete(&mut self, student: &Student) -> SessionResult<()> {
        self.ensure_usable()?;
        let id = student.id.ok_or(RepoError::MissingPrimaryKey)?;
        self.pending.push(StagedChange::Delete(id));
        Ok(())
    }

    /// Writes staged changes into the open transaction.
    ///
    /// On failure the partial flush is undone, staged changes are kept, and
    /// the session refuses work until [`Session::rollback`].
    pub fn flush(&mut self) -> SessionResult<()> {
        self.ensure_usable()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        self.begin()?;

        let started_at = Instant::now();
        let staged = self.pending_count();
        self.conn.execute_batch("SAVEPOINT session_flush;")?;

        match self.apply_pending() {
            Ok(summary) => {
                self.conn.execute_batch("RELEASE session_flush;")?;
                self.pending.clear();
                self.written.absorb(summary);
                info!(
                    "event=session_flush module=session status=ok session_id={} records={} duration_ms={}",
                    self.id,
                    staged,
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                if let Err(undo) = self
                    .conn
                    .execute_batch("ROLLBACK TO session_flush; RELEASE session_flush;")
                {
                    error!(
                        "event=session_flush module=session status=error session_id={} error_code=savepoint_undo_failed error={}",
                        self.id, undo
                    );
                }
                self.failed = Some(err.to_string());
                error!(
                    "event=session_flush module=session status=error session_id={} records={} duration_ms={} error_code=flush_failed error={}",
                    self.id,
                    staged,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Flushes staged changes and makes the transaction durable.
    pub fn commit(&mut self) -> SessionResult<CommitSummary> {
        self.flush()?;

        if self.in_transaction {
            if let Err(err) = self.conn.execute_batch("COMMIT;") {
                self.failed = Some(err.to_string());
                error!(
                    "event=session_commit module=session status=error session_id={} error_code=commit_failed error={}",
                    self.id, err
                );
                return Err(err.into());
            }
            self.in_transaction = false;
        }

        let summary = std::mem::take(&mut self.written);
        info!(
            "event=session_commit module=session status=ok session_id={} inserted={} updated={} deleted={}",
            self.id, summary.inserted, summary.updated, summary.deleted
        );
        Ok(summary)
    }

    /// Discards staged changes and everything written since the last commit.
    pub fn rollback(&mut self) -> SessionResult<()> {
        let discarded = self.pending_count();
        self.pending.clear();
        self.written = CommitSummary::default();
        self.failed = None;

        if self.in_transaction {
            self.in_transaction = false;
            if !self.conn.is_autocommit() {
                self.conn.execute_batch("ROLLBACK;")?;
            }
        }

        info!(
            "event=session_rollback module=session status=ok session_id={} discarded={}",
            self.id, discarded
        );
        Ok(())
    }

    /// Ends the session, rolling back anything not committed.
    pub fn close(mut self) -> SessionResult<()> {
        if self.in_transaction || !self.pending.is_empty() {
            self.rollback()?;
        }
        debug!(
            "event=session_close module=session status=ok session_id={}",
            self.id
        );
        Ok(())
    }

    /// All matching records, after flushing staged changes.
    pub fn all(&mut self, query: &StudentQuery) -> SessionResult<Vec<Student>> {
        self.prepare_read()?;
        Ok(self.repo.list_students(query)?)
    }

    /// Streams matching records one row at a time.
    pub fn for_each(
        &mut self,
        query: &StudentQuery,
        mut visit: impl FnMut(Student),
    ) -> SessionResult<usize> {
        self.prepare_read()?;
        let visited = self.repo.for_each_student(query, &mut |student: Student| -> RepoResult<()> {
            visit(student);
            Ok(())
        })?;
        Ok(visited)
    }

    /// First matching record; same as `limit(1)` but returns a scalar.
    pub fn first(&mut self, query: &StudentQuery) -> SessionResult<Option<Student>> {
        let limited = query.clone().limit(1);
        Ok(self.all(&limited)?.into_iter().next())
    }

    pub fn get(&mut self, id: StudentId) -> SessionResult<Option<Student>> {
        self.prepare_read()?;
        Ok(self.repo.get_student(id)?)
    }

    /// Matching rows reduced to `columns`.
    pub fn project(
        &mut self,
        query: &StudentQuery,
        columns: &[StudentColumn],
    ) -> SessionResult<Vec<ProjectedRow>> {
        self.prepare_read()?;
        Ok(self.repo.project_students(query, columns)?)
    }

    pub fn project_first(
        &mut self,
        query: &StudentQuery,
        columns: &[StudentColumn],
    ) -> SessionResult<Option<ProjectedRow>> {
        let limited = query.clone().limit(1);
        Ok(self.project(&limited, columns)?.into_iter().next())
    }

    /// `count(id)` over the query's filter.
    pub fn count(&mut self, query: &StudentQuery) -> SessionResult<u64> {
        let value = self.aggregate(query, Aggregate::Count(StudentColumn::Id))?;
        let count = value
            .as_integer()
            .and_then(|count| u64::try_from(count).ok())
            .ok_or_else(|| RepoError::InvalidData(format!("invalid count result {value}")))?;
        Ok(count)
    }

    /// Scalar aggregate over the query's filter; ordering and limit are ignored.
    pub fn aggregate(
        &mut self,
        query: &StudentQuery,
        aggregate: Aggregate,
    ) -> SessionResult<FieldValue> {
        self.prepare_read()?;
        Ok(self.repo.aggregate_students(query, aggregate)?)
    }

    /// Loads every match, applies `modify`, and stages an update for each
    /// record that changed. Returns the number of staged updates.
    ///
    /// Nothing is staged unless every record was modified successfully.
    ///
    /// # Errors
    /// - `QueryError::ImmutableColumn` if `modify` changes a record's id.
    pub fn modify_each(
        &mut self,
        query: &StudentQuery,
        mut modify: impl FnMut(&mut Student),
    ) -> SessionResult<usize> {
        let students = self.all(query)?;
        let mut updates = Vec::new();
        for mut student in students {
            let before = student.clone();
            modify(&mut student);
            if student.id != before.id {
                return Err(QueryError::ImmutableColumn(StudentColumn::Id).into());
            }
            if student != before {
                updates.push(StagedChange::Update(student));
            }
        }

        let staged = updates.len();
        self.pending.extend(updates);
        Ok(staged)
    }

    /// Applies `assignments` to every match in one store-side statement.
    ///
    /// Runs immediately inside the open transaction; a constraint failure
    /// leaves no row changed and the session usable.
    pub fn update_where(
        &mut self,
        query: &StudentQuery,
        assignments: &[Assignment],
    ) -> SessionResult<usize> {
        self.prepare_read()?;
        match self.repo.update_students(query, assignments) {
            Ok(changed) => {
                self.written.updated += changed;
                info!(
                    "event=bulk_update module=session status=ok session_id={} assignments={} rows={}",
                    self.id,
                    assignments.len(),
                    changed
                );
                Ok(changed)
            }
            Err(err) => {
                warn!(
                    "event=bulk_update module=session status=error session_id={} error={}",
                    self.id, err
                );
                Err(err.into())
            }
        }
    }

    /// Deletes every match in one store-side statement.
    pub fn delete_where(&mut self, query: &StudentQuery) -> SessionResult<usize> {
        self.prepare_read()?;
        let removed = self.repo.delete_students(query)?;
        self.written.deleted += removed;
        info!(
            "event=bulk_delete module=session status=ok session_id={} rows={}",
            self.id, removed
        );
        Ok(removed)
    }

    fn ensure_usable(&self) -> SessionResult<()> {
        match &self.failed {
            Some(cause) => Err(SessionError::PendingRollback {
                cause: cause.clone(),
            }),
            None => Ok(()),
        }
    }

    fn begin(&mut self) -> SessionResult<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN DEFERRED;")?;
            self.in_transaction = true;
            debug!(
                "event=session_begin module=session status=ok session_id={}",
                self.id
            );
        }
        Ok(())
    }

    fn prepare_read(&mut self) -> SessionResult<()> {
        self.ensure_usable()?;
        self.begin()?;
        self.flush()
    }

    fn apply_pending(&self) -> RepoResult<CommitSummary> {
        let mut summary = CommitSummary::default();
        for change in &self.pending {
            match change {
                StagedChange::Insert(student) => {
                    let id = self.repo.insert_student(student)?;
                    summary.inserted_ids.push(id);
                    summary.inserted += 1;
                }
                StagedChange::BulkInsert(batch) => {
                    summary.inserted += self.repo.insert_students(batch)?;
                }
                StagedChange::Update(student) => {
                    self.repo.update_student(student)?;
                    summary.updated += 1;
                }
                StagedChange::Delete(id) => {
                    self.repo.delete_student(*id)?;
                    summary.deleted += 1;
                }
            }
        }
        Ok(summary)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.in_transaction || self.conn.is_autocommit() {
            return;
        }
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!(
                "event=session_close module=session status=ok mode=drop session_id={}",
                self.id
            ),
            Err(err) => warn!(
                "event=session_close module=session status=error mode=drop session_id={} error={}",
                self.id, err
            ),
        }
    }
}
