//! Student repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide record-level and set-level data access over `students`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Writes rely on store constraints; nothing is pre-validated in Rust.
//! - Read paths reject undecodable persisted state instead of masking it.
//! - Bulk update/delete run as one statement and refuse order/limit.

use crate::db::schema::{schema_version, verify_schema, ColumnType, TableSchema, SCHEMA_VERSION};
use crate::db::DbError;
use crate::model::student::{timestamp_from_millis, timestamp_to_millis, Student, StudentId};
use crate::query::{
    Aggregate, Assignment, FieldValue, ProjectedRow, QueryError, StudentColumn, StudentQuery,
};
use crate::repo::constraint::{classify, ConstraintViolation};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::OffsetDateTime;

const STUDENT_COLUMNS: &str = "id, name, email, grade, birthday, enrolled_date";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for student persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Malformed query description.
    Query(QueryError),
    /// Write rejected by a store constraint.
    Constraint(ConstraintViolation),
    NotFound(StudentId),
    /// Record-level operation on a record the store never assigned an id.
    MissingPrimaryKey,
    /// Connection schema is not at the expected version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl RepoError {
    /// Returns the constraint violation, if this error is one.
    pub fn constraint_violation(&self) -> Option<&ConstraintViolation> {
        match self {
            Self::Constraint(violation) => Some(violation),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "invalid query: {err}"),
            Self::Constraint(violation) => write!(f, "{violation}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::MissingPrimaryKey => write!(f, "student has no id; it was never persisted"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "student repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted student data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Constraint(_)
            | Self::NotFound(_)
            | Self::MissingPrimaryKey
            | Self::UninitializedConnection { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

/// Repository interface for student data access.
pub trait StudentRepository {
    /// Inserts one record and returns its assigned id.
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId>;
    /// Inserts a batch through one cached statement; returns rows written.
    fn insert_students(&self, students: &[Student]) -> RepoResult<usize>;
    /// Rewrites every mutable column of a persisted record.
    fn update_student(&self, student: &Student) -> RepoResult<()>;
    fn delete_student(&self, id: StudentId) -> RepoResult<()>;
    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>>;
    /// Streams matching records to `visit`; returns how many were visited.
    fn for_each_student(
        &self,
        query: &StudentQuery,
        visit: &mut dyn FnMut(Student) -> RepoResult<()>,
    ) -> RepoResult<usize>;
    fn list_students(&self, query: &StudentQuery) -> RepoResult<Vec<Student>>;
    fn project_students(
        &self,
        query: &StudentQuery,
        columns: &[StudentColumn],
    ) -> RepoResult<Vec<ProjectedRow>>;
    /// Computes an aggregate over the query's filter.
    fn aggregate_students(&self, query: &StudentQuery, aggregate: Aggregate)
        -> RepoResult<FieldValue>;
    /// Applies assignments to all matching rows in one statement.
    fn update_students(&self, query: &StudentQuery, assignments: &[Assignment])
        -> RepoResult<usize>;
    /// Deletes all matching rows in one statement.
    fn delete_students(&self, query: &StudentQuery) -> RepoResult<usize>;
}

/// SQLite-backed student repository.
pub struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
    schema: &'conn TableSchema,
}

impl<'conn> SqliteStudentRepository<'conn> {
    /// Constructs a repository over a connection carrying `schema`.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version does not match.
    /// - `Db(MissingRequiredTable | MissingRequiredColumn)` when the table
    ///   shape does not match the descriptor.
    pub fn try_new(conn: &'conn Connection, schema: &'conn TableSchema) -> RepoResult<Self> {
        let actual_version = schema_version(conn)?;
        if actual_version != SCHEMA_VERSION {
            return Err(RepoError::UninitializedConnection {
                expected_version: SCHEMA_VERSION,
                actual_version,
            });
        }
        verify_schema(conn, schema)?;
        Ok(Self { conn, schema })
    }

    fn write_error(&self, err: rusqlite::Error) -> RepoError {
        match classify(&err, self.schema) {
            Some(violation) => RepoError::Constraint(violation),
            None => err.into(),
        }
    }

    fn select_sql(
        &self,
        columns: &str,
        query: &StudentQuery,
        binds: &mut Vec<Value>,
    ) -> RepoResult<String> {
        let where_clause = query.where_clause(binds)?;
        let tail = query.tail_clause(binds);
        Ok(format!(
            "SELECT {columns} FROM {}{where_clause}{tail};",
            self.schema.table
        ))
    }
}

impl StudentRepository for SqliteStudentRepository<'_> {
    fn insert_student(&self, student: &Student) -> RepoResult<StudentId> {
        let (sql, values) = insert_statement(self.schema.table, student);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values))
            .map_err(|err| self.write_error(err))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_students(&self, students: &[Student]) -> RepoResult<usize> {
        let mut written = 0;
        for student in students {
            let (sql, values) = insert_statement(self.schema.table, student);
            let mut stmt = self.conn.prepare_cached(&sql)?;
            written += stmt
                .execute(params_from_iter(values))
                .map_err(|err| self.write_error(err))?;
        }
        Ok(written)
    }

    fn update_student(&self, student: &Student) -> RepoResult<()> {
        let id = student.id.ok_or(RepoError::MissingPrimaryKey)?;

        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE {}
                     SET
                        name = ?1,
                        email = ?2,
                        grade = ?3,
                        birthday = ?4,
                        enrolled_date = COALESCE(?5, enrolled_date)
                     WHERE id = ?6;",
                    self.schema.table
                ),
                params![
                    student.name.as_deref(),
                    student.email.as_deref(),
                    student.grade,
                    student.birthday.map(timestamp_to_millis),
                    student.enrolled_date.map(timestamp_to_millis),
                    id,
                ],
            )
            .map_err(|err| self.write_error(err))?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn delete_student(&self, id: StudentId) -> RepoResult<()> {
        let changed = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1;", self.schema.table),
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn get_student(&self, id: StudentId) -> RepoResult<Option<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM {} WHERE id = ?1;",
            self.schema.table
        ))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_student_row(row)?));
        }

        Ok(None)
    }

    fn for_each_student(
        &self,
        query: &StudentQuery,
        visit: &mut dyn FnMut(Student) -> RepoResult<()>,
    ) -> RepoResult<usize> {
        let mut binds = Vec::new();
        let sql = self.select_sql(STUDENT_COLUMNS, query, &mut binds)?;

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut visited = 0;
        while let Some(row) = rows.next()? {
            visit(parse_student_row(row)?)?;
            visited += 1;
        }

        Ok(visited)
    }

    fn list_students(&self, query: &StudentQuery) -> RepoResult<Vec<Student>> {
        let mut students = Vec::new();
        self.for_each_student(query, &mut |student: Student| -> RepoResult<()> {
            students.push(student);
            Ok(())
        })?;
        Ok(students)
    }

    fn project_students(
        &self,
        query: &StudentQuery,
        columns: &[StudentColumn],
    ) -> RepoResult<Vec<ProjectedRow>> {
        if columns.is_empty() {
            return Err(QueryError::EmptyProjection.into());
        }

        let column_list = columns
            .iter()
            .map(|column| column.name())
            .collect::<Vec<_>>()
            .join(", ");
        let mut binds = Vec::new();
        let sql = self.select_sql(&column_list, query, &mut binds)?;

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut projected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                fields.push((*column, read_field(row, index, column.kind(), column.name())?));
            }
            projected.push(ProjectedRow::new(fields));
        }

        Ok(projected)
    }

    fn aggregate_students(
        &self,
        query: &StudentQuery,
        aggregate: Aggregate,
    ) -> RepoResult<FieldValue> {
        let expression = aggregate.render()?;
        let mut binds = Vec::new();
        let where_clause = query.where_clause(&mut binds)?;
        let sql = format!(
            "SELECT {expression} FROM {}{where_clause};",
            self.schema.table
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        match rows.next()? {
            Some(row) => read_field(row, 0, aggregate.result_kind(), &expression),
            None => Ok(FieldValue::Null),
        }
    }

    fn update_students(
        &self,
        query: &StudentQuery,
        assignments: &[Assignment],
    ) -> RepoResult<usize> {
        if query.has_modifiers() {
            return Err(QueryError::UnsupportedModifier {
                operation: "bulk update",
            }
            .into());
        }
        if assignments.is_empty() {
            return Err(QueryError::EmptyUpdate.into());
        }

        let mut binds = Vec::new();
        let set_clause = assignments
            .iter()
            .map(|assignment| assignment.render(&mut binds))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let where_clause = query.where_clause(&mut binds)?;
        let sql = format!(
            "UPDATE {} SET {set_clause}{where_clause};",
            self.schema.table
        );

        let changed = self
            .conn
            .execute(&sql, params_from_iter(binds))
            .map_err(|err| self.write_error(err))?;
        Ok(changed)
    }

    fn delete_students(&self, query: &StudentQuery) -> RepoResult<usize> {
        if query.has_modifiers() {
            return Err(QueryError::UnsupportedModifier {
                operation: "bulk delete",
            }
            .into());
        }

        let mut binds = Vec::new();
        let where_clause = query.where_clause(&mut binds)?;
        let sql = format!("DELETE FROM {}{where_clause};", self.schema.table);
        let changed = self.conn.execute(&sql, params_from_iter(binds))?;
        Ok(changed)
    }
}

/// Builds an insert that leaves unset `id` and `enrolled_date` to the store.
///
/// Other unset fields are bound as NULL, their declared default.
fn insert_statement(table: &str, student: &Student) -> (String, Vec<Value>) {
    let mut columns = Vec::with_capacity(6);
    let mut values = Vec::with_capacity(6);

    if let Some(id) = student.id {
        columns.push("id");
        values.push(Value::Integer(id));
    }
    columns.push("name");
    values.push(optional_text(student.name.as_deref()));
    columns.push("email");
    values.push(optional_text(student.email.as_deref()));
    columns.push("grade");
    values.push(student.grade.map_or(Value::Null, Value::Integer));
    columns.push("birthday");
    values.push(optional_timestamp(student.birthday));
    if let Some(enrolled_date) = student.enrolled_date {
        columns.push("enrolled_date");
        values.push(Value::Integer(timestamp_to_millis(enrolled_date)));
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders});",
        columns.join(", ")
    );
    (sql, values)
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn optional_timestamp(value: Option<OffsetDateTime>) -> Value {
    value.map_or(Value::Null, |timestamp| {
        Value::Integer(timestamp_to_millis(timestamp))
    })
}

fn parse_student_row(row: &Row<'_>) -> RepoResult<Student> {
    let id: i64 = row.get("id")?;

    let birthday = match row.get::<_, Option<i64>>("birthday")? {
        Some(millis) => Some(parse_timestamp(millis, "students.birthday")?),
        None => None,
    };
    let enrolled_date = match row.get::<_, Option<i64>>("enrolled_date")? {
        Some(millis) => Some(parse_timestamp(millis, "students.enrolled_date")?),
        None => None,
    };

    Ok(Student {
        id: Some(id),
        name: row.get("name")?,
        email: row.get("email")?,
        grade: row.get("grade")?,
        birthday,
        enrolled_date,
    })
}

fn read_field(
    row: &Row<'_>,
    index: usize,
    kind: ColumnType,
    label: &str,
) -> RepoResult<FieldValue> {
    let value = match kind {
        ColumnType::Integer => row
            .get::<_, Option<i64>>(index)?
            .map_or(FieldValue::Null, FieldValue::Integer),
        ColumnType::Text => row
            .get::<_, Option<String>>(index)?
            .map_or(FieldValue::Null, FieldValue::Text),
        ColumnType::Timestamp => match row.get::<_, Option<i64>>(index)? {
            Some(millis) => FieldValue::Timestamp(parse_timestamp(millis, label)?),
            None => FieldValue::Null,
        },
    };
    Ok(value)
}

fn parse_timestamp(millis: i64, location: &str) -> RepoResult<OffsetDateTime> {
    timestamp_from_millis(millis).map_err(|_| {
        RepoError::InvalidData(format!("invalid timestamp value `{millis}` in {location}"))
    })
}
