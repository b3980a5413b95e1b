//! Student schema descriptor and schema creation.
//!
//! # Responsibility
//! - Describe the `students` table (columns, named constraints, index) as a
//!   plain value built by [`student_schema`].
//! - Render and apply the DDL for a descriptor in one transaction.
//!
//! # Invariants
//! - Creation never replaces existing objects; name clashes are reported.
//! - Applied schema version is mirrored to `PRAGMA user_version`.
//! - Timestamp columns hold epoch milliseconds.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

/// Schema version stamped into `PRAGMA user_version` on creation.
pub const SCHEMA_VERSION: u32 = 1;

pub const STUDENTS_TABLE: &str = "students";

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    /// Stored as INTEGER epoch milliseconds.
    Timestamp,
}

impl ColumnType {
    fn sql_type(self, max_length: Option<u32>) -> String {
        match (self, max_length) {
            (Self::Text, Some(len)) => format!("VARCHAR({len})"),
            (Self::Text, None) => "TEXT".to_string(),
            (Self::Integer | Self::Timestamp, _) => "INTEGER".to_string(),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Store-side default applied when an insert omits the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    /// Wall-clock time of the inserting statement, in epoch milliseconds.
    CreationTime,
}

impl ColumnDefault {
    fn sql(self) -> &'static str {
        match self {
            Self::CreationTime => "(CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnType,
    /// Declared maximum length for text columns.
    pub max_length: Option<u32>,
    pub not_null: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            max_length: None,
            not_null: false,
            default: None,
        }
    }

    fn ddl(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.kind.sql_type(self.max_length));
        if self.not_null {
            ddl.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(default.sql());
        }
        ddl
    }
}

/// Named table constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintDef {
    PrimaryKey {
        name: &'static str,
        column: &'static str,
    },
    Unique {
        name: &'static str,
        column: &'static str,
    },
    Check {
        name: &'static str,
        expression: &'static str,
    },
}

impl ConstraintDef {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PrimaryKey { name, .. }
            | Self::Unique { name, .. }
            | Self::Check { name, .. } => name,
        }
    }

    fn ddl(&self) -> String {
        match self {
            Self::PrimaryKey { name, column } => {
                format!("CONSTRAINT {name} PRIMARY KEY ({column})")
            }
            Self::Unique { name, column } => format!("CONSTRAINT {name} UNIQUE ({column})"),
            Self::Check { name, expression } => format!("CONSTRAINT {name} CHECK ({expression})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
    pub unique: bool,
}

/// Full description of one table: columns, constraints and secondary indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<ConstraintDef>,
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns the primary-key or unique constraint declared on `column`.
    pub fn key_constraint_on(&self, column: &str) -> Option<&ConstraintDef> {
        self.constraints.iter().find(|constraint| match constraint {
            ConstraintDef::PrimaryKey { column: c, .. } | ConstraintDef::Unique { column: c, .. } => {
                *c == column
            }
            ConstraintDef::Check { .. } => false,
        })
    }

    /// Renders `CREATE TABLE` followed by one `CREATE INDEX` per index.
    pub fn create_statements(&self) -> Vec<String> {
        let body = self
            .columns
            .iter()
            .map(ColumnDef::ddl)
            .chain(self.constraints.iter().map(ConstraintDef::ddl))
            .collect::<Vec<_>>()
            .join(",\n    ");

        let mut statements = vec![format!("CREATE TABLE {} (\n    {body}\n);", self.table)];
        for index in &self.indexes {
            let unique = if index.unique { "UNIQUE " } else { "" };
            statements.push(format!(
                "CREATE {unique}INDEX {} ON {} ({});",
                index.name,
                self.table,
                index.columns.join(", ")
            ));
        }
        statements
    }

    fn object_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.table).chain(self.indexes.iter().map(|index| index.name))
    }
}

/// Builds the descriptor for the `students` table.
pub fn student_schema() -> TableSchema {
    TableSchema {
        table: STUDENTS_TABLE,
        columns: vec![
            ColumnDef::new("id", ColumnType::Integer),
            ColumnDef::new("name", ColumnType::Text),
            ColumnDef {
                max_length: Some(55),
                ..ColumnDef::new("email", ColumnType::Text)
            },
            ColumnDef::new("grade", ColumnType::Integer),
            ColumnDef::new("birthday", ColumnType::Timestamp),
            ColumnDef {
                not_null: true,
                default: Some(ColumnDefault::CreationTime),
                ..ColumnDef::new("enrolled_date", ColumnType::Timestamp)
            },
        ],
        constraints: vec![
            ConstraintDef::PrimaryKey {
                name: "id_pk",
                column: "id",
            },
            ConstraintDef::Unique {
                name: "unique_email",
                column: "email",
            },
            ConstraintDef::Check {
                name: "grade_between_1_and_12",
                expression: "grade BETWEEN 1 AND 12",
            },
            ConstraintDef::Check {
                name: "email_max_length",
                expression: "length(email) <= 55",
            },
        ],
        indexes: vec![IndexDef {
            name: "index_name",
            columns: vec!["name"],
            unique: false,
        }],
    }
}

/// Creates every object of `schema` in one transaction.
///
/// # Errors
/// - `DbError::SchemaConflict` when a table or index with the same name
///   already exists. Nothing is created in that case.
pub fn create_schema(conn: &mut Connection, schema: &TableSchema) -> DbResult<()> {
    for object in schema.object_names() {
        if object_exists(conn, object)? {
            error!(
                "event=schema_create module=db status=error error_code=schema_conflict object={object}"
            );
            return Err(DbError::SchemaConflict {
                object: object.to_string(),
            });
        }
    }

    let tx = conn.transaction()?;
    for statement in schema.create_statements() {
        tx.execute_batch(&statement)?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    tx.commit()?;

    info!(
        "event=schema_create module=db status=ok table={} indexes={} version={}",
        schema.table,
        schema.indexes.len(),
        SCHEMA_VERSION
    );
    Ok(())
}

/// Creates the schema on a fresh database, or verifies an existing one.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database was stamped by a newer build.
/// - `MissingRequiredTable` / `MissingRequiredColumn` when the stamped
///   database lacks objects the descriptor requires.
pub fn ensure_schema(conn: &mut Connection, schema: &TableSchema) -> DbResult<()> {
    let version = schema_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: version,
            latest_supported: SCHEMA_VERSION,
        });
    }
    if version == 0 {
        return create_schema(conn, schema);
    }
    verify_schema(conn, schema)
}

/// Reads `PRAGMA user_version`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Checks that the table and all described columns exist.
pub fn verify_schema(conn: &Connection, schema: &TableSchema) -> DbResult<()> {
    if !object_exists(conn, schema.table)? {
        return Err(DbError::MissingRequiredTable(schema.table));
    }

    let existing = table_columns(conn, schema.table)?;
    for column in &schema.columns {
        if !existing.iter().any(|name| name == column.name) {
            return Err(DbError::MissingRequiredColumn {
                table: schema.table,
                column: column.name,
            });
        }
    }
    Ok(())
}

fn object_exists(conn: &Connection, name: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE name = ?1
        );",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::{student_schema, ConstraintDef};

    #[test]
    fn create_statements_name_every_constraint_and_index() {
        let statements = student_schema().create_statements();
        assert_eq!(statements.len(), 2);

        let table = &statements[0];
        assert!(table.starts_with("CREATE TABLE students ("));
        assert!(table.contains("email VARCHAR(55)"));
        assert!(table.contains("CONSTRAINT id_pk PRIMARY KEY (id)"));
        assert!(table.contains("CONSTRAINT unique_email UNIQUE (email)"));
        assert!(table.contains("CONSTRAINT grade_between_1_and_12 CHECK (grade BETWEEN 1 AND 12)"));
        assert!(table.contains("enrolled_date INTEGER NOT NULL DEFAULT"));

        assert_eq!(statements[1], "CREATE INDEX index_name ON students (name);");
    }

    #[test]
    fn key_constraint_lookup_ignores_checks() {
        let schema = student_schema();
        assert_eq!(
            schema.key_constraint_on("email").map(ConstraintDef::name),
            Some("unique_email")
        );
        assert_eq!(
            schema.key_constraint_on("id").map(ConstraintDef::name),
            Some("id_pk")
        );
        assert!(schema.key_constraint_on("grade").is_none());
    }
}
