use rusqlite::Connection;
use student_core::db::schema::{
    create_schema, schema_version, student_schema, SCHEMA_VERSION,
};
use student_core::db::{open_db, open_db_in_memory, DbError};
use student_core::{
    RepoError, SqliteStudentRepository, Student, StudentQuery, StudentStore,
};

#[test]
fn open_db_in_memory_creates_table_index_and_version() {
    let schema = student_schema();
    let conn = open_db_in_memory(&schema).unwrap();

    assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    assert!(object_exists(&conn, "table", "students"));
    assert!(object_exists(&conn, "index", "index_name"));
}

#[test]
fn create_schema_twice_reports_conflict() {
    let schema = student_schema();
    let mut conn = Connection::open_in_memory().unwrap();

    create_schema(&mut conn, &schema).unwrap();
    let err = create_schema(&mut conn, &schema).unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict { ref object } if object == "students"));
}

#[test]
fn conflicting_index_name_creates_nothing() {
    let schema = student_schema();
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE courses (name TEXT);
         CREATE INDEX index_name ON courses (name);",
    )
    .unwrap();

    let err = create_schema(&mut conn, &schema).unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict { ref object } if object == "index_name"));
    assert!(!object_exists(&conn, "table", "students"));
    assert_eq!(schema_version(&conn).unwrap(), 0);
}

#[test]
fn reopening_file_store_keeps_committed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("students.db");

    {
        let mut store = StudentStore::open(&path).unwrap();
        let mut session = store.session().unwrap();
        session
            .add(Student::new("Ada Lovelace", "ada@analytical.engine", 9))
            .unwrap();
        session.commit().unwrap();
        session.close().unwrap();
    }

    let schema = student_schema();
    let conn = open_db(&path, &schema).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    drop(conn);

    let mut store = StudentStore::open(&path).unwrap();
    let mut session = store.session().unwrap();
    let students = session.all(&StudentQuery::new()).unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].name.as_deref(), Some("Ada Lovelace"));
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match StudentStore::open(&path) {
        Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }) => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, SCHEMA_VERSION);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected unsupported schema version"),
    }
}

#[test]
fn stamped_database_missing_column_is_rejected() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT);
         PRAGMA user_version = 1;",
    )
    .unwrap();

    match StudentStore::from_connection(conn, student_schema()) {
        Err(DbError::MissingRequiredColumn { table, column }) => {
            assert_eq!(table, "students");
            assert_eq!(column, "email");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected missing column error"),
    }
}

#[test]
fn repository_rejects_unversioned_connection() {
    let schema = student_schema();
    let conn = Connection::open_in_memory().unwrap();

    match SqliteStudentRepository::try_new(&conn, &schema) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        }) => {
            assert_eq!(expected_version, SCHEMA_VERSION);
            assert_eq!(actual_version, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}
