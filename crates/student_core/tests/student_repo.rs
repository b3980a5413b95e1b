use rusqlite::Connection;
use student_core::db::open_db_in_memory;
use student_core::db::schema::{student_schema, TableSchema};
use student_core::{
    calendar_date, Aggregate, ConstraintKind, FieldValue, QueryError, RepoError,
    SqliteStudentRepository, Student, StudentColumn, StudentQuery, StudentRepository,
};
use time::OffsetDateTime;

fn setup() -> (Connection, TableSchema) {
    let schema = student_schema();
    let conn = open_db_in_memory(&schema).unwrap();
    (conn, schema)
}

fn einstein() -> Student {
    Student::new("Albert Einstein", "albert.einstein@zurich.edu", 6)
        .with_birthday(calendar_date(1879, 3, 14).unwrap())
}

fn turing() -> Student {
    Student::new("Alan Turing", "alan.turing@sherborne.edu", 11)
        .with_birthday(calendar_date(1912, 6, 23).unwrap())
}

fn expect_constraint(err: RepoError, kind: ConstraintKind, name: &str) {
    match err {
        RepoError::Constraint(violation) => {
            assert_eq!(violation.kind, kind, "unexpected violation: {violation}");
            assert_eq!(violation.constraint.as_deref(), Some(name));
        }
        other => panic!("expected constraint violation, got {other}"),
    }
}

#[test]
fn insert_and_get_roundtrip_fills_enrollment_default() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let before = OffsetDateTime::now_utc().unix_timestamp();
    let id = repo.insert_student(&einstein()).unwrap();
    let after = OffsetDateTime::now_utc().unix_timestamp();

    let loaded = repo.get_student(id).unwrap().unwrap();
    assert_eq!(loaded.id, Some(id));
    assert_eq!(loaded.name.as_deref(), Some("Albert Einstein"));
    assert_eq!(loaded.birthday, Some(calendar_date(1879, 3, 14).unwrap()));

    let enrolled = loaded.enrolled_date.unwrap().unix_timestamp();
    assert!(enrolled >= before - 1 && enrolled <= after + 1);
}

#[test]
fn explicit_enrollment_date_is_kept() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    let enrolled = calendar_date(2020, 9, 1).unwrap();

    let id = repo
        .insert_student(&turing().with_enrolled_date(enrolled))
        .unwrap();

    let loaded = repo.get_student(id).unwrap().unwrap();
    assert_eq!(loaded.enrolled_date, Some(enrolled));
}

#[test]
fn ids_are_assigned_in_insert_order() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let first = repo.insert_student(&einstein()).unwrap();
    let second = repo.insert_student(&turing()).unwrap();
    assert!(second > first);
}

#[test]
fn duplicate_email_is_a_unique_violation() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_student(&einstein()).unwrap();

    let mut copy = turing();
    copy.email = Some("albert.einstein@zurich.edu".to_string());
    let err = repo.insert_student(&copy).unwrap_err();
    expect_constraint(err, ConstraintKind::Unique, "unique_email");
}

#[test]
fn duplicate_explicit_id_is_a_primary_key_violation() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let mut first = einstein();
    first.id = Some(7);
    repo.insert_student(&first).unwrap();

    let mut second = turing();
    second.id = Some(7);
    let err = repo.insert_student(&second).unwrap_err();
    expect_constraint(err, ConstraintKind::PrimaryKey, "id_pk");
}

#[test]
fn grade_range_is_inclusive_of_bounds() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    repo.insert_student(&Student::new("Low", "low@school.edu", 1)).unwrap();
    repo.insert_student(&Student::new("High", "high@school.edu", 12)).unwrap();

    for (grade, email) in [(0, "zero@school.edu"), (13, "thirteen@school.edu")] {
        let err = repo
            .insert_student(&Student::new("Out", email, grade))
            .unwrap_err();
        expect_constraint(err, ConstraintKind::Check, "grade_between_1_and_12");
    }
}

#[test]
fn overlong_email_is_rejected() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let email = format!("{}@school.edu", "a".repeat(44));
    assert_eq!(email.len(), 55);
    repo.insert_student(&Student::new("Fits", email, 5)).unwrap();

    let email = format!("{}@school.edu", "b".repeat(45));
    let err = repo
        .insert_student(&Student::new("Too long", email, 5))
        .unwrap_err();
    expect_constraint(err, ConstraintKind::Check, "email_max_length");
}

#[test]
fn update_and_delete_report_missing_rows() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let mut ghost = einstein();
    ghost.id = Some(404);
    assert!(matches!(
        repo.update_student(&ghost).unwrap_err(),
        RepoError::NotFound(404)
    ));
    assert!(matches!(
        repo.delete_student(404).unwrap_err(),
        RepoError::NotFound(404)
    ));
    assert!(matches!(
        repo.update_student(&einstein()).unwrap_err(),
        RepoError::MissingPrimaryKey
    ));
}

#[test]
fn update_rewrites_mutable_columns_and_keeps_enrollment() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    let id = repo.insert_student(&einstein()).unwrap();
    let stored = repo.get_student(id).unwrap().unwrap();

    let mut changed = stored.clone();
    changed.grade = Some(7);
    changed.enrolled_date = None;
    repo.update_student(&changed).unwrap();

    let loaded = repo.get_student(id).unwrap().unwrap();
    assert_eq!(loaded.grade, Some(7));
    assert_eq!(loaded.enrolled_date, stored.enrolled_date);
}

#[test]
fn bulk_insert_reports_rows_written() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let written = repo
        .insert_students(&[
            einstein(),
            turing(),
            Student::new("Grace Hopper", "grace.hopper@vassar.edu", 12),
        ])
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(repo.list_students(&StudentQuery::new()).unwrap().len(), 3);
}

#[test]
fn aggregates_cover_sum_min_max_and_empty_matches() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_students(&[einstein(), turing()]).unwrap();
    let everyone = StudentQuery::new();

    assert_eq!(
        repo.aggregate_students(&everyone, Aggregate::Sum(StudentColumn::Grade))
            .unwrap(),
        FieldValue::Integer(17)
    );
    assert_eq!(
        repo.aggregate_students(&everyone, Aggregate::Min(StudentColumn::Name))
            .unwrap(),
        FieldValue::Text("Alan Turing".to_string())
    );
    assert_eq!(
        repo.aggregate_students(&everyone, Aggregate::Max(StudentColumn::Birthday))
            .unwrap(),
        FieldValue::Timestamp(calendar_date(1912, 6, 23).unwrap())
    );

    let nobody = StudentQuery::new().filter(StudentColumn::Grade.gt(12));
    assert_eq!(
        repo.aggregate_students(&nobody, Aggregate::Sum(StudentColumn::Grade))
            .unwrap(),
        FieldValue::Null
    );
    assert_eq!(
        repo.aggregate_students(&nobody, Aggregate::Count(StudentColumn::Id))
            .unwrap(),
        FieldValue::Integer(0)
    );
}

#[test]
fn projection_requires_columns_and_keeps_requested_order() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_student(&turing()).unwrap();

    let err = repo
        .project_students(&StudentQuery::new(), &[])
        .unwrap_err();
    assert!(matches!(err, RepoError::Query(QueryError::EmptyProjection)));

    let rows = repo
        .project_students(
            &StudentQuery::new(),
            &[StudentColumn::Grade, StudentColumn::Name],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(StudentColumn::Grade), Some(&FieldValue::Integer(11)));
    assert_eq!(rows[0].get(StudentColumn::Email), None);
    assert_eq!(rows[0].to_string(), "(11, 'Alan Turing')");
}

#[test]
fn bulk_update_rejects_modifiers_and_bad_assignments() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_students(&[einstein(), turing()]).unwrap();

    let limited = StudentQuery::new().limit(1);
    assert!(matches!(
        repo.update_students(&limited, &[StudentColumn::Grade.increment_by(1)])
            .unwrap_err(),
        RepoError::Query(QueryError::UnsupportedModifier { .. })
    ));
    assert!(matches!(
        repo.update_students(&StudentQuery::new(), &[]).unwrap_err(),
        RepoError::Query(QueryError::EmptyUpdate)
    ));
    assert!(matches!(
        repo.update_students(&StudentQuery::new(), &[StudentColumn::Name.increment_by(1)])
            .unwrap_err(),
        RepoError::Query(QueryError::TypeMismatch { .. })
    ));
}

#[test]
fn bulk_update_out_of_range_changes_no_rows() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_students(&[einstein(), turing()]).unwrap();

    let err = repo
        .update_students(&StudentQuery::new(), &[StudentColumn::Grade.increment_by(2)])
        .unwrap_err();
    expect_constraint(err, ConstraintKind::Check, "grade_between_1_and_12");

    let grades = repo
        .list_students(&StudentQuery::new().order_by(StudentColumn::Grade))
        .unwrap()
        .into_iter()
        .filter_map(|student| student.grade)
        .collect::<Vec<_>>();
    assert_eq!(grades, vec![6, 11]);
}

#[test]
fn bulk_delete_removes_only_matches() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();
    repo.insert_students(&[einstein(), turing()]).unwrap();

    let removed = repo
        .delete_students(&StudentQuery::new().filter(StudentColumn::Grade.lt(10)))
        .unwrap();
    assert_eq!(removed, 1);

    let remaining = repo.list_students(&StudentQuery::new()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name.as_deref(), Some("Alan Turing"));
}

#[test]
fn null_columns_are_written_and_read_back_as_none() {
    let (conn, schema) = setup();
    let repo = SqliteStudentRepository::try_new(&conn, &schema).unwrap();

    let first = repo
        .insert_student(&Student::default().with_name("Anonymous"))
        .unwrap();
    repo.insert_student(&Student::default().with_name("Nameless")).unwrap();
    let loaded = repo.get_student(first).unwrap().unwrap();
    assert_eq!(loaded.email, None);
    assert_eq!(loaded.grade, None);

    repo.insert_student(&einstein()).unwrap();
    let changed = repo
        .update_students(&StudentQuery::new(), &[StudentColumn::Grade.set(None::<i64>)])
        .unwrap();
    assert_eq!(changed, 3);

    let students = repo.list_students(&StudentQuery::new()).unwrap();
    assert_eq!(students.len(), 3);
    assert!(students.iter().all(|student| student.grade.is_none()));
}
