//! Demonstration entry point.
//!
//! # Responsibility
//! - Walk through the student store operations against a transient
//!   in-memory database and print each result.
//! - Take no arguments; output is deterministic apart from enrollment times.

use log::warn;
use std::error::Error;
use std::process::ExitCode;
use student_core::{
    calendar_date, default_log_level, init_logging, Student, StudentColumn, StudentQuery,
    StudentStore,
};

fn main() -> ExitCode {
    let log_dir = std::env::temp_dir().join("student-demo-logs");
    if let Err(err) = init_logging(default_log_level(), &log_dir.to_string_lossy()) {
        eprintln!("logging disabled: {err}");
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    println!("student_core version={}", student_core::core_version());

    let mut store = StudentStore::open_in_memory()?;
    let mut session = store.session()?;

    let albert_einstein = Student::new("Albert Einstein", "albert.einstein@zurich.edu", 6)
        .with_birthday(calendar_date(1879, 3, 14)?);
    let alan_turing = Student::new("Alan Turing", "alan.turing@sherborne.edu", 11)
        .with_birthday(calendar_date(1912, 6, 23)?);

    session.add_all([albert_einstein, alan_turing])?;
    session.commit()?;

    let everyone = StudentQuery::new();
    let mut streamed = Vec::new();
    session.for_each(&everyone, |student| streamed.push(student.to_string()))?;
    println!("all (streamed): {streamed:?}");
    println!("all: {}", render_students(&session.all(&everyone)?));

    let names = session.project(&everyone, &[StudentColumn::Name])?;
    println!("names: {}", render_rows(&names));

    let by_name = everyone.clone().order_by(StudentColumn::Name);
    let names_sorted = session.project(&by_name, &[StudentColumn::Name])?;
    println!("names by name: {}", render_rows(&names_sorted));

    let by_grade_desc = everyone.clone().order_by(StudentColumn::Grade.desc());
    let graded = session.project(&by_grade_desc, &[StudentColumn::Name, StudentColumn::Grade])?;
    println!("by grade desc: {}", render_rows(&graded));

    let top_columns = [StudentColumn::Name, StudentColumn::Birthday];
    let top = session.project(&by_grade_desc.clone().limit(1), &top_columns)?;
    println!("highest grade (limit 1): {}", render_rows(&top));
    match session.project_first(&by_grade_desc, &top_columns)? {
        Some(row) => println!("highest grade (first): {row}"),
        None => println!("highest grade (first): None"),
    }

    println!("count: {}", session.count(&everyone)?);

    let alan_in_eleventh = everyone
        .clone()
        .filter(StudentColumn::Name.like("%Alan%"))
        .filter(StudentColumn::Grade.eq(11));
    for student in session.all(&alan_in_eleventh)? {
        println!("filtered: {student}");
    }

    session.modify_each(&everyone, |student| {
        if let Some(grade) = student.grade.as_mut() {
            *grade += 1;
        }
    })?;
    session.commit()?;
    let grade_columns = [StudentColumn::Name, StudentColumn::Grade];
    let grades = session.project(&everyone, &grade_columns)?;
    println!("after per-record increment: {}", render_rows(&grades));

    match session.update_where(&everyone, &[StudentColumn::Grade.increment_by(1)]) {
        Ok(changed) => println!("bulk increment updated {changed} rows"),
        Err(err) => {
            warn!("event=demo_bulk_update module=cli status=error error={err}");
            println!("bulk increment rejected: {err}");
        }
    }
    let grades = session.project(&everyone, &grade_columns)?;
    println!("after bulk increment: {}", render_rows(&grades));

    let einstein_query = everyone.filter(StudentColumn::Name.eq("Albert Einstein"));
    if let Some(einstein) = session.first(&einstein_query)? {
        session.delete(&einstein)?;
    }
    session.commit()?;

    match session.first(&einstein_query)? {
        Some(student) => println!("after delete: {student}"),
        None => println!("after delete: None"),
    }

    session.close()?;
    Ok(())
}

fn render_students(students: &[Student]) -> String {
    let items = students.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}

fn render_rows(rows: &[student_core::ProjectedRow]) -> String {
    let items = rows.iter().map(ToString::to_string).collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}
