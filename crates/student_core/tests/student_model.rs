use student_core::{calendar_date, Student};

#[test]
fn student_new_leaves_store_assigned_fields_unset() {
    let student = Student::new("Alan Turing", "alan.turing@sherborne.edu", 11);

    assert_eq!(student.id, None);
    assert_eq!(student.name.as_deref(), Some("Alan Turing"));
    assert_eq!(student.grade, Some(11));
    assert_eq!(student.birthday, None);
    assert_eq!(student.enrolled_date, None);
    assert!(!student.is_persistent());
}

#[test]
fn display_matches_record_summary_format() {
    let mut student = Student::new("Alan Turing", "alan.turing@sherborne.edu", 11);
    assert_eq!(student.to_string(), "Student None:Alan Turing,Grade 11");

    student.id = Some(2);
    assert_eq!(student.to_string(), "Student 2:Alan Turing,Grade 11");
}

#[test]
fn serialization_uses_rfc3339_timestamps() {
    let student = Student::new("Alan Turing", "alan.turing@sherborne.edu", 11)
        .with_birthday(calendar_date(1912, 6, 23).unwrap());

    let json = serde_json::to_value(&student).unwrap();
    assert_eq!(json["id"], serde_json::Value::Null);
    assert_eq!(json["email"], "alan.turing@sherborne.edu");
    assert_eq!(json["birthday"], "1912-06-23T00:00:00Z");
    assert_eq!(json["enrolled_date"], serde_json::Value::Null);

    let decoded: Student = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, student);
}

#[test]
fn calendar_date_rejects_impossible_days() {
    assert!(calendar_date(1879, 2, 30).is_err());
    assert!(calendar_date(1879, 3, 14).is_ok());
}
