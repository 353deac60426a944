use crate::{
    ConsoleColor, KeyInfo, ProgressRecord, ProgressRecordType, PsObject, PsValue, TypesError,
    format_double,
};

#[test]
fn primitives_stringify_like_the_console() {
    assert_eq!(PsValue::from(true).to_string(), "True");
    assert_eq!(PsValue::from(false).to_string(), "False");
    assert_eq!(PsValue::NULL.to_string(), "");
    assert_eq!(PsValue::from(42).to_string(), "42");
    assert_eq!(PsValue::from(2.0).to_string(), "2");
    assert_eq!(PsValue::from(1.5).to_string(), "1.5");
    assert_eq!(format_double(f64::NAN), "NaN");
}

#[test]
fn lists_join_with_spaces() {
    let list = PsValue::List(vec![PsValue::from(1), PsValue::from("a"), PsValue::from(2.5)]);
    assert_eq!(list.to_string(), "1 a 2.5");
}

#[test]
fn truthiness_follows_language_rules() {
    assert!(!PsValue::from("").is_truthy());
    assert!(PsValue::from("0").is_truthy());
    assert!(!PsValue::from(0).is_truthy());
    assert!(!PsValue::List(vec![]).is_truthy());
    assert!(!PsValue::List(vec![PsValue::from(0)]).is_truthy());
    assert!(PsValue::List(vec![PsValue::from(0), PsValue::from(0)]).is_truthy());
    assert!(PsValue::Object(PsObject::new("X")).is_truthy());
}

#[test]
fn output_collapses_to_scalar_or_list() {
    assert!(PsValue::from_output(vec![]).is_null());
    assert_eq!(PsValue::from_output(vec![PsValue::from(1)]), PsValue::from(1));
    assert!(matches!(
        PsValue::from_output(vec![PsValue::from(1), PsValue::from(2)]),
        PsValue::List(items) if items.len() == 2
    ));
}

#[test]
fn object_properties_are_case_insensitive_and_ordered() {
    let mut obj = PsObject::new("Sample").with_property("Name", "a").with_property("Size", 3);
    obj.set("name", "b");
    assert_eq!(obj.properties.len(), 2);
    assert_eq!(obj.properties[0].name, "Name");
    assert_eq!(obj.get("NAME").and_then(|v| v.as_str()), Some("b"));
}

#[test]
fn colors_parse_by_name_or_number() {
    assert_eq!("darkred".parse::<ConsoleColor>(), Ok(ConsoleColor::DarkRed));
    assert_eq!("15".parse::<ConsoleColor>(), Ok(ConsoleColor::White));
    assert_eq!(
        "puce".parse::<ConsoleColor>(),
        Err(TypesError::UnknownColor("puce".to_string()))
    );
}

#[test]
fn progress_percent_is_clamped_to_unknown() {
    let record = ProgressRecord::builder()
        .activity("Copy")
        .status_description("files")
        .percent_complete(250)
        .build();
    assert_eq!(record.percent_complete, -1);
    assert_eq!(record.summary(), "Copy: files");

    let done = ProgressRecord::builder()
        .activity("Copy")
        .progress_type(ProgressRecordType::Completed)
        .build();
    assert_eq!(done.summary(), "Copy: completed");
}

#[test]
fn key_info_classifies_keys() {
    assert!(KeyInfo::enter().is_enter());
    assert!(!KeyInfo::enter().is_printable());
    assert!(KeyInfo::from_char('a').is_printable());
    assert_eq!(KeyInfo::from_char('a').virtual_key_code, 'A' as i32);
    assert!(KeyInfo::backspace().is_backspace());
}
