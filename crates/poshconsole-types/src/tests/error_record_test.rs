use crate::{ErrorCategory, ErrorCategoryKind, ErrorRecord, InvocationInfo, RenderOptions};

fn thrown_record() -> ErrorRecord {
    ErrorRecord::builder()
        .message("boom")
        .fully_qualified_error_id("boom")
        .category(
            ErrorCategory::builder()
                .kind(ErrorCategoryKind::OperationStopped)
                .target_name("boom")
                .target_type("String")
                .reason("RuntimeException")
                .build(),
        )
        .was_thrown_from_throw_statement(true)
        .invocation_info(
            InvocationInfo::builder()
                .line_text("throw 'boom'".to_string())
                .line(1)
                .column(1)
                .length(12)
                .build(),
        )
        .build()
}

#[test]
fn concise_view_is_just_the_message() {
    let record = ErrorRecord::new("line one\r\nline two", "Some.Id");
    assert_eq!(record.render_concise(), "line one\nline two");
    assert_eq!(record.to_string(), "line one\nline two");
}

#[test]
fn normal_view_has_position_message_and_category() {
    let rendered = thrown_record().render_normal();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "At line:1 char:1");
    assert_eq!(lines[1], "+ throw 'boom'");
    assert_eq!(lines[2], "+ ~~~~~~~~~~~~");
    assert_eq!(lines[3], "boom");
    assert_eq!(
        lines[4],
        "    + CategoryInfo          : OperationStopped: (boom:String), RuntimeException"
    );
    assert_eq!(lines[5], "    + FullyQualifiedErrorId : boom");
    assert!(!rendered.ends_with('\n'));
}

#[test]
fn options_can_drop_sections() {
    let rendered = thrown_record().render_with_options(RenderOptions {
        include_category: false,
        include_position: false,
        trim: true,
    });
    assert_eq!(rendered, "boom");
}

#[test]
fn category_message_includes_activity() {
    let category = ErrorCategory::builder()
        .activity("Write-Error")
        .reason("WriteErrorException")
        .build();
    assert_eq!(
        category.message(),
        "NotSpecified: (:) [Write-Error], WriteErrorException"
    );
}

#[test]
fn error_record_as_object_keeps_message() {
    let obj = thrown_record().to_ps_object();
    assert_eq!(obj.type_name(), "System.Management.Automation.ErrorRecord");
    assert_eq!(obj.get("message").and_then(|v| v.as_str()), Some("boom"));
    assert_eq!(obj.to_string(), "boom");
}

#[test]
fn category_kind_parses_by_name() {
    use crate::ErrorCategoryKind;

    assert_eq!(
        ErrorCategoryKind::parse("objectnotfound"),
        Some(ErrorCategoryKind::ObjectNotFound)
    );
    assert_eq!(ErrorCategoryKind::parse("Bogus"), None);
}
