use poshconsole_types::{PsObject, PsValue};

use super::{Command, Parameter, SubCommand, quote_literal, render_value};

#[test]
fn script_renders_as_typed() {
    let command = Command::script("  Get-Thing -Name x  ");
    assert_eq!(command.to_string(), "Get-Thing -Name x");
}

#[test]
fn intermediate_script_is_grouped_when_piped() {
    let command = Command::script("1; 2").pipe(SubCommand::command("Out-Default", vec![]));
    assert_eq!(command.to_string(), "(1; 2) | Out-Default");
}

#[test]
fn trailing_script_is_not_grouped() {
    let command = Command::command("Get-Item", vec![]).pipe(SubCommand::script("$input"));
    assert_eq!(command.to_string(), "Get-Item | $input");
}

#[test]
fn parameters_render_in_source_form() {
    let command = Command::command(
        "Write-Host",
        vec![
            Parameter::positional("it's"),
            Parameter::named("ForegroundColor", "Red"),
            Parameter::switch("NoNewline"),
            Parameter::Switch {
                name: "Verbose".to_string(),
                value: false,
            },
            Parameter::named("Count", 3),
        ],
    );
    assert_eq!(
        command.to_string(),
        "Write-Host 'it''s' -ForegroundColor 'Red' -NoNewline -Verbose:$false -Count 3"
    );
}

#[test]
fn values_render_as_literals() {
    assert_eq!(render_value(&PsValue::from(true)), "$true");
    assert_eq!(render_value(&PsValue::NULL), "$null");
    assert_eq!(render_value(&PsValue::from(2.5)), "2.5");
    assert_eq!(
        render_value(&PsValue::List(vec![PsValue::from(1), PsValue::from("a")])),
        "@(1, 'a')"
    );
    let obj = PsObject::new("Thing").with_to_string("thing");
    assert_eq!(render_value(&PsValue::Object(obj)), "'thing'");
}

#[test]
fn quote_literal_doubles_quotes() {
    assert_eq!(quote_literal("/tmp/o'brien/profile.ps1"), "'/tmp/o''brien/profile.ps1'");
}

#[test]
fn secret_flag_is_kept() {
    let command = Command::script("1").secret();
    assert!(command.is_secret());
    assert!(!Command::from("1").is_secret());
    assert!(Command::new().is_empty());
}
