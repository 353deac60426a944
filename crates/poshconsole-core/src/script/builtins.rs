use std::time::{Duration, Instant};

use poshconsole_types::{
    ConsoleColor, ErrorCategory, ErrorCategoryKind, ErrorRecord, KeyInfo, ProgressRecord,
    ProgressRecordType, PsObject, PsPrimitiveValue, PsValue, Style,
};

use super::ast::BinaryOp;
use super::eval::{Eval, Flow, Interpreter};
use super::format::{format_lines, format_string};
use super::ops::{self, wildcard_match};
use crate::engine::{CommandArgs, InvocationContext};
use crate::host::{HostError, HostHandle};

pub(crate) type BuiltinFn = fn(
    &mut Interpreter,
    &CommandArgs,
    Vec<PsValue>,
    &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>>;

/// A command implemented by the interpreter itself.
pub(crate) struct BuiltinDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// Named parameters the command accepts; anything else is a binding error.
    pub parameters: &'static [&'static str],
    /// Parameters that never consume the following argument.
    pub switches: &'static [&'static str],
    pub run: BuiltinFn,
}

const ERROR_RECORD_TYPE: &str = "System.Management.Automation.ErrorRecord";
const SLEEP_SLICE: Duration = Duration::from_millis(20);

pub(crate) static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "Write-Output",
        aliases: &["echo", "write"],
        parameters: &["InputObject", "NoEnumerate"],
        switches: &["NoEnumerate"],
        run: write_output,
    },
    BuiltinDef {
        name: "Write-Host",
        aliases: &[],
        parameters: &["Object", "NoNewline", "Separator", "ForegroundColor", "BackgroundColor"],
        switches: &["NoNewline"],
        run: write_host,
    },
    BuiltinDef {
        name: "Write-Error",
        aliases: &[],
        parameters: &["Message", "Category", "ErrorId", "TargetObject"],
        switches: &[],
        run: write_error,
    },
    BuiltinDef {
        name: "Write-Warning",
        aliases: &[],
        parameters: &["Message"],
        switches: &[],
        run: write_warning,
    },
    BuiltinDef {
        name: "Write-Verbose",
        aliases: &[],
        parameters: &["Message"],
        switches: &[],
        run: write_verbose,
    },
    BuiltinDef {
        name: "Write-Debug",
        aliases: &[],
        parameters: &["Message"],
        switches: &[],
        run: write_debug,
    },
    BuiltinDef {
        name: "Write-Progress",
        aliases: &[],
        parameters: &[
            "Activity",
            "Status",
            "Id",
            "PercentComplete",
            "SecondsRemaining",
            "CurrentOperation",
            "ParentId",
            "Completed",
        ],
        switches: &["Completed"],
        run: write_progress,
    },
    BuiltinDef {
        name: "Read-Host",
        aliases: &[],
        parameters: &["Prompt", "AsSecureString", "MaskInput"],
        switches: &["AsSecureString", "MaskInput"],
        run: read_host,
    },
    BuiltinDef {
        name: "Read-Key",
        aliases: &[],
        parameters: &[],
        switches: &[],
        run: read_key,
    },
    BuiltinDef {
        name: "Out-Default",
        aliases: &[],
        parameters: &["InputObject"],
        switches: &[],
        run: out_default,
    },
    BuiltinDef {
        name: "Tee-Default",
        aliases: &[],
        parameters: &["InputObject"],
        switches: &[],
        run: tee_default,
    },
    BuiltinDef {
        name: "Out-Host",
        aliases: &["oh"],
        parameters: &["InputObject", "Paging"],
        switches: &["Paging"],
        run: out_default,
    },
    BuiltinDef {
        name: "Out-String",
        aliases: &[],
        parameters: &["InputObject", "Stream", "Width"],
        switches: &["Stream"],
        run: out_string,
    },
    BuiltinDef {
        name: "Out-Null",
        aliases: &[],
        parameters: &["InputObject"],
        switches: &[],
        run: out_null,
    },
    BuiltinDef {
        name: "ForEach-Object",
        aliases: &["%", "foreach"],
        parameters: &["Process", "Begin", "End", "MemberName"],
        switches: &[],
        run: foreach_object,
    },
    BuiltinDef {
        name: "Where-Object",
        aliases: &["?", "where"],
        parameters: &[
            "FilterScript",
            "Property",
            "Value",
            "EQ",
            "NE",
            "GT",
            "GE",
            "LT",
            "LE",
            "Like",
            "NotLike",
        ],
        switches: &["EQ", "NE", "GT", "GE", "LT", "LE", "Like", "NotLike"],
        run: where_object,
    },
    BuiltinDef {
        name: "Get-Command",
        aliases: &["gcm"],
        parameters: &["Name", "CommandType"],
        switches: &[],
        run: get_command,
    },
    BuiltinDef {
        name: "Get-Module",
        aliases: &["gmo"],
        parameters: &["Name", "ListAvailable"],
        switches: &["ListAvailable"],
        run: get_module,
    },
    BuiltinDef {
        name: "Import-Module",
        aliases: &["ipmo"],
        parameters: &["Name", "Force"],
        switches: &["Force"],
        run: import_module,
    },
    BuiltinDef {
        name: "Get-Variable",
        aliases: &["gv"],
        parameters: &["Name", "ValueOnly"],
        switches: &["ValueOnly"],
        run: get_variable,
    },
    BuiltinDef {
        name: "Set-Variable",
        aliases: &["sv", "set"],
        parameters: &["Name", "Value", "Scope"],
        switches: &[],
        run: set_variable,
    },
    BuiltinDef {
        name: "Get-Location",
        aliases: &["pwd", "gl"],
        parameters: &[],
        switches: &[],
        run: get_location,
    },
    BuiltinDef {
        name: "Set-Location",
        aliases: &["cd", "sl", "chdir"],
        parameters: &["Path", "LiteralPath"],
        switches: &[],
        run: set_location,
    },
    BuiltinDef {
        name: "Start-Sleep",
        aliases: &["sleep"],
        parameters: &["Seconds", "Milliseconds"],
        switches: &[],
        run: start_sleep,
    },
    BuiltinDef {
        name: "Invoke-Expression",
        aliases: &["iex"],
        parameters: &["Command"],
        switches: &[],
        run: invoke_expression,
    },
    BuiltinDef {
        name: "Clear-Host",
        aliases: &["cls", "clear"],
        parameters: &[],
        switches: &[],
        run: clear_host,
    },
    BuiltinDef {
        name: "Set-Title",
        aliases: &[],
        parameters: &["Title"],
        switches: &[],
        run: set_title,
    },
    BuiltinDef {
        name: "Get-History",
        aliases: &["h", "history", "ghy"],
        parameters: &["Count", "Id"],
        switches: &[],
        run: get_history,
    },
    BuiltinDef {
        name: "prompt",
        aliases: &[],
        parameters: &[],
        switches: &[],
        run: prompt,
    },
];

pub(crate) fn find(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|def| {
        def.name.eq_ignore_ascii_case(name) || def.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

// --- helpers ---

fn text(args: &CommandArgs, names: &[&str], position: usize) -> Option<String> {
    args.value(names, position).map(ToString::to_string)
}

/// Named value or every positional argument, flattened; pipeline input otherwise.
fn objects(args: &CommandArgs, name: &str, input: Vec<PsValue>) -> Vec<PsValue> {
    let given: Vec<PsValue> = args
        .get(&[name])
        .into_iter()
        .chain(args.positional())
        .cloned()
        .flat_map(PsValue::into_items)
        .collect();
    if given.is_empty() { input } else { given }
}

fn script_text(value: &PsValue) -> Option<&str> {
    match value {
        PsValue::Primitive(PsPrimitiveValue::ScriptBlock(text)) => Some(text),
        _ => None,
    }
}

fn silenced(preference: &PsValue) -> bool {
    let value = preference.to_string();
    value.eq_ignore_ascii_case("SilentlyContinue") || value.eq_ignore_ascii_case("Ignore")
}

fn shows(interp: &Interpreter, args: &CommandArgs, switch: &str, preference: &str) -> bool {
    if args.has(&[switch]) {
        return args.switch(&[switch]);
    }
    !silenced(&interp.variable(preference))
}

fn bind_error(interp: &Interpreter, command: &str, parameter: &str, message: String) -> Flow {
    Flow::Error(
        interp.located(
            ErrorRecord::builder()
                .message(format!("Cannot bind parameter '{parameter}'. {message}"))
                .fully_qualified_error_id(format!("CannotConvertArgumentNoMessage,{command}"))
                .category(
                    ErrorCategory::builder()
                        .kind(ErrorCategoryKind::InvalidArgument)
                        .activity(command)
                        .reason("ParameterBindingException")
                        .build(),
                )
                .build(),
        ),
    )
}

fn not_found(id: &str, kind: ErrorCategoryKind, message: String, target: &str) -> ErrorRecord {
    ErrorRecord::builder()
        .message(message)
        .fully_qualified_error_id(id)
        .target_object(PsValue::from(target))
        .category(
            ErrorCategory::builder()
                .kind(kind)
                .target_name(target)
                .target_type("String")
                .build(),
        )
        .build()
}

fn int_arg(
    interp: &Interpreter,
    args: &CommandArgs,
    name: &str,
    position: Option<usize>,
    command: &str,
) -> Eval<Option<i32>> {
    let value = match position {
        Some(p) => args.value(&[name], p),
        None => args.get(&[name]),
    };
    value
        .map(|v| {
            v.as_f64().map(|f| f as i32).ok_or_else(|| {
                bind_error(
                    interp,
                    command,
                    name,
                    format!("Cannot convert value \"{v}\" to type \"System.Int32\"."),
                )
            })
        })
        .transpose()
}

/// Writes values to the host the way the end of an interactive pipeline does.
fn render(host: &HostHandle, values: &[PsValue]) {
    let mut pending: Vec<PsValue> = Vec::new();
    let flush = |pending: &mut Vec<PsValue>| {
        for line in format_lines(pending) {
            host.write_line(line);
        }
        pending.clear();
    };
    for value in values {
        match value {
            PsValue::Object(obj) if obj.type_name() == ERROR_RECORD_TYPE => {
                flush(&mut pending);
                host.write_error_line(obj.to_string());
            }
            other => pending.push(other.clone()),
        }
    }
    flush(&mut pending);
}

// --- output ---

fn write_output(
    _interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    if args.switch(&["NoEnumerate"]) {
        let given: Vec<PsValue> = args
            .get(&["InputObject"])
            .into_iter()
            .chain(args.positional())
            .cloned()
            .collect();
        return Ok(if given.is_empty() { input } else { given });
    }
    Ok(objects(args, "InputObject", input))
}

fn write_host(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let color = |name: &str| -> Eval<Option<ConsoleColor>> {
        args.get(&[name])
            .map(|v| {
                v.to_string().parse::<ConsoleColor>().map_err(|_| {
                    bind_error(
                        &*interp,
                        "Write-Host",
                        name,
                        format!("Cannot convert value \"{v}\" to type \"System.ConsoleColor\"."),
                    )
                })
            })
            .transpose()
    };
    let style = Style {
        foreground: color("ForegroundColor")?,
        background: color("BackgroundColor")?,
    };
    let separator = text(args, &["Separator"], usize::MAX).unwrap_or_else(|| " ".to_string());
    let line = objects(args, "Object", input)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&separator);

    if args.switch(&["NoNewline"]) {
        ctx.host().write_styled(line, style);
    } else {
        ctx.host().write_line_styled(line, style);
    }
    Ok(Vec::new())
}

fn write_error(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let messages: Vec<String> = match args.get(&["Message"]) {
        Some(message) => vec![message.to_string()],
        None if !args.positional().is_empty() => vec![
            args.positional()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        ],
        None => input
            .iter()
            .map(|item| match item {
                PsValue::Object(obj) => obj
                    .get("Message")
                    .map_or_else(|| obj.to_string(), ToString::to_string),
                other => other.to_string(),
            })
            .collect(),
    };
    let kind = args
        .get(&["Category"])
        .and_then(|c| ErrorCategoryKind::parse(&c.to_string()))
        .unwrap_or_default();
    let error_id = text(args, &["ErrorId"], usize::MAX)
        .unwrap_or_else(|| "Microsoft.PowerShell.Commands.WriteErrorException".to_string());

    for message in messages {
        let mut record = ErrorRecord::builder()
            .message(message)
            .fully_qualified_error_id(error_id.clone())
            .category(
                ErrorCategory::builder()
                    .kind(kind)
                    .activity("Write-Error")
                    .reason("WriteErrorException")
                    .build(),
            )
            .build();
        record.target_object = args.get(&["TargetObject"]).cloned();
        ctx.write_error(interp.located(record));
    }
    Ok(Vec::new())
}

fn message(args: &CommandArgs, input: &[PsValue]) -> String {
    text(args, &["Message"], 0).unwrap_or_else(|| PsValue::List(input.to_vec()).to_string())
}

fn write_warning(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let action = args
        .get(&["WarningAction"])
        .map_or_else(|| interp.variable("WarningPreference"), Clone::clone);
    if !silenced(&action) {
        ctx.host().write_warning_line(message(args, &input));
    }
    Ok(Vec::new())
}

fn write_verbose(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    if shows(interp, args, "Verbose", "VerbosePreference") {
        ctx.host().write_verbose_line(message(args, &input));
    }
    Ok(Vec::new())
}

fn write_debug(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    if shows(interp, args, "Debug", "DebugPreference") {
        ctx.host().write_debug_line(message(args, &input));
    }
    Ok(Vec::new())
}

fn write_progress(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    if silenced(&interp.variable("ProgressPreference")) {
        return Ok(Vec::new());
    }
    let command = "Write-Progress";
    let mut record = ProgressRecord::builder()
        .activity(text(args, &["Activity"], 0).unwrap_or_default())
        .activity_id(int_arg(interp, args, "Id", Some(2), command)?.unwrap_or(0))
        .build();
    record.status_description = text(args, &["Status"], 1);
    record.current_operation = text(args, &["CurrentOperation"], usize::MAX);
    record.parent_activity_id =
        int_arg(interp, args, "ParentId", None, command)?.filter(|&id| id >= 0);
    record.percent_complete = int_arg(interp, args, "PercentComplete", None, command)?
        .filter(|p| (-1..=100).contains(p))
        .unwrap_or(-1);
    record.seconds_remaining = int_arg(interp, args, "SecondsRemaining", None, command)?;
    if args.switch(&["Completed"]) {
        record.progress_type = ProgressRecordType::Completed;
    }
    ctx.host().write_progress(ctx.source_id(), record);
    Ok(Vec::new())
}

// --- input ---

fn read_failed(interp: &Interpreter, ctx: &InvocationContext<'_>, error: &HostError) -> Flow {
    if ctx.is_stopping() {
        return Flow::Stopped;
    }
    Flow::Error(
        interp.located(
            ErrorRecord::builder()
                .message(format!("The console input could not be read: {error}"))
                .fully_qualified_error_id("ReadHostInputFailed")
                .category(
                    ErrorCategory::builder()
                        .kind(ErrorCategoryKind::ReadError)
                        .reason("HostException")
                        .build(),
                )
                .build(),
        ),
    )
}

fn read_host(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    if let Some(prompt) = text(args, &["Prompt"], 0) {
        ctx.host().write(format!("{prompt}: "));
    }
    let result = if args.switch(&["AsSecureString"]) {
        ctx.read_line_secret()
            .map(|bytes| PsValue::Primitive(PsPrimitiveValue::SecureString(bytes)))
    } else if args.switch(&["MaskInput"]) {
        ctx.read_line_secret()
            .map(|bytes| PsValue::from(String::from_utf8_lossy(&bytes).into_owned()))
    } else {
        ctx.read_line().map(PsValue::from)
    };
    result
        .map(|value| vec![value])
        .map_err(|e| read_failed(&*interp, &*ctx, &e))
}

fn key_object(key: KeyInfo) -> PsValue {
    PsValue::Object(
        PsObject::new("System.Management.Automation.Host.KeyInfo")
            .with_property("VirtualKeyCode", key.virtual_key_code)
            .with_property("Character", key.character)
            .with_property("ControlKeyState", i64::from(key.control_key_state.0))
            .with_property("KeyDown", key.key_down)
            .with_to_string(key.character.to_string()),
    )
}

fn read_key(
    interp: &mut Interpreter,
    _args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    ctx.read_key()
        .map(|key| vec![key_object(key)])
        .map_err(|e| read_failed(&*interp, &*ctx, &e))
}

// --- formatting sinks ---

fn out_default(
    _interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    render(ctx.host(), &objects(args, "InputObject", input));
    Ok(Vec::new())
}

fn tee_default(
    _interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let values = objects(args, "InputObject", input);
    render(ctx.host(), &values);
    Ok(values)
}

fn out_string(
    _interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let values = objects(args, "InputObject", input);
    if args.switch(&["Stream"]) {
        return Ok(format_lines(&values).into_iter().map(PsValue::from).collect());
    }
    Ok(vec![PsValue::from(format_string(&values))])
}

fn out_null(
    _interp: &mut Interpreter,
    _args: &CommandArgs,
    _input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    Ok(Vec::new())
}

// --- pipeline shaping ---

fn foreach_object(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let process = args.value(&["Process"], 0).cloned();
    let member = args.get(&["MemberName"]).cloned().or_else(|| {
        process
            .as_ref()
            .filter(|p| script_text(p).is_none())
            .cloned()
    });

    let mut out = Vec::new();
    if let Some(member) = member {
        let name = member.to_string();
        for item in input {
            ctx.check_stop()?;
            let value = ops::member(&item, &name);
            if !value.is_null() {
                out.push(value);
            }
        }
        return Ok(out);
    }

    let block_for = |interp: &mut Interpreter, value: Option<&PsValue>| {
        value
            .and_then(script_text)
            .map(|text| interp.script_block(text))
            .transpose()
    };
    let begin = block_for(interp, args.get(&["Begin"]))?;
    let end = block_for(interp, args.get(&["End"]))?;
    let Some(process) = block_for(interp, process.as_ref())? else {
        return Err(bind_error(
            interp,
            "ForEach-Object",
            "Process",
            "The argument is null. Provide a script block.".to_string(),
        ));
    };

    if let Some(begin) = begin {
        out.extend(interp.invoke_with_item(&begin, PsValue::NULL, ctx)?);
    }
    for item in input {
        ctx.check_stop()?;
        out.extend(interp.invoke_with_item(&process, item, ctx)?);
    }
    if let Some(end) = end {
        out.extend(interp.invoke_with_item(&end, PsValue::NULL, ctx)?);
    }
    Ok(out)
}

fn where_object(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let first = args.value(&["FilterScript"], 0).cloned();
    let mut kept = Vec::new();

    if let Some(text) = first.as_ref().and_then(script_text) {
        let block = interp.script_block(text)?;
        for item in input {
            ctx.check_stop()?;
            let result = interp.invoke_with_item(&block, item.clone(), ctx)?;
            if PsValue::from_output(result).is_truthy() {
                kept.push(item);
            }
        }
        return Ok(kept);
    }

    let property = text(args, &["Property"], 0).unwrap_or_default();
    let operator = [
        ("EQ", BinaryOp::Eq),
        ("NE", BinaryOp::Ne),
        ("GT", BinaryOp::Gt),
        ("GE", BinaryOp::Ge),
        ("LT", BinaryOp::Lt),
        ("LE", BinaryOp::Le),
        ("Like", BinaryOp::Like),
        ("NotLike", BinaryOp::NotLike),
    ]
    .into_iter()
    .find(|(name, _)| args.switch(&[name]))
    .map(|(_, op)| op);
    let value = args.value(&["Value"], 1).cloned().unwrap_or(PsValue::NULL);

    for item in input {
        ctx.check_stop()?;
        let member = ops::member(&item, &property);
        let keep = match operator {
            Some(op) => ops::binary(op, member, value.clone())
                .map_err(|e| Flow::Error(interp.located(e)))?
                .is_truthy(),
            None => member.is_truthy(),
        };
        if keep {
            kept.push(item);
        }
    }
    Ok(kept)
}

// --- session introspection ---

fn name_filters(args: &CommandArgs) -> Vec<String> {
    args.value(&["Name"], 0)
        .cloned()
        .map(|v| v.into_items().iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

fn get_command(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let filters = name_filters(args);
    let kind = text(args, &["CommandType"], usize::MAX);
    let entries = interp.command_entries();

    let mut out = Vec::new();
    for entry in &entries {
        let name_ok = filters.is_empty() || filters.iter().any(|f| wildcard_match(f, &entry.name));
        let kind_ok = kind.as_ref().is_none_or(|k| k.eq_ignore_ascii_case(entry.kind));
        if name_ok && kind_ok {
            out.push(PsValue::Object(
                PsObject::new("System.Management.Automation.CommandInfo")
                    .with_property("CommandType", entry.kind)
                    .with_property("Name", entry.name.clone())
                    .with_property("Source", entry.source.clone())
                    .with_to_string(entry.name.clone()),
            ));
        }
    }

    for filter in filters.iter().filter(|f| !f.contains(['*', '?', '['])) {
        if !entries.iter().any(|e| e.name.eq_ignore_ascii_case(filter)) {
            ctx.write_error(interp.located(not_found(
                "CommandNotFoundException,Microsoft.PowerShell.Commands.GetCommandCommand",
                ErrorCategoryKind::ObjectNotFound,
                format!("The term '{filter}' is not recognized as a name of a cmdlet, function, script file, or executable program."),
                filter,
            )));
        }
    }
    Ok(out)
}

fn get_module(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let filters = name_filters(args);
    let modules = if args.switch(&["ListAvailable"]) {
        interp.modules()
    } else {
        interp.loaded_modules()
    };
    Ok(modules
        .iter()
        .filter(|m| filters.is_empty() || filters.iter().any(|f| wildcard_match(f, &m.name)))
        .map(|m| {
            PsValue::Object(
                PsObject::new("System.Management.Automation.PSModuleInfo")
                    .with_property("ModuleType", "Script")
                    .with_property("Name", m.name.clone())
                    .with_property("Path", m.path.display().to_string())
                    .with_to_string(m.name.clone()),
            )
        })
        .collect())
}

fn import_module(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    for name in name_filters(args) {
        if !interp.import_module(&name, ctx)? {
            ctx.write_error(interp.located(not_found(
                "Modules_ModuleNotFound,Microsoft.PowerShell.Commands.ImportModuleCommand",
                ErrorCategoryKind::ObjectNotFound,
                format!("The specified module '{name}' was not loaded because no valid module file was found in any module directory."),
                &name,
            )));
        }
    }
    Ok(Vec::new())
}

fn get_variable(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let filters = name_filters(args);
    let value_only = args.switch(&["ValueOnly"]);
    let variables = interp.visible_variables();

    let mut out = Vec::new();
    for (name, value) in &variables {
        if filters.is_empty() || filters.iter().any(|f| wildcard_match(f, name)) {
            out.push(if value_only {
                value.clone()
            } else {
                PsValue::Object(
                    PsObject::new("System.Management.Automation.PSVariable")
                        .with_property("Name", name.clone())
                        .with_property("Value", value.clone())
                        .with_to_string(name.clone()),
                )
            });
        }
    }
    for filter in filters.iter().filter(|f| !f.contains(['*', '?', '['])) {
        if !variables.iter().any(|(name, _)| name.eq_ignore_ascii_case(filter)) {
            ctx.write_error(interp.located(not_found(
                "VariableNotFound,Microsoft.PowerShell.Commands.GetVariableCommand",
                ErrorCategoryKind::ObjectNotFound,
                format!("Cannot find a variable with the name '{filter}'."),
                filter,
            )));
        }
    }
    Ok(out)
}

fn set_variable(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let Some(name) = text(args, &["Name"], 0) else {
        return Err(bind_error(
            interp,
            "Set-Variable",
            "Name",
            "The argument is null or empty.".to_string(),
        ));
    };
    let value = args
        .value(&["Value"], 1)
        .cloned()
        .unwrap_or_else(|| PsValue::from_output(input));
    let global = text(args, &["Scope"], usize::MAX).is_some_and(|s| s.eq_ignore_ascii_case("Global"));
    if global {
        interp.set_global(&name, value);
    } else {
        interp.set_variable(&name, value);
    }
    Ok(Vec::new())
}

fn get_location(
    interp: &mut Interpreter,
    _args: &CommandArgs,
    _input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let path = interp.location().display().to_string();
    Ok(vec![PsValue::Object(
        PsObject::new("System.Management.Automation.PathInfo")
            .with_property("Path", path.clone())
            .with_to_string(path),
    )])
}

fn set_location(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let target = text(args, &["Path", "LiteralPath"], 0).unwrap_or_else(|| "~".to_string());
    let path = interp.resolve_path(&target);
    if path.is_dir() {
        interp.set_location(path);
    } else {
        ctx.write_error(interp.located(not_found(
            "PathNotFound,Microsoft.PowerShell.Commands.SetLocationCommand",
            ErrorCategoryKind::ObjectNotFound,
            format!("Cannot find path '{}' because it does not exist.", path.display()),
            &target,
        )));
    }
    Ok(Vec::new())
}

fn start_sleep(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let millis = match args.get(&["Milliseconds"]) {
        Some(ms) => ms.as_f64(),
        None => args.value(&["Seconds"], 0).and_then(PsValue::as_f64).map(|s| s * 1000.0),
    };
    let Some(millis) = millis.filter(|m| *m >= 0.0) else {
        return Err(bind_error(
            interp,
            "Start-Sleep",
            "Seconds",
            "Provide a non-negative duration.".to_string(),
        ));
    };

    let deadline = Instant::now() + Duration::from_millis(millis as u64);
    loop {
        ctx.check_stop()?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(Vec::new());
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn invoke_expression(
    interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let Some(command) = text(args, &["Command"], 0) else {
        return Ok(Vec::new());
    };
    let block = interp.script_block(&command)?;
    interp.invoke_block(&block, false, Vec::new(), input, ctx)
}

fn clear_host(
    _interp: &mut Interpreter,
    _args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    ctx.host().clear_screen();
    Ok(Vec::new())
}

fn set_title(
    _interp: &mut Interpreter,
    args: &CommandArgs,
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let title = text(args, &["Title"], 0).unwrap_or_else(|| PsValue::List(input).to_string());
    ctx.host().set_window_title(title);
    Ok(Vec::new())
}

fn get_history(
    interp: &mut Interpreter,
    args: &CommandArgs,
    _input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    let history = ctx.history();
    let id = int_arg(interp, args, "Id", None, "Get-History")?;
    let count = int_arg(interp, args, "Count", Some(0), "Get-History")?
        .map_or(history.len(), |c| usize::try_from(c).unwrap_or(0));
    let matching: Vec<_> = history
        .iter()
        .filter(|entry| id.is_none_or(|id| usize::try_from(id).is_ok_and(|id| id == entry.id)))
        .collect();
    Ok(matching
        .iter()
        .skip(matching.len().saturating_sub(count))
        .map(|entry| {
            PsValue::Object(
                PsObject::new("Microsoft.PowerShell.Commands.HistoryInfo")
                    .with_property("Id", i64::try_from(entry.id).unwrap_or(i64::MAX))
                    .with_property("CommandLine", entry.command_line.clone())
                    .with_to_string(entry.command_line.clone()),
            )
        })
        .collect())
}

fn prompt(
    interp: &mut Interpreter,
    _args: &CommandArgs,
    _input: Vec<PsValue>,
    _ctx: &mut InvocationContext<'_>,
) -> Eval<Vec<PsValue>> {
    Ok(vec![PsValue::from(format!(
        "PS {}> ",
        interp.location().display()
    ))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_case_insensitively() {
        assert_eq!(find("ECHO").map(|d| d.name), Some("Write-Output"));
        assert_eq!(find("%").map(|d| d.name), Some("ForEach-Object"));
        assert_eq!(find("cd").map(|d| d.name), Some("Set-Location"));
        assert!(find("Get-Nothing").is_none());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<String> = BUILTINS
            .iter()
            .flat_map(|d| std::iter::once(d.name).chain(d.aliases.iter().copied()))
            .map(str::to_ascii_lowercase)
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
