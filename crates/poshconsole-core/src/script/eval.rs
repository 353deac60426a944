use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use poshconsole_types::{
    ErrorCategory, ErrorCategoryKind, ErrorRecord, PsObject, PsPrimitiveValue, PsValue,
};
use tracing::{debug, instrument};

use super::ast::{
    Argument, BinaryOp, CommandCall, CommandName, Element, Expr, Invocation, Pipeline,
    ScriptBlockAst, Span, Statement, StringPart,
};
use super::builtins;
use super::ops;
use super::parser;
use crate::engine::{CommandArgs, ExtensionCommand, InvocationContext, InvocationError};
use crate::runspace::{InitialSessionState, ModuleInfo};

/// Why evaluation left the normal statement sequence.
#[derive(Debug)]
pub(crate) enum Flow {
    /// A terminating error; fails the pipeline unless something upstream absorbs it.
    Error(ErrorRecord),
    Stopped,
    Return(Vec<PsValue>),
    Exit(i32),
    Break,
    Continue,
}

impl From<ErrorRecord> for Flow {
    fn from(record: ErrorRecord) -> Self {
        Self::Error(record)
    }
}

impl From<InvocationError> for Flow {
    fn from(error: InvocationError) -> Self {
        match error {
            InvocationError::Failed(record) => Self::Error(record),
            InvocationError::Stopped => Self::Stopped,
        }
    }
}

pub(crate) type Eval<T> = Result<T, Flow>;

/// A command argument before it is bound to a parameter set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawArg {
    Named(String, Option<PsValue>),
    Value(PsValue),
}

/// Parameters every command accepts.
const COMMON_PARAMETERS: &[&str] = &[
    "ErrorAction",
    "WarningAction",
    "Verbose",
    "Debug",
    "OutVariable",
];
const COMMON_SWITCHES: &[&str] = &["Verbose", "Debug"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionPreference {
    Continue,
    SilentlyContinue,
    Stop,
}

impl ActionPreference {
    fn parse(value: &PsValue) -> Self {
        let text = value.to_string();
        if text.eq_ignore_ascii_case("Stop") {
            Self::Stop
        } else if text.eq_ignore_ascii_case("SilentlyContinue") || text.eq_ignore_ascii_case("Ignore") {
            Self::SilentlyContinue
        } else {
            Self::Continue
        }
    }
}

/// Binds raw arguments: a bare `-Name` takes the next value unless it is a switch.
/// Named arguments may be abbreviated to a unique prefix of a known parameter.
pub(crate) fn bind(raw: Vec<RawArg>, parameters: &[&str], switches: &[&str]) -> CommandArgs {
    let resolve = |name: String| -> String {
        if parameters
            .iter()
            .chain(COMMON_PARAMETERS)
            .any(|p| p.eq_ignore_ascii_case(&name))
        {
            return name;
        }
        let lower = name.to_ascii_lowercase();
        let mut candidates = parameters
            .iter()
            .chain(COMMON_PARAMETERS)
            .filter(|p| p.to_ascii_lowercase().starts_with(&lower));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => (*only).to_string(),
            _ => name,
        }
    };

    let mut args = CommandArgs::new();
    let mut iter = raw.into_iter().peekable();
    while let Some(arg) = iter.next() {
        match arg {
            RawArg::Named(name, Some(value)) => args.push_named(resolve(name), Some(value)),
            RawArg::Named(name, None) => {
                let name = resolve(name);
                let is_switch = switches
                    .iter()
                    .chain(COMMON_SWITCHES)
                    .any(|s| s.eq_ignore_ascii_case(&name));
                let value = if is_switch {
                    None
                } else {
                    iter.next_if(|next| matches!(next, RawArg::Value(_)))
                        .and_then(|next| match next {
                            RawArg::Value(v) => Some(v),
                            RawArg::Named(..) => None,
                        })
                };
                args.push_named(name, value);
            }
            RawArg::Value(value) => args.push_positional(value),
        }
    }
    args
}

pub(crate) fn parameter_not_found(command: &str, name: &str) -> ErrorRecord {
    ErrorRecord::builder()
        .message(format!(
            "A parameter cannot be found that matches parameter name '{name}'."
        ))
        .fully_qualified_error_id(format!("NamedParameterNotFound,{command}"))
        .category(
            ErrorCategory::builder()
                .kind(ErrorCategoryKind::InvalidArgument)
                .activity(command)
                .reason("ParameterBindingException")
                .build(),
        )
        .build()
}

pub(crate) fn command_not_found(name: &str) -> ErrorRecord {
    ErrorRecord::builder()
        .message(format!(
            "The term '{name}' is not recognized as a name of a cmdlet, function, script file, or executable program.\nCheck the spelling of the name, or if a path was included, verify that the path is correct and try again."
        ))
        .fully_qualified_error_id("CommandNotFoundException")
        .target_object(PsValue::from(name))
        .category(
            ErrorCategory::builder()
                .kind(ErrorCategoryKind::ObjectNotFound)
                .target_name(name)
                .target_type("String")
                .reason("CommandNotFoundException")
                .build(),
        )
        .build()
}

fn looks_like_path(name: &str) -> bool {
    name.contains('/') || name.contains('\\') || name.to_ascii_lowercase().ends_with(".ps1")
}

/// Lexically folds `.` and `..` so locations print cleanly.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    value: PsValue,
}

#[derive(Debug, Clone)]
struct FunctionDef {
    name: String,
    body: Arc<ScriptBlockAst>,
}

/// Command kinds as `Get-Command` reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandEntry {
    pub name: String,
    pub kind: &'static str,
    pub source: String,
}

/// Session state and tree-walking evaluation for the built-in language.
#[derive(Debug)]
pub(crate) struct Interpreter {
    /// Index 0 is the global scope.
    scopes: Vec<HashMap<String, Variable>>,
    functions: HashMap<String, FunctionDef>,
    extensions: Vec<Arc<dyn ExtensionCommand>>,
    modules: Vec<ModuleInfo>,
    loaded_modules: Vec<ModuleInfo>,
    env_overrides: HashMap<String, String>,
    location: PathBuf,
    block_cache: HashMap<String, Arc<ScriptBlockAst>>,
    /// Text that spans in the running block index into.
    source: Arc<str>,
    /// Span of the command call being dispatched, for error positions.
    current_call: Option<Span>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Self {
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
            extensions: Vec::new(),
            modules: Vec::new(),
            loaded_modules: Vec::new(),
            env_overrides: HashMap::new(),
            location: PathBuf::from("."),
            block_cache: HashMap::new(),
            source: Arc::from(""),
            current_call: None,
        };
        for (name, value) in [
            ("ErrorActionPreference", "Continue"),
            ("WarningPreference", "Continue"),
            ("VerbosePreference", "SilentlyContinue"),
            ("DebugPreference", "SilentlyContinue"),
            ("ProgressPreference", "Continue"),
        ] {
            interp.set_global(name, PsValue::from(value));
        }
        interp
    }

    pub fn configure(&mut self, session: &InitialSessionState) {
        for (name, value) in &session.variables {
            self.set_global(name, value.clone());
        }
        self.set_global(
            "Host",
            PsValue::Object(
                PsObject::new("System.Management.Automation.Internal.Host.InternalHost")
                    .with_property("Name", session.host_name.clone())
                    .with_property("Version", session.host_version.clone())
                    .with_to_string(session.host_name.clone()),
            ),
        );
        self.extensions.clone_from(&session.extension_commands);
        self.modules.clone_from(&session.modules);
        self.location = normalize(&session.location);
    }

    // --- variables ---

    fn split_scope(name: &str) -> (Option<String>, &str) {
        match name.split_once(':') {
            Some((scope, rest)) if !scope.is_empty() => (Some(scope.to_ascii_lowercase()), rest),
            _ => (None, name),
        }
    }

    pub fn variable(&self, name: &str) -> PsValue {
        let (scope, bare) = Self::split_scope(name);
        let key = bare.to_ascii_lowercase();
        match scope.as_deref() {
            Some("env") => self
                .env_overrides
                .get(&key)
                .cloned()
                .or_else(|| std::env::var(bare).ok())
                .map_or(PsValue::NULL, PsValue::from),
            Some("global" | "script") => self.scopes[0]
                .get(&key)
                .map_or(PsValue::NULL, |v| v.value.clone()),
            _ => match key.as_str() {
                "true" => PsValue::from(true),
                "false" => PsValue::from(false),
                "null" => PsValue::NULL,
                "pwd" => PsValue::from(self.location.display().to_string()),
                _ => self
                    .scopes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.get(&key))
                    .map_or(PsValue::NULL, |v| v.value.clone()),
            },
        }
    }

    pub fn set_variable(&mut self, name: &str, value: PsValue) {
        let (scope, bare) = Self::split_scope(name);
        let key = bare.to_ascii_lowercase();
        if key == "null" {
            return;
        }
        let variable = Variable {
            name: bare.to_string(),
            value,
        };
        match scope.as_deref() {
            Some("env") => {
                self.env_overrides.insert(key, variable.value.to_string());
            }
            Some("global" | "script") => {
                self.scopes[0].insert(key, variable);
            }
            _ => {
                if let Some(top) = self.scopes.last_mut() {
                    top.insert(key, variable);
                }
            }
        }
    }

    pub fn set_global(&mut self, name: &str, value: PsValue) {
        self.scopes[0].insert(
            name.to_ascii_lowercase(),
            Variable {
                name: name.to_string(),
                value,
            },
        );
    }

    /// Every variable visible from the current scope, inner definitions winning.
    pub fn visible_variables(&self) -> Vec<(String, PsValue)> {
        let mut merged: HashMap<&str, &Variable> = HashMap::new();
        for scope in &self.scopes {
            for (key, variable) in scope {
                merged.insert(key.as_str(), variable);
            }
        }
        let mut out: Vec<_> = merged
            .into_values()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect();
        out.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        out
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    // --- locations and modules ---

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn set_location(&mut self, path: PathBuf) {
        self.location = normalize(&path);
    }

    /// Resolves `~`, relative and absolute paths against the session location.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let expanded = match path.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => home_dir()
                .map_or_else(
                    || PathBuf::from(path),
                    |home| home.join(rest.trim_start_matches(['/', '\\'])),
                ),
            _ => PathBuf::from(path),
        };
        if expanded.is_absolute() {
            normalize(&expanded)
        } else {
            normalize(&self.location.join(expanded))
        }
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn loaded_modules(&self) -> &[ModuleInfo] {
        &self.loaded_modules
    }

    /// Runs a module file in the global scope. `Ok(false)` when nothing matches `name`.
    #[instrument(skip(self, ctx))]
    pub fn import_module(&mut self, name: &str, ctx: &mut InvocationContext<'_>) -> Eval<bool> {
        let module = if name.to_ascii_lowercase().ends_with(".psm1") {
            let path = self.resolve_path(name);
            path.is_file().then(|| ModuleInfo {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path,
            })
        } else {
            self.modules
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(name))
                .cloned()
        };
        let Some(module) = module else {
            return Ok(false);
        };
        if self.loaded_modules.iter().any(|m| m.path == module.path) {
            return Ok(true);
        }

        let block = self.load_script(&module.path)?;
        let inner: Vec<_> = self.scopes.drain(1..).collect();
        let result = self.invoke_block(&block, false, Vec::new(), Vec::new(), ctx);
        self.scopes.extend(inner);
        result?;
        debug!(module = %module.name, "module imported");
        self.loaded_modules.push(module);
        Ok(true)
    }

    // --- commands ---

    pub fn command_entries(&self) -> Vec<CommandEntry> {
        let mut entries: Vec<CommandEntry> = builtins::BUILTINS
            .iter()
            .flat_map(|def| {
                std::iter::once(CommandEntry {
                    name: def.name.to_string(),
                    kind: "Cmdlet",
                    source: "Microsoft.PowerShell.Core".to_string(),
                })
                .chain(def.aliases.iter().map(|alias| CommandEntry {
                    name: (*alias).to_string(),
                    kind: "Alias",
                    source: def.name.to_string(),
                }))
            })
            .collect();
        entries.extend(self.extensions.iter().map(|ext| CommandEntry {
            name: ext.name().to_string(),
            kind: "Cmdlet",
            source: "Host".to_string(),
        }));
        entries.extend(self.functions.values().map(|f| CommandEntry {
            name: f.name.clone(),
            kind: "Function",
            source: String::new(),
        }));
        // functions shadow commands of the same name
        entries.sort_by(|a, b| {
            a.name
                .to_ascii_lowercase()
                .cmp(&b.name.to_ascii_lowercase())
                .then_with(|| (a.kind != "Function").cmp(&(b.kind != "Function")))
        });
        entries.dedup_by(|b, a| a.name.eq_ignore_ascii_case(&b.name));
        entries
    }

    pub fn command_exists(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        self.functions.contains_key(&key)
            || self.extension(name).is_some()
            || builtins::find(name).is_some()
    }

    fn extension(&self, name: &str) -> Option<Arc<dyn ExtensionCommand>> {
        self.extensions
            .iter()
            .find(|ext| ext.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Builds a terminating error positioned at the command being dispatched.
    pub fn located(&self, mut record: ErrorRecord) -> ErrorRecord {
        if record.invocation_info.is_none()
            && let Some(span) = self.current_call
        {
            record.invocation_info = Some(span.invocation_info(&self.source));
        }
        record
    }

    pub fn script_block(&mut self, text: &str) -> Eval<Arc<ScriptBlockAst>> {
        if let Some(block) = self.block_cache.get(text) {
            return Ok(Arc::clone(block));
        }
        let block = Arc::new(parser::parse(text).map_err(|e| e.into_error_record(text))?);
        self.block_cache.insert(text.to_string(), Arc::clone(&block));
        Ok(block)
    }

    fn load_script(&self, path: &Path) -> Eval<Arc<ScriptBlockAst>> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ErrorRecord::builder()
                .message(format!("Cannot read '{}': {e}", path.display()))
                .fully_qualified_error_id("ScriptReadError")
                .category(
                    ErrorCategory::builder()
                        .kind(ErrorCategoryKind::ReadError)
                        .target_name(path.display().to_string())
                        .build(),
                )
                .build()
        })?;
        let block = parser::parse(&text).map_err(|e| e.into_error_record(&text))?;
        Ok(Arc::new(block))
    }

    /// Runs a top-level statement; its output lands in `out` even when it fails part way.
    pub fn exec_statement(
        &mut self,
        statement: &Statement,
        ctx: &mut InvocationContext<'_>,
        out: &mut Vec<PsValue>,
    ) -> Eval<()> {
        ctx.check_stop()?;
        match statement {
            Statement::Pipeline(pipeline) => out.extend(self.run_pipeline(pipeline, ctx)?),
            Statement::Assignment { name, value } => {
                let value = PsValue::from_output(self.run_pipeline(value, ctx)?);
                self.set_variable(name, value);
            }
            Statement::Function { name, body } => {
                debug!(function = %name, "function defined");
                self.functions.insert(
                    name.to_ascii_lowercase(),
                    FunctionDef {
                        name: name.clone(),
                        body: Arc::clone(body),
                    },
                );
            }
            Statement::If { clauses, else_body } => {
                for (condition, body) in clauses {
                    if self.condition(condition, ctx)? {
                        return self.exec_block(body, ctx, out);
                    }
                }
                if let Some(body) = else_body {
                    self.exec_block(body, ctx, out)?;
                }
            }
            Statement::Foreach {
                variable,
                items,
                body,
            } => {
                for item in self.run_pipeline(items, ctx)? {
                    ctx.check_stop()?;
                    self.set_variable(variable, item);
                    match self.exec_block(body, ctx, out) {
                        Ok(()) | Err(Flow::Continue) => {}
                        Err(Flow::Break) => break,
                        Err(other) => return Err(other),
                    }
                }
            }
            Statement::While { condition, body } => loop {
                ctx.check_stop()?;
                if !self.condition(condition, ctx)? {
                    break;
                }
                match self.exec_block(body, ctx, out) {
                    Ok(()) | Err(Flow::Continue) => {}
                    Err(Flow::Break) => break,
                    Err(other) => return Err(other),
                }
            },
            Statement::Throw { value, span } => {
                let span = value.as_ref().map_or(*span, |p| span.to(p.span));
                let value = match value {
                    Some(pipeline) => Some(PsValue::from_output(self.run_pipeline(pipeline, ctx)?)),
                    None => None,
                };
                return Err(Flow::Error(self.thrown(value, span)));
            }
            Statement::Exit(value) => {
                let code = match value {
                    Some(pipeline) => PsValue::from_output(self.run_pipeline(pipeline, ctx)?)
                        .as_f64()
                        .map_or(0, |c| c as i32),
                    None => 0,
                };
                return Err(Flow::Exit(code));
            }
            Statement::Return(value) => {
                let values = match value {
                    Some(pipeline) => self.run_pipeline(pipeline, ctx)?,
                    None => Vec::new(),
                };
                return Err(Flow::Return(values));
            }
            Statement::Break => return Err(Flow::Break),
            Statement::Continue => return Err(Flow::Continue),
        }
        Ok(())
    }

    fn exec_block(
        &mut self,
        statements: &[Statement],
        ctx: &mut InvocationContext<'_>,
        out: &mut Vec<PsValue>,
    ) -> Eval<()> {
        for statement in statements {
            self.exec_statement(statement, ctx, out)?;
        }
        Ok(())
    }

    fn collect(&mut self, statements: &[Statement], ctx: &mut InvocationContext<'_>) -> Eval<Vec<PsValue>> {
        let mut out = Vec::new();
        self.exec_block(statements, ctx, &mut out)?;
        Ok(out)
    }

    fn condition(&mut self, pipeline: &Pipeline, ctx: &mut InvocationContext<'_>) -> Eval<bool> {
        Ok(PsValue::from_output(self.run_pipeline(pipeline, ctx)?).is_truthy())
    }

    fn thrown(&self, value: Option<PsValue>, span: Span) -> ErrorRecord {
        let message = match &value {
            None => "ScriptHalted".to_string(),
            Some(PsValue::Object(obj)) => obj
                .get("Message")
                .map_or_else(|| obj.to_string(), ToString::to_string),
            Some(other) => other.to_string(),
        };
        let mut category = ErrorCategory::builder()
            .kind(ErrorCategoryKind::OperationStopped)
            .activity("")
            .target_name(message.clone())
            .reason("RuntimeException")
            .build();
        if value.as_ref().is_some_and(PsValue::is_string) {
            category.target_type = Some("String".to_string());
        }
        let mut record = ErrorRecord::builder()
            .message(message.clone())
            .fully_qualified_error_id(message)
            .category(category)
            .was_thrown_from_throw_statement(true)
            .invocation_info(span.invocation_info(&self.source))
            .build();
        record.target_object = value;
        record
    }

    pub fn run_pipeline(&mut self, pipeline: &Pipeline, ctx: &mut InvocationContext<'_>) -> Eval<Vec<PsValue>> {
        let mut current = Vec::new();
        for (i, element) in pipeline.elements.iter().enumerate() {
            ctx.check_stop()?;
            let input = std::mem::take(&mut current);
            let step = match element {
                Element::Expression(expr) => self.eval(expr, ctx).map(|value| {
                    if i == 0 && matches!(expr, Expr::Paren(_) | Expr::SubExpr(_)) && value.is_null() {
                        Vec::new()
                    } else {
                        value.into_items()
                    }
                }),
                Element::Command(call) => self.invoke_call(call, input, ctx),
            };
            current = step.map_err(|flow| match flow {
                Flow::Error(mut record) if record.invocation_info.is_none() => {
                    record.invocation_info = Some(pipeline.span.invocation_info(&self.source));
                    Flow::Error(record)
                }
                other => other,
            })?;
        }
        Ok(current)
    }

    fn eval(&mut self, expr: &Expr, ctx: &mut InvocationContext<'_>) -> Eval<PsValue> {
        Ok(match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Variable(name) => self.variable(name),
            Expr::Expandable(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        StringPart::Text(t) => text.push_str(t),
                        StringPart::Variable(name) => text.push_str(&self.variable(name).to_string()),
                        StringPart::SubExpr(statements) => {
                            let values = self.collect(statements, ctx)?;
                            text.push_str(&PsValue::List(values).to_string());
                        }
                    }
                }
                PsValue::from(text)
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, ctx)?);
                }
                PsValue::List(values)
            }
            Expr::SubExpr(statements) | Expr::Paren(statements) => {
                PsValue::from_output(self.collect(statements, ctx)?)
            }
            Expr::ArrayExpr(statements) => PsValue::List(self.collect(statements, ctx)?),
            Expr::ScriptBlock(text) => PsValue::Primitive(PsPrimitiveValue::ScriptBlock(text.clone())),
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
                ..
            } => {
                let left = self.eval(left, ctx)?.is_truthy();
                let result = match op {
                    BinaryOp::And => left && self.eval(right, ctx)?.is_truthy(),
                    _ => left || self.eval(right, ctx)?.is_truthy(),
                };
                PsValue::from(result)
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left, ctx)?;
                let right = self.eval(right, ctx)?;
                ops::binary(*op, left, right).map_err(|e| self.at(e, *span))?
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand, ctx)?;
                ops::unary(*op, operand)?
            }
            Expr::Member { object, name } => ops::member(&self.eval(object, ctx)?, name),
            Expr::MethodCall {
                object,
                name,
                args,
                span,
            } => {
                let target = self.eval(object, ctx)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, ctx)?);
                }
                if let PsValue::Primitive(PsPrimitiveValue::ScriptBlock(text)) = &target
                    && name.eq_ignore_ascii_case("Invoke")
                {
                    let block = self.script_block(text)?;
                    let raw = values.into_iter().map(RawArg::Value).collect();
                    PsValue::from_output(self.invoke_block(&block, true, raw, Vec::new(), ctx)?)
                } else {
                    ops::method(&target, name, &values).map_err(|e| self.at(e, *span))?
                }
            }
            Expr::Index {
                object,
                index,
                span,
            } => {
                let target = self.eval(object, ctx)?;
                let index = self.eval(index, ctx)?;
                ops::index(&target, &index).map_err(|e| self.at(e, *span))?
            }
        })
    }

    fn at(&self, mut record: ErrorRecord, span: Span) -> ErrorRecord {
        record.invocation_info = Some(span.invocation_info(&self.source));
        record
    }

    fn invoke_call(
        &mut self,
        call: &CommandCall,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        let mut raw = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            raw.push(match arg {
                Argument::Parameter { name, value } => RawArg::Named(
                    name.clone(),
                    match value {
                        Some(expr) => Some(self.eval(expr, ctx)?),
                        None => None,
                    },
                ),
                Argument::Value(expr) => RawArg::Value(self.eval(expr, ctx)?),
            });
        }

        let name = match &call.name {
            CommandName::Bare(name) => name.clone(),
            CommandName::Expr(expr) => match self.eval(expr, ctx)? {
                PsValue::Primitive(PsPrimitiveValue::ScriptBlock(text)) => {
                    let block = self.script_block(&text)?;
                    let new_scope = call.invocation != Invocation::DotSource;
                    return self.invoke_block(&block, new_scope, raw, input, ctx);
                }
                other => other.to_string(),
            },
        };

        let saved = self.current_call.replace(call.span);
        let result = self.invoke_command(&name, call.invocation, raw, input, ctx);
        self.current_call = saved;
        result
    }

    /// Resolves and runs a command by name, applying `-ErrorAction`.
    pub fn invoke_command(
        &mut self,
        name: &str,
        invocation: Invocation,
        raw: Vec<RawArg>,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        let mut action = None;
        let raw: Vec<RawArg> = {
            let mut kept = Vec::with_capacity(raw.len());
            let mut iter = raw.into_iter().peekable();
            while let Some(arg) = iter.next() {
                match arg {
                    RawArg::Named(n, value) if n.eq_ignore_ascii_case("ErrorAction") || n.eq_ignore_ascii_case("ea") => {
                        let value = value.or_else(|| match iter.next_if(|a| matches!(a, RawArg::Value(_))) {
                            Some(RawArg::Value(v)) => Some(v),
                            _ => None,
                        });
                        action = value.as_ref().map(ActionPreference::parse);
                    }
                    other => kept.push(other),
                }
            }
            kept
        };
        let action =
            action.unwrap_or_else(|| ActionPreference::parse(&self.variable("ErrorActionPreference")));

        let before = ctx.error_count();
        let result = self.dispatch(name, invocation, raw, input, ctx);
        if result.is_ok() {
            match action {
                ActionPreference::Stop => {
                    if let Some(first) = ctx.take_errors_from(before).into_iter().next() {
                        return Err(Flow::Error(first));
                    }
                }
                ActionPreference::SilentlyContinue => {
                    ctx.take_errors_from(before);
                }
                ActionPreference::Continue => {}
            }
        }
        result
    }

    fn dispatch(
        &mut self,
        name: &str,
        invocation: Invocation,
        raw: Vec<RawArg>,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        if let Some(function) = self.functions.get(&name.to_ascii_lowercase()).cloned() {
            let new_scope = invocation != Invocation::DotSource;
            return self.invoke_block(&function.body, new_scope, raw, input, ctx);
        }

        if let Some(ext) = self.extension(name) {
            let args = bind(raw, &[], ext.switches());
            return ext.invoke(&args, input, ctx).map_err(Flow::from);
        }

        if let Some(def) = builtins::find(name) {
            let args = bind(raw, def.parameters, def.switches);
            let mut accepted: Vec<&str> = def.parameters.to_vec();
            accepted.extend(COMMON_PARAMETERS);
            if let Some(unknown) = args.unknown(&accepted) {
                return Err(Flow::Error(self.located(parameter_not_found(def.name, unknown))));
            }
            return (def.run)(self, &args, input, ctx);
        }

        if looks_like_path(name) {
            let path = self.resolve_path(name);
            if path.is_file() {
                return self.run_script_file(&path, invocation, raw, input, ctx);
            }
        }

        Err(Flow::Error(self.located(command_not_found(name))))
    }

    #[instrument(skip(self, raw, input, ctx), fields(path = %path.display()))]
    fn run_script_file(
        &mut self,
        path: &Path,
        invocation: Invocation,
        raw: Vec<RawArg>,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        let block = self.load_script(path)?;
        let new_scope = invocation != Invocation::DotSource;
        match self.invoke_block(&block, new_scope, raw, input, ctx) {
            Err(Flow::Exit(code)) => {
                self.set_global("LASTEXITCODE", PsValue::from(code));
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Binds `raw` to the block's `param(...)` list and runs it.
    pub fn invoke_block(
        &mut self,
        block: &Arc<ScriptBlockAst>,
        new_scope: bool,
        raw: Vec<RawArg>,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        let names: Vec<&str> = block.params.iter().map(|p| p.name.as_str()).collect();
        let switches: Vec<&str> = block
            .params
            .iter()
            .filter(|p| p.switch)
            .map(|p| p.name.as_str())
            .collect();
        let args = bind(raw, &names, &switches);
        if !names.is_empty() {
            let mut accepted = names.clone();
            accepted.extend(COMMON_PARAMETERS);
            if let Some(unknown) = args.unknown(&accepted) {
                let command = self
                    .functions
                    .values()
                    .find(|f| Arc::ptr_eq(&f.body, block))
                    .map_or_else(|| "ScriptBlock".to_string(), |f| f.name.clone());
                return Err(Flow::Error(self.located(parameter_not_found(&command, unknown))));
            }
        }

        if new_scope {
            self.push_scope();
        }
        let saved = std::mem::replace(&mut self.source, Arc::clone(&block.source));
        let mut out = Vec::new();
        let result = self
            .bind_block_params(block, &args, input, ctx)
            .and_then(|()| self.exec_block(&block.statements, ctx, &mut out));
        self.source = saved;
        if new_scope {
            self.pop_scope();
        }

        match result {
            Ok(()) | Err(Flow::Break | Flow::Continue) => Ok(out),
            Err(Flow::Return(values)) => {
                out.extend(values);
                Ok(out)
            }
            Err(other) => Err(other),
        }
    }

    fn bind_block_params(
        &mut self,
        block: &ScriptBlockAst,
        args: &CommandArgs,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<()> {
        let mut positional = args.positional().iter().cloned();
        for param in &block.params {
            let value = if param.switch {
                PsValue::from(args.switch(&[param.name.as_str()]))
            } else if let Some(value) = args.get(&[param.name.as_str()]) {
                value.clone()
            } else if let Some(value) = positional.next() {
                value
            } else if let Some(default) = &param.default {
                self.eval(default, ctx)?
            } else {
                PsValue::NULL
            };
            self.set_variable(&param.name, value);
        }
        self.set_variable("args", PsValue::List(positional.collect()));
        self.set_variable("input", PsValue::List(input));
        Ok(())
    }

    /// Runs a block once per pipeline object with `$_` bound.
    pub fn invoke_with_item(
        &mut self,
        block: &Arc<ScriptBlockAst>,
        item: PsValue,
        ctx: &mut InvocationContext<'_>,
    ) -> Eval<Vec<PsValue>> {
        self.push_scope();
        self.set_variable("_", item.clone());
        self.set_variable("PSItem", item);
        let saved = std::mem::replace(&mut self.source, Arc::clone(&block.source));
        let mut out = Vec::new();
        let result = self.exec_block(&block.statements, ctx, &mut out);
        self.source = saved;
        self.pop_scope();
        match result {
            Ok(()) | Err(Flow::Continue) => Ok(out),
            Err(Flow::Return(values)) => {
                out.extend(values);
                Ok(out)
            }
            Err(other) => Err(other),
        }
    }

    /// Runs `statements` as part of `block`, with error positions taken from its text.
    pub fn with_source<T>(
        &mut self,
        block: &ScriptBlockAst,
        run: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.source, Arc::clone(&block.source));
        let result = run(self);
        self.source = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_parameter_takes_next_value_unless_switch() {
        let raw = vec![
            RawArg::Named("Fore".into(), None),
            RawArg::Value(PsValue::from("Red")),
            RawArg::Named("NoNewline".into(), None),
            RawArg::Value(PsValue::from("text")),
        ];
        let args = bind(raw, &["ForegroundColor", "NoNewline"], &["NoNewline"]);
        assert_eq!(args.get(&["ForegroundColor"]), Some(&PsValue::from("Red")));
        assert!(args.switch(&["NoNewline"]));
        assert_eq!(args.positional(), &[PsValue::from("text")]);
    }

    #[test]
    fn scoped_variables() {
        let mut interp = Interpreter::new();
        interp.set_variable("x", PsValue::from(1));
        interp.push_scope();
        interp.set_variable("x", PsValue::from(2));
        interp.set_variable("global:y", PsValue::from(3));
        assert_eq!(interp.variable("X"), PsValue::from(2));
        interp.pop_scope();
        assert_eq!(interp.variable("x"), PsValue::from(1));
        assert_eq!(interp.variable("y"), PsValue::from(3));
        assert_eq!(interp.variable("true"), PsValue::from(true));
    }

    #[test]
    fn paths_resolve_against_location() {
        let mut interp = Interpreter::new();
        let base = std::env::temp_dir().join("poshconsole-eval");
        interp.set_location(base.clone());
        assert_eq!(interp.resolve_path("a/../b"), base.join("b"));
        assert_eq!(interp.resolve_path("./c"), base.join("c"));
    }
}
