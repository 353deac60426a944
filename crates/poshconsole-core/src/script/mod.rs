//! The built-in command language: a small PowerShell dialect evaluated by a
//! tree-walking interpreter that lives on the pipeline worker.

use std::sync::Arc;

use poshconsole_types::{ErrorCategory, ErrorCategoryKind, ErrorRecord, PsValue};
use tracing::{debug, instrument};

use crate::command::{Parameter, SubCommand};
use crate::engine::{EngineError, InvocationContext, InvocationError, ScriptEngine};
use crate::runspace::InitialSessionState;

mod ast;
mod builtins;
mod eval;
mod format;
mod lexer;
mod ops;
mod parser;

pub use ast::{ParseError, ScriptBlockAst, Span};
pub use format::{format_lines, format_string};
pub use ops::wildcard_match;
pub use parser::parse;

use ast::Invocation;
use eval::{Eval, Flow, Interpreter, RawArg};

/// Parse errors that more input could still fix.
const INCOMPLETE_INPUT: &[&str] = &[
    "MissingEndCurlyBrace",
    "MissingEndParenthesisInExpression",
    "MissingEndParenthesisInSubexpression",
    "TerminatorExpectedAtEndOfString",
    "MissingEndOfCommentBlock",
];

/// Whether `text` fails to parse only because it stops early, so a front end
/// should keep reading continuation lines.
pub fn is_incomplete(text: &str) -> bool {
    match parse(text) {
        Ok(_) => false,
        Err(e) => INCOMPLETE_INPUT.contains(&e.error_id),
    }
}

#[derive(Debug)]
enum Stage {
    Script(Arc<ScriptBlockAst>),
    Command { name: String, args: Vec<RawArg> },
}

/// A submission parsed and resolved, ready for [`BuiltinEngine::invoke`].
#[derive(Debug)]
pub struct PreparedPipeline {
    stages: Vec<Stage>,
}

impl PreparedPipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// The engine a console session runs by default.
#[derive(Debug, Default)]
pub struct BuiltinEngine {
    interp: Interpreter,
}

impl BuiltinEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn raw_args(parameters: &[Parameter]) -> Vec<RawArg> {
    parameters
        .iter()
        .map(|parameter| match parameter {
            Parameter::Named { name, value } => RawArg::Named(name.clone(), Some(value.clone())),
            Parameter::Positional { value } => RawArg::Value(value.clone()),
            Parameter::Switch { name, value } => {
                RawArg::Named(name.clone(), Some(PsValue::from(*value)))
            }
        })
        .collect()
}

fn empty_pipeline() -> ErrorRecord {
    ErrorRecord::builder()
        .message("An empty pipeline element is not allowed.")
        .fully_qualified_error_id("EmptyPipeline")
        .category(
            ErrorCategory::builder()
                .kind(ErrorCategoryKind::InvalidOperation)
                .reason("InvalidOperationException")
                .build(),
        )
        .build()
}

/// Feeds `input` through the remaining stages and writes what comes out.
fn run_downstream(
    interp: &mut Interpreter,
    stages: &[Stage],
    input: Vec<PsValue>,
    ctx: &mut InvocationContext<'_>,
) -> Eval<()> {
    let mut current = input;
    for stage in stages {
        ctx.check_stop()?;
        let input = std::mem::take(&mut current);
        current = match stage {
            Stage::Command { name, args } => {
                interp.invoke_command(name, Invocation::Direct, args.clone(), input, ctx)?
            }
            Stage::Script(block) => interp.invoke_block(block, true, Vec::new(), input, ctx)?,
        };
    }
    ctx.write_objects(current);
    Ok(())
}

/// Runs a leading script stage one statement at a time so each statement's
/// output reaches the downstream stages before the next one starts.
fn run_script(
    interp: &mut Interpreter,
    block: &ScriptBlockAst,
    downstream: &[Stage],
    ctx: &mut InvocationContext<'_>,
) -> Eval<()> {
    interp.with_source(block, |interp| {
        for statement in &block.statements {
            let mut out = Vec::new();
            let result = match interp.exec_statement(statement, ctx, &mut out) {
                Err(Flow::Return(values)) => {
                    out.extend(values);
                    Err(Flow::Return(Vec::new()))
                }
                other => other,
            };
            if !out.is_empty() {
                run_downstream(interp, downstream, out, ctx)?;
            }
            result?;
        }
        Ok(())
    })
}

impl ScriptEngine for BuiltinEngine {
    type Prepared = PreparedPipeline;

    #[instrument(skip_all, fields(location = %session.location.display()))]
    fn open(&mut self, session: &InitialSessionState) -> Result<(), EngineError> {
        if !session.location.is_dir() {
            return Err(EngineError::Open(format!(
                "starting location '{}' is not a directory",
                session.location.display()
            )));
        }
        self.interp.configure(session);
        debug!(
            modules = session.modules.len(),
            extensions = session.extension_commands.len(),
            "interpreter configured"
        );
        Ok(())
    }

    fn command_names(&self) -> Vec<String> {
        self.interp
            .command_entries()
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    }

    fn prepare(&mut self, commands: &[SubCommand]) -> Result<PreparedPipeline, ErrorRecord> {
        if commands.is_empty() {
            return Err(empty_pipeline());
        }
        let mut stages = Vec::with_capacity(commands.len());
        for sub_command in commands {
            let stage = match sub_command {
                SubCommand::Script(text) => {
                    let block = parse(text).map_err(|e| e.into_error_record(text))?;
                    Stage::Script(Arc::new(block))
                }
                SubCommand::Command { name, parameters } => {
                    if !self.interp.command_exists(name) {
                        return Err(eval::command_not_found(name));
                    }
                    Stage::Command {
                        name: name.clone(),
                        args: raw_args(parameters),
                    }
                }
            };
            stages.push(stage);
        }
        Ok(PreparedPipeline { stages })
    }

    fn invoke(
        &mut self,
        prepared: PreparedPipeline,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), InvocationError> {
        let Some((first, rest)) = prepared.stages.split_first() else {
            return Ok(());
        };
        let result = match first {
            Stage::Script(block) => run_script(&mut self.interp, block, rest, ctx),
            Stage::Command { name, args } => self
                .interp
                .invoke_command(name, Invocation::Direct, args.clone(), Vec::new(), ctx)
                .and_then(|out| run_downstream(&mut self.interp, rest, out, ctx)),
        };

        match result {
            Ok(()) | Err(Flow::Return(_) | Flow::Break | Flow::Continue) => Ok(()),
            Err(Flow::Exit(code)) => {
                debug!(code, "exit requested");
                ctx.request_exit(code);
                Ok(())
            }
            Err(Flow::Error(record)) => Err(InvocationError::Failed(record)),
            Err(Flow::Stopped) => Err(InvocationError::Stopped),
        }
    }

    fn set_variable(&mut self, name: &str, value: PsValue) {
        self.interp.set_global(name, value);
    }
}
