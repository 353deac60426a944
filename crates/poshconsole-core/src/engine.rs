use std::fmt::Debug;

use poshconsole_types::{ErrorRecord, KeyInfo, PsValue};
use uuid::Uuid;

use crate::command::{Parameter, SubCommand};
use crate::host::{HostHandle, HostResult, InputBridge, InputKind};
use crate::pipeline::PipelineControl;
use crate::runspace::InitialSessionState;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine failed to open: {0}")]
    Open(String),
}

/// Why an invocation ended without completing.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationError {
    /// A terminating error; the pipeline fails with this record.
    Failed(ErrorRecord),
    /// The stop token was observed.
    Stopped,
}

impl From<ErrorRecord> for InvocationError {
    fn from(record: ErrorRecord) -> Self {
        Self::Failed(record)
    }
}

/// The interpreter a session hosts.
///
/// Every method runs on the pipeline worker thread; implementations do not
/// need to be `Send` beyond what the factory that builds them requires.
pub trait ScriptEngine {
    /// A parsed, ready-to-run pipeline.
    type Prepared;

    /// Builds session state from the resolved configuration.
    fn open(&mut self, session: &InitialSessionState) -> Result<(), EngineError>;

    /// Names of every command a submission can call, for `SessionInfo`.
    fn command_names(&self) -> Vec<String>;

    /// Parses and binds a pipeline. Errors here never reach `Running`.
    fn prepare(&mut self, commands: &[SubCommand]) -> Result<Self::Prepared, ErrorRecord>;

    /// Runs a prepared pipeline to completion, failure or stop.
    fn invoke(
        &mut self,
        prepared: Self::Prepared,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), InvocationError>;

    /// Sets a global variable, used for `$ExitCode` before shutdown profiles.
    fn set_variable(&mut self, name: &str, value: PsValue);

    fn close(&mut self) {}
}

/// A command supplied by the embedding host and registered at session open.
pub trait ExtensionCommand: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Parameters that never take a value, so `-Name arg` binds `arg` positionally.
    fn switches(&self) -> &[&str] {
        &[]
    }

    fn invoke(
        &self,
        args: &CommandArgs,
        input: Vec<PsValue>,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<Vec<PsValue>, InvocationError>;
}

/// Arguments bound to one command call.
///
/// Named values keep their spelling; a bare switch has no value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    named: Vec<(String, Option<PsValue>)>,
    positional: Vec<PsValue>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parameters(parameters: &[Parameter]) -> Self {
        let mut args = Self::new();
        for parameter in parameters {
            match parameter {
                Parameter::Named { name, value } => args.push_named(name, Some(value.clone())),
                Parameter::Positional { value } => args.push_positional(value.clone()),
                Parameter::Switch { name, value } => {
                    args.push_named(name, Some(PsValue::from(*value)));
                }
            }
        }
        args
    }

    pub fn push_named(&mut self, name: impl Into<String>, value: Option<PsValue>) {
        self.named.push((name.into(), value));
    }

    pub fn push_positional(&mut self, value: PsValue) {
        self.positional.push(value);
    }

    /// The value of the first named argument matching any of `names`.
    pub fn get(&self, names: &[&str]) -> Option<&PsValue> {
        self.find(names).and_then(Option::as_ref)
    }

    /// Present without a value, or with a truthy one.
    pub fn switch(&self, names: &[&str]) -> bool {
        self.find(names)
            .is_some_and(|value| value.as_ref().is_none_or(PsValue::is_truthy))
    }

    pub fn has(&self, names: &[&str]) -> bool {
        self.find(names).is_some()
    }

    pub fn positional(&self) -> &[PsValue] {
        &self.positional
    }

    /// Named value, falling back to a positional slot.
    pub fn value(&self, names: &[&str], position: usize) -> Option<&PsValue> {
        self.get(names).or_else(|| self.positional.get(position))
    }

    /// The first named argument not in `accepted`.
    pub fn unknown(&self, accepted: &[&str]) -> Option<&str> {
        self.named
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| !accepted.iter().any(|a| a.eq_ignore_ascii_case(name)))
    }

    fn find(&self, names: &[&str]) -> Option<&Option<PsValue>> {
        self.named
            .iter()
            .find(|(name, _)| names.iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: usize,
    pub command_line: String,
}

/// Everything an engine may touch while a pipeline is `Running`.
///
/// Interactive reads are only reachable through this type, so they can only
/// happen from inside a running pipeline.
pub struct InvocationContext<'a> {
    control: &'a PipelineControl,
    source_id: i64,
    host: &'a HostHandle,
    bridge: &'a InputBridge,
    history: &'a [HistoryEntry],
    output: Vec<PsValue>,
    errors: Vec<ErrorRecord>,
    exit_code: Option<i32>,
}

impl<'a> InvocationContext<'a> {
    pub fn new(
        control: &'a PipelineControl,
        source_id: i64,
        host: &'a HostHandle,
        bridge: &'a InputBridge,
        history: &'a [HistoryEntry],
    ) -> Self {
        Self {
            control,
            source_id,
            host,
            bridge,
            history,
            output: Vec::new(),
            errors: Vec::new(),
            exit_code: None,
        }
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.control.id()
    }

    /// Small per-session number identifying this pipeline in progress records.
    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn host(&self) -> &HostHandle {
        self.host
    }

    pub fn history(&self) -> &[HistoryEntry] {
        self.history
    }

    pub fn write_object(&mut self, value: PsValue) {
        self.output.push(value);
    }

    pub fn write_objects(&mut self, values: impl IntoIterator<Item = PsValue>) {
        self.output.extend(values);
    }

    /// Records a non-terminating error.
    pub fn write_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Removes and returns the errors written after the first `from`.
    pub fn take_errors_from(&mut self, from: usize) -> Vec<ErrorRecord> {
        self.errors.split_off(from.min(self.errors.len()))
    }

    pub fn is_stopping(&self) -> bool {
        self.control.is_stop_requested()
    }

    pub fn check_stop(&self) -> Result<(), InvocationError> {
        if self.is_stopping() {
            Err(InvocationError::Stopped)
        } else {
            Ok(())
        }
    }

    pub fn read_line(&self) -> HostResult<String> {
        self.interactive(|on_wait| self.bridge.read_line(on_wait))
    }

    pub fn read_line_secret(&self) -> HostResult<Vec<u8>> {
        self.interactive(|on_wait| self.bridge.read_line_secret(on_wait))
    }

    pub fn read_key(&self) -> HostResult<KeyInfo> {
        self.interactive(|on_wait| self.bridge.read_key(on_wait))
    }

    pub fn key_available(&self) -> bool {
        self.bridge.key_available()
    }

    pub fn flush_input(&self) {
        self.bridge.flush_input();
    }

    /// Asks the host to end the session once this pipeline finishes.
    pub fn request_exit(&mut self, exit_code: i32) {
        self.exit_code = Some(exit_code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub(crate) fn into_results(self) -> (Vec<PsValue>, Vec<ErrorRecord>, Option<i32>) {
        (self.output, self.errors, self.exit_code)
    }

    /// Moves UI focus to the input while a read blocks, and back afterwards.
    fn interactive<T>(
        &self,
        read: impl FnOnce(&mut dyn FnMut(InputKind)) -> HostResult<T>,
    ) -> HostResult<T> {
        let mut requested = false;
        let result = read(&mut |kind| {
            requested = true;
            self.host.input_requested(kind);
        });
        if requested {
            self.host.input_finished();
        }
        result
    }
}
