use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use poshconsole_types::{ErrorRecord, PsValue};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::command::Command;

#[cfg(test)]
mod test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PsInvocationState {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
    Completed = 4,
    Failed = 5,
}

impl PsInvocationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            4 => Self::Completed,
            _ => Self::Failed,
        }
    }

    /// Completed, Failed and Stopped are terminal.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::NotStarted => matches!(next, Self::Running | Self::Stopped | Self::Failed),
            Self::Running => next != Self::NotStarted && next != Self::Running,
            Self::Stopping => next.is_done(),
            Self::Stopped | Self::Completed | Self::Failed => false,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid pipeline transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: PsInvocationState,
        to: PsInvocationState,
    },
}

/// State shared between whoever submitted a pipeline and the worker running it.
///
/// Stop requests are cooperative: the flag is raised here and the engine
/// notices it at its next check point.
#[derive(Debug)]
pub struct PipelineControl {
    id: Uuid,
    state: AtomicU8,
    stop_requested: AtomicBool,
    claimed: AtomicBool,
}

impl PipelineControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(PsInvocationState::NotStarted as u8),
            stop_requested: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PsInvocationState {
        PsInvocationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Asks the pipeline to stop. Returns false when it had already finished.
    pub fn request_stop(&self) -> bool {
        if self.state().is_done() {
            return false;
        }
        self.stop_requested.store(true, Ordering::Release);
        let _ = self.state.compare_exchange(
            PsInvocationState::Running as u8,
            PsInvocationState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        debug!(id = %self.id, "stop requested");
        true
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn store_state(&self, state: PsInvocationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// First caller wins; everyone after gets false.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }
}

/// The result of a pipeline that reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFinished {
    pub id: Uuid,
    pub command: Command,
    pub state: PsInvocationState,
    pub output: Vec<PsValue>,
    pub errors: Vec<ErrorRecord>,
    /// The terminating error, present only for `Failed`.
    pub failure: Option<ErrorRecord>,
}

impl PipelineFinished {
    pub fn succeeded(&self) -> bool {
        self.state == PsInvocationState::Completed && self.errors.is_empty()
    }

    /// Output collapsed the way an assignment would see it.
    pub fn output_value(&self) -> PsValue {
        PsValue::from_output(self.output.clone())
    }

    /// Output rendered one item per line.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Internal representation of one submission while the worker owns it.
#[derive(Debug)]
pub struct Pipeline {
    control: Arc<PipelineControl>,
    command: Command,
    output: Vec<PsValue>,
    errors: Vec<ErrorRecord>,
    failure: Option<ErrorRecord>,
}

impl Pipeline {
    pub fn new(command: Command, control: Arc<PipelineControl>) -> Self {
        Self {
            control,
            command,
            output: Vec::new(),
            errors: Vec::new(),
            failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.control.id()
    }

    pub fn state(&self) -> PsInvocationState {
        self.control.state()
    }

    pub fn control(&self) -> &Arc<PipelineControl> {
        &self.control
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn extend_output(&mut self, values: impl IntoIterator<Item = PsValue>) {
        self.output.extend(values);
    }

    pub fn extend_errors(&mut self, errors: impl IntoIterator<Item = ErrorRecord>) {
        self.errors.extend(errors);
    }

    pub fn set_failure(&mut self, failure: ErrorRecord) {
        if let Some(previous) = self.failure.replace(failure) {
            warn!(previous = %previous, "pipeline failure replaced");
        }
    }

    /// Applies a state change and, when it is terminal, claims the result.
    ///
    /// The claim is atomic on the shared control, so a duplicated terminal
    /// notification (or a second `Pipeline` over the same control) yields
    /// `None` and the collections are drained once.
    #[instrument(skip(self), fields(id = %self.id()))]
    pub fn on_state_changed(
        &mut self,
        next: PsInvocationState,
    ) -> Result<Option<PipelineFinished>, PipelineError> {
        let current = self.state();
        if current != next {
            if !current.can_transition_to(next) {
                return Err(PipelineError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
            self.control.store_state(next);
            info!(from = ?current, to = ?next, "pipeline state changed");
        }

        if !next.is_done() || !self.control.claim() {
            return Ok(None);
        }

        Ok(Some(PipelineFinished {
            id: self.id(),
            command: self.command.clone(),
            state: next,
            output: std::mem::take(&mut self.output),
            errors: std::mem::take(&mut self.errors),
            failure: self.failure.take(),
        }))
    }
}
