use std::sync::Arc;

use poshconsole_types::{ProgressRecord, Style};
use tracing::debug;

mod bridge;
mod error;
mod recording;
#[cfg(test)]
mod test;

pub use bridge::{InputBridge, KeyDisposition};
pub use error::{HostError, HostResult};
pub use recording::RecordingHost;

/// Which kind of interactive read the worker is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Line,
    SecretLine,
    Key,
}

/// Everything the worker asks the UI to do.
///
/// Events are posted, never invoked synchronously: the UI thread drains them
/// in order and owns all rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Write { text: String, style: Style },
    WriteLine { text: String, style: Style },
    ErrorLine(String),
    WarningLine(String),
    VerboseLine(String),
    DebugLine(String),
    Progress { source_id: i64, record: ProgressRecord },
    /// Reconstructed text of a submission that asked to be echoed.
    Echo(String),
    SetPrompt(String),
    NewParagraph,
    InputRequested(InputKind),
    InputFinished,
    ShouldExit(i32),
    SetWindowTitle(String),
    ClearScreen,
    HistoryAdded(String),
}

/// The post primitive towards the UI thread.
pub trait HostUi: Send + Sync {
    fn post(&self, event: HostEvent);
}

impl HostUi for crossbeam::channel::Sender<HostEvent> {
    fn post(&self, event: HostEvent) {
        if self.send(event).is_err() {
            debug!("host event dropped, UI receiver is gone");
        }
    }
}

/// Cloneable handle the worker and the engine write through.
#[derive(Clone)]
pub struct HostHandle(Arc<dyn HostUi>);

impl std::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HostHandle").finish_non_exhaustive()
    }
}

impl HostHandle {
    pub fn new(ui: impl HostUi + 'static) -> Self {
        Self(Arc::new(ui))
    }

    pub fn from_arc(ui: Arc<dyn HostUi>) -> Self {
        Self(ui)
    }

    /// A handle over an unbounded channel, returning the receiving end for the UI loop.
    pub fn channel() -> (Self, crossbeam::channel::Receiver<HostEvent>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn post(&self, event: HostEvent) {
        self.0.post(event);
    }

    pub fn write(&self, text: impl Into<String>) {
        self.write_styled(text, Style::DEFAULT);
    }

    pub fn write_styled(&self, text: impl Into<String>, style: Style) {
        self.post(HostEvent::Write {
            text: text.into(),
            style,
        });
    }

    pub fn write_line(&self, text: impl Into<String>) {
        self.write_line_styled(text, Style::DEFAULT);
    }

    pub fn write_line_styled(&self, text: impl Into<String>, style: Style) {
        self.post(HostEvent::WriteLine {
            text: text.into(),
            style,
        });
    }

    pub fn write_error_line(&self, text: impl Into<String>) {
        self.post(HostEvent::ErrorLine(text.into()));
    }

    pub fn write_warning_line(&self, text: impl Into<String>) {
        self.post(HostEvent::WarningLine(text.into()));
    }

    pub fn write_verbose_line(&self, text: impl Into<String>) {
        self.post(HostEvent::VerboseLine(text.into()));
    }

    pub fn write_debug_line(&self, text: impl Into<String>) {
        self.post(HostEvent::DebugLine(text.into()));
    }

    pub fn write_progress(&self, source_id: i64, record: ProgressRecord) {
        self.post(HostEvent::Progress { source_id, record });
    }

    pub fn echo(&self, text: impl Into<String>) {
        self.post(HostEvent::Echo(text.into()));
    }

    pub fn set_prompt(&self, text: impl Into<String>) {
        self.post(HostEvent::SetPrompt(text.into()));
    }

    pub fn new_paragraph(&self) {
        self.post(HostEvent::NewParagraph);
    }

    pub fn input_requested(&self, kind: InputKind) {
        self.post(HostEvent::InputRequested(kind));
    }

    pub fn input_finished(&self) {
        self.post(HostEvent::InputFinished);
    }

    pub fn should_exit(&self, exit_code: i32) {
        self.post(HostEvent::ShouldExit(exit_code));
    }

    pub fn set_window_title(&self, title: impl Into<String>) {
        self.post(HostEvent::SetWindowTitle(title.into()));
    }

    pub fn clear_screen(&self) {
        self.post(HostEvent::ClearScreen);
    }

    pub fn history_added(&self, text: impl Into<String>) {
        self.post(HostEvent::HistoryAdded(text.into()));
    }
}
