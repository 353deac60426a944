pub mod command;
pub mod completion;
pub mod engine;
pub mod executor;
pub mod host;
pub mod pipeline;
pub mod runspace;
pub mod script;

pub use command::{Command, OutputMode, Parameter, SubCommand};
pub use engine::{CommandArgs, ExtensionCommand, InvocationContext, InvocationError, ScriptEngine};
pub use executor::{Console, PendingResult, SubmitOptions};
pub use host::{
    HostEvent, HostHandle, HostUi, InputBridge, InputKind, KeyDisposition, RecordingHost,
};
pub use pipeline::{PipelineFinished, PsInvocationState};
pub use runspace::{SessionConfig, SessionInfo, SessionState};
pub use script::BuiltinEngine;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Session failed to open: {0}")]
    SessionOpen(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Submission was cancelled before it ran")]
    Cancelled,

    #[error("Failed to spawn the pipeline worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Pipeline worker did not exit within {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("Timed out waiting for the pipeline result")]
    WaitTimeout,

    #[error("Command could not be prepared: {}", .0.render_concise())]
    Setup(poshconsole_types::ErrorRecord),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}
