//! Reporting finished pipelines back to the host.

use poshconsole_types::ErrorRecord;
use tracing::{debug, instrument};

use crate::host::HostHandle;
use crate::pipeline::PipelineFinished;

/// Writes the error output of a finished pipeline: the terminating failure
/// first, then the non-terminating errors in the order they were produced.
/// Returns the number of error entries written.
#[instrument(skip_all, fields(id = %finished.id, state = ?finished.state))]
pub fn report(host: &HostHandle, finished: &PipelineFinished) -> usize {
    let mut written = 0;
    for record in finished.failure.iter().chain(&finished.errors) {
        host.write_error_line(record.render_normal());
        written += 1;
    }
    if written > 0 {
        debug!(written, "errors reported");
    }
    written
}

/// A submission that never reached `Running`.
pub fn report_setup_error(host: &HostHandle, record: &ErrorRecord) {
    host.write_error_line(record.render_normal());
}

/// Whether the prompt is regenerated after `finished`.
///
/// Only a secret submission that stayed silent skips it.
pub fn needs_prompt(finished: &PipelineFinished) -> bool {
    !finished.command.is_secret()
        || !finished.output.is_empty()
        || !finished.errors.is_empty()
        || finished.failure.is_some()
}

#[cfg(test)]
mod tests {
    use poshconsole_types::{ErrorRecord, PsValue};
    use uuid::Uuid;

    use super::*;
    use crate::command::Command;
    use crate::host::RecordingHost;
    use crate::pipeline::PsInvocationState;

    fn finished(command: Command, state: PsInvocationState) -> PipelineFinished {
        PipelineFinished {
            id: Uuid::new_v4(),
            command,
            state,
            output: Vec::new(),
            errors: Vec::new(),
            failure: None,
        }
    }

    #[test]
    fn failure_is_reported_before_errors() {
        let host = RecordingHost::new();
        let mut done = finished(Command::script("x"), PsInvocationState::Failed);
        done.errors = vec![
            ErrorRecord::new("first soft", "Soft1"),
            ErrorRecord::new("second soft", "Soft2"),
        ];
        done.failure = Some(ErrorRecord::new("hard", "Hard"));

        assert_eq!(report(&host.handle(), &done), 3);
        let lines = host.error_lines();
        assert!(lines[0].contains("hard"));
        assert!(lines[1].contains("first soft"));
        assert!(lines[2].contains("second soft"));
    }

    #[test]
    fn clean_pipeline_writes_nothing() {
        let host = RecordingHost::new();
        let done = finished(Command::script("x"), PsInvocationState::Completed);
        assert_eq!(report(&host.handle(), &done), 0);
        assert!(host.events().is_empty());
    }

    #[test]
    fn silent_secret_skips_prompt() {
        let secret = Command::script("profile").secret();
        assert!(!needs_prompt(&finished(secret.clone(), PsInvocationState::Completed)));

        let mut noisy = finished(secret.clone(), PsInvocationState::Completed);
        noisy.output.push(PsValue::from("out"));
        assert!(needs_prompt(&noisy));

        let mut failed = finished(secret, PsInvocationState::Failed);
        failed.failure = Some(ErrorRecord::new("boom", "boom"));
        assert!(needs_prompt(&failed));

        assert!(needs_prompt(&finished(
            Command::script("'hi'"),
            PsInvocationState::Completed
        )));
    }
}
