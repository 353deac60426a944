use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use poshconsole_types::{ErrorRecord, PsValue};

use super::{Pipeline, PipelineControl, PipelineError, PsInvocationState};
use crate::command::Command;

#[test]
fn completes_once_with_collected_results() {
    let mut pipeline = Pipeline::new(Command::script("'hi'"), PipelineControl::new());
    assert_eq!(pipeline.on_state_changed(PsInvocationState::Running), Ok(None));
    pipeline.extend_output([PsValue::from("hi")]);
    pipeline.extend_errors([ErrorRecord::new("soft", "Soft")]);

    let finished = pipeline
        .on_state_changed(PsInvocationState::Completed)
        .unwrap()
        .expect("first terminal notification claims the result");
    assert_eq!(finished.state, PsInvocationState::Completed);
    assert_eq!(finished.output, vec![PsValue::from("hi")]);
    assert_eq!(finished.errors.len(), 1);
    assert!(!finished.succeeded());

    assert_eq!(
        pipeline.on_state_changed(PsInvocationState::Completed),
        Ok(None)
    );
}

#[test]
fn rejects_invalid_transitions() {
    let mut pipeline = Pipeline::new(Command::script("1"), PipelineControl::new());
    pipeline.on_state_changed(PsInvocationState::Running).unwrap();
    pipeline.on_state_changed(PsInvocationState::Failed).unwrap();

    assert_eq!(
        pipeline.on_state_changed(PsInvocationState::Running),
        Err(PipelineError::InvalidTransition {
            from: PsInvocationState::Failed,
            to: PsInvocationState::Running,
        })
    );
}

#[test]
fn failure_travels_with_the_result() {
    let mut pipeline = Pipeline::new(Command::script("throw 'x'"), PipelineControl::new());
    pipeline.on_state_changed(PsInvocationState::Running).unwrap();
    pipeline.set_failure(ErrorRecord::new("x", "x"));
    let finished = pipeline
        .on_state_changed(PsInvocationState::Failed)
        .unwrap()
        .unwrap();
    assert_eq!(finished.failure.unwrap().message, "x");
}

#[test]
fn stop_request_moves_running_to_stopping() {
    let control = PipelineControl::new();
    let mut pipeline = Pipeline::new(Command::script("1"), Arc::clone(&control));
    pipeline.on_state_changed(PsInvocationState::Running).unwrap();

    assert!(control.request_stop());
    assert!(control.is_stop_requested());
    assert_eq!(control.state(), PsInvocationState::Stopping);

    let finished = pipeline
        .on_state_changed(PsInvocationState::Stopped)
        .unwrap()
        .unwrap();
    assert_eq!(finished.state, PsInvocationState::Stopped);
    assert!(!control.request_stop(), "a finished pipeline cannot be stopped");
}

#[test]
fn concurrent_terminal_notifications_claim_once() {
    for _ in 0..50 {
        let control = PipelineControl::new();
        let mut first = Pipeline::new(Command::script("1"), Arc::clone(&control));
        first.on_state_changed(PsInvocationState::Running).unwrap();

        let claims = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let control = Arc::clone(&control);
                let claims = Arc::clone(&claims);
                thread::spawn(move || {
                    let mut pipeline = Pipeline::new(Command::script("1"), control);
                    if let Ok(Some(_)) = pipeline.on_state_changed(PsInvocationState::Completed) {
                        claims.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(claims.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn terminal_states() {
    assert!(PsInvocationState::Stopped.is_done());
    assert!(PsInvocationState::Completed.is_done());
    assert!(PsInvocationState::Failed.is_done());
    assert!(!PsInvocationState::Stopping.is_done());
    assert!(PsInvocationState::NotStarted.can_transition_to(PsInvocationState::Running));
    assert!(!PsInvocationState::Stopping.can_transition_to(PsInvocationState::Running));
}
