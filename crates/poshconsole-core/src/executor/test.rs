use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use poshconsole_types::{ErrorRecord, PsValue};
use tracing_test::traced_test;

use super::*;
use crate::command::SubCommand;
use crate::engine::{EngineError, InvocationContext, InvocationError};
use crate::host::{HostEvent, RecordingHost};
use crate::runspace::{InitialSessionState, ProfileDirs};

/// An engine whose behaviour is keyed on the first stage's text.
#[derive(Debug, Default, Clone)]
struct MockEngine {
    log: Arc<Mutex<Vec<String>>>,
    fail_open: bool,
}

impl ScriptEngine for MockEngine {
    type Prepared = String;

    fn open(&mut self, _session: &InitialSessionState) -> Result<(), EngineError> {
        if self.fail_open {
            return Err(EngineError::Open("mock refused".to_string()));
        }
        Ok(())
    }

    fn command_names(&self) -> Vec<String> {
        vec!["prompt".to_string()]
    }

    fn prepare(&mut self, commands: &[SubCommand]) -> Result<String, ErrorRecord> {
        match &commands[0] {
            SubCommand::Script(text) if text == "bad" => {
                Err(ErrorRecord::new("cannot parse", "MockParseError"))
            }
            SubCommand::Script(text) => Ok(text.clone()),
            SubCommand::Command { name, .. } => Ok(name.clone()),
        }
    }

    fn invoke(
        &mut self,
        prepared: String,
        ctx: &mut InvocationContext<'_>,
    ) -> Result<(), InvocationError> {
        self.log.lock().push(prepared.clone());
        match prepared.as_str() {
            "prompt" => {
                ctx.write_object(PsValue::from("mock> "));
                Ok(())
            }
            "fail" => {
                ctx.write_error(ErrorRecord::new("soft one", "Soft1"));
                ctx.write_error(ErrorRecord::new("soft two", "Soft2"));
                Err(InvocationError::Failed(ErrorRecord::new("hard", "Hard")))
            }
            "spin" => loop {
                ctx.check_stop()?;
                std::thread::sleep(Duration::from_millis(5));
            },
            "hang" => {
                std::thread::sleep(Duration::from_millis(800));
                Ok(())
            }
            "silent" => Ok(()),
            "exit" => {
                ctx.request_exit(7);
                Ok(())
            }
            "panic" => panic!("mock engine gave up"),
            other => {
                ctx.write_object(PsValue::from(other));
                Ok(())
            }
        }
    }

    fn set_variable(&mut self, _name: &str, _value: PsValue) {}
}

fn config() -> SessionConfig {
    SessionConfig::builder()
        .host_name("Mock")
        .profile_dirs(ProfileDirs::default())
        .module_path(Vec::new())
        .location(std::env::temp_dir())
        .build()
}

fn start(engine: MockEngine) -> (Console, RecordingHost) {
    let host = RecordingHost::new();
    let console = Console::start(config(), host.handle(), move || engine).expect("console starts");
    (console, host)
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn entries_run_in_submission_order() {
    let engine = MockEngine::default();
    let log = Arc::clone(&engine.log);
    let (console, _host) = start(engine);

    let pending: Vec<_> = (0..10)
        .map(|i| {
            console
                .enqueue(format!("job{i}"), OutputMode::Collect)
                .expect("enqueue")
        })
        .collect();
    for (i, result) in pending.into_iter().enumerate() {
        let finished = result.wait().expect("finishes");
        assert_eq!(finished.output, vec![PsValue::from(format!("job{i}"))]);
    }

    let jobs: Vec<String> = log
        .lock()
        .iter()
        .filter(|entry| entry.starts_with("job"))
        .cloned()
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("job{i}")).collect();
    assert_eq!(jobs, expected);
}

#[test]
fn every_completion_regenerates_the_prompt() {
    let (console, host) = start(MockEngine::default());
    console
        .enqueue("one", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    // startup prompt plus one per completion
    assert_eq!(host.prompts(), vec!["mock> ", "mock> "]);
}

#[test]
fn setup_errors_are_reported_and_the_loop_continues() {
    let (console, host) = start(MockEngine::default());
    let result = console.enqueue("bad", OutputMode::Collect).expect("enqueue").wait();
    assert!(matches!(result, Err(ConsoleError::Setup(ref record)) if record.message == "cannot parse"));
    assert_eq!(host.error_lines().len(), 1);

    let next = console
        .enqueue("after", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("loop still alive");
    assert_eq!(next.state, PsInvocationState::Completed);
}

#[test]
fn secret_setup_errors_still_prompt() {
    let (console, host) = start(MockEngine::default());
    console
        .enqueue("sync", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    host.clear();

    let result = console
        .enqueue(Command::script("bad").secret(), OutputMode::Collect)
        .expect("enqueue")
        .wait();
    assert!(matches!(result, Err(ConsoleError::Setup(_))));
    assert_eq!(host.error_lines().len(), 1);
    assert_eq!(host.prompts(), vec!["mock> "]);
}

#[test]
fn exit_request_is_posted_before_the_result_resolves() {
    let (console, host) = start(MockEngine::default());
    for _ in 0..20 {
        host.clear();
        console
            .enqueue("exit", OutputMode::Collect)
            .expect("enqueue")
            .wait()
            .expect("finishes");
        assert!(host.events().contains(&HostEvent::ShouldExit(7)));
    }
}

#[test]
fn a_panicking_pipeline_fails_and_the_loop_survives() {
    let (console, host) = start(MockEngine::default());
    let finished = console
        .enqueue("panic", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    assert_eq!(finished.state, PsInvocationState::Failed);
    assert!(
        finished
            .failure
            .as_ref()
            .is_some_and(|f| f.message.contains("mock engine gave up"))
    );
    assert_eq!(host.error_lines().len(), 1);

    let next = console
        .enqueue("after", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("loop still alive");
    assert_eq!(next.output, vec![PsValue::from("after")]);
}

#[test]
fn failure_is_reported_before_soft_errors() {
    let (console, host) = start(MockEngine::default());
    let finished = console
        .enqueue("fail", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    assert_eq!(finished.state, PsInvocationState::Failed);
    assert_eq!(finished.failure.as_ref().map(|f| f.message.as_str()), Some("hard"));
    assert_eq!(finished.errors.len(), 2);

    let lines = host.error_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("hard"));
    assert!(lines[1].contains("soft one"));
    assert!(lines[2].contains("soft two"));
}

#[test]
fn silent_secret_commands_do_not_prompt() {
    let (console, host) = start(MockEngine::default());
    console
        .enqueue("sync", OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    host.clear();

    console
        .enqueue(Command::script("silent").secret(), OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    assert!(host.prompts().is_empty());

    console
        .enqueue(Command::script("noisy").secret(), OutputMode::Collect)
        .expect("enqueue")
        .wait()
        .expect("finishes");
    assert_eq!(host.prompts().len(), 1);
}

#[test]
fn stop_current_stops_the_running_pipeline() {
    let (console, _host) = start(MockEngine::default());
    let spinning = console.enqueue("spin", OutputMode::Collect).expect("enqueue");
    wait_until("pipeline to start", || console.is_busy());

    assert!(console.stop_current());
    let finished = spinning.wait().expect("finishes");
    assert_eq!(finished.state, PsInvocationState::Stopped);
    assert!(finished.failure.is_none());
    assert!(!console.stop_current());
}

#[test]
fn a_submission_stopped_before_it_starts_never_runs() {
    let engine = MockEngine::default();
    let log = Arc::clone(&engine.log);
    let (console, _host) = start(engine);

    let spinning = console.enqueue("spin", OutputMode::Collect).expect("enqueue");
    let queued = console.enqueue("never", OutputMode::Collect).expect("enqueue");
    wait_until("pipeline to start", || console.is_busy());
    assert_eq!(queued.state(), PsInvocationState::NotStarted);
    assert!(queued.stop());
    spinning.stop();

    assert_eq!(queued.wait().expect("finishes").state, PsInvocationState::Stopped);
    assert!(!log.lock().contains(&"never".to_string()));
}

#[test]
fn wait_timeout_leaves_the_result_pending() {
    let (console, _host) = start(MockEngine::default());
    let mut spinning = console.enqueue("spin", OutputMode::Collect).expect("enqueue");
    assert!(matches!(
        spinning.wait_timeout(Duration::from_millis(50)),
        Err(ConsoleError::WaitTimeout)
    ));
    spinning.stop();
    let finished = spinning
        .wait_timeout(Duration::from_secs(5))
        .expect("finishes after stop");
    assert_eq!(finished.state, PsInvocationState::Stopped);
}

#[test]
fn open_failure_is_reported_once() {
    let host = RecordingHost::new();
    let engine = MockEngine {
        fail_open: true,
        ..MockEngine::default()
    };
    let result = Console::start(config(), host.handle(), move || engine);
    assert!(matches!(result, Err(ConsoleError::SessionOpen(_))));
    assert_eq!(host.error_lines().len(), 1);
}

#[test]
#[traced_test]
fn shutdown_cancels_queued_entries_and_closes() {
    let (mut console, _host) = start(MockEngine::default());
    let spinning = console.enqueue("spin", OutputMode::Collect).expect("enqueue");
    let queued = console.enqueue("queued", OutputMode::Collect).expect("enqueue");
    wait_until("pipeline to start", || console.is_busy());

    console.shutdown(0).expect("worker exits in time");
    assert_eq!(console.session_state(), SessionState::Closed);
    assert_eq!(spinning.wait().expect("finishes").state, PsInvocationState::Stopped);
    assert!(matches!(queued.wait(), Err(ConsoleError::Cancelled)));
    assert!(matches!(
        console.enqueue("late", OutputMode::Collect),
        Err(ConsoleError::SessionClosed)
    ));
    assert!(logs_contain("console shutting down"));
}

#[test]
fn shutdown_gives_up_after_the_timeout() {
    let host = RecordingHost::new();
    let config = SessionConfig::builder()
        .profile_dirs(ProfileDirs::default())
        .module_path(Vec::new())
        .location(std::env::temp_dir())
        .shutdown_timeout(Duration::from_millis(50))
        .build();
    let mut console =
        Console::start(config, host.handle(), MockEngine::default).expect("console starts");
    let _hanging = console.enqueue("hang", OutputMode::Collect).expect("enqueue");
    wait_until("pipeline to start", || console.is_busy());

    assert!(matches!(
        console.shutdown(0),
        Err(ConsoleError::ShutdownTimeout(_))
    ));
    // a second call has nothing left to wait for
    assert!(console.shutdown(0).is_ok());
}
