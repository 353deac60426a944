use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use poshconsole_core::runspace::ProfileDirs;
use poshconsole_core::{
    Command, Console, ConsoleError, HostEvent, InputKind, OutputMode, PsInvocationState,
    RecordingHost, SessionConfig, SessionState, SubmitOptions,
};
use poshconsole_types::PsValue;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("poshconsole-{name}-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

fn start_with(profile_dirs: ProfileDirs) -> (Console, RecordingHost) {
    let host = RecordingHost::new();
    let config = SessionConfig::builder()
        .host_name("Test")
        .profile_dirs(profile_dirs)
        .module_path(Vec::new())
        .location(std::env::temp_dir())
        .build();
    let console = Console::start_builtin(config, host.handle()).expect("console starts");
    (console, host)
}

fn start() -> (Console, RecordingHost) {
    start_with(ProfileDirs::default())
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn echoed_submission_prints_and_prompts_once() -> anyhow::Result<()> {
    let (console, host) = start();
    let options = SubmitOptions::builder().echo(true).build();
    let finished = console
        .enqueue_with(Command::script("'hi'"), OutputMode::Default, options)?
        .wait()?;

    assert_eq!(finished.state, PsInvocationState::Completed);
    assert_eq!(host.echoes(), vec!["'hi'"]);
    assert_eq!(host.output_text(), "hi\n");
    // one at startup, one after the submission
    let prompts = host.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|p| p.starts_with("PS ") && p.ends_with("> ")));
    Ok(())
}

#[test]
fn parse_failure_is_reported_and_the_queue_keeps_going() -> anyhow::Result<()> {
    let (console, host) = start();
    let result = console.enqueue("Write-Output (", OutputMode::Default)?.wait();
    assert!(matches!(result, Err(ConsoleError::Setup(_))));
    assert_eq!(host.error_lines().len(), 1);

    let next = console.enqueue("'still here'", OutputMode::Collect)?.wait()?;
    assert_eq!(next.output, vec![PsValue::from("still here")]);
    Ok(())
}

#[test]
fn oversized_repeat_fails_without_killing_the_console() -> anyhow::Result<()> {
    let (console, host) = start();
    let finished = console.enqueue("'ab' * 1e19", OutputMode::Default)?.wait()?;
    assert_eq!(finished.state, PsInvocationState::Failed);
    assert_eq!(host.error_lines().len(), 1);

    let next = console.enqueue("'after'", OutputMode::Collect)?.wait()?;
    assert_eq!(next.output, vec![PsValue::from("after")]);
    Ok(())
}

#[test]
fn terminating_error_is_reported_before_earlier_errors() -> anyhow::Result<()> {
    let (console, host) = start();
    let finished = console
        .enqueue("Write-Error 'soft'; throw 'hard'", OutputMode::Default)?
        .wait()?;

    assert_eq!(finished.state, PsInvocationState::Failed);
    let lines = host.error_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("hard"));
    assert!(lines[1].contains("soft"));
    Ok(())
}

#[test]
fn submissions_never_interleave() -> anyhow::Result<()> {
    let (console, host) = start();
    let pending = (0..5)
        .map(|i| {
            console.enqueue(
                format!("Write-Host 'start {i}'; Start-Sleep -Milliseconds 10; Write-Host 'end {i}'"),
                OutputMode::Default,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    for result in pending {
        result.wait()?;
    }

    let expected: String = (0..5).map(|i| format!("start {i}\nend {i}\n")).collect();
    assert_eq!(host.output_text(), expected);
    Ok(())
}

#[test]
fn read_host_holds_the_queue_until_a_line_arrives() -> anyhow::Result<()> {
    let (console, host) = start();
    let reading = console.enqueue("Read-Host", OutputMode::Collect)?;
    let queued = console.enqueue("'second'", OutputMode::Collect)?;

    wait_until("the read to block", || {
        console.input().is_waiting() == Some(InputKind::Line)
    });
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(queued.state(), PsInvocationState::NotStarted);
    assert!(host.events().contains(&HostEvent::InputRequested(InputKind::Line)));

    assert!(console.input().submit_line("typed"));
    assert_eq!(reading.wait()?.output, vec![PsValue::from("typed")]);
    assert_eq!(queued.wait()?.output, vec![PsValue::from("second")]);
    Ok(())
}

#[test]
fn silent_secret_submission_leaves_no_trace() -> anyhow::Result<()> {
    let (console, host) = start();
    console.enqueue("'sync'", OutputMode::Collect)?.wait()?;
    host.clear();

    let options = SubmitOptions::builder().echo(true).add_to_history(true).build();
    console
        .enqueue_with(Command::script("$hidden = 1").secret(), OutputMode::Default, options)?
        .wait()?;

    let events = host.events();
    assert!(host.prompts().is_empty(), "unexpected events: {events:?}");
    assert!(host.echoes().is_empty());
    assert!(!events.iter().any(|e| matches!(e, HostEvent::HistoryAdded(_))));
    Ok(())
}

#[test]
fn interactive_submissions_are_recorded_in_history() -> anyhow::Result<()> {
    let (console, host) = start();
    console
        .enqueue_with("'first'", OutputMode::Default, SubmitOptions::interactive())?
        .wait()?;
    let history = console.enqueue("Get-History", OutputMode::Collect)?.wait()?;

    assert_eq!(history.output.len(), 1);
    assert!(host.events().contains(&HostEvent::HistoryAdded("'first'".to_string())));
    assert!(host.echoes().is_empty());
    Ok(())
}

#[test]
fn profiles_run_before_the_first_submission() -> anyhow::Result<()> {
    let system = scratch_dir("system");
    let user = scratch_dir("user");
    fs::write(system.join("profile.ps1"), "$order = 'system'\n")?;
    fs::write(
        user.join("Test_profile.ps1"),
        "$order = \"$order user\"\nfunction prompt { 'custom> ' }\n",
    )?;

    let (console, host) = start_with(ProfileDirs::new(Some(system.clone()), Some(user.clone())));
    assert_eq!(console.info().profiles.len(), 2);

    let finished = console.enqueue("$order", OutputMode::Collect)?.wait()?;
    assert_eq!(finished.output, vec![PsValue::from("system user")]);
    assert!(host.echoes().is_empty());
    assert_eq!(host.prompts().last().map(String::as_str), Some("custom> "));

    drop(console);
    fs::remove_dir_all(system)?;
    fs::remove_dir_all(user)?;
    Ok(())
}

#[test]
fn exit_asks_the_host_to_quit() -> anyhow::Result<()> {
    let (console, host) = start();
    console.enqueue("exit 7", OutputMode::Default)?.wait()?;
    assert!(host.events().contains(&HostEvent::ShouldExit(7)));
    Ok(())
}

#[test]
fn shutdown_runs_shutdown_scripts_and_closes() -> anyhow::Result<()> {
    let user = scratch_dir("shutdown");
    fs::write(user.join("Test_shutdown.ps1"), "Write-Host \"bye $ExitCode\"\n")?;

    let (mut console, host) = start_with(ProfileDirs::new(None, Some(user.clone())));
    let reading = console.enqueue("Read-Host", OutputMode::Collect)?;
    let queued = console.enqueue("'never runs'", OutputMode::Collect)?;
    wait_until("the read to block", || console.input().is_waiting().is_some());

    console.shutdown(3)?;
    assert_eq!(console.session_state(), SessionState::Closed);
    assert_eq!(reading.wait()?.state, PsInvocationState::Stopped);
    assert!(matches!(queued.wait(), Err(ConsoleError::Cancelled)));
    assert!(host.output_text().contains("bye 3\n"));
    assert!(matches!(
        console.enqueue("'late'", OutputMode::Default),
        Err(ConsoleError::SessionClosed)
    ));

    fs::remove_dir_all(user)?;
    Ok(())
}
