mod config;
mod keys;
mod line_editor;
mod render;
mod ui_handler;

use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use poshconsole_core::{Console, HostEvent, HostHandle, OutputMode, PsInvocationState};
use tracing::{error, info, instrument};

use config::{Args, create_session_config, init_logging};
use render::Renderer;
use ui_handler::UiHandler;

#[instrument(name = "main", level = "info")]
fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging. If it fails, we can't log, so just print and exit.
    if let Err(e) = init_logging(&args) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    match run_app(&args) {
        Ok(code) => Ok(ExitCode::from(code.clamp(0, 255) as u8)),
        Err(e) => {
            error!("Application failed to run: {:?}", e);
            Err(e)
        }
    }
}

fn run_app(args: &Args) -> anyhow::Result<i32> {
    info!("Starting poshconsole");
    let config = create_session_config(args);
    let (host, events) = HostHandle::channel();
    let console = Console::start_builtin(config, host).context("Failed to open the session")?;
    info!(
        commands = console.info().commands.len(),
        modules = ?console.info().modules,
        profiles = ?console.info().profiles,
        "session open"
    );

    if let Some(command) = &args.command {
        return run_once(console, &events, command.clone());
    }
    if !std::io::stdin().is_terminal() {
        let mut script = String::new();
        std::io::stdin()
            .read_to_string(&mut script)
            .context("Failed to read the script from stdin")?;
        return run_once(console, &events, script);
    }

    UiHandler::new(console, events).run()
}

/// Runs a single submission without a prompt and maps its outcome to an exit code.
#[instrument(skip_all)]
fn run_once(
    mut console: Console,
    events: &crossbeam::channel::Receiver<HostEvent>,
    script: String,
) -> anyhow::Result<i32> {
    let finished = console.enqueue(script, OutputMode::Default)?.wait();

    let mut exit_code = match &finished {
        Ok(done) if done.state == PsInvocationState::Completed => 0,
        Ok(_) | Err(_) => 1,
    };
    let mut drawn: Vec<HostEvent> = events.try_iter().collect();
    if let Some(code) = drawn.iter().find_map(|event| match event {
        HostEvent::ShouldExit(code) => Some(*code),
        _ => None,
    }) {
        exit_code = code;
    }

    if let Err(e) = console.shutdown(exit_code) {
        error!(error = %e, "console shutdown incomplete");
    }
    drawn.extend(events.try_iter());

    let mut renderer = Renderer::new(std::io::stdout().lock(), false);
    for event in &drawn {
        renderer.render(event)?;
    }
    renderer.flush()?;
    info!(exit_code, "one-shot run finished");
    Ok(exit_code)
}
