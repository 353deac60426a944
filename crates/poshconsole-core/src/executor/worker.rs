use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use poshconsole_types::{ErrorRecord, PsValue};
use tracing::{debug, error, info, instrument, warn};

use super::{CurrentPipeline, Reply, SubmitOptions};
use crate::ConsoleError;
use crate::command::{Command, OutputMode, SubCommand, quote_literal};
use crate::completion;
use crate::engine::{HistoryEntry, InvocationContext, InvocationError, ScriptEngine};
use crate::host::{HostHandle, InputBridge};
use crate::pipeline::{Pipeline, PipelineControl, PipelineFinished, PsInvocationState};
use crate::runspace::{
    InitialSessionState, Runspace, SessionConfig, SessionInfo, SessionState, SessionStateCell,
};

/// Shown when the `prompt` command fails or prints nothing.
const FALLBACK_PROMPT: &str = "PS> ";

/// One queued submission. Ownership moves to the worker on dequeue.
pub(crate) struct Entry {
    pub command: Command,
    pub mode: OutputMode,
    pub options: SubmitOptions,
    pub control: Arc<PipelineControl>,
    pub reply: Option<Reply>,
}

impl Entry {
    /// A submission the session makes on its own behalf: profiles and shutdown scripts.
    fn internal(command: Command) -> Self {
        Self {
            command,
            mode: OutputMode::Default,
            options: SubmitOptions::default(),
            control: PipelineControl::new(),
            reply: None,
        }
    }

    fn respond(&mut self, result: Result<PipelineFinished, ConsoleError>) {
        if let Some(reply) = self.reply.take()
            && reply.send(result).is_err()
        {
            debug!("result dropped, nobody is waiting");
        }
    }
}

enum Next {
    Run(Entry),
    Shutdown(i32),
    Disconnected,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn dot_source(path: &Path) -> Command {
    Command::script(format!(". {}", quote_literal(&path.display().to_string()))).secret()
}

/// The thread that owns the session. Nothing else touches the engine.
pub(crate) struct Worker<E: ScriptEngine> {
    runspace: Runspace<E>,
    config: SessionConfig,
    host: HostHandle,
    bridge: Arc<InputBridge>,
    current: CurrentPipeline,
    history: Vec<HistoryEntry>,
    next_history_id: usize,
    next_source_id: i64,
    /// Profile scripts, run before anything from the queue.
    bootstrap: VecDeque<Entry>,
    cancel: Option<Receiver<i32>>,
    /// Exit code of a shutdown request seen while checking for cancellation.
    shutdown_requested: Option<i32>,
}

impl<E: ScriptEngine> Worker<E> {
    /// Opens the session on the calling (worker) thread and reports the
    /// outcome through `ready`. A failed open is written to the host once.
    #[instrument(skip_all, fields(host = %config.host_name))]
    pub(crate) fn open(
        config: SessionConfig,
        engine: E,
        host: HostHandle,
        bridge: Arc<InputBridge>,
        state: Arc<SessionStateCell>,
        current: CurrentPipeline,
        ready: &Sender<Result<SessionInfo, ConsoleError>>,
    ) -> Option<Self> {
        let initial = InitialSessionState::from_config(&config);
        let mut runspace = Runspace::new(engine, initial, state);

        match runspace.open() {
            Ok(mut info) => {
                let mut worker = Self {
                    runspace,
                    config,
                    host,
                    bridge,
                    current,
                    history: Vec::new(),
                    next_history_id: 1,
                    next_source_id: 1,
                    bootstrap: VecDeque::new(),
                    cancel: None,
                    shutdown_requested: None,
                };
                info.profiles = worker.queue_profiles();
                let _ = ready.send(Ok(info));
                Some(worker)
            }
            Err(e) => {
                error!(error = %e, "session open failed");
                host.write_error_line(e.to_string());
                let _ = ready.send(Err(e));
                None
            }
        }
    }

    fn queue_profiles(&mut self) -> Vec<PathBuf> {
        if !self.config.load_profiles {
            return Vec::new();
        }
        let scripts = self.config.profile_dirs.existing(&self.config.host_name);
        for script in &scripts {
            debug!(path = %script.path.display(), scope = ?script.scope, "profile queued");
            self.bootstrap.push_back(Entry::internal(dot_source(&script.path)));
        }
        scripts.into_iter().map(|script| script.path).collect()
    }

    /// Runs the profiles, then serves the queue until shutdown is requested
    /// or the console goes away, then closes the session.
    #[instrument(name = "worker.run", skip_all, fields(processed = 0u64))]
    pub(crate) fn run(mut self, queue: &Receiver<Entry>, cancel: Receiver<i32>) {
        let span = tracing::Span::current();
        self.cancel = Some(cancel);

        let mut prompted = false;
        while let Some(entry) = self.bootstrap.pop_front() {
            if self.check_shutdown().is_some() {
                break;
            }
            prompted = self.run_entry(entry);
        }
        if !prompted && self.check_shutdown().is_none() {
            self.regenerate_prompt();
        }

        let mut processed = 0u64;
        let exit_code = loop {
            if let Some(code) = self.check_shutdown() {
                break code;
            }
            let Some(cancel) = self.cancel.clone() else {
                break 0;
            };
            let next = crossbeam::channel::select! {
                recv(cancel) -> code => Next::Shutdown(code.unwrap_or(0)),
                recv(queue) -> entry => entry.map_or(Next::Disconnected, Next::Run),
            };
            match next {
                Next::Shutdown(code) => break code,
                Next::Disconnected => break self.check_shutdown().unwrap_or(0),
                Next::Run(entry) => {
                    if let Some(code) = self.check_shutdown() {
                        self.cancel_entry(entry);
                        break code;
                    }
                    processed += 1;
                    span.record("processed", processed);
                    self.run_entry(entry);
                }
            }
        };

        for entry in queue.try_iter() {
            self.cancel_entry(entry);
        }
        self.shutdown(exit_code);
        info!(processed, "pipeline worker exiting");
    }

    /// Non-blocking look at the cancellation channel, remembering what it said.
    fn check_shutdown(&mut self) -> Option<i32> {
        if self.shutdown_requested.is_none()
            && let Some(cancel) = &self.cancel
            && let Ok(code) = cancel.try_recv()
        {
            info!(exit_code = code, "shutdown requested");
            self.shutdown_requested = Some(code);
        }
        self.shutdown_requested
    }

    fn cancel_entry(&mut self, mut entry: Entry) {
        debug!(id = %entry.control.id(), "queued submission cancelled");
        entry.respond(Err(ConsoleError::Cancelled));
    }

    fn stages(&self, command: &Command, mode: OutputMode) -> Vec<SubCommand> {
        let mut stages = command.sub_commands().to_vec();
        let sink = match mode {
            OutputMode::Collect => None,
            OutputMode::Default => Some(self.config.default_output_command.as_str()),
            OutputMode::Tee => Some(self.config.content_output_command.as_str()),
            OutputMode::Suppress => Some("Out-Null"),
        };
        if let Some(sink) = sink {
            stages.push(SubCommand::command(sink, Vec::new()));
        }
        stages
    }

    fn add_history(&mut self, command: &Command) {
        let command_line = command.to_string();
        self.history.push(HistoryEntry {
            id: self.next_history_id,
            command_line: command_line.clone(),
        });
        self.next_history_id += 1;
        if self.history.len() > self.config.history_limit {
            let excess = self.history.len() - self.config.history_limit;
            self.history.drain(..excess);
        }
        self.host.history_added(command_line);
    }

    /// Runs one submission to a Done state and reports it. Returns whether a
    /// prompt was issued afterwards.
    #[instrument(skip_all, fields(id = %entry.control.id(), secret = entry.command.is_secret()))]
    fn run_entry(&mut self, mut entry: Entry) -> bool {
        let secret = entry.command.is_secret();
        if entry.options.echo && !secret {
            self.host.echo(entry.command.to_string());
        }
        if entry.options.add_to_history && !secret {
            self.add_history(&entry.command);
        }

        let control = Arc::clone(&entry.control);
        let mut pipeline = Pipeline::new(entry.command.clone(), Arc::clone(&control));

        if control.is_stop_requested() {
            debug!("stopped before it started");
            return self.finish(&mut entry, &mut pipeline, PsInvocationState::Stopped);
        }

        let stages = self.stages(&entry.command, entry.mode);
        let prepared = match self.runspace.engine_mut().prepare(&stages) {
            Ok(prepared) => prepared,
            Err(record) => {
                warn!(error = %record.render_concise(), "pipeline setup failed");
                completion::report_setup_error(&self.host, &record);
                // an error line was written, so even a secret submission re-prompts
                self.regenerate_prompt();
                entry.respond(Err(ConsoleError::Setup(record)));
                return true;
            }
        };

        *self.current.lock() = Some(Arc::clone(&control));
        if self.check_shutdown().is_some() {
            control.request_stop();
        }
        if let Err(e) = pipeline.on_state_changed(PsInvocationState::Running) {
            error!(error = %e, "pipeline could not start");
            *self.current.lock() = None;
            entry.respond(Err(e.into()));
            return false;
        }

        let source_id = self.next_source_id;
        self.next_source_id += 1;
        let mut ctx =
            InvocationContext::new(&control, source_id, &self.host, &self.bridge, &self.history);
        let engine = self.runspace.engine_mut();
        let result = catch_unwind(AssertUnwindSafe(|| engine.invoke(prepared, &mut ctx)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(%message, "pipeline panicked");
                Err(InvocationError::Failed(ErrorRecord::new(
                    format!("The pipeline failed unexpectedly: {message}"),
                    "PipelinePanicked",
                )))
            });
        let (output, errors, exit_code) = ctx.into_results();
        *self.current.lock() = None;

        pipeline.extend_output(output);
        pipeline.extend_errors(errors);
        let next = match result {
            Ok(()) => PsInvocationState::Completed,
            Err(InvocationError::Stopped) => PsInvocationState::Stopped,
            Err(InvocationError::Failed(record)) => {
                pipeline.set_failure(record);
                PsInvocationState::Failed
            }
        };
        // posted before the result resolves so a waiter always sees it
        if let Some(code) = exit_code {
            info!(exit_code = code, "script asked the host to exit");
            self.host.should_exit(code);
        }
        self.finish(&mut entry, &mut pipeline, next)
    }

    /// Claims the result and propagates it: errors to the host, then the
    /// prompt, then the result to whoever is waiting.
    fn finish(
        &mut self,
        entry: &mut Entry,
        pipeline: &mut Pipeline,
        state: PsInvocationState,
    ) -> bool {
        let finished = match pipeline.on_state_changed(state) {
            Ok(Some(finished)) => finished,
            Ok(None) => {
                warn!("pipeline result was already claimed");
                return false;
            }
            Err(e) => {
                error!(error = %e, "pipeline could not finish");
                entry.respond(Err(e.into()));
                return false;
            }
        };

        completion::report(&self.host, &finished);
        let prompted = completion::needs_prompt(&finished);
        if prompted {
            self.regenerate_prompt();
        }
        entry.respond(Ok(finished));
        prompted
    }

    /// Runs the session's `prompt` command and hands its text to the host.
    fn regenerate_prompt(&mut self) {
        let text = self.prompt_text().unwrap_or_else(|| FALLBACK_PROMPT.to_string());
        self.host.new_paragraph();
        self.host.set_prompt(text);
    }

    fn prompt_text(&mut self) -> Option<String> {
        let engine = self.runspace.engine_mut();
        let prepared = engine
            .prepare(&[SubCommand::command("prompt", Vec::new())])
            .inspect_err(|e| warn!(error = %e.render_concise(), "prompt command unavailable"))
            .ok()?;

        let control = PipelineControl::new();
        let mut ctx = InvocationContext::new(&control, 0, &self.host, &self.bridge, &self.history);
        if let Err(e) = engine.invoke(prepared, &mut ctx) {
            warn!(error = ?e, "prompt command failed");
            return None;
        }
        let (output, _, _) = ctx.into_results();
        let text: String = output.iter().map(ToString::to_string).collect();
        (!text.is_empty()).then_some(text)
    }

    /// Runs shutdown scripts with `$ExitCode` set, then closes the session.
    #[instrument(skip(self))]
    fn shutdown(&mut self, exit_code: i32) {
        self.cancel = None;
        self.shutdown_requested = None;
        if self.runspace.state() == SessionState::Opened {
            self.runspace
                .engine_mut()
                .set_variable("ExitCode", PsValue::from(exit_code));
            for path in self
                .config
                .profile_dirs
                .shutdown_scripts(&self.config.host_name)
            {
                debug!(path = %path.display(), "running shutdown script");
                self.run_entry(Entry::internal(dot_source(&path)));
            }
        }
        self.runspace.close();
    }
}
