//! The execution queue: one worker thread owns the session and runs
//! submissions strictly in the order they were enqueued.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use futures::channel::oneshot;
use futures::future::Either;
use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::ConsoleError;
use crate::command::{Command, OutputMode};
use crate::engine::ScriptEngine;
use crate::host::{HostHandle, InputBridge};
use crate::pipeline::{PipelineControl, PipelineFinished, PsInvocationState};
use crate::runspace::{SessionConfig, SessionInfo, SessionState, SessionStateCell};
use crate::script::BuiltinEngine;

mod worker;
#[cfg(test)]
mod test;

use worker::{Entry, Worker};

pub(crate) type Reply = oneshot::Sender<Result<PipelineFinished, ConsoleError>>;

/// How a submission is presented, separate from what it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, typed_builder::TypedBuilder)]
pub struct SubmitOptions {
    /// Record the command text in the session history
    #[builder(default)]
    pub add_to_history: bool,
    /// Write the reconstructed command text to the host before it runs
    #[builder(default)]
    pub echo: bool,
}

impl SubmitOptions {
    /// What a line typed at the prompt uses: recorded, not echoed (the UI already shows it).
    pub fn interactive() -> Self {
        Self {
            add_to_history: true,
            echo: false,
        }
    }
}

/// The currently running pipeline, if any. Only its stop flag is used from
/// outside the worker.
pub(crate) type CurrentPipeline = Arc<Mutex<Option<Arc<PipelineControl>>>>;

/// A submission's result, resolved exactly once when it reaches a Done state.
///
/// Awaiting it works from any executor; [`PendingResult::wait`] blocks the
/// calling thread instead.
#[derive(Debug)]
pub struct PendingResult {
    control: Arc<PipelineControl>,
    rx: oneshot::Receiver<Result<PipelineFinished, ConsoleError>>,
}

impl PendingResult {
    pub fn id(&self) -> Uuid {
        self.control.id()
    }

    pub fn state(&self) -> PsInvocationState {
        self.control.state()
    }

    /// Requests cooperative cancellation, whether or not it started yet.
    pub fn stop(&self) -> bool {
        self.control.request_stop()
    }

    pub fn wait(self) -> Result<PipelineFinished, ConsoleError> {
        futures::executor::block_on(self)
    }

    /// Waits up to `timeout`; the result stays pending when it runs out.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<PipelineFinished, ConsoleError> {
        futures::executor::block_on(with_timeout(self, timeout))
            .unwrap_or(Err(ConsoleError::WaitTimeout))
    }
}

impl Future for PendingResult {
    type Output = Result<PipelineFinished, ConsoleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ConsoleError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug)]
pub struct Timeout;

pub async fn with_timeout<F, T>(fut: F, dur: Duration) -> Result<T, Timeout>
where
    F: Future<Output = T>,
{
    let timeout = futures_timer::Delay::new(dur);

    futures::pin_mut!(timeout);
    futures::pin_mut!(fut);

    match futures::future::select(fut, timeout).await {
        Either::Left((val, _sleep)) => Ok(val),
        Either::Right((_unit, _fut)) => Err(Timeout),
    }
}

/// Signals the console when the worker thread ends, however it ends.
struct DoneGuard(Sender<()>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Handle to a running console session.
///
/// Dropping it shuts the session down with exit code 0.
pub struct Console {
    queue: Option<Sender<Entry>>,
    cancel: Option<Sender<i32>>,
    done: channel::Receiver<()>,
    worker: Option<JoinHandle<()>>,
    host: HostHandle,
    bridge: Arc<InputBridge>,
    state: Arc<SessionStateCell>,
    current: CurrentPipeline,
    info: SessionInfo,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("state", &self.state.get())
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Console {
    /// Starts a session running the built-in interpreter.
    pub fn start_builtin(config: SessionConfig, host: HostHandle) -> Result<Self, ConsoleError> {
        Self::start(config, host, BuiltinEngine::new)
    }

    /// Spawns the worker, builds the engine on it and opens the session there.
    ///
    /// Returns once the session is open; profile scripts are already queued
    /// ahead of anything submitted afterwards.
    #[instrument(skip_all, fields(host = %config.host_name))]
    pub fn start<E, F>(
        config: SessionConfig,
        host: HostHandle,
        make_engine: F,
    ) -> Result<Self, ConsoleError>
    where
        E: ScriptEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        let (queue_tx, queue_rx) = channel::unbounded();
        let (cancel_tx, cancel_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        let (ready_tx, ready_rx) = channel::bounded(1);

        let bridge = Arc::new(InputBridge::new());
        let state = Arc::new(SessionStateCell::default());
        let current = CurrentPipeline::default();
        let shutdown_timeout = config.shutdown_timeout;

        let worker = {
            let host = host.clone();
            let bridge = Arc::clone(&bridge);
            let state = Arc::clone(&state);
            let current = Arc::clone(&current);
            std::thread::Builder::new()
                .name(config.worker_thread_name.clone())
                .spawn(move || {
                    let _done = DoneGuard(done_tx);
                    let Some(worker) =
                        Worker::open(config, make_engine(), host, bridge, state, current, &ready_tx)
                    else {
                        return;
                    };
                    worker.run(&queue_rx, cancel_rx);
                })
                .map_err(ConsoleError::WorkerSpawn)?
        };

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(ConsoleError::SessionOpen(
                "worker exited before the session opened".to_string(),
            ))
        });
        let info = match opened {
            Ok(info) => info,
            Err(e) => {
                if worker.join().is_err() {
                    error!("pipeline worker panicked during open");
                }
                return Err(e);
            }
        };
        info!(commands = info.commands.len(), profiles = info.profiles.len(), "console started");

        Ok(Self {
            queue: Some(queue_tx),
            cancel: Some(cancel_tx),
            done: done_rx,
            worker: Some(worker),
            host,
            bridge,
            state,
            current,
            info,
            shutdown_timeout,
        })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn session_state(&self) -> SessionState {
        self.state.get()
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// The UI side of interactive reads.
    pub fn input(&self) -> &Arc<InputBridge> {
        &self.bridge
    }

    pub fn enqueue(
        &self,
        command: impl Into<Command>,
        mode: OutputMode,
    ) -> Result<PendingResult, ConsoleError> {
        self.enqueue_with(command, mode, SubmitOptions::default())
    }

    pub fn enqueue_with(
        &self,
        command: impl Into<Command>,
        mode: OutputMode,
        options: SubmitOptions,
    ) -> Result<PendingResult, ConsoleError> {
        let command = command.into();
        if command.is_empty() {
            return Err(ConsoleError::InvalidState("command has no sub-commands"));
        }
        let queue = self
            .queue
            .as_ref()
            .filter(|_| self.state.get() == SessionState::Opened)
            .ok_or(ConsoleError::SessionClosed)?;

        let control = PipelineControl::new();
        let (tx, rx) = oneshot::channel();
        let entry = Entry {
            command,
            mode,
            options,
            control: Arc::clone(&control),
            reply: Some(tx),
        };
        queue.send(entry).map_err(|_| ConsoleError::SessionClosed)?;
        Ok(PendingResult { control, rx })
    }

    /// Stops whatever is running. Returns false when the worker is idle.
    pub fn stop_current(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|control| control.request_stop())
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Cancels queued submissions, stops the running one, runs shutdown
    /// profiles and closes the session, waiting at most the configured
    /// shutdown timeout for the worker.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self, exit_code: i32) -> Result<(), ConsoleError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        info!("console shutting down");

        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(exit_code);
        }
        self.queue = None;
        self.stop_current();
        self.bridge.close();

        match self.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join().is_err() {
                    error!("pipeline worker panicked");
                }
                info!(state = ?self.state.get(), "console shut down");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = ?self.shutdown_timeout,
                    "pipeline worker did not exit in time, leaving it detached"
                );
                Err(ConsoleError::ShutdownTimeout(self.shutdown_timeout))
            }
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(0) {
            error!(error = %e, "shutdown on drop failed");
        }
    }
}
