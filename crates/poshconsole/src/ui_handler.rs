use std::io::Stdout;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use crossbeam::channel::{Receiver, Sender, select};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::terminal;
use poshconsole_core::{Console, ConsoleError, HostEvent, KeyDisposition, OutputMode, SubmitOptions};
use tracing::{debug, error, info, instrument, warn};

use crate::keys::{KeyAction, key_to_action, to_key_info};
use crate::line_editor::{Edit, LineEditor};
use crate::render::Renderer;

enum Step {
    Host(HostEvent),
    Key(KeyEvent),
    Closed,
}

/// Leaves raw mode however the UI loop ends.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            error!(error = %e, "failed to leave raw mode");
        }
    }
}

fn spawn_key_reader(keys: Sender<KeyEvent>, stop: Arc<AtomicBool>) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("poshconsole-keys".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                            if keys.send(key).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "failed to read terminal event");
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "failed to poll terminal events");
                        break;
                    }
                }
            }
            debug!("key reader exiting");
        })?;
    Ok(handle)
}

/// The interactive terminal front end.
///
/// Owns the terminal: host events from the pipeline worker and key presses
/// are both handled on this thread, so drawing never interleaves.
pub struct UiHandler {
    console: Console,
    events: Receiver<HostEvent>,
    renderer: Renderer<Stdout>,
    editor: LineEditor,
    /// A submission is queued or running and no prompt came back yet.
    busy: bool,
}

impl UiHandler {
    pub fn new(console: Console, events: Receiver<HostEvent>) -> Self {
        Self {
            console,
            events,
            renderer: Renderer::new(std::io::stdout(), true),
            editor: LineEditor::new(),
            // cleared by the first prompt
            busy: true,
        }
    }

    /// Runs until a script calls `exit`, the user ends input or the session
    /// goes away. Returns the process exit code.
    #[instrument(name = "ui_loop", skip_all, fields(keys = 0u64))]
    pub fn run(mut self) -> anyhow::Result<i32> {
        let raw = RawModeGuard::enable()?;
        let stop = Arc::new(AtomicBool::new(false));
        let (key_tx, key_rx) = crossbeam::channel::unbounded();
        let reader = spawn_key_reader(key_tx, Arc::clone(&stop))?;
        info!("Starting UI loop");

        let mut keys = 0u64;
        let exit_code = loop {
            let step = select! {
                recv(self.events) -> event => event.map_or(Step::Closed, Step::Host),
                recv(key_rx) -> key => key.map_or(Step::Closed, Step::Key),
            };
            match step {
                Step::Host(HostEvent::ShouldExit(code)) => {
                    info!(code, "exit requested by script");
                    break code;
                }
                Step::Host(event) => self.on_host_event(&event)?,
                Step::Key(key) => {
                    keys += 1;
                    tracing::Span::current().record("keys", keys);
                    if let Some(code) = self.on_key(key)? {
                        break code;
                    }
                }
                Step::Closed => {
                    warn!("event source closed, leaving UI loop");
                    break 0;
                }
            }
            self.renderer.flush()?;
        };

        stop.store(true, Ordering::Release);
        let exit_code = self.finish(exit_code)?;
        drop(raw);
        if reader.join().is_err() {
            error!("key reader panicked");
        }
        Ok(exit_code)
    }

    fn on_host_event(&mut self, event: &HostEvent) -> anyhow::Result<()> {
        match event {
            HostEvent::SetPrompt(_) => {
                self.busy = false;
                self.editor.cancel();
            }
            HostEvent::HistoryAdded(text) => self.editor.record(text.clone()),
            _ => {}
        }
        self.renderer.render(event)?;
        Ok(())
    }

    fn on_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<i32>> {
        let action = key_to_action(key);
        if self.busy {
            self.key_while_busy(key, action)?;
            return Ok(None);
        }

        match action {
            KeyAction::Interrupt => {
                self.editor.cancel();
                self.renderer.print("^C")?;
                self.renderer.newline()?;
                self.renderer.redraw_input(false, "")?;
            }
            KeyAction::EndOfInput if self.editor.line().is_empty() && !self.editor.is_continuing() => {
                info!("end of input at the prompt");
                self.renderer.newline()?;
                return Ok(Some(0));
            }
            KeyAction::ClearScreen => {
                self.renderer.render(&HostEvent::ClearScreen)?;
                self.redraw()?;
            }
            KeyAction::HistoryPrevious => {
                if self.editor.recall_previous() {
                    self.redraw()?;
                }
            }
            KeyAction::HistoryNext => {
                if self.editor.recall_next() {
                    self.redraw()?;
                }
            }
            KeyAction::Key(info) => match self.editor.apply(info) {
                Edit::Redraw => self.redraw()?,
                Edit::Continue => {
                    self.renderer.newline()?;
                    self.redraw()?;
                }
                Edit::Submit(text) => {
                    self.renderer.newline()?;
                    return self.submit(text);
                }
                Edit::Nothing => {}
            },
            KeyAction::EndOfInput | KeyAction::Ignore => {}
        }
        Ok(None)
    }

    /// Keys typed while the worker owns the session go to the input bridge:
    /// a pending read consumes them, otherwise they wait as typeahead.
    fn key_while_busy(&mut self, key: KeyEvent, action: KeyAction) -> anyhow::Result<()> {
        if action == KeyAction::Interrupt {
            let stopped = self.console.stop_current();
            debug!(stopped, "interrupt while busy");
            // release a blocked read so the stop is observed
            if self.console.input().interrupt() {
                debug!("pending read released");
            }
            self.renderer.print("^C")?;
            return Ok(());
        }
        let Some(info) = to_key_info(key) else {
            return Ok(());
        };
        match self.console.input().key_down(info) {
            KeyDisposition::Echo(c) => self.renderer.print(c.encode_utf8(&mut [0; 4]))?,
            KeyDisposition::Masked => self.renderer.print("*")?,
            KeyDisposition::Erase => self.renderer.erase_chars(1)?,
            KeyDisposition::Cleared(count) => self.renderer.erase_chars(count)?,
            KeyDisposition::LineCompleted => self.renderer.newline()?,
            KeyDisposition::Buffered | KeyDisposition::KeyDelivered | KeyDisposition::Ignored => {}
        }
        Ok(())
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        let continuation = self.editor.is_continuing();
        self.renderer.redraw_input(continuation, self.editor.line())?;
        Ok(())
    }

    fn submit(&mut self, text: String) -> anyhow::Result<Option<i32>> {
        if text.trim().is_empty() {
            debug!("Empty command received, reprompting");
            let prompt = self.renderer.prompt().to_string();
            self.renderer.write_styled(&prompt, poshconsole_types::Style::DEFAULT)?;
            return Ok(None);
        }

        debug!(command = %text, "submitting");
        match self
            .console
            .enqueue_with(text, OutputMode::Default, SubmitOptions::interactive())
        {
            // the prompt that follows completion is the only signal the UI needs
            Ok(_pending) => {
                self.busy = true;
                Ok(None)
            }
            Err(ConsoleError::SessionClosed) => {
                warn!("session closed, leaving UI loop");
                Ok(Some(0))
            }
            Err(e) => Err(e).context("Failed to submit command"),
        }
    }

    /// Shuts the console down and draws whatever the shutdown scripts wrote.
    fn finish(mut self, exit_code: i32) -> anyhow::Result<i32> {
        if let Err(e) = self.console.shutdown(exit_code) {
            error!(error = %e, "console shutdown incomplete");
        }
        // output still pending from the last submission, minus its prompt
        for event in self.events.try_iter() {
            if !matches!(event, HostEvent::SetPrompt(_)) {
                self.renderer.render(&event)?;
            }
        }
        self.renderer.newline()?;
        self.renderer.flush()?;
        Ok(exit_code)
    }
}
