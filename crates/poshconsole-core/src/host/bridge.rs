use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};
use poshconsole_types::KeyInfo;
use tracing::{debug, instrument, trace};

use super::{HostError, HostResult, InputKind};

/// What the UI should render for a key it handed to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// No read is waiting for a line; the key was queued for a later read.
    Buffered,
    /// Appended to the line being read; show the character.
    Echo(char),
    /// Appended to a secret line; show a mask.
    Masked,
    /// Removed the last character of the line being read.
    Erase,
    /// Cleared the line being read; the UI should erase this many cells.
    Cleared(usize),
    /// Terminated the line and released the waiting read.
    LineCompleted,
    /// Handed to a pending key read.
    KeyDelivered,
    /// Had no effect.
    Ignored,
}

#[derive(Debug, Default)]
struct BridgeState {
    pending: Option<InputKind>,
    line: String,
    completed_line: Option<String>,
    keys: VecDeque<KeyInfo>,
    closed: bool,
}

impl BridgeState {
    /// Applies one key to the line under edit.
    fn edit_line(&mut self, key: KeyInfo, secret: bool) -> KeyDisposition {
        if key.is_enter() {
            self.completed_line = Some(std::mem::take(&mut self.line));
            KeyDisposition::LineCompleted
        } else if key.is_backspace() {
            if self.line.pop().is_some() {
                KeyDisposition::Erase
            } else {
                KeyDisposition::Ignored
            }
        } else if key.is_escape() {
            let cleared = self.line.chars().count();
            self.line.clear();
            KeyDisposition::Cleared(cleared)
        } else if key.is_printable() {
            self.line.push(key.character);
            if secret {
                KeyDisposition::Masked
            } else {
                KeyDisposition::Echo(key.character)
            }
        } else {
            KeyDisposition::Ignored
        }
    }
}

/// Interactive input shared by the UI thread and the pipeline worker.
///
/// The worker blocks in [`InputBridge::read_line`] / [`InputBridge::read_key`]
/// until the UI delivers input through [`InputBridge::key_down`] or
/// [`InputBridge::submit_line`]. Reads never time out; only [`InputBridge::close`]
/// releases them early, which the console does once at teardown.
#[derive(Debug, Default)]
pub struct InputBridge {
    state: Mutex<BridgeState>,
    got_input_line: Condvar,
    got_input_key: Condvar,
    waiting_for_input: AtomicBool,
}

impl InputBridge {
    pub fn new() -> Self {
        Self::default()
    }

    // --- UI side ---

    /// Routes one key press from the UI.
    pub fn key_down(&self, key: KeyInfo) -> KeyDisposition {
        let mut state = self.state.lock();
        if state.closed {
            return KeyDisposition::Ignored;
        }

        match state.pending {
            // the worker has not taken the finished line yet
            Some(InputKind::Line | InputKind::SecretLine) if state.completed_line.is_some() => {
                state.keys.push_back(key);
                KeyDisposition::Buffered
            }
            Some(kind @ (InputKind::Line | InputKind::SecretLine)) => {
                let disposition = state.edit_line(key, kind == InputKind::SecretLine);
                if disposition == KeyDisposition::LineCompleted {
                    trace!("line completed by key");
                    self.got_input_line.notify_one();
                }
                disposition
            }
            Some(InputKind::Key) => {
                state.keys.push_back(key);
                self.got_input_key.notify_one();
                KeyDisposition::KeyDelivered
            }
            None => {
                state.keys.push_back(key);
                self.got_input_key.notify_one();
                KeyDisposition::Buffered
            }
        }
    }

    /// Completes a pending line read with the given text. Returns false when
    /// no line read is waiting.
    pub fn submit_line(&self, text: impl Into<String>) -> bool {
        let mut state = self.state.lock();
        if state.closed
            || state.completed_line.is_some()
            || !matches!(state.pending, Some(InputKind::Line | InputKind::SecretLine))
        {
            return false;
        }
        state.line.clear();
        state.completed_line = Some(text.into());
        self.got_input_line.notify_one();
        true
    }

    /// Releases a pending read after the pipeline was asked to stop: a line
    /// read gets an empty line, a key read gets Ctrl+C. Returns false when no
    /// read is pending.
    pub fn interrupt(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        match state.pending {
            Some(InputKind::Line | InputKind::SecretLine) => {
                if state.completed_line.is_none() {
                    state.line.clear();
                    state.completed_line = Some(String::new());
                    self.got_input_line.notify_one();
                }
                true
            }
            Some(InputKind::Key) => {
                state.keys.push_back(KeyInfo::ctrl_c());
                self.got_input_key.notify_one();
                true
            }
            None => false,
        }
    }

    /// The read the worker is currently blocked on, if any.
    pub fn is_waiting(&self) -> Option<InputKind> {
        if !self.waiting_for_input.load(Ordering::Acquire) {
            return None;
        }
        self.state.lock().pending
    }

    /// Releases any blocked read and refuses future ones.
    #[instrument(skip(self))]
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.got_input_line.notify_all();
        self.got_input_key.notify_all();
        debug!("input bridge closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    // --- worker side ---

    /// Blocks until a full line has been typed.
    pub fn read_line(&self, on_wait: impl FnOnce(InputKind)) -> HostResult<String> {
        self.wait_for_line(InputKind::Line, on_wait)
    }

    /// Like [`Self::read_line`], but keys are masked and the result is raw bytes.
    pub fn read_line_secret(&self, on_wait: impl FnOnce(InputKind)) -> HostResult<Vec<u8>> {
        self.wait_for_line(InputKind::SecretLine, on_wait)
            .map(String::into_bytes)
    }

    /// Blocks until one key is available, consuming buffered keys first.
    pub fn read_key(&self, on_wait: impl FnOnce(InputKind)) -> HostResult<KeyInfo> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HostError::InputClosed);
        }
        if let Some(key) = state.keys.pop_front() {
            return Ok(key);
        }

        state.pending = Some(InputKind::Key);
        self.waiting_for_input.store(true, Ordering::Release);
        on_wait(InputKind::Key);

        let key = loop {
            if let Some(key) = state.keys.pop_front() {
                break Ok(key);
            }
            if state.closed {
                break Err(HostError::InputClosed);
            }
            self.got_input_key.wait(&mut state);
        };

        state.pending = None;
        self.waiting_for_input.store(false, Ordering::Release);
        key
    }

    pub fn key_available(&self) -> bool {
        !self.state.lock().keys.is_empty()
    }

    /// Discards buffered keys.
    pub fn flush_input(&self) {
        self.state.lock().keys.clear();
    }

    #[instrument(skip(self, on_wait), level = "debug")]
    fn wait_for_line(&self, kind: InputKind, on_wait: impl FnOnce(InputKind)) -> HostResult<String> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(HostError::InputClosed);
        }

        state.pending = Some(kind);
        state.line.clear();
        state.completed_line = None;

        // typeahead
        while state.completed_line.is_none()
            && let Some(key) = state.keys.pop_front()
        {
            state.edit_line(key, kind == InputKind::SecretLine);
        }

        let result = if let Some(line) = state.completed_line.take() {
            Ok(line)
        } else {
            self.waiting_for_input.store(true, Ordering::Release);
            on_wait(kind);
            loop {
                if let Some(line) = state.completed_line.take() {
                    break Ok(line);
                }
                if state.closed {
                    break Err(HostError::InputClosed);
                }
                self.got_input_line.wait(&mut state);
            }
        };

        state.pending = None;
        state.line.clear();
        self.waiting_for_input.store(false, Ordering::Release);
        debug!(completed = result.is_ok(), "line read finished");
        result
    }
}
