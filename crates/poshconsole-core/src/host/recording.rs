use std::sync::Arc;

use parking_lot::Mutex;

use super::{HostEvent, HostHandle, HostUi};

/// A host that keeps every event in memory, for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> HostHandle {
        HostHandle::new(self.clone())
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.collect(|e| match e {
            HostEvent::ErrorLine(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.collect(|e| match e {
            HostEvent::SetPrompt(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn echoes(&self) -> Vec<String> {
        self.collect(|e| match e {
            HostEvent::Echo(text) => Some(text.clone()),
            _ => None,
        })
    }

    /// Text written through `Write`/`WriteLine`, lines terminated with `\n`.
    pub fn output_text(&self) -> String {
        let mut out = String::new();
        for event in self.events.lock().iter() {
            match event {
                HostEvent::Write { text, .. } => out.push_str(text),
                HostEvent::WriteLine { text, .. } => {
                    out.push_str(text);
                    out.push('\n');
                }
                _ => {}
            }
        }
        out
    }

    fn collect<T>(&self, f: impl Fn(&HostEvent) -> Option<T>) -> Vec<T> {
        self.events.lock().iter().filter_map(f).collect()
    }
}

impl HostUi for RecordingHost {
    fn post(&self, event: HostEvent) {
        self.events.lock().push(event);
    }
}
