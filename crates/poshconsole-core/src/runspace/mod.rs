use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use poshconsole_types::PsValue;
use tracing::{error, info, instrument, warn};

use crate::ConsoleError;
use crate::engine::{ExtensionCommand, ScriptEngine};

mod config;
mod modules;
mod profile;
#[cfg(test)]
mod test;

pub use config::SessionConfig;
pub use modules::{ModuleInfo, default_module_path, discover_modules};
pub use profile::{
    ALL_HOSTS_PROFILE, ProfileDirs, ProfileScope, ProfileScript, host_profile_name,
    shutdown_profile_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    BeforeOpen = 0,
    Opening = 1,
    Opened = 2,
    Closing = 3,
    Closed = 4,
    Broken = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::BeforeOpen,
            1 => Self::Opening,
            2 => Self::Opened,
            3 => Self::Closing,
            4 => Self::Closed,
            _ => Self::Broken,
        }
    }
}

/// Session state readable from any thread; only the worker writes it.
#[derive(Debug)]
pub struct SessionStateCell(AtomicU8);

impl Default for SessionStateCell {
    fn default() -> Self {
        Self(AtomicU8::new(SessionState::BeforeOpen as u8))
    }
}

impl SessionStateCell {
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            info!(from = ?previous, to = ?state, "session state changed");
        }
    }
}

/// What the opened session looks like, handed back from `Console::start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub host_name: String,
    pub module_path: Vec<PathBuf>,
    pub modules: Vec<String>,
    pub commands: Vec<String>,
    /// Profile scripts queued at startup, in run order
    pub profiles: Vec<PathBuf>,
}

/// Configuration resolved against the environment, on the worker thread.
#[derive(Debug, Clone)]
pub struct InitialSessionState {
    pub host_name: String,
    pub host_version: String,
    pub module_path: Vec<PathBuf>,
    pub modules: Vec<ModuleInfo>,
    pub extension_commands: Vec<Arc<dyn ExtensionCommand>>,
    pub location: PathBuf,
    /// Global variables defined before any profile runs
    pub variables: Vec<(String, PsValue)>,
}

impl InitialSessionState {
    pub fn from_config(config: &SessionConfig) -> Self {
        let module_path = config
            .module_path
            .clone()
            .unwrap_or_else(|| default_module_path(&config.profile_dirs));
        let modules = discover_modules(&module_path);

        let location = config
            .location
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut variables = vec![
            ("HostName".to_string(), PsValue::from(config.host_name.clone())),
            (
                "HostVersion".to_string(),
                PsValue::from(config.host_version.clone()),
            ),
        ];
        if let Some(profile) = config
            .profile_dirs
            .current_user_current_host(&config.host_name)
        {
            variables.push((
                "PROFILE".to_string(),
                PsValue::from(profile.display().to_string()),
            ));
        }
        if let Some(system) = &config.profile_dirs.system {
            variables.push((
                "PSHOME".to_string(),
                PsValue::from(system.display().to_string()),
            ));
        }

        Self {
            host_name: config.host_name.clone(),
            host_version: config.host_version.clone(),
            module_path,
            modules,
            extension_commands: config.extension_commands.clone(),
            location,
            variables,
        }
    }
}

/// A session: the engine plus its lifecycle state. Owned by the worker.
pub struct Runspace<E: ScriptEngine> {
    engine: E,
    state: Arc<SessionStateCell>,
    initial: InitialSessionState,
}

impl<E: ScriptEngine> Runspace<E> {
    pub fn new(engine: E, initial: InitialSessionState, state: Arc<SessionStateCell>) -> Self {
        Self {
            engine,
            state,
            initial,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn initial(&self) -> &InitialSessionState {
        &self.initial
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    #[instrument(skip_all, fields(host = %self.initial.host_name))]
    pub fn open(&mut self) -> Result<SessionInfo, ConsoleError> {
        if self.state() != SessionState::BeforeOpen {
            return Err(ConsoleError::InvalidState("session was already opened"));
        }
        self.state.set(SessionState::Opening);

        if let Err(e) = self.engine.open(&self.initial) {
            error!(error = %e, "session open failed");
            self.state.set(SessionState::Broken);
            return Err(ConsoleError::SessionOpen(e.to_string()));
        }

        self.state.set(SessionState::Opened);
        Ok(SessionInfo {
            host_name: self.initial.host_name.clone(),
            module_path: self.initial.module_path.clone(),
            modules: self.initial.modules.iter().map(|m| m.name.clone()).collect(),
            commands: self.engine.command_names(),
            profiles: Vec::new(),
        })
    }

    #[instrument(skip_all)]
    pub fn close(&mut self) {
        match self.state() {
            SessionState::Closed => return,
            SessionState::BeforeOpen => warn!("closing a session that never opened"),
            _ => {}
        }
        self.state.set(SessionState::Closing);
        self.engine.close();
        self.state.set(SessionState::Closed);
    }
}
