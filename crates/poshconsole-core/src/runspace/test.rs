use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use poshconsole_types::{ErrorRecord, PsValue};

use super::{
    InitialSessionState, ProfileDirs, ProfileScope, Runspace, SessionConfig, SessionState,
    SessionStateCell, discover_modules,
};
use crate::command::SubCommand;
use crate::engine::{EngineError, InvocationContext, InvocationError, ScriptEngine};

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("poshconsole-runspace-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn path(&self) -> &Path {
        &self.0
    }

    fn touch(&self, relative: &str) -> PathBuf {
        let path = self.0.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn profiles_run_system_first_then_user() {
    let system = TempDir::new();
    let user = TempDir::new();
    system.touch("profile.ps1");
    system.touch("Test_profile.ps1");
    user.touch("profile.ps1");
    user.touch("Test_profile.ps1");
    user.touch("Other_profile.ps1");

    let dirs = ProfileDirs::new(Some(system.path().into()), Some(user.path().into()));
    let found = dirs.existing("Test");

    let order: Vec<_> = found.iter().map(|p| (p.scope, p.host_specific)).collect();
    assert_eq!(
        order,
        vec![
            (ProfileScope::System, false),
            (ProfileScope::System, true),
            (ProfileScope::User, false),
            (ProfileScope::User, true),
        ]
    );
    assert_eq!(found[3].path, user.path().join("Test_profile.ps1"));
}

#[test]
fn missing_profiles_are_skipped() {
    let user = TempDir::new();
    user.touch("Test_profile.ps1");
    let dirs = ProfileDirs::new(None, Some(user.path().into()));

    let found = dirs.existing("Test");
    assert_eq!(found.len(), 1);
    assert!(found[0].host_specific);
    assert_eq!(
        dirs.current_user_current_host("Test"),
        Some(user.path().join("Test_profile.ps1"))
    );
}

#[test]
fn shutdown_scripts_user_first() {
    let system = TempDir::new();
    let user = TempDir::new();
    let sys_script = system.touch("Test_shutdown.ps1");
    let user_script = user.touch("Test_shutdown.ps1");

    let dirs = ProfileDirs::new(Some(system.path().into()), Some(user.path().into()));
    assert_eq!(dirs.shutdown_scripts("Test"), vec![user_script, sys_script]);
}

#[test]
fn modules_are_discovered_and_shadowed() {
    let first = TempDir::new();
    let second = TempDir::new();
    first.touch("Alpha/Alpha.psm1");
    second.touch("alpha/alpha.psm1");
    second.touch("Beta/Beta.psm1");
    second.touch("NotAModule/readme.txt");

    let modules = discover_modules(&[
        first.path().to_path_buf(),
        second.path().join("missing"),
        second.path().to_path_buf(),
    ]);

    let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Beta"]);
    assert_eq!(modules[0].path, first.path().join("Alpha").join("Alpha.psm1"));
}

#[test]
fn initial_state_uses_explicit_module_path() {
    let modules = TempDir::new();
    modules.touch("Tools/Tools.psm1");
    let user = TempDir::new();

    let config = SessionConfig::builder()
        .host_name("Test")
        .module_path(vec![modules.path().to_path_buf()])
        .profile_dirs(ProfileDirs::new(None, Some(user.path().into())))
        .build();
    let initial = InitialSessionState::from_config(&config);

    assert_eq!(initial.module_path, vec![modules.path().to_path_buf()]);
    assert_eq!(initial.modules.len(), 1);
    let profile = initial
        .variables
        .iter()
        .find(|(name, _)| name == "PROFILE")
        .map(|(_, value)| value.to_string());
    assert_eq!(
        profile,
        Some(user.path().join("Test_profile.ps1").display().to_string())
    );
}

struct StubEngine {
    fail_open: bool,
    closed: bool,
}

impl ScriptEngine for StubEngine {
    type Prepared = ();

    fn open(&mut self, _session: &InitialSessionState) -> Result<(), EngineError> {
        if self.fail_open {
            Err(EngineError::Open("module path unreadable".to_string()))
        } else {
            Ok(())
        }
    }

    fn command_names(&self) -> Vec<String> {
        vec!["Get-Stub".to_string()]
    }

    fn prepare(&mut self, _commands: &[SubCommand]) -> Result<(), ErrorRecord> {
        Ok(())
    }

    fn invoke(&mut self, (): (), _ctx: &mut InvocationContext<'_>) -> Result<(), InvocationError> {
        Ok(())
    }

    fn set_variable(&mut self, _name: &str, _value: PsValue) {}

    fn close(&mut self) {
        self.closed = true;
    }
}

fn stub_runspace(fail_open: bool) -> (Runspace<StubEngine>, Arc<SessionStateCell>) {
    let config = SessionConfig::builder()
        .module_path(vec![])
        .profile_dirs(ProfileDirs::default())
        .build();
    let state = Arc::new(SessionStateCell::default());
    let runspace = Runspace::new(
        StubEngine {
            fail_open,
            closed: false,
        },
        InitialSessionState::from_config(&config),
        Arc::clone(&state),
    );
    (runspace, state)
}

#[test]
fn open_then_close() {
    let (mut runspace, state) = stub_runspace(false);
    assert_eq!(state.get(), SessionState::BeforeOpen);

    let info = runspace.open().unwrap();
    assert_eq!(info.commands, vec!["Get-Stub".to_string()]);
    assert_eq!(state.get(), SessionState::Opened);
    assert!(runspace.open().is_err(), "a session opens once");

    runspace.close();
    assert_eq!(state.get(), SessionState::Closed);
    assert!(runspace.engine_mut().closed);
}

#[test]
fn failed_open_breaks_the_session() {
    let (mut runspace, state) = stub_runspace(true);
    let err = runspace.open().unwrap_err();
    assert!(err.to_string().contains("module path unreadable"));
    assert_eq!(state.get(), SessionState::Broken);

    runspace.close();
    assert_eq!(state.get(), SessionState::Closed);
}
