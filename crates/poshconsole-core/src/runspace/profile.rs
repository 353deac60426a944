use std::path::{Path, PathBuf};

use tracing::debug;

pub const ALL_HOSTS_PROFILE: &str = "profile.ps1";

pub fn host_profile_name(host_name: &str) -> String {
    format!("{host_name}_profile.ps1")
}

pub fn shutdown_profile_name(host_name: &str) -> String {
    format!("{host_name}_shutdown.ps1")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileScript {
    pub scope: ProfileScope,
    pub host_specific: bool,
    pub path: PathBuf,
}

/// Where profile scripts are looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDirs {
    pub system: Option<PathBuf>,
    pub user: Option<PathBuf>,
}

impl ProfileDirs {
    pub fn new(system: Option<PathBuf>, user: Option<PathBuf>) -> Self {
        Self { system, user }
    }

    /// System dir from `POSHCONSOLE_SYSTEM_DIR` or the executable's directory;
    /// user dir under `XDG_CONFIG_HOME`, `HOME/.config` or the Windows documents folder.
    pub fn discover() -> Self {
        let system = std::env::var_os("POSHCONSOLE_SYSTEM_DIR")
            .map(PathBuf::from)
            .or_else(exe_dir);

        let user = std::env::var_os("XDG_CONFIG_HOME")
            .map(|dir| PathBuf::from(dir).join("poshconsole"))
            .or_else(|| {
                std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/poshconsole"))
            })
            .or_else(|| {
                std::env::var_os("USERPROFILE")
                    .map(|home| PathBuf::from(home).join("Documents").join("PoshConsole"))
            });

        debug!(?system, ?user, "profile directories");
        Self { system, user }
    }

    /// Every profile location in execution order: system all-hosts, system
    /// host-specific, user all-hosts, user host-specific. Later scripts can
    /// override what earlier ones define.
    pub fn candidates(&self, host_name: &str) -> Vec<ProfileScript> {
        let host_file = host_profile_name(host_name);
        let mut out = Vec::new();
        for (scope, dir) in [
            (ProfileScope::System, &self.system),
            (ProfileScope::User, &self.user),
        ] {
            let Some(dir) = dir else { continue };
            out.push(ProfileScript {
                scope,
                host_specific: false,
                path: dir.join(ALL_HOSTS_PROFILE),
            });
            out.push(ProfileScript {
                scope,
                host_specific: true,
                path: dir.join(&host_file),
            });
        }
        out
    }

    pub fn existing(&self, host_name: &str) -> Vec<ProfileScript> {
        self.candidates(host_name)
            .into_iter()
            .filter(|p| p.path.is_file())
            .collect()
    }

    /// The path `$PROFILE` points at, whether or not it exists.
    pub fn current_user_current_host(&self, host_name: &str) -> Option<PathBuf> {
        self.user
            .as_ref()
            .map(|dir| dir.join(host_profile_name(host_name)))
    }

    /// Existing shutdown scripts, user first.
    pub fn shutdown_scripts(&self, host_name: &str) -> Vec<PathBuf> {
        let name = shutdown_profile_name(host_name);
        [&self.user, &self.system]
            .into_iter()
            .flatten()
            .map(|dir| dir.join(&name))
            .filter(|path| path.is_file())
            .collect()
    }
}

pub(crate) fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
