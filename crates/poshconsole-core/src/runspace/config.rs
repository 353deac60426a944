use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use super::profile::ProfileDirs;
use crate::engine::ExtensionCommand;

/// Everything the host decides before a session opens.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SessionConfig {
    /// Used for host-specific profile names and `$Host`-style variables
    #[builder(default = "PoshConsole".to_string(), setter(into))]
    pub host_name: String,

    #[builder(default = env!("CARGO_PKG_VERSION").to_string(), setter(into))]
    pub host_version: String,

    /// Overrides `PSModulePath` and the derived defaults
    #[builder(default, setter(strip_option))]
    pub module_path: Option<Vec<PathBuf>>,

    #[builder(default = ProfileDirs::discover())]
    pub profile_dirs: ProfileDirs,

    #[builder(default = true)]
    pub load_profiles: bool,

    #[builder(default)]
    pub extension_commands: Vec<Arc<dyn ExtensionCommand>>,

    /// Appended for `OutputMode::Default`
    #[builder(default = "Out-Default".to_string(), setter(into))]
    pub default_output_command: String,

    /// Appended for `OutputMode::Tee`
    #[builder(default = "Tee-Default".to_string(), setter(into))]
    pub content_output_command: String,

    /// Upper bound on waiting for the worker during shutdown
    #[builder(default = Duration::from_secs(5))]
    pub shutdown_timeout: Duration,

    #[builder(default = "poshconsole-pipeline".to_string(), setter(into))]
    pub worker_thread_name: String,

    #[builder(default = 256)]
    pub history_limit: usize,

    /// Starting location; the process working directory when unset
    #[builder(default, setter(strip_option))]
    pub location: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
