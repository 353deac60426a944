use clap::Parser;
use poshconsole_core::SessionConfig;
use poshconsole_core::runspace::ProfileDirs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry::Registry};

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Sets up a panic hook so the panic reaches the log file before the program exits.
fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        tracing::error!("A panic occurred: {}", panic_info);
    }));
}

/// Interactive PowerShell-style console
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Run this command, print its output and exit
    #[arg(short = 'c', long = "command", help = "Command to run non-interactively")]
    pub command: Option<String>,

    #[arg(long, help = "Do not run profile scripts at startup")]
    pub no_profile: bool,

    #[arg(long, default_value = "PoshConsole", help = "Host name used for profile file names")]
    pub host_name: String,

    /// Module search path, replacing the default one; repeat for several directories
    #[arg(long = "module-path", help = "Module search directory")]
    pub module_path: Option<Vec<PathBuf>>,

    #[arg(long, help = "Directory holding the current user's profile scripts")]
    pub profile_dir: Option<PathBuf>,

    #[arg(long, help = "Directory holding the all-users profile scripts")]
    pub system_profile_dir: Option<PathBuf>,

    #[arg(long, help = "Starting location (default: current directory)")]
    pub location: Option<PathBuf>,

    #[arg(long, default_value_t = 5, help = "Seconds to wait for the pipeline on exit")]
    pub shutdown_timeout: u64,

    #[arg(long, default_value = "poshconsole.log", help = "Log file path")]
    pub log_file: PathBuf,

    /// Verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase logging verbosity")]
    pub verbose: u8,
}

/// Initialize logging with file output; the terminal belongs to the console.
pub fn init_logging(args: &Args) -> anyhow::Result<()> {
    setup_panic_hook();

    // Bridge logs from the `log` crate to `tracing`
    LogTracer::init().ok();

    let file = std::fs::File::create(&args.log_file)?;
    let (nb_writer, guard) = tracing_appender::non_blocking(file);

    if LOG_GUARD.set(guard).is_err() {
        tracing::warn!("LOG_GUARD was already set. This may indicate a problem in initialization.");
    }

    let filter_str = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let subscriber = Registry::default().with(EnvFilter::new(filter_str)).with(
        fmt::layer()
            .with_writer(nb_writer)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_thread_names(true)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)?;
    tracing::info!("Logging system initialized.");

    Ok(())
}

/// Session configuration from command line arguments
pub fn create_session_config(args: &Args) -> SessionConfig {
    let discovered = ProfileDirs::discover();
    let profile_dirs = ProfileDirs::new(
        args.system_profile_dir.clone().or(discovered.system),
        args.profile_dir.clone().or(discovered.user),
    );
    debug!(?profile_dirs, "profile directories resolved");

    let location = args
        .location
        .clone()
        .or_else(|| std::env::current_dir().ok());

    let mut config = SessionConfig::builder()
        .host_name(args.host_name.clone())
        .profile_dirs(profile_dirs)
        .load_profiles(!args.no_profile)
        .shutdown_timeout(Duration::from_secs(args.shutdown_timeout))
        .build();
    config.module_path.clone_from(&args.module_path);
    config.location = location;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_the_session() {
        let args = Args::parse_from([
            "poshconsole",
            "--no-profile",
            "--host-name",
            "Shell",
            "--profile-dir",
            "/tmp/profiles",
            "--location",
            "/tmp",
            "-vv",
        ]);
        assert_eq!(args.verbose, 2);

        let config = create_session_config(&args);
        assert!(!config.load_profiles);
        assert_eq!(config.host_name, "Shell");
        assert_eq!(config.profile_dirs.user, Some(PathBuf::from("/tmp/profiles")));
        assert_eq!(config.location, Some(PathBuf::from("/tmp")));
        assert_eq!(config.module_path, None);
    }

    #[test]
    fn command_flag_is_optional() {
        let args = Args::parse_from(["poshconsole", "-c", "'hi'"]);
        assert_eq!(args.command.as_deref(), Some("'hi'"));
        assert!(!args.no_profile);
        assert_eq!(args.shutdown_timeout, 5);
    }
}
