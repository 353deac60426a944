use std::path::PathBuf;

use tracing::{debug, trace};

use super::profile::{ProfileDirs, exe_dir};

/// A module found on the module path: `<dir>/<Name>/<Name>.psm1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub path: PathBuf,
}

/// `PSModulePath` when set, otherwise the `Modules` folder under the user
/// dir, the system dir and the executable's dir, in that order.
pub fn default_module_path(dirs: &ProfileDirs) -> Vec<PathBuf> {
    if let Some(value) = std::env::var_os("PSModulePath") {
        return dedup(std::env::split_paths(&value).collect());
    }

    let candidates = [dirs.user.clone(), dirs.system.clone(), exe_dir()]
        .into_iter()
        .flatten()
        .map(|dir| dir.join("Modules"))
        .collect();
    dedup(candidates)
}

fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.as_os_str().is_empty() && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// Scans the module path. A name found in an earlier directory shadows later ones.
pub fn discover_modules(module_path: &[PathBuf]) -> Vec<ModuleInfo> {
    let mut modules: Vec<ModuleInfo> = Vec::new();
    for dir in module_path {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                trace!(dir = %dir.display(), %error, "module directory not readable");
                continue;
            }
        };

        let mut found: Vec<ModuleInfo> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let manifest = entry.path().join(format!("{name}.psm1"));
                manifest.is_file().then_some(ModuleInfo {
                    name,
                    path: manifest,
                })
            })
            .collect();
        found.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        for module in found {
            if modules
                .iter()
                .any(|m| m.name.eq_ignore_ascii_case(&module.name))
            {
                debug!(name = %module.name, "module shadowed by earlier path entry");
                continue;
            }
            modules.push(module);
        }
    }
    modules
}
