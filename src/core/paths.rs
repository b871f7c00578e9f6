//! Shared path utilities and default file locations.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Home directory, with a loud `/tmp` fallback when `HOME` is unset.
#[must_use]
pub fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[DSW-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

/// Default config file location: `~/.config/docksweep/config.toml`.
#[must_use]
pub fn default_config_file() -> PathBuf {
    home_dir()
        .join(".config")
        .join("docksweep")
        .join("config.toml")
}

/// Default data directory: `~/.local/share/docksweep`.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("docksweep")
}

/// Resolve a path to an absolute, normalized form.
///
/// Existing paths go through `fs::canonicalize`, which also resolves
/// symlinks. Paths that do not exist yet (a fresh backup or report
/// directory, a config file about to be written) are anchored to the
/// current directory with `.`/`..` components collapsed syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Canonicalize when the path exists.
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
