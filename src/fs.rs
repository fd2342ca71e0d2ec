use anyhow::Context;
use std::path::{Path, PathBuf};

/// Platform config directory, e.g. `~/.config/adaswap/` on Linux.
fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "adaswap")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    config_dir()
        .map(|dir| dir.join("config.toml"))
        .context("could not determine the configuration directory")
}

/// Platform data directory, where the session database lives, e.g.
/// `~/.local/share/adaswap/` on Linux.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "adaswap")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn ensure_directory_exists(file: &Path) -> Result<(), std::io::Error> {
    match file.parent() {
        Some(parent) if !parent.exists() => {
            tracing::info!("creating directory {}", parent.display());
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
