//! XDG Base Directory utilities for module storage.

use std::path::PathBuf;

/// Directory segment used under every XDG base directory.
pub const APP_DIR: &str = "cucumber-host";

/// Get XDG data home directory
///
/// Returns `$XDG_DATA_HOME` if set, otherwise defaults to `$HOME/.local/share`
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        if !xdg_data_home.is_empty() {
            return Some(PathBuf::from(xdg_data_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Some(PathBuf::from(xdg_config_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// Default module root: `$XDG_DATA_HOME/cucumber-host/modules`.
///
/// Falls back to `appModules` under the working directory when no home
/// directory can be determined.
pub fn default_module_root() -> PathBuf {
    match data_home() {
        Some(data_home) => data_home.join(APP_DIR).join("modules"),
        None => PathBuf::from("appModules"),
    }
}

/// Global configuration file path, if a config home exists.
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|home| home.join(APP_DIR).join("config.toml"))
}
