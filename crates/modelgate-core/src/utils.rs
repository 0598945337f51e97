//! Utility helpers: data directory and `~` expansion.

use std::path::PathBuf;

/// Get the Modelgate data directory (e.g. `~/.modelgate/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".modelgate")
}

/// Default credential store file (e.g. `~/.modelgate/auth.json`).
pub fn get_auth_path() -> PathBuf {
    get_data_path().join("auth.json")
}

/// Expand `~` to the home directory in a path string.
///
/// An empty path means the current directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path.is_empty() {
        return PathBuf::from(".");
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Mask a secret for logs: keep a short prefix, hide the rest.
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
