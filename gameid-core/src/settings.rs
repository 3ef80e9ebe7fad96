//! Shared settings file.
//!
//! Every reader looks in `~/.config/gameid/settings.toml` and pulls out the
//! table it owns (the container decoder reads `[chd]`, for example). A
//! missing file or table is not an error: callers fall back to defaults.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

/// Canonical path to the shared settings file: `~/.config/gameid/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("gameid").join("settings.toml")
}

/// Load the `[section]` table from the shared settings file.
pub fn load_section<T: DeserializeOwned>(section: &str) -> Option<T> {
    load_section_from(&settings_path(), section)
}

/// Load the `[section]` table from an explicit settings file.
///
/// Returns `None` if the file is missing, is not valid TOML, lacks the
/// table, or the table does not deserialize into `T`.
pub fn load_section_from<T: DeserializeOwned>(path: &Path, section: &str) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    let doc: toml::Value = match contents.parse() {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
            return None;
        }
    };
    let table = doc.get(section)?.clone();
    match table.try_into() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!(
                "Ignoring invalid [{}] table in {}: {}",
                section,
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
