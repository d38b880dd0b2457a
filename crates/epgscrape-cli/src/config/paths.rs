//! Config file location.

use std::path::PathBuf;

/// Resolves the config file path.
///
/// - If `explicit` is `Some`, returns it unchanged.
/// - Otherwise returns `~/.config/epgscrape/config.toml`, or `None` when
///   `HOME` is not set (typical for service containers).
#[must_use]
pub fn resolve_config_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.clone());
    }

    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("epgscrape")
            .join("config.toml")
    })
}
