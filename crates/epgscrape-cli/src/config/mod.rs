//! Application configuration module.
//!
//! Resolves pipeline settings from built-in defaults, an optional TOML
//! file and environment variables, in that order.

#[allow(clippy::module_inception)]
mod config;
mod paths;

#[allow(clippy::module_name_repetitions)]
pub use config::AppConfig;
pub use paths::resolve_config_path;
