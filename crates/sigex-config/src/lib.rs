//! Layered config loading (deep-merge + canonicalize + hash) and the typed
//! `SignalConfig` the rest of the workspace consumes.

mod loader;
mod signal_config;

pub use loader::{load_layered_yaml, LoadedConfig};
pub use signal_config::{ConfigError, SignalConfig};
