//! File locations
//!
//! Each path is taken from the command line, then the environment, then
//! the platform directories reported by `dirs`.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::constants::{config, env as vars};

/// Explicit locations given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Profile document
    pub config: PathBuf,
    /// Launch script for the active profile
    pub script: PathBuf,
    /// IPC socket
    pub socket: PathBuf,
}

impl Paths {
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| env::var_os(key))
    }

    fn resolve_with(overrides: Overrides, var: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let from_env = |key: &str| var(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let config = match overrides.config.or_else(|| from_env(vars::CONFIG_PATH)) {
            Some(path) => path,
            None => dirs::config_dir()
                .context("Failed to determine config directory")?
                .join(config::APP_DIR)
                .join(config::FILENAME),
        };

        let script = match overrides.script.or_else(|| from_env(vars::SCRIPT_PATH)) {
            Some(path) => path,
            None => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(config::SCRIPT_NAME),
        };

        let socket = match overrides.socket.or_else(|| from_env(vars::SOCKET_PATH)) {
            Some(path) => path,
            None => match from_env(vars::XDG_RUNTIME_DIR) {
                Some(runtime) => runtime.join(config::APP_DIR).join(config::SOCKET_NAME),
                None => dirs::cache_dir()
                    .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?
                    .join(config::APP_DIR)
                    .join(config::SOCKET_NAME),
            },
        };

        Ok(Self {
            config,
            script,
            socket,
        })
    }
}
