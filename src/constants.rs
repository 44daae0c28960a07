//! Application-wide constants
//!
//! File names, environment variable names and wire limits used across the
//! crate live here so there is a single source of truth for them.

/// On-disk locations of the profile document and derived artifacts
pub mod config {
    /// Directory under the user config dir (`~/.config/lsfg-vk`)
    pub const APP_DIR: &str = "lsfg-vk";

    /// Profile document file name
    pub const FILENAME: &str = "profiles.toml";

    /// Launch script file name, placed in the home directory (`~/lsfg`)
    pub const SCRIPT_NAME: &str = "lsfg";

    /// Socket file name under the runtime dir
    pub const SOCKET_NAME: &str = "profiles.sock";

    /// Current document format version
    pub const DOCUMENT_VERSION: i64 = 1;

    /// Permission bits for the profile document
    pub const DOCUMENT_MODE: u32 = 0o644;

    /// Permission bits for the launch script (must be executable)
    pub const SCRIPT_MODE: u32 = 0o755;
}

/// Profile naming
pub mod profile {
    /// Name of the protected profile that always exists
    pub const DEFAULT_PROFILE: &str = "decky-lsfg-vk";
}

/// Environment variables read by this crate
pub mod env {
    /// Override for the profile document path
    pub const CONFIG_PATH: &str = "LSFG_PROFILES_CONFIG";

    /// Override for the launch script path
    pub const SCRIPT_PATH: &str = "LSFG_PROFILES_SCRIPT";

    /// Override for the IPC socket path
    pub const SOCKET_PATH: &str = "LSFG_PROFILES_SOCKET";

    /// Log level (trace, debug, info, warn, error)
    pub const LOG_LEVEL: &str = "LOG_LEVEL";

    pub const XDG_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
}

/// Launch script layout
pub mod script {
    pub const SHEBANG: &str = "#!/bin/sh";

    /// Variable naming the profile the layer should pick up
    pub const PROCESS_VAR: &str = "LSFG_PROCESS";

    /// Final line handing control to the wrapped game command
    pub const EXEC_LINE: &str = "exec \"$@\"";
}

/// IPC framing
pub mod ipc {
    /// Maximum message size (10 MB) to prevent DoS via memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

    /// Socket permission bits (owner only)
    pub const SOCKET_MODE: u32 = 0o700;

    /// Poll interval for the accept loop while waiting for a shutdown signal
    pub const ACCEPT_POLL_MS: u64 = 100;
}
