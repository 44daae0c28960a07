//! Launch script generation
//!
//! The script wraps a game command: it exports the active profile's
//! settings as environment variables and then `exec`s its arguments.
//!
//! ```sh
//! #!/bin/sh
//! export ENABLE_LSFG=1
//! export LSFG_MULTIPLIER=2
//! # export LSFG_HDR=1
//! export LSFG_PROCESS=decky-lsfg-vk
//! exec "$@"
//! ```

use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::schema::{self, Export};
use crate::config::values::{ConfigurationValues, FieldValue};
use crate::constants::config::SCRIPT_MODE;
use crate::constants::script::{EXEC_LINE, PROCESS_VAR, SHEBANG};
use crate::error::{Error, Result};
use crate::persistence::AtomicWriter;

const BANNER: &str = "# generated by lsfg-profiles, local edits are overwritten";

/// How the script on disk relates to the stored active profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    InSync,
    Stale,
    Missing,
}

/// Render the script for `profile`.
///
/// Fields appear in schema order; disabled exports stay in the file as
/// comments so toggling a flag changes exactly one line.
pub fn render(profile: &str, values: &ConfigurationValues) -> String {
    let mut lines = vec![SHEBANG.to_string(), BANNER.to_string()];

    for field in schema::fields() {
        let value = values.get(field.id);
        let line = match (field.export, value) {
            (Export::ConfigOnly, _) => continue,
            (Export::Flag { var, value: on }, FieldValue::Bool(enabled)) => {
                export_line(*enabled, var, on)
            }
            (Export::Always { var }, value) => export_line(true, var, &shell_value(value)),
            (Export::NonEmpty { var }, FieldValue::Str(s)) => {
                export_line(!s.is_empty(), var, &quote(s))
            }
            (Export::Positive { var }, FieldValue::Int(i)) => {
                export_line(*i > 0, var, &i.to_string())
            }
            // Kinds are checked when values are stored
            (export, value) => {
                debug!(field = field.name(), ?export, %value, "export rule does not match value kind");
                continue;
            }
        };
        lines.push(line);
    }

    lines.push(format!("export {PROCESS_VAR}={}", quote(profile)));
    lines.push(EXEC_LINE.to_string());

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

fn export_line(enabled: bool, var: &str, value: &str) -> String {
    if enabled {
        format!("export {var}={value}")
    } else {
        format!("# export {var}={value}")
    }
}

fn shell_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) => format!("{f:?}"),
        FieldValue::Str(s) => quote(s),
    }
}

fn quote(raw: &str) -> String {
    let cleaned = raw.replace('\0', "");
    shlex::try_quote(&cleaned)
        .map(Cow::into_owned)
        .unwrap_or(cleaned)
}

/// Active `export VAR=value` lines of a script, with shell quoting removed
pub fn parse_exports(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("export "))
        .filter_map(|assignment| {
            let (var, raw) = assignment.split_once('=')?;
            let value = shlex::split(raw)
                .and_then(|words| words.into_iter().next())
                .unwrap_or_default();
            Some((var.trim().to_string(), value))
        })
        .collect()
}

/// Profile named by the script's `LSFG_PROCESS` export
pub fn parse_profile(text: &str) -> Option<String> {
    parse_exports(text)
        .into_iter()
        .find(|(var, _)| var == PROCESS_VAR)
        .map(|(_, value)| value)
}

/// The executable script file for the active profile
#[derive(Debug, Clone)]
pub struct LaunchScript {
    path: PathBuf,
    writer: AtomicWriter,
}

impl LaunchScript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: AtomicWriter::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_writer(path: impl Into<PathBuf>, writer: AtomicWriter) -> Self {
        Self {
            path: path.into(),
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replace the script; mode is set before it becomes visible
    pub fn write(&self, profile: &str, values: &ConfigurationValues) -> Result<()> {
        let text = render(profile, values);
        self.writer.write(&self.path, text.as_bytes(), SCRIPT_MODE)?;
        info!(profile = %profile, path = %self.path.display(), "launch script regenerated");
        Ok(())
    }

    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io("read", &self.path, e)),
        }
    }

    /// Compare the script on disk against a fresh render
    pub fn status(&self, profile: &str, values: &ConfigurationValues) -> Result<ScriptStatus> {
        Ok(match self.read()? {
            None => ScriptStatus::Missing,
            Some(text) if text == render(profile, values) => ScriptStatus::InSync,
            Some(_) => ScriptStatus::Stale,
        })
    }
}
