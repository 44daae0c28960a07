#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{Level as TraceLevel, debug, warn};
use tracing_subscriber::FmtSubscriber;

use lsfg_profiles::config::{Overrides, Paths};
use lsfg_profiles::constants::env;
use lsfg_profiles::ipc::{self, Client, Request, Response, Server};
use lsfg_profiles::script::ScriptStatus;
use lsfg_profiles::ConfigService;

/// Manage lsfg-vk profiles and the launch script
#[derive(Parser, Debug)]
#[command(name = "lsfg-profiles", version, about)]
struct Cli {
    /// Profile document (default: ~/.config/lsfg-vk/profiles.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Launch script (default: ~/lsfg)
    #[arg(long, global = true)]
    script: Option<PathBuf>,

    /// IPC socket used by `serve` and `--remote`
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Send the request to a running `serve` instance
    #[arg(long, global = true)]
    remote: bool,

    /// trace, debug, info, warn or error (overrides LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the values of a profile
    Get {
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Change fields, e.g. `set multiplier=3 hdr_mode=true`
    Set {
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, Value)>,
    },
    /// Create or overwrite profiles from an exported TOML bundle
    Import { file: PathBuf },
    /// Write every profile as a TOML bundle (stdout when no file is given)
    Export { file: Option<PathBuf> },
    /// List profile names and the active profile
    List,
    /// Create a profile copied from another (the active one by default)
    Create {
        name: String,
        #[arg(long)]
        from: Option<String>,
    },
    Rename { name: String, new_name: String },
    Delete { name: String },
    /// Make a profile active and rewrite the launch script
    Activate { name: String },
    /// Rewrite the launch script from the active profile
    Regenerate,
    /// Compare the launch script with the active profile
    Status,
    /// Print the field schema
    Schema,
    /// Answer requests on the IPC socket until stopped
    Serve,
}

/// `field=value`; the value is read as JSON and falls back to a plain string
fn parse_assignment(arg: &str) -> Result<(String, Value), String> {
    let (field, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{arg}'"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field.trim().to_string(), value))
}

fn init_logging(flag: Option<&str>) -> Result<()> {
    let level = flag
        .map(str::to_string)
        .or_else(|| std::env::var(env::LOG_LEVEL).ok())
        .unwrap_or_else(|| "info".to_string())
        .to_lowercase();
    let log_level = match level.as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    // stdout carries the JSON responses
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")
}

/// The IPC request equivalent of a command, if it has one
fn to_request(command: &Command) -> Option<Request> {
    let request = match command {
        Command::Get { profile } => Request::GetConfiguration {
            profile: profile.clone(),
        },
        Command::Set {
            profile,
            assignments,
        } => match assignments.as_slice() {
            [(field, value)] => Request::UpdateField {
                profile: profile.clone(),
                field: field.clone(),
                value: value.clone(),
            },
            many => Request::UpdateFields {
                profile: profile.clone(),
                values: many.iter().cloned().collect::<Map<String, Value>>(),
            },
        },
        Command::List => Request::ListProfiles,
        Command::Create { name, from } => Request::CreateProfile {
            name: name.clone(),
            source: from.clone(),
        },
        Command::Rename { name, new_name } => Request::RenameProfile {
            name: name.clone(),
            new_name: new_name.clone(),
        },
        Command::Delete { name } => Request::DeleteProfile { name: name.clone() },
        Command::Activate { name } => Request::SetActiveProfile { name: name.clone() },
        Command::Regenerate => Request::RegenerateScript,
        Command::Status => Request::ScriptStatus,
        Command::Schema => Request::DescribeSchema,
        Command::Import { .. } | Command::Export { .. } | Command::Serve => return None,
    };
    Some(request)
}

fn import(service: &ConfigService, file: &Path) -> Result<Response> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read bundle from {}", file.display()))?;
    Ok(match service.import_profiles(&text) {
        Ok((imported, script)) => Response {
            message: Some(format!(
                "imported {} new and {} updated profile(s)",
                imported.created.len(),
                imported.updated.len()
            )),
            profiles: Some(imported.created.into_iter().chain(imported.updated).collect()),
            active_profile: Some(imported.active),
            script: Some(script),
            ..Response::ok()
        },
        Err(e) => Response::from(&e),
    })
}

fn export(service: &ConfigService, file: Option<&Path>) -> Result<Option<Response>> {
    let bundle = match service.export_profiles() {
        Ok(bundle) => bundle,
        Err(e) => return Ok(Some(Response::from(&e))),
    };
    match file {
        Some(path) => {
            fs::write(path, bundle)
                .with_context(|| format!("Failed to write bundle to {}", path.display()))?;
            Ok(Some(
                Response::ok().with_message(format!("exported profiles to {}", path.display())),
            ))
        }
        None => {
            print!("{bundle}");
            Ok(None)
        }
    }
}

fn serve(service: &ConfigService, paths: &Paths) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("Failed to register signal handler")?;
    }

    match service.script_status() {
        Ok((profile, ScriptStatus::Stale)) => {
            warn!(profile = %profile, "launch script does not match the active profile")
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not check launch script"),
    }

    let server = Server::bind_to(paths.socket.clone())?;
    ipc::serve(service, &server, &shutdown)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let paths = Paths::resolve(Overrides {
        config: cli.config.clone(),
        script: cli.script.clone(),
        socket: cli.socket.clone(),
    })?;
    debug!(config = %paths.config.display(), script = %paths.script.display(), "resolved paths");
    let service = ConfigService::from_paths(&paths);

    let response = match (&cli.command, to_request(&cli.command)) {
        (Command::Serve, _) => {
            if cli.remote {
                bail!("`serve` cannot be combined with --remote");
            }
            serve(&service, &paths)?;
            return Ok(ExitCode::SUCCESS);
        }
        (Command::Import { file }, _) if !cli.remote => import(&service, file)?,
        (Command::Export { file }, _) if !cli.remote => match export(&service, file.as_deref())? {
            Some(response) => response,
            None => return Ok(ExitCode::SUCCESS),
        },
        (_, Some(request)) if cli.remote => Client::connect_to(&paths.socket)?.request(&request)?,
        (_, Some(request)) => service.handle(request),
        (_, None) => bail!("this command only works on local files, drop --remote"),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?
    );
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn assignment_values_are_json_or_string() {
        assert_eq!(
            parse_assignment("multiplier=3").unwrap(),
            ("multiplier".to_string(), json!(3))
        );
        assert_eq!(
            parse_assignment("experimental_present_mode=mailbox").unwrap(),
            ("experimental_present_mode".to_string(), json!("mailbox"))
        );
        assert_eq!(
            parse_assignment("dll=").unwrap(),
            ("dll".to_string(), json!(""))
        );
        assert!(parse_assignment("multiplier").is_err());
    }

    #[test]
    fn set_with_many_fields_is_bulk() {
        let cli = Cli::parse_from(["lsfg-profiles", "set", "multiplier=3", "hdr_mode=true"]);
        match to_request(&cli.command) {
            Some(Request::UpdateFields { values, .. }) => {
                assert_eq!(values["multiplier"], json!(3));
                assert_eq!(values["hdr_mode"], json!(true));
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let cli = Cli::parse_from(["lsfg-profiles", "--remote", "set", "-p", "fast", "multiplier=2"]);
        assert!(cli.remote);
        assert!(matches!(
            to_request(&cli.command),
            Some(Request::UpdateField { profile: Some(_), .. })
        ));
    }
}
