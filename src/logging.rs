//! Logging
//!
//! Installs the global `tracing` subscriber for the host process. The
//! library itself only emits events; embedding applications call
//! [`init_logging`] once at startup, or let [`ModuleHost::from_environment`]
//! do it.
//!
//! [`ModuleHost::from_environment`]: crate::manager::ModuleHost::from_environment

use crate::error::HostError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const ENV_FILTER: &str = "CUCUMBER_LOG";
const ENV_FORMAT: &str = "CUCUMBER_LOG_FORMAT";
const ENV_OUTPUT: &str = "CUCUMBER_LOG_OUTPUT";
const ENV_MODULES: &str = "CUCUMBER_LOG_MODULES";
const ENV_FILE: &str = "CUCUMBER_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(HostError::Config(format!(
                "Invalid log format: {} (expected text or json)",
                other
            ))),
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
    File,
    #[serde(rename = "file+stderr")]
    FileAndStderr,
    /// stdout and stderr
    Both,
}

impl LogOutput {
    fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::FileAndStderr)
    }
}

impl FromStr for LogOutput {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            "file+stderr" => Ok(LogOutput::FileAndStderr),
            "both" => Ok(LogOutput::Both),
            other => Err(HostError::Config(format!(
                "Invalid log output: {} (expected stdout, stderr, file, file+stderr or both)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base level directive: trace, debug, info, warn, error or off.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file when `output` writes one; platform state directory otherwise.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// ANSI colors for text output to a terminal stream.
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-target levels, e.g. `cucumber_host::replica = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: None,
            color: true,
            modules: HashMap::new(),
        }
    }
}

/// Install the global subscriber.
///
/// Environment variables override the configuration: `CUCUMBER_LOG` replaces
/// the whole filter, `CUCUMBER_LOG_MODULES` (`target=level,...`) adds
/// directives, `CUCUMBER_LOG_FORMAT` and `CUCUMBER_LOG_OUTPUT` replace the
/// configured format and destination.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), HostError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);
    let installed = |e: tracing_subscriber::util::TryInitError| {
        HostError::Config(format!("Failed to install subscriber: {}", e))
    };

    if !config.enabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .try_init()
            .map_err(installed);
    }

    let filter = build_filter(config)?;
    let format = env_override(ENV_FORMAT)?.unwrap_or(config.format);
    let output = env_override(ENV_OUTPUT)?.unwrap_or(config.output);
    let color = config.color && !output.writes_file();
    let writer = make_writer(output, config)?;

    let registry = Registry::default().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(color)
                    .with_writer(writer),
            )
            .try_init(),
    }
    .map_err(installed)
}

fn env_override<T: FromStr<Err = HostError>>(name: &str) -> Result<Option<T>, HostError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse().map(Some),
        _ => Ok(None),
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, HostError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let from_env = std::env::var(ENV_MODULES).unwrap_or_default();
    let extra = from_env
        .split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(target, level)| (target.trim().to_string(), level.trim().to_string()));

    let mut filter = EnvFilter::new(&config.level);
    for (target, level) in config
        .modules
        .iter()
        .map(|(t, l)| (t.clone(), l.clone()))
        .chain(extra)
    {
        let directive = format!("{}={}", target, level)
            .parse()
            .map_err(|e| HostError::Config(format!("Invalid log directive {}={}: {}", target, level, e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn make_writer(output: LogOutput, config: &LoggingConfig) -> Result<BoxMakeWriter, HostError> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File => BoxMakeWriter::new(open_log_file(config)?),
        LogOutput::FileAndStderr => {
            BoxMakeWriter::new(open_log_file(config)?.and(std::io::stderr))
        }
    })
}

fn open_log_file(config: &LoggingConfig) -> Result<std::sync::Mutex<std::fs::File>, HostError> {
    let path = resolve_log_file_path(None, config.file.clone())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            HostError::Config(format!("Failed to create log directory {}: {}", parent.display(), e))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| HostError::Config(format!("Failed to open log file {}: {}", path.display(), e)))?;
    Ok(std::sync::Mutex::new(file))
}

/// Log file location: `explicit`, then `CUCUMBER_LOG_FILE`, then
/// `configured`, then `cucumber-host.log` in the platform state directory.
pub fn resolve_log_file_path(
    explicit: Option<PathBuf>,
    configured: Option<PathBuf>,
) -> Result<PathBuf, HostError> {
    let from_env = std::env::var_os(ENV_FILE).map(PathBuf::from);
    if let Some(path) = [explicit, from_env, configured]
        .into_iter()
        .flatten()
        .find(|p| !p.as_os_str().is_empty())
    {
        return Ok(path);
    }

    let dirs = directories::ProjectDirs::from("", "wenxig", "cucumber-host").ok_or_else(|| {
        HostError::Config("Could not determine a state directory for the log file".to_string())
    })?;
    let dir = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
    Ok(dir.join("cucumber-host.log"))
}
