use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_VAR: &str = "RESEARCH_STREAM_OBSERVABILITY";
const LEVEL_VAR: &str = "RESEARCH_STREAM_LOG_LEVEL";
const JSON_PATH_VAR: &str = "RESEARCH_STREAM_JSON_LOG_PATH";
const DEFAULT_FILTER: &str = "info";
const DEFAULT_JSON_LOG_FILE: &str = "research-stream.logs.jsonl";

/// Where log records are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact human-readable lines on stderr. Stdout is left for reports.
    Console,
    /// One JSON object per line, appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogOutput {
    fn json_file(raw: &str) -> Self {
        let path = Path::new(raw);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_JSON_LOG_FILE)
            .to_string();
        Self::JsonFile { dir, file_name }
    }
}

/// Resolved logging setup for a process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directive string, e.g. `info` or `research_stream=debug`.
    pub filter: String,
    pub output: LogOutput,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            output: LogOutput::Console,
        }
    }
}

impl LogSettings {
    /// Reads settings from the process environment.
    ///
    /// - `RESEARCH_STREAM_OBSERVABILITY`: on/off flag, default on.
    /// - `RESEARCH_STREAM_LOG_LEVEL`: filter directive, then `RUST_LOG`, then `info`.
    /// - `RESEARCH_STREAM_JSON_LOG_PATH`: JSON-lines file instead of the console.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_VAR)
            .and_then(|value| parse_flag(&value))
            .unwrap_or(true);
        let filter = [LEVEL_VAR, "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let output = match lookup(JSON_PATH_VAR) {
            Some(raw) if !raw.trim().is_empty() => LogOutput::json_file(raw.trim()),
            _ => LogOutput::Console,
        };
        Self {
            enabled,
            filter,
            output,
        }
    }

    /// Overrides the filter directive, e.g. from a command-line flag.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs the global tracing subscriber from the environment.
///
/// See `LogSettings::from_env` for the variables read.
pub fn init_observability() {
    init_observability_with(LogSettings::from_env());
}

/// Installs the global tracing subscriber with explicit settings.
///
/// Only the first call in a process has any effect. Returns whether this call
/// installed a subscriber.
pub fn init_observability_with(settings: LogSettings) -> bool {
    let mut installed = false;
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let env_filter = settings.env_filter();
        let registry = tracing_subscriber::registry().with(env_filter);
        installed = match &settings.output {
            LogOutput::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                registry.with(json_layer).try_init().is_ok()
            }
            LogOutput::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                registry.with(console_layer).try_init().is_ok()
            }
        };
    });
    installed
}
