//! Process-wide `tracing` setup for binaries built on the client.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "chat-stream.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Logging settings read from `CHAT_*` variables.
#[derive(Debug, Default, PartialEq)]
struct LogSettings {
    enabled: bool,
    level: Option<String>,
    json_path: Option<PathBuf>,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            enabled: lookup("CHAT_OBSERVABILITY_ENABLED")
                .and_then(|v| parse_bool_env(&v))
                .unwrap_or(true),
            level: lookup("CHAT_LOG_LEVEL").filter(|v| !v.trim().is_empty()),
            json_path: lookup("CHAT_JSON_LOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(filter) = self
            .level
            .as_deref()
            .and_then(|level| tracing_subscriber::EnvFilter::try_new(level).ok())
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Splits a log path into the directory and file name the appender wants.
fn log_file_target(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `CHAT_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `CHAT_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `CHAT_JSON_LOG_PATH`: optional log file path. If set, each event is one
///   JSON line in that file. Otherwise events go to stderr so stdout stays
///   free for answer text.
/// - `RUST_LOG`: used when `CHAT_LOG_LEVEL` is unset or invalid.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        match settings.json_path.as_deref() {
            Some(path) => {
                let (dir, file_name) = log_file_target(path);
                let _ = std::fs::create_dir_all(dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn settings_default_to_enabled_console_logging() {
        let s = settings(&[("CHAT_OBSERVABILITY_ENABLED", "maybe"), ("CHAT_LOG_LEVEL", " ")]);
        assert!(s.enabled);
        assert_eq!(s.level, None);
        assert_eq!(s.json_path, None);
        assert!(!settings(&[("CHAT_OBSERVABILITY_ENABLED", "off")]).enabled);
    }

    #[test]
    fn bare_file_name_logs_to_current_directory() {
        assert_eq!(
            log_file_target(Path::new("chat.jsonl")),
            (Path::new("."), "chat.jsonl")
        );
        assert_eq!(
            log_file_target(Path::new("logs/run/chat.jsonl")),
            (Path::new("logs/run"), "chat.jsonl")
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
