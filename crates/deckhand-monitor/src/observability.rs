//! Process-wide logging setup.

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLE_KEYS: [&str; 2] = ["DECKHAND_OBSERVABILITY_ENABLED", "DECKHAND_OBSERVABILITY"];
const LEVEL_KEY: &str = "DECKHAND_LOG_LEVEL";
const JSON_PATH_KEY: &str = "DECKHAND_JSON_LOG_PATH";
const DEFAULT_JSON_FILE: &str = "deckhand-monitor.logs.jsonl";

fn flag_from(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn logging_enabled() -> bool {
    for key in ENABLE_KEYS {
        if let Ok(value) = std::env::var(key) {
            return flag_from(&value).unwrap_or(true);
        }
    }
    true
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var(LEVEL_KEY)
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initializes logging once per process.
///
/// Environment variables:
/// - `DECKHAND_OBSERVABILITY_ENABLED` / `DECKHAND_OBSERVABILITY`: enable or
///   disable logging entirely (default enabled).
/// - `DECKHAND_LOG_LEVEL`: level or filter override (`info`, `debug`, ...).
/// - `DECKHAND_JSON_LOG_PATH`: when set, logs are written as JSONL to that
///   file. Otherwise a compact console format goes to stderr, keeping
///   stdout free for the monitored output itself.
/// - `RUST_LOG`: standard filter override.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !logging_enabled() {
            return;
        }
        let filter = env_filter();
        match std::env::var(JSON_PATH_KEY) {
            Ok(raw_path) => init_json_file(filter, raw_path),
            Err(_) => init_console(filter),
        }
    });
}

fn init_json_file(filter: tracing_subscriber::EnvFilter, raw_path: String) {
    let path = std::path::PathBuf::from(raw_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(parent);
    }
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE);
    let writer = tracing_appender::rolling::never(dir, file_name);
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(false)
        .with_writer(writer);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

fn init_console(filter: tracing_subscriber::EnvFilter) {
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
