use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::parse_bool_env;
use crate::request::PreparedRequest;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_JSON_LOG_FILE: &str = "cluster-watch.logs.jsonl";

/// Span covering one watch session task.
///
/// Events logged by the session inherit its identity fields; the JSON sink
/// records them under `span` and `spans`.
pub(crate) fn session_span(request: &PreparedRequest) -> tracing::Span {
    tracing::info_span!(
        "watch_session",
        session_id = %request.session_id,
        cluster = %request.cluster.name,
        scheme = ?request.scheme,
        path = request.url.path(),
    )
}

fn observability_enabled() -> bool {
    match std::env::var("CLUSTER_WATCH_OBSERVABILITY") {
        Ok(value) => parse_bool_env(&value).unwrap_or(true),
        Err(_) => true,
    }
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("CLUSTER_WATCH_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Installs a global tracing subscriber once per process.
///
/// Libraries embedding the watch client usually install their own subscriber
/// and never call this.
///
/// Environment variables:
/// - `CLUSTER_WATCH_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `CLUSTER_WATCH_LOG_LEVEL`: optional filter (`info`, `cluster_watch=debug`, ...).
/// - `CLUSTER_WATCH_JSON_LOG_PATH`: optional file path. If set, logs are JSONL
///   in that file; otherwise a compact console format goes to stderr.
/// - `RUST_LOG`: fallback filter.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        if let Ok(path_raw) = std::env::var("CLUSTER_WATCH_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_JSON_LOG_FILE);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
