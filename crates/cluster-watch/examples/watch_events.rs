use std::sync::Arc;

use clap::Parser;
use cluster_watch::observability::init_observability;
use cluster_watch::prelude::*;
use futures::StreamExt as _;

/// Prints watch events from the cluster named by `CLUSTER_WATCH_*`.
#[derive(Parser, Debug)]
struct Args {
    /// Resource collection path, e.g. /api/v1/namespaces/default/pods
    path: String,
    /// Extra query pairs as key=value (repeatable).
    #[arg(short, long = "query", value_parser = parse_pair)]
    query: Vec<(String, String)>,
    /// Fail sessions whose lines grow beyond this many bytes.
    #[arg(long)]
    max_line_bytes: Option<usize>,
    /// Report a server-side close as an error instead of a clean end.
    #[arg(long)]
    report_server_close: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), WatchError> {
    let _ = dotenvy::dotenv();
    init_observability();
    let args = Args::parse();

    let watch = Watch::new(Arc::new(StaticClusterConfig::from_env()?));
    let mut builder = watch
        .request(args.path)
        .report_server_close(args.report_server_close);
    for (key, value) in args.query {
        builder = builder.query(key, value);
    }
    if let Some(limit) = args.max_line_bytes {
        builder = builder.max_line_bytes(limit);
    }

    let mut stream = builder.start_stream()?;
    let abort = stream.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    while let Some(event) = stream.next().await {
        println!("{:<9} {}", event.event_type, event.object);
    }
    match stream.finish().await {
        Ok(()) | Err(WatchError::Aborted) => Ok(()),
        Err(err) => Err(err),
    }
}
