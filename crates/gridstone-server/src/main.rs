use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use gridstone_server::ServerEngine;

/// Gridstone voxel world server.
#[derive(Parser, Debug)]
#[command(name = "gridstone-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:7777")]
    bind: SocketAddr,

    /// Directory for JSON log output.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Tracing filter (overridden by RUST_LOG).
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    gridstone_log::init_logging(args.log_dir.as_deref(), args.log_filter.as_deref());

    let engine = ServerEngine::new();
    let result = gridstone_server::serve_on(engine.clone(), args.bind).await;
    engine.shutdown();
    result
}
