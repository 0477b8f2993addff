//! unitdb-adapter - recover and apply pending message writes

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unitdb_adapter::{Adapter, AdapterConfig};

#[derive(Parser, Debug)]
#[command(name = "unitdb-adapter")]
#[command(about = "Replay the unitdb message log and apply pending writes")]
struct Args {
    /// Directory holding the message log (overrides UNITDB_DIR)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Target size in bytes: engine capacity, log segment target (overrides UNITDB_SIZE)
    #[arg(long)]
    size: Option<u64>,

    /// Epoch window in milliseconds (overrides UNITDB_EPOCH_MS)
    #[arg(long)]
    epoch_ms: Option<u64>,

    /// Block id recovered messages are applied under
    #[arg(long, env = "UNITDB_BLOCK_ID", default_value = "0")]
    block_id: u64,

    /// Discard pending log contents instead of replaying them
    #[arg(long)]
    reset: bool,

    /// Disable fsync on log commits (overrides UNITDB_FSYNC)
    #[arg(long)]
    no_fsync: bool,

    /// Log level
    #[arg(long, env = "UNITDB_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting unitdb-adapter v{}", env!("CARGO_PKG_VERSION"));

    // Environment first, then CLI overrides
    let mut config = AdapterConfig::from_env();
    if let Some(dir) = args.dir {
        config.dir = dir;
    }
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(epoch_ms) = args.epoch_ms {
        config.epoch_window = Duration::from_millis(epoch_ms);
    }
    if args.no_fsync {
        config.fsync_enabled = false;
    }

    let adapter = Adapter::new();
    adapter.open(config)?;

    let result = async {
        let pending = adapter.recovery(args.reset).await?;
        tracing::info!(pending = pending.len(), "recovered pending writes");
        adapter.apply_pending(args.block_id, &pending).await?;
        anyhow::Ok(())
    }
    .await;

    adapter.close().await?;
    result
}
