//! dpfd - DPF regeneration monitor daemon
//!
//! Usage: `dpfd [config.toml]`

use dpfd::{init_logging, run, DaemonConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== dpfd v{} ===", env!("CARGO_PKG_VERSION"));

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    info!("Loading config from {}", path.display());
    let config = DaemonConfig::load(&path)?;

    run(config).await
}
