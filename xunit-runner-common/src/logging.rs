use anyhow::{anyhow, Result};

/// Install the global `tracing` subscriber.
///
/// Returns an error instead of panicking when a subscriber is already set.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))
}
