use std::sync::Arc;

use monti_core::config::MontiConfig;
use monti_core::logging::{log_welcome, setup_logging, LoggingConfig};
use monti_core::persistence::NullSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging(LoggingConfig::default().with_file_info())?;
    log_welcome("monti-core", env!("CARGO_PKG_VERSION"));

    let config = MontiConfig::default();
    // No external persistence sink is wired up by default; a deployment
    // that needs durable call records swaps this for a real
    // `PersistenceSink` implementation before calling `server::run`.
    let persistence = Arc::new(NullSink);

    monti_core::run(config, persistence).await?;
    Ok(())
}
