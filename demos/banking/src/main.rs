//! Banking teller CLI.
//!
//! Reads instructions from stdin, one per line:
//!
//! ```text
//! balance <account>
//! transfer <from> <to> <amount>
//! create <account>
//! exit
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to follow each command.

use banking::{Config, Teller, open_bank, serve};
use demandbus_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,banking=info,demandbus_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    let metrics = if config.metrics_enabled {
        let mut server = MetricsServer::new(config.metrics_addr);
        server.start()?;
        Some(server)
    } else {
        None
    };

    let bus = open_bank(&config)?;
    let teller = Teller::new(Arc::new(bus));

    serve(&teller, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        tracing::info!("Final metrics:\n{text}");
    }
    tracing::info!("Teller closed");

    Ok(())
}
