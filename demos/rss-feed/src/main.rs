//! Article feed CLI.
//!
//! Type how many articles you want next; the feed prints that many.
//!
//! ```bash
//! printf '3\n2\n2\n' | cargo run -p rss-feed
//! ```

use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,rss_feed=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!(articles = rss_feed::ARTICLES.len(), "Feed open");

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    rss_feed::run(rss_feed::ARTICLES, stdin, stdout)?;

    Ok(())
}
