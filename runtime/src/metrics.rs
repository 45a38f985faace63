//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the runtime components:
//! - Command bus publish/apply/drop
//! - Entity registration
//! - Paced stream demand and delivery
//!
//! # Example
//!
//! ```rust,no_run
//! use demandbus_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and renders the text exposition format.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address advertised for scraping (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// succeeds without a handle and `render` returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Command bus
    describe_counter!(
        "bus_commands_published_total",
        "Total number of top-level command publications"
    );
    describe_counter!(
        "bus_commands_applied_total",
        "Total number of commands applied to an entity, chained ones included"
    );
    describe_counter!(
        "bus_commands_dropped_total",
        "Total number of commands dropped for lack of a registered target"
    );
    describe_counter!(
        "bus_entities_registered_total",
        "Total number of entities registered"
    );
    describe_histogram!(
        "bus_publish_duration_seconds",
        "Time taken to apply a publication and its chain"
    );

    // Paced streams
    describe_counter!(
        "paced_demand_requested_total",
        "Total number of items requested by paced stream consumers"
    );
    describe_counter!(
        "paced_items_delivered_total",
        "Total number of items emitted by paced stream producers"
    );
}

/// Command bus metrics recorder.
pub struct BusMetrics;

impl BusMetrics {
    /// Record a finished publication.
    pub fn record_publish(applied: usize, dropped: usize, duration: Duration) {
        counter!("bus_commands_published_total").increment(1);
        counter!("bus_commands_applied_total").increment(applied as u64);
        if dropped > 0 {
            counter!("bus_commands_dropped_total").increment(dropped as u64);
        }
        histogram!("bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an entity registration.
    pub fn record_registration() {
        counter!("bus_entities_registered_total").increment(1);
    }
}

/// Paced stream metrics recorder.
pub struct PacedMetrics;

impl PacedMetrics {
    /// Record demand granted by a consumer.
    pub fn record_request(n: usize) {
        counter!("paced_demand_requested_total").increment(n as u64);
    }

    /// Record one item emitted by a producer.
    pub fn record_delivery() {
        counter!("paced_items_delivered_total").increment(1);
    }
}
