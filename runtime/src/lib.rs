//! # Demandbus Runtime
//!
//! Runtime implementation for the demandbus contracts.
//!
//! ## Core Components
//!
//! - **KeyedBus**: routes each command to the one entity registered under its
//!   key, serialising commands per entity and applying chained publications
//!   before `publish` returns
//! - **Registry**: the explicitly owned key → entity map a bus routes through
//! - **Paced streams**: the async, cross-task rendition of a demand stream
//! - **Metrics**: Prometheus exporter and metric recorders
//!
//! ## Example
//!
//! ```ignore
//! use demandbus_runtime::KeyedBus;
//!
//! let bus = KeyedBus::new(AccountHandler);
//! bus.register("A".into(), Account::new(dec!(100))).await?;
//! bus.register("B".into(), Account::new(dec!(50))).await?;
//!
//! let delivery = bus.publish(BankCommand::start_transfer("A", "B", dec!(30))).await;
//! assert_eq!(delivery.applied, 2); // debit and credit
//! ```

/// Bus configuration
pub mod config;

/// The keyed command bus
pub mod bus;

/// Entity registry
pub mod registry;

/// Demand-paced async streams
pub mod paced;

/// Prometheus metrics for observability
pub mod metrics;

pub use bus::KeyedBus;
pub use config::{BusConfig, ConfigError};
pub use paced::{DemandHandle, PacedStream, paced};
pub use registry::{EntityHandle, Registry};
