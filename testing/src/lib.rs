//! # Demandbus Testing
//!
//! Testing utilities and helpers for demand streams and command buses.
//!
//! This crate provides:
//! - [`HandlerTest`]: Given-When-Then harness for command handlers
//! - [`RecordingSubscriber`] and [`ScriptedSubscriber`]: subscribers that
//!   record every signal they observe
//! - [`RecordingBus`]: a [`CommandBus`](demandbus_core::CommandBus) mock
//! - [`init_test_tracing`]: tracing output captured by the test harness
//!
//! ## Example
//!
//! ```
//! use demandbus_core::DemandStream;
//! use demandbus_testing::ScriptedSubscriber;
//!
//! let subscription = DemandStream::new(1..=7).subscribe(ScriptedSubscriber::new([3, 2, 2]));
//! assert_eq!(subscription.subscriber().batches().len(), 3);
//! assert_eq!(subscription.subscriber().completions(), 1);
//! ```


/// Mock implementations of bus traits
pub mod mocks;

/// Recording subscribers
pub mod subscribers;

// Re-export commonly used items
pub use handler_test::{HandlerTest, assertions};
pub use mocks::RecordingBus;
pub use subscribers::{RecordingSubscriber, ScriptedSubscriber};

/// Install a tracing subscriber whose output is captured per test.
///
/// Respects `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
