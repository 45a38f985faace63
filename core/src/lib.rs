//! # Demandbus Core
//!
//! Core traits and types for demand-driven streaming and key-routed command
//! dispatch.
//!
//! Both halves share one idea: the consumer declares what it is ready for, and
//! the producer does exactly that much work.
//!
//! ## Core Concepts
//!
//! - **Backlog**: the fixed, finite sequence a [`DemandStream`] will ever produce
//! - **Demand**: the count of items a subscriber is currently willing to receive
//! - **Routing key**: identifier selecting the entity a command targets
//! - **Entity**: stateful unit of a command bus, serialised independently
//! - **Chained publish**: a command's handler publishing a further command as
//!   part of its own application
//!
//! ## Modules
//!
//! - [`demand`]: pull-based single-producer/single-consumer stream
//! - [`key`]: the [`RoutingKey`] newtype
//! - [`bus`]: the command bus contract ([`CommandHandler`], [`Effect`], [`CommandBus`])
//!
//! This crate performs no I/O and spawns nothing; the `demandbus-runtime`
//! crate executes these contracts.

/// Pull-based demand streams
pub mod demand;

/// Routing keys
pub mod key;

/// Command bus contract
pub mod bus;

pub use bus::{BusError, CommandBus, CommandHandler, Delivery, Effect, Notice, Routed};
pub use demand::{Demand, DemandStream, Signal, StreamError, StreamState, Subscriber, Subscription};
pub use key::RoutingKey;

// Re-export so handlers can build effect lists without a direct dependency
pub use smallvec::{SmallVec, smallvec};
