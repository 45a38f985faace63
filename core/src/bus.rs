//! Key-routed command bus contract.
//!
//! This module defines how commands reach the single entity they target and
//! how an entity's handler answers them. The runtime crate provides the
//! in-process implementation (`KeyedBus`); applications only depend on the
//! traits and value types here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Command   │  routing key ─┐
//! └──────┬──────┘               │
//!        │ publish              ▼
//!        │              ┌───────────────┐
//!        └────────────► │   Registry    │  key → entity
//!                       └───────┬───────┘
//!                               │ exactly one entity (or none: dropped)
//!                               ▼
//!                       ┌───────────────┐
//!                       │ CommandHandler│  handle(state, command)
//!                       └───────┬───────┘
//!                               │ effects
//!                  ┌────────────┴───────────┐
//!                  ▼                        ▼
//!          Effect::Publish(cmd)      Effect::Report(r)
//!          (chained publish,         (user-visible outcome,
//!           applied before            collected in Delivery)
//!           publish returns)
//! ```
//!
//! # Key Principles
//!
//! - **One entity per key**: registering a key twice fails with
//!   [`BusError::AlreadyExists`]
//! - **Per-entity order**: commands for one entity are applied one at a time,
//!   in publication order
//! - **Commands are data**: handlers match on a command enum rather than
//!   running closures carried by the command
//! - **Failures are reports**: domain failures surface as
//!   [`Effect::Report`] values, never as panics or bus errors
//!
//! # Example
//!
//! ```
//! use demandbus_core::bus::{CommandHandler, Effect, Routed};
//! use demandbus_core::key::RoutingKey;
//! use demandbus_core::{smallvec, SmallVec};
//!
//! #[derive(Clone, Debug)]
//! enum TallyCommand {
//!     Add { key: RoutingKey, n: u64 },
//! }
//!
//! impl Routed for TallyCommand {
//!     fn routing_key(&self) -> &RoutingKey {
//!         match self {
//!             Self::Add { key, .. } => key,
//!         }
//!     }
//! }
//!
//! struct Tally;
//!
//! impl CommandHandler for Tally {
//!     type State = u64;
//!     type Command = TallyCommand;
//!     type Report = u64;
//!
//!     fn handle(&self, state: &mut u64, command: TallyCommand) -> SmallVec<[Effect<TallyCommand, u64>; 4]> {
//!         match command {
//!             TallyCommand::Add { n, .. } => {
//!                 *state += n;
//!                 smallvec![Effect::Report(*state)]
//!             }
//!         }
//!     }
//! }
//!
//! let mut total = 1;
//! let effects = Tally.handle(&mut total, TallyCommand::Add { key: "a".into(), n: 2 });
//! assert_eq!(total, 3);
//! assert!(matches!(effects.as_slice(), [Effect::Report(3)]));
//! ```

use crate::key::RoutingKey;
use smallvec::{SmallVec, smallvec};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during command bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// An entity is already registered under this key
    #[error("Entity '{0}' already exists")]
    AlreadyExists(RoutingKey),

    /// No entity is registered under this key
    #[error("No entity registered under '{0}'")]
    UnknownKey(RoutingKey),
}

/// A command that carries its own routing key.
pub trait Routed {
    /// The key of the entity this command is applied to.
    fn routing_key(&self) -> &RoutingKey;

    /// Every key the command's chained publications may reach synchronously.
    ///
    /// A bus holds the registered ones among these entities for the duration
    /// of the chain so no intermediate state is observable. Defaults to the
    /// routing key alone.
    fn footprint(&self) -> SmallVec<[RoutingKey; 2]> {
        smallvec![self.routing_key().clone()]
    }
}

/// Outcome of applying a command, returned by a handler.
///
/// Effects are descriptions; the bus executes them after `handle` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<C, R> {
    /// Nothing to do
    None,

    /// Publish a follow-up command (chained publish)
    Publish(C),

    /// Surface a domain outcome to whoever published the command
    Report(R),
}

impl<C, R> Effect<C, R> {
    /// Check if this effect does nothing
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// The business logic applied to one entity's state.
///
/// # Type Parameters
///
/// - `State`: The per-entity state (an account, for instance)
/// - `Command`: The routed command type
/// - `Report`: User-visible outcomes produced while applying commands
pub trait CommandHandler {
    /// The per-entity state this handler mutates
    type State;

    /// The command type this handler applies
    type Command: Routed;

    /// Outcomes reported back to the publisher
    type Report;

    /// Apply `command` to `state`, returning the effects it produced.
    ///
    /// The bus guarantees exclusive access to `state` for the duration of the
    /// call and serialises calls for the same entity in publication order.
    fn handle(
        &self,
        state: &mut Self::State,
        command: Self::Command,
    ) -> SmallVec<[Effect<Self::Command, Self::Report>; 4]>;
}

/// Summary of one publication, including every command it chained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<R> {
    /// Commands applied to an entity
    pub applied: usize,

    /// Commands dropped because their target was not registered
    pub dropped: usize,

    /// Reports produced, in application order
    pub reports: Vec<R>,
}

impl<R> Delivery<R> {
    /// An empty delivery
    #[must_use]
    pub const fn new() -> Self {
        Self {
            applied: 0,
            dropped: 0,
            reports: Vec::new(),
        }
    }

    /// Whether at least one command was applied
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied > 0
    }

    /// Fold another delivery (a later hop of the same publication) into this one
    pub fn absorb(&mut self, other: Self) {
        self.applied += other.applied;
        self.dropped += other.dropped;
        self.reports.extend(other.reports);
    }
}

impl<R> Default for Delivery<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// A report tagged with the entity that produced it.
///
/// Broadcast to bus observers as commands are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice<R> {
    /// Entity whose command produced the report
    pub key: RoutingKey,
    /// The report itself
    pub report: R,
}

/// Trait for command bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so applications can hold an `Arc<dyn CommandBus<..>>` and swap the in-process
/// bus for a recording mock in tests.
pub trait CommandBus: Send + Sync {
    /// Commands routed by this bus
    type Command: Routed;

    /// Entity state held by this bus
    type State;

    /// Reports produced while applying commands
    type Report;

    /// Publish a command and wait until it, and every command it chained
    /// synchronously, has been applied.
    ///
    /// A command addressed to an unregistered key is dropped, not rejected.
    ///
    /// # Errors
    ///
    /// Implementations backed by a transport may fail to deliver; the
    /// in-process bus never returns an error here.
    fn publish(
        &self,
        command: Self::Command,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery<Self::Report>, BusError>> + Send + '_>>;

    /// Register a new entity under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyExists`] if `key` is taken. The check and
    /// the insertion are atomic.
    fn register(
        &self,
        key: RoutingKey,
        initial: Self::State,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>>;

    /// Whether an entity is registered under `key`
    fn contains<'a>(&'a self, key: &'a RoutingKey) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Ping(RoutingKey);

    impl Routed for Ping {
        fn routing_key(&self) -> &RoutingKey {
            &self.0
        }
    }

    #[test]
    fn default_footprint_is_routing_key() {
        let ping = Ping(RoutingKey::new("a"));
        assert_eq!(ping.footprint().as_slice(), &[RoutingKey::new("a")]);
    }

    #[test]
    fn delivery_absorbs_later_hops() {
        let mut first = Delivery {
            applied: 1,
            dropped: 0,
            reports: vec!["debited"],
        };
        first.absorb(Delivery {
            applied: 1,
            dropped: 1,
            reports: vec!["credited"],
        });

        assert_eq!(first.applied, 2);
        assert_eq!(first.dropped, 1);
        assert_eq!(first.reports, vec!["debited", "credited"]);
        assert!(first.is_applied());
        assert!(!Delivery::<()>::new().is_applied());
    }

    #[test]
    fn bus_error_messages() {
        assert_eq!(
            BusError::AlreadyExists(RoutingKey::new("123")).to_string(),
            "Entity '123' already exists"
        );
        assert_eq!(
            BusError::UnknownKey(RoutingKey::new("9")).to_string(),
            "No entity registered under '9'"
        );
    }

    #[test]
    fn effect_is_none() {
        assert!(Effect::<Ping, ()>::None.is_none());
        assert!(!Effect::<Ping, u8>::Report(1).is_none());
    }
}
