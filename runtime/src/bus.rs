//! In-process key-routed command bus.
//!
//! [`KeyedBus`] routes each published command to the single entity registered
//! under its routing key and applies it with that entity's state locked.
//!
//! # Ordering
//!
//! - Commands for one entity are applied one at a time, in the order their
//!   publishers reached the entity's (FIFO) lock.
//! - Commands for different entities run concurrently.
//! - A command's whole synchronous chain runs with every entity in its
//!   [`footprint`](demandbus_core::Routed::footprint) locked. Locks are taken
//!   in sorted key order, so overlapping chains never deadlock, and no other
//!   publisher can observe the chain half-applied.
//! - A follow-up addressed outside the footprint is published on its own once
//!   the chain has released its locks. Between the two, other publishers may
//!   observe the first hop without the second.
//! - Only a command whose own routing key is unregistered is dropped.
//!   Unregistered footprint keys are skipped when locking; a follow-up sent
//!   to one is deferred and then dropped as its own hop.

use crate::config::BusConfig;
use crate::metrics::BusMetrics;
use crate::registry::{EntityHandle, Registry};
use demandbus_core::bus::{
    BusError, CommandBus, CommandHandler, Delivery, Effect, Notice, Routed,
};
use demandbus_core::key::RoutingKey;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedMutexGuard, broadcast};

/// A command waiting to be dispatched, with its chain depth
type Pending<C> = (C, usize);

/// The command bus runtime.
///
/// # Example
///
/// ```ignore
/// let bus = KeyedBus::new(AccountHandler);
/// bus.register("123456".into(), Account::new(dec!(1300.00))).await?;
///
/// let delivery = bus.publish(BankCommand::query_balance("123456")).await;
/// for report in delivery.reports {
///     println!("{report}");
/// }
/// ```
pub struct KeyedBus<H>
where
    H: CommandHandler,
{
    handler: Arc<H>,
    registry: Arc<Registry<H::State>>,
    notices: broadcast::Sender<Notice<H::Report>>,
    config: BusConfig,
}

impl<H> KeyedBus<H>
where
    H: CommandHandler + Send + Sync + 'static,
    H::State: Send + 'static,
    H::Command: Send + std::fmt::Debug + 'static,
    H::Report: Clone + Send + 'static,
{
    /// Create a bus with an empty registry and default configuration
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, BusConfig::default())
    }

    /// Create a bus with an empty registry and custom configuration
    #[must_use]
    pub fn with_config(handler: H, config: BusConfig) -> Self {
        Self::with_registry(handler, Arc::new(Registry::new()), config)
    }

    /// Create a bus over an existing (possibly seeded) registry
    #[must_use]
    pub fn with_registry(handler: H, registry: Arc<Registry<H::State>>, config: BusConfig) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));

        Self {
            handler: Arc::new(handler),
            registry,
            notices,
            config,
        }
    }

    /// The registry this bus routes through
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry<H::State>> {
        &self.registry
    }

    /// The configuration this bus was built with
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Subscribe to every report produced from now on.
    ///
    /// Observers that lag more than `notice_capacity` notices behind receive
    /// `RecvError::Lagged`; publishers never wait for them.
    #[must_use]
    pub fn observe(&self) -> broadcast::Receiver<Notice<H::Report>> {
        self.notices.subscribe()
    }

    /// Register an entity under `key` and subscribe it to its commands.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyExists`] if `key` is already registered.
    #[tracing::instrument(skip_all, name = "bus_register", fields(key = %key))]
    pub async fn register(
        &self,
        key: RoutingKey,
        initial: H::State,
    ) -> Result<EntityHandle<H::State>, BusError> {
        let handle = self.registry.insert(key, initial).await?;
        BusMetrics::record_registration();
        tracing::debug!("Entity registered");
        Ok(handle)
    }

    /// Handle to the entity registered under `key`
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownKey`] if nothing is registered under `key`.
    pub async fn entity(&self, key: &RoutingKey) -> Result<EntityHandle<H::State>, BusError> {
        self.registry
            .get(key)
            .await
            .ok_or_else(|| BusError::UnknownKey(key.clone()))
    }

    /// Read an entity's state once no command is being applied to it
    pub async fn inspect<F, T>(&self, key: &RoutingKey, f: F) -> Option<T>
    where
        F: FnOnce(&H::State) -> T,
    {
        match self.registry.get(key).await {
            Some(handle) => Some(handle.inspect(f).await),
            None => None,
        }
    }

    /// Read several entities' states together.
    ///
    /// The entities are locked in sorted key order, the same order commands
    /// take them in, so `f` never sees a chain half-applied across them.
    /// States are passed to `f` in the order of `keys`; repeated keys are
    /// read once and passed at each position.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownKey`] for the first key (in sorted order)
    /// that is not registered.
    pub async fn inspect_many<F, T>(&self, keys: &[RoutingKey], f: F) -> Result<T, BusError>
    where
        F: FnOnce(&[&H::State]) -> T,
    {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        let handles = self
            .registry
            .resolve(&sorted)
            .await
            .map_err(BusError::UnknownKey)?;

        let mut guards = Vec::with_capacity(handles.len());
        for handle in &handles {
            guards.push(handle.lock().await);
        }

        let states: Vec<&H::State> = keys
            .iter()
            .filter_map(|key| sorted.binary_search(key).ok())
            .map(|i| &*guards[i])
            .collect();
        Ok(f(&states))
    }

    /// Publish a command.
    ///
    /// Returns once the command and every command it chained have been
    /// applied (or dropped). A command is dropped only when nothing is
    /// registered under its own routing key.
    #[tracing::instrument(skip_all, name = "bus_publish", fields(key = %command.routing_key()))]
    pub async fn publish(&self, command: H::Command) -> Delivery<H::Report> {
        let start = Instant::now();
        let mut delivery = Delivery::new();
        let mut pending: VecDeque<Pending<H::Command>> = VecDeque::from([(command, 0)]);

        while let Some((next, depth)) = pending.pop_front() {
            let hop = self.dispatch(next, depth, &mut pending).await;
            delivery.absorb(hop);
        }

        BusMetrics::record_publish(delivery.applied, delivery.dropped, start.elapsed());
        tracing::debug!(
            applied = delivery.applied,
            dropped = delivery.dropped,
            "Publication settled"
        );
        delivery
    }

    /// Apply one command and its in-footprint chain under the footprint's locks.
    async fn dispatch(
        &self,
        command: H::Command,
        depth: usize,
        deferred: &mut VecDeque<Pending<H::Command>>,
    ) -> Delivery<H::Report> {
        let mut delivery = Delivery::new();

        let mut footprint = command.footprint();
        footprint.push(command.routing_key().clone());
        footprint.sort();
        footprint.dedup();

        let handles = self.registry.resolve_registered(&footprint).await;
        if !handles.iter().any(|handle| handle.key() == command.routing_key()) {
            tracing::debug!(?command, "Dropping command, target not registered");
            delivery.dropped = 1;
            return delivery;
        }
        if handles.len() < footprint.len() {
            tracing::debug!(
                held = handles.len(),
                footprint = footprint.len(),
                "Footprint names unregistered keys"
            );
        }

        // Sorted acquisition order keeps overlapping chains deadlock-free
        let mut guards: Vec<(RoutingKey, OwnedMutexGuard<H::State>)> =
            Vec::with_capacity(handles.len());
        for handle in handles {
            let guard = handle.lock().await;
            guards.push((handle.key().clone(), guard));
        }

        let mut stack: Vec<Pending<H::Command>> = vec![(command, depth)];
        while let Some((command, depth)) = stack.pop() {
            if depth > self.config.max_chain_depth {
                tracing::warn!(
                    depth,
                    max = self.config.max_chain_depth,
                    ?command,
                    "Dropping chained command, chain too deep"
                );
                delivery.dropped += 1;
                continue;
            }

            let key = command.routing_key().clone();
            let Some((_, state)) = guards.iter_mut().find(|(held, _)| *held == key) else {
                tracing::debug!(target_key = %key, "Deferring chained command outside footprint");
                deferred.push_back((command, depth));
                continue;
            };

            let effects = self.handler.handle(state, command);
            delivery.applied += 1;

            let mut chained = Vec::new();
            for effect in effects {
                match effect {
                    Effect::None => {}
                    Effect::Publish(next) => chained.push(next),
                    Effect::Report(report) => {
                        // No observers is fine
                        let _ = self.notices.send(Notice {
                            key: key.clone(),
                            report: report.clone(),
                        });
                        delivery.reports.push(report);
                    }
                }
            }

            // Depth-first: the first follow-up (and its own chain) runs before the second
            stack.extend(chained.into_iter().rev().map(|next| (next, depth + 1)));
        }

        delivery
    }
}

impl<H> Clone for KeyedBus<H>
where
    H: CommandHandler,
{
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            registry: Arc::clone(&self.registry),
            notices: self.notices.clone(),
            config: self.config,
        }
    }
}

impl<H> CommandBus for KeyedBus<H>
where
    H: CommandHandler + Send + Sync + 'static,
    H::State: Send + 'static,
    H::Command: Send + std::fmt::Debug + 'static,
    H::Report: Clone + Send + 'static,
{
    type Command = H::Command;
    type State = H::State;
    type Report = H::Report;

    fn publish(
        &self,
        command: Self::Command,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery<Self::Report>, BusError>> + Send + '_>> {
        Box::pin(async move { Ok(Self::publish(self, command).await) })
    }

    fn register(
        &self,
        key: RoutingKey,
        initial: Self::State,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        Box::pin(async move { Self::register(self, key, initial).await.map(|_| ()) })
    }

    fn contains<'a>(&'a self, key: &'a RoutingKey) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.registry.contains(key))
    }
}
