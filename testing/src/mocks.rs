//! Mock implementations of the bus traits.

use demandbus_core::bus::{BusError, CommandBus, Delivery, Routed};
use demandbus_core::key::RoutingKey;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Type alias for the canned reply of a [`RecordingBus`]
type Responder<C, R> = Box<dyn Fn(&C) -> Vec<R> + Send + Sync>;

/// Command bus that records instead of executing.
///
/// Published commands are kept in order. A command counts as applied when its
/// routing key was registered, otherwise as dropped, mirroring the in-process
/// bus. Reports come from an optional responder.
///
/// # Example
///
/// ```ignore
/// let bus = RecordingBus::new().responding(|cmd: &BankCommand| vec![BankReport::Balance(..)]);
/// bus.register("A".into(), Account::default()).await?;
/// teller.execute("balance A").await;
/// assert_eq!(bus.published().len(), 1);
/// ```
pub struct RecordingBus<C, S, R> {
    published: Mutex<Vec<C>>,
    registered: Mutex<Vec<(RoutingKey, S)>>,
    responder: Option<Responder<C, R>>,
}

impl<C, S, R> RecordingBus<C, S, R> {
    /// An empty recording bus with no responder
    #[must_use]
    pub const fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            registered: Mutex::new(Vec::new()),
            responder: None,
        }
    }

    /// Produce reports for every applied command with `responder`
    #[must_use]
    pub fn responding<F>(mut self, responder: F) -> Self
    where
        F: Fn(&C) -> Vec<R> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Keys registered so far, in registration order
    #[must_use]
    pub fn registered_keys(&self) -> Vec<RoutingKey> {
        lock(&self.registered)
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of published commands
    #[must_use]
    pub fn published_count(&self) -> usize {
        lock(&self.published).len()
    }

    /// Clear recorded commands, keeping registrations
    pub fn clear(&self) {
        lock(&self.published).clear();
    }
}

impl<C: Clone, S, R> RecordingBus<C, S, R> {
    /// Every command published so far, in order
    #[must_use]
    pub fn published(&self) -> Vec<C> {
        lock(&self.published).clone()
    }
}

impl<C, S: Clone, R> RecordingBus<C, S, R> {
    /// Initial state registered under `key`
    #[must_use]
    pub fn registered_state(&self, key: &RoutingKey) -> Option<S> {
        lock(&self.registered)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, state)| state.clone())
    }
}

impl<C, S, R> Default for RecordingBus<C, S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S, R> CommandBus for RecordingBus<C, S, R>
where
    C: Routed + Send,
    S: Send,
    R: Send,
{
    type Command = C;
    type State = S;
    type Report = R;

    fn publish(
        &self,
        command: C,
    ) -> Pin<Box<dyn Future<Output = Result<Delivery<R>, BusError>> + Send + '_>> {
        let known = lock(&self.registered)
            .iter()
            .any(|(key, _)| key == command.routing_key());

        let mut delivery = Delivery::new();
        if known {
            delivery.applied = 1;
            if let Some(responder) = &self.responder {
                delivery.reports = responder(&command);
            }
        } else {
            delivery.dropped = 1;
        }

        lock(&self.published).push(command);
        Box::pin(async move { Ok(delivery) })
    }

    fn register(
        &self,
        key: RoutingKey,
        initial: S,
    ) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send + '_>> {
        let result = {
            let mut registered = lock(&self.registered);
            if registered.iter().any(|(k, _)| *k == key) {
                Err(BusError::AlreadyExists(key))
            } else {
                registered.push((key, initial));
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn contains<'a>(&'a self, key: &'a RoutingKey) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let known = lock(&self.registered).iter().any(|(k, _)| k == key);
        Box::pin(async move { known })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
