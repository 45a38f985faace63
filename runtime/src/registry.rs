//! Explicitly owned entity registry.
//!
//! The registry maps each [`RoutingKey`] to one entity cell. It is created by
//! the application (optionally seeded) and handed to the bus; nothing about it
//! is global.

use demandbus_core::bus::BusError;
use demandbus_core::key::RoutingKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Shared handle to one registered entity.
///
/// The state sits behind a fair (FIFO) mutex: whoever queued first is served
/// first, which is what gives each entity its publication-order guarantee.
pub struct EntityHandle<S> {
    key: RoutingKey,
    cell: Arc<Mutex<S>>,
}

impl<S> EntityHandle<S> {
    /// The entity's routing key
    #[must_use]
    pub const fn key(&self) -> &RoutingKey {
        &self.key
    }

    /// Read the entity's state, waiting for any command in flight to finish.
    pub async fn inspect<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.cell.lock().await;
        f(&state)
    }

    /// Exclusive access for the length of a command chain
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<S> {
        Arc::clone(&self.cell).lock_owned().await
    }
}

impl<S> Clone for EntityHandle<S> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<S> std::fmt::Debug for EntityHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle").field("key", &self.key).finish()
    }
}

/// Key → entity map shared by a bus and its publishers.
///
/// # Example
///
/// ```
/// use demandbus_runtime::Registry;
///
/// # async fn example() -> Result<(), demandbus_core::BusError> {
/// let registry = Registry::seeded([("123456".into(), 1300_u64), ("999999".into(), 400)])?;
/// assert_eq!(registry.len().await, 2);
/// assert!(registry.insert("123456".into(), 0).await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct Registry<S> {
    entities: RwLock<HashMap<RoutingKey, Arc<Mutex<S>>>>,
}

impl<S> Registry<S> {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with `entities`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyExists`] if the seed repeats a key.
    pub fn seeded<I>(entities: I) -> Result<Self, BusError>
    where
        I: IntoIterator<Item = (RoutingKey, S)>,
    {
        let mut map = HashMap::new();
        for (key, state) in entities {
            if map.contains_key(&key) {
                return Err(BusError::AlreadyExists(key));
            }
            map.insert(key, Arc::new(Mutex::new(state)));
        }
        Ok(Self {
            entities: RwLock::new(map),
        })
    }

    /// Register `initial` under `key`.
    ///
    /// The existence check and the insertion happen under one write lock, so
    /// two concurrent inserts of the same key cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyExists`] if `key` is taken.
    pub async fn insert(&self, key: RoutingKey, initial: S) -> Result<EntityHandle<S>, BusError> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(&key) {
            return Err(BusError::AlreadyExists(key));
        }

        let cell = Arc::new(Mutex::new(initial));
        entities.insert(key.clone(), Arc::clone(&cell));
        Ok(EntityHandle { key, cell })
    }

    /// Look up one entity
    pub async fn get(&self, key: &RoutingKey) -> Option<EntityHandle<S>> {
        self.entities
            .read()
            .await
            .get(key)
            .map(|cell| EntityHandle {
                key: key.clone(),
                cell: Arc::clone(cell),
            })
    }

    /// Look up every key in `keys`, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns the first key that is not registered.
    pub async fn resolve(&self, keys: &[RoutingKey]) -> Result<Vec<EntityHandle<S>>, RoutingKey> {
        let entities = self.entities.read().await;
        keys.iter()
            .map(|key| {
                entities
                    .get(key)
                    .map(|cell| EntityHandle {
                        key: key.clone(),
                        cell: Arc::clone(cell),
                    })
                    .ok_or_else(|| key.clone())
            })
            .collect()
    }

    /// Look up the registered keys among `keys`, preserving their order and
    /// skipping the rest.
    pub async fn resolve_registered(&self, keys: &[RoutingKey]) -> Vec<EntityHandle<S>> {
        let entities = self.entities.read().await;
        keys.iter()
            .filter_map(|key| {
                entities.get(key).map(|cell| EntityHandle {
                    key: key.clone(),
                    cell: Arc::clone(cell),
                })
            })
            .collect()
    }

    /// Whether `key` is registered
    pub async fn contains(&self, key: &RoutingKey) -> bool {
        self.entities.read().await.contains_key(key)
    }

    /// All registered keys, sorted
    pub async fn keys(&self) -> Vec<RoutingKey> {
        let mut keys: Vec<RoutingKey> = self.entities.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered entities
    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Whether no entity is registered
    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
