//! Demand-driven item streams with explicit backpressure.
//!
//! A [`DemandStream`] owns a finite backlog and never hands an item to its
//! subscriber unless that item was requested first. The consumer grants demand
//! through [`Subscription::request`] or, from inside its own callbacks, through
//! the [`Demand`] accumulator it is handed.
//!
//! # Protocol
//!
//! ```text
//! subscribe ──► on_subscribe(demand)
//!                   │
//!   request(n) ─────┤
//!                   ▼
//!   ┌───────────────────────────────┐
//!   │ while outstanding > 0:        │
//!   │   on_next(item, demand) ──────┼──► re-entrant demand is added to
//!   │                               │    `outstanding`, never recursed into
//!   └──────────────┬────────────────┘
//!                  │ backlog exhausted
//!                  ▼
//!             on_complete()  (exactly once)
//! ```
//!
//! Delivery is synchronous: `request` returns only after every item it (and
//! any demand added re-entrantly) authorised has been handed over. Re-entrant
//! demand is folded into a single work loop, so a consumer that requests one
//! more item from every `on_next` does not grow the call stack.
//!
//! # Example
//!
//! ```
//! use demandbus_core::demand::{Demand, DemandStream, Subscriber};
//!
//! #[derive(Default)]
//! struct Printer {
//!     lines: Vec<String>,
//!     done: bool,
//! }
//!
//! impl Subscriber<&'static str> for Printer {
//!     fn on_next(&mut self, item: &'static str, _demand: &mut Demand) {
//!         self.lines.push(item.to_string());
//!     }
//!
//!     fn on_complete(&mut self) {
//!         self.done = true;
//!     }
//! }
//!
//! let mut subscription = DemandStream::new(["a", "b", "c"]).subscribe(Printer::default());
//! subscription.request(2);
//! assert_eq!(subscription.subscriber().lines, ["a", "b"]);
//! assert!(!subscription.subscriber().done);
//!
//! subscription.request(5);
//! assert_eq!(subscription.subscriber().lines, ["a", "b", "c"]);
//! assert!(subscription.subscriber().done);
//! ```

use thiserror::Error;

/// Error delivered through the stream's error signal.
///
/// The in-memory backlog never fails on its own; the variant exists so
/// producers layered on top of a subscription can terminate it with a cause.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The producer could not continue
    #[error("Producer failed: {0}")]
    Producer(String),
}

/// One callback observed by a subscriber.
///
/// Used by recorders and tests to describe the exact sequence a subscriber saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    /// An item was delivered
    Next(T),
    /// The stream terminated with an error
    Error(StreamError),
    /// The stream completed (exhausted or cancelled)
    Complete,
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Items may still be delivered
    Active,
    /// The backlog was exhausted and completion was signalled
    Completed,
    /// The consumer cancelled; completion was signalled
    Cancelled,
    /// The error signal was delivered
    Failed,
}

impl StreamState {
    /// Check whether no further signal can be delivered
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Demand accumulated from inside a subscriber callback.
///
/// The subscription reads it back once the callback returns and folds it into
/// the running delivery loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Demand {
    requested: u64,
    cancelled: bool,
}

impl Demand {
    /// Request `n` more items. Demand saturates at `u64::MAX`.
    pub const fn request(&mut self, n: u64) {
        self.requested = self.requested.saturating_add(n);
    }

    /// Cancel the subscription once the current callback returns
    pub const fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Items requested so far in this callback
    #[must_use]
    pub const fn requested(&self) -> u64 {
        self.requested
    }

    /// Whether cancellation was requested in this callback
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Consumer side of a [`DemandStream`].
///
/// Only `on_next` and `on_complete` are required; the error signal defaults to
/// a no-op.
pub trait Subscriber<T> {
    /// Called once when the subscription is established, before any item.
    fn on_subscribe(&mut self, demand: &mut Demand) {
        let _ = demand;
    }

    /// Called for each delivered item, in backlog order.
    fn on_next(&mut self, item: T, demand: &mut Demand);

    /// Called at most once if the stream fails. No other signal follows.
    fn on_error(&mut self, error: StreamError) {
        let _ = error;
    }

    /// Called exactly once when the backlog is exhausted or the consumer cancels.
    fn on_complete(&mut self);
}

/// A finite backlog waiting for its single subscriber.
///
/// `subscribe` consumes the stream, so a second subscriber cannot be attached.
#[derive(Debug, Clone)]
pub struct DemandStream<T> {
    backlog: Vec<T>,
}

impl<T> DemandStream<T> {
    /// Capture the backlog. Nothing is delivered until a subscriber requests it.
    #[must_use]
    pub fn new(backlog: impl IntoIterator<Item = T>) -> Self {
        Self {
            backlog: backlog.into_iter().collect(),
        }
    }

    /// Number of items the stream will ever produce
    #[must_use]
    pub fn len(&self) -> usize {
        self.backlog.len()
    }

    /// Whether the backlog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backlog.is_empty()
    }

    /// Attach the single subscriber.
    ///
    /// `on_subscribe` runs immediately; any demand it registers is served
    /// before this call returns.
    pub fn subscribe<S>(self, subscriber: S) -> Subscription<T, S>
    where
        S: Subscriber<T>,
    {
        let mut subscription = Subscription {
            total: self.backlog.len(),
            items: self.backlog.into_iter(),
            state: StreamState::Active,
            subscriber,
        };

        let mut demand = Demand::default();
        subscription.subscriber.on_subscribe(&mut demand);
        subscription.settle(demand);
        subscription
    }
}

/// The binding between one stream and its subscriber.
///
/// This is the demand handle: the driver calls [`request`](Self::request) and
/// [`cancel`](Self::cancel) on it.
#[derive(Debug)]
pub struct Subscription<T, S> {
    items: std::vec::IntoIter<T>,
    total: usize,
    state: StreamState,
    subscriber: S,
}

impl<T, S> Subscription<T, S>
where
    S: Subscriber<T>,
{
    /// Request up to `n` further items.
    ///
    /// A zero request, or any request after the stream terminated, is a no-op.
    pub fn request(&mut self, n: u64) {
        self.drain(n);
    }

    /// Terminate the stream early.
    ///
    /// Signals completion once; later calls are ignored and no item follows.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = StreamState::Cancelled;
        self.subscriber.on_complete();
    }

    /// Terminate the stream with an error.
    ///
    /// No completion is signalled afterwards. Ignored if already terminal.
    pub fn fail(&mut self, error: StreamError) {
        if self.state.is_terminal() {
            return;
        }
        self.state = StreamState::Failed;
        self.subscriber.on_error(error);
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the stream has terminated
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Number of items handed to the subscriber so far
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.total - self.items.len()
    }

    /// Number of backlog items not yet delivered
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Borrow the subscriber
    #[must_use]
    pub const fn subscriber(&self) -> &S {
        &self.subscriber
    }

    /// Mutably borrow the subscriber
    pub const fn subscriber_mut(&mut self) -> &mut S {
        &mut self.subscriber
    }

    /// Detach and return the subscriber
    #[must_use]
    pub fn into_subscriber(self) -> S {
        self.subscriber
    }

    fn settle(&mut self, demand: Demand) {
        if demand.is_cancelled() {
            self.cancel();
            return;
        }
        self.drain(demand.requested());
    }

    fn drain(&mut self, mut outstanding: u64) {
        if outstanding == 0 || self.state.is_terminal() {
            return;
        }

        while outstanding > 0 {
            let Some(item) = self.items.next() else {
                break;
            };
            outstanding -= 1;

            let mut demand = Demand::default();
            self.subscriber.on_next(item, &mut demand);

            if demand.is_cancelled() {
                self.cancel();
                return;
            }
            outstanding = outstanding.saturating_add(demand.requested());

            if self.items.len() == 0 {
                break;
            }
        }

        if self.items.len() == 0 {
            self.state = StreamState::Completed;
            self.subscriber.on_complete();
        }
    }
}
