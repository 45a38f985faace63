//! Subscribers that record what they observe.
//!
//! Both types keep every signal they receive so tests can assert on the exact
//! sequence, including that completion arrived once and nothing followed it.

use demandbus_core::demand::{Demand, Signal, StreamError, Subscriber};
use std::collections::VecDeque;

/// Records every signal, optionally re-requesting as items arrive.
///
/// # Example
///
/// ```
/// use demandbus_core::DemandStream;
/// use demandbus_testing::RecordingSubscriber;
///
/// let mut subscription = DemandStream::new([1, 2, 3]).subscribe(RecordingSubscriber::new());
/// subscription.request(2);
/// assert_eq!(subscription.subscriber().items(), vec![1, 2]);
/// assert_eq!(subscription.subscriber().completions(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct RecordingSubscriber<T> {
    signals: Vec<Signal<T>>,
    on_subscribe: u64,
    per_item: u64,
    cancel_after: Option<usize>,
}

impl<T> RecordingSubscriber<T> {
    /// A passive recorder that never requests on its own
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signals: Vec::new(),
            on_subscribe: 0,
            per_item: 0,
            cancel_after: None,
        }
    }

    /// Request `n` items as soon as the subscription is established
    #[must_use]
    pub const fn requesting_on_subscribe(mut self, n: u64) -> Self {
        self.on_subscribe = n;
        self
    }

    /// Request `n` more items from inside every `on_next`
    #[must_use]
    pub const fn requesting_per_item(mut self, n: u64) -> Self {
        self.per_item = n;
        self
    }

    /// Cancel from inside `on_next` once `n` items have been received
    #[must_use]
    pub const fn cancelling_after(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }

    /// Every signal received, in order
    #[must_use]
    pub fn signals(&self) -> &[Signal<T>] {
        &self.signals
    }

    /// Number of `on_complete` calls
    #[must_use]
    pub fn completions(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| matches!(s, Signal::Complete))
            .count()
    }

    /// Errors received
    #[must_use]
    pub fn errors(&self) -> Vec<&StreamError> {
        self.signals
            .iter()
            .filter_map(|s| match s {
                Signal::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Number of items received
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| matches!(s, Signal::Next(_)))
            .count()
    }

    /// Whether the last signal is terminal and nothing else is terminal
    #[must_use]
    pub fn terminated_once(&self) -> bool {
        let terminal = |s: &Signal<T>| matches!(s, Signal::Complete | Signal::Error(_));
        self.signals.iter().filter(|s| terminal(*s)).count() == 1
            && self.signals.last().is_some_and(terminal)
    }
}

impl<T: Clone> RecordingSubscriber<T> {
    /// Items received, in order
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.signals
            .iter()
            .filter_map(|s| match s {
                Signal::Next(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }
}

impl<T> Default for RecordingSubscriber<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subscriber<T> for RecordingSubscriber<T> {
    fn on_subscribe(&mut self, demand: &mut Demand) {
        demand.request(self.on_subscribe);
    }

    fn on_next(&mut self, item: T, demand: &mut Demand) {
        self.signals.push(Signal::Next(item));
        if self.cancel_after.is_some_and(|n| self.item_count() >= n) {
            demand.cancel();
            return;
        }
        demand.request(self.per_item);
    }

    fn on_error(&mut self, error: StreamError) {
        self.signals.push(Signal::Error(error));
    }

    fn on_complete(&mut self) {
        self.signals.push(Signal::Complete);
    }
}

/// Requests items in scripted batches.
///
/// The first batch is requested on subscribe; each following batch is
/// requested from inside the `on_next` that drains the previous one. When the
/// script runs out the subscriber stops asking.
#[derive(Debug, Clone)]
pub struct ScriptedSubscriber<T> {
    script: VecDeque<u64>,
    outstanding: u64,
    batches: Vec<Vec<T>>,
    completed: usize,
}

impl<T> ScriptedSubscriber<T> {
    /// Subscriber that will request `batches` in order
    #[must_use]
    pub fn new(batches: impl IntoIterator<Item = u64>) -> Self {
        Self {
            script: batches.into_iter().collect(),
            outstanding: 0,
            batches: Vec::new(),
            completed: 0,
        }
    }

    /// Items grouped by the batch that requested them
    #[must_use]
    pub fn batches(&self) -> &[Vec<T>] {
        &self.batches
    }

    /// Number of `on_complete` calls
    #[must_use]
    pub const fn completions(&self) -> usize {
        self.completed
    }

    fn next_batch(&mut self, demand: &mut Demand) {
        while let Some(n) = self.script.pop_front() {
            if n == 0 {
                continue;
            }
            self.outstanding = n;
            self.batches.push(Vec::new());
            demand.request(n);
            return;
        }
    }
}

impl<T> Subscriber<T> for ScriptedSubscriber<T> {
    fn on_subscribe(&mut self, demand: &mut Demand) {
        self.next_batch(demand);
    }

    fn on_next(&mut self, item: T, demand: &mut Demand) {
        if let Some(batch) = self.batches.last_mut() {
            batch.push(item);
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            self.next_batch(demand);
        }
    }

    fn on_complete(&mut self) {
        self.completed += 1;
    }
}
