//! Demand-paced async streams.
//!
//! The concurrent counterpart of [`DemandStream`](demandbus_core::DemandStream):
//! the producer runs on its own task and the consumer grants demand from
//! another. Every emitted item consumes one permit from a semaphore that only
//! the consumer refills, so the producer can never run ahead of what was
//! requested. Requests and deliveries for one stream serialise through that
//! semaphore.
//!
//! # Example
//!
//! ```
//! use demandbus_runtime::paced::paced;
//! use futures::StreamExt;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (demand, mut articles) = paced(vec!["first", "second", "third"]);
//!
//! demand.request(2);
//! assert_eq!(articles.next().await, Some("first"));
//! assert_eq!(articles.next().await, Some("second"));
//!
//! demand.request(1);
//! assert_eq!(articles.next().await, Some("third"));
//! assert_eq!(articles.next().await, None); // completed
//! # }
//! ```

use crate::metrics::PacedMetrics;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Semaphore, mpsc};

/// State shared by both halves of a paced stream and its producer.
///
/// The semaphore closes when no more demand can arrive: on cancellation, or
/// once the demand handle is gone. Only cancellation discards items.
#[derive(Debug)]
struct Pacing {
    permits: Semaphore,
    granted: AtomicUsize,
    cancelled: AtomicBool,
}

impl Pacing {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.permits.close();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Consumer-side demand handle of a paced stream.
///
/// Dropping the handle grants nothing further: the stream yields what was
/// already requested, then ends.
#[derive(Debug)]
pub struct DemandHandle {
    pacing: Arc<Pacing>,
}

impl DemandHandle {
    /// Authorise up to `n` more items. Zero, or any request after
    /// cancellation, is a no-op.
    pub fn request(&self, n: usize) {
        if n == 0 || self.pacing.permits.is_closed() {
            return;
        }

        let room = Semaphore::MAX_PERMITS.saturating_sub(self.pacing.permits.available_permits());
        let granted = n.min(room);
        self.pacing.granted.fetch_add(granted, Ordering::SeqCst);
        self.pacing.permits.add_permits(granted);
        PacedMetrics::record_request(granted);
    }

    /// Stop the stream. Nothing is yielded afterwards, including items the
    /// producer already emitted. Idempotent.
    pub fn cancel(&self) {
        if !self.pacing.is_cancelled() {
            tracing::debug!("Paced stream cancelled by consumer");
            self.pacing.cancel();
        }
    }

    /// Whether the stream was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.pacing.is_cancelled()
    }
}

impl Drop for DemandHandle {
    fn drop(&mut self) {
        // Wakes a producer parked on demand that can no longer arrive
        self.pacing.permits.close();
    }
}

/// Item side of a paced stream. Ends when the backlog is exhausted, the
/// stream is cancelled, or the demand handle is dropped and every granted
/// item has been yielded.
#[derive(Debug)]
pub struct PacedStream<T> {
    items: mpsc::UnboundedReceiver<T>,
    pacing: Arc<Pacing>,
}

impl<T> Stream for PacedStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.pacing.is_cancelled() {
            return Poll::Ready(None);
        }
        self.items.poll_recv(cx)
    }
}

impl<T> Drop for PacedStream<T> {
    fn drop(&mut self) {
        self.pacing.cancel();
    }
}

/// Start a paced stream over `backlog`.
///
/// Spawns the producer on the current tokio runtime. Like the synchronous
/// stream, an empty backlog completes on the first positive request.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn paced<T>(backlog: impl IntoIterator<Item = T>) -> (DemandHandle, PacedStream<T>)
where
    T: Send + 'static,
{
    let backlog: Vec<T> = backlog.into_iter().collect();
    let pacing = Arc::new(Pacing {
        permits: Semaphore::new(0),
        granted: AtomicUsize::new(0),
        cancelled: AtomicBool::new(false),
    });
    let (tx, rx) = mpsc::unbounded_channel();

    let producer = Arc::clone(&pacing);
    tokio::spawn(async move {
        if backlog.is_empty() {
            let _ = producer.permits.acquire().await;
            return;
        }

        let mut produced = 0_usize;
        for item in backlog {
            match producer.permits.acquire().await {
                Ok(permit) => permit.forget(),
                // Closed: only items granted before the handle went away remain
                Err(_) => {
                    let granted = producer.granted.load(Ordering::SeqCst);
                    if producer.is_cancelled() || produced >= granted {
                        tracing::debug!(produced, "Paced stream closed");
                        return;
                    }
                }
            }
            if tx.send(item).is_err() {
                return;
            }
            produced += 1;
            PacedMetrics::record_delivery();
        }
        tracing::debug!("Paced stream backlog exhausted");
    });

    (
        DemandHandle {
            pacing: Arc::clone(&pacing),
        },
        PacedStream { items: rx, pacing },
    )
}
