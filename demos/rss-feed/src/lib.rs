//! Article feed driven by reader demand.
//!
//! The feed holds a fixed list of articles. The reader types how many it wants
//! next; the feed prints exactly that many and waits for the next count. Once
//! every article is out a marker line closes the feed.
//!
//! ```text
//! > 3
//! Writing code that nobody else can read
//! Blaming the architecture
//! Z-Index: 10000000
//! > 10
//! RegExp by trial and error
//! ...
//! Blaming the user
//! -----------
//! ```
//!
//! Counts of zero or below are skipped. End of input, or a line that is not a
//! number, ends the feed early.

use demandbus_core::{Demand, DemandStream, StreamError, Subscriber};
use std::fmt::Display;
use std::io::{self, BufRead, Write};

/// The articles every feed starts with
pub const ARTICLES: [&str; 7] = [
    "Writing code that nobody else can read",
    "Blaming the architecture",
    "Z-Index: 10000000",
    "RegExp by trial and error",
    "Solving imaginary scaling issues",
    "Getting an Arduino LED to blink",
    "Blaming the user",
];

/// Line written once the feed is over
pub const COMPLETION_MARKER: &str = "-----------";

/// Subscriber that reads batch sizes from `input` and prints items to `output`.
///
/// The next count is read from inside the callback that finishes the current
/// batch, so the whole exchange runs within `DemandStream::subscribe`.
pub struct FeedConsumer<R, W> {
    input: R,
    output: W,
    outstanding: u64,
    error: Option<io::Error>,
}

impl<R, W> FeedConsumer<R, W>
where
    R: BufRead,
    W: Write,
{
    /// Create a consumer over a line source and a line sink
    pub const fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            outstanding: 0,
            error: None,
        }
    }

    /// Release the sink, or the first I/O error encountered
    ///
    /// # Errors
    ///
    /// Returns the first read or write failure.
    pub fn finish(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.output),
        }
    }

    /// Read counts until one is positive, then request it. Cancels on end of
    /// input, unreadable input, or a count that does not parse.
    fn next_batch(&mut self, demand: &mut Demand) {
        let mut line = String::new();
        loop {
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => {
                    tracing::debug!("Input exhausted, cancelling feed");
                    demand.cancel();
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    self.error.get_or_insert(err);
                    demand.cancel();
                    return;
                }
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match text.parse::<i64>() {
                Ok(count) if count > 0 => {
                    self.outstanding = count.unsigned_abs();
                    demand.request(self.outstanding);
                    return;
                }
                Ok(count) => {
                    tracing::debug!(count, "Ignoring non-positive count");
                }
                Err(_) => {
                    tracing::warn!(input = text, "Not a count, cancelling feed");
                    demand.cancel();
                    return;
                }
            }
        }
    }

    fn write_line(&mut self, text: impl Display) -> bool {
        if let Err(err) = writeln!(self.output, "{text}") {
            self.error.get_or_insert(err);
            return false;
        }
        true
    }
}

impl<T, R, W> Subscriber<T> for FeedConsumer<R, W>
where
    T: Display,
    R: BufRead,
    W: Write,
{
    fn on_subscribe(&mut self, demand: &mut Demand) {
        self.next_batch(demand);
    }

    fn on_next(&mut self, item: T, demand: &mut Demand) {
        if !self.write_line(item) {
            demand.cancel();
            return;
        }

        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            if let Err(err) = self.output.flush() {
                self.error.get_or_insert(err);
                demand.cancel();
                return;
            }
            self.next_batch(demand);
        }
    }

    fn on_error(&mut self, error: StreamError) {
        tracing::error!(%error, "Feed failed");
    }

    fn on_complete(&mut self) {
        if self.write_line(COMPLETION_MARKER) {
            if let Err(err) = self.output.flush() {
                self.error.get_or_insert(err);
            }
        }
    }
}

/// Serve `articles` to a reader on `input`/`output` until the feed ends.
///
/// # Errors
///
/// Returns the first I/O error from either side.
pub fn run<T, R, W>(articles: impl IntoIterator<Item = T>, input: R, output: W) -> io::Result<W>
where
    T: Display,
    R: BufRead,
    W: Write,
{
    let subscription = DemandStream::new(articles).subscribe(FeedConsumer::new(input, output));
    tracing::debug!(
        delivered = subscription.delivered(),
        state = ?subscription.state(),
        "Feed closed"
    );
    subscription.into_subscriber().finish()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;

    fn feed(input: &str) -> Vec<String> {
        let out = run(ARTICLES, input.as_bytes(), Vec::new()).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn non_positive_counts_are_skipped() {
        let lines = feed("0\n-4\n\n2\n");
        assert_eq!(lines, vec![ARTICLES[0], ARTICLES[1], COMPLETION_MARKER]);
    }

    #[test]
    fn end_of_input_closes_the_feed() {
        let lines = feed("");
        assert_eq!(lines, vec![COMPLETION_MARKER]);
    }

    #[test]
    fn garbage_closes_the_feed() {
        let lines = feed("1\nmore please\n5\n");
        assert_eq!(lines, vec![ARTICLES[0], COMPLETION_MARKER]);
    }

    #[test]
    fn oversized_count_drains_everything() {
        let lines = feed("100\n");
        assert_eq!(lines.len(), ARTICLES.len() + 1);
        assert_eq!(lines.last().map(String::as_str), Some(COMPLETION_MARKER));
    }

    #[test]
    fn empty_feed_completes_on_first_count() {
        let out = run(Vec::<String>::new(), "1\n".as_bytes(), Vec::new()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{COMPLETION_MARKER}\n"));
    }
}
