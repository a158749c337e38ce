//! Database configuration.

use std::time::Duration;

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct Config {
    /// How long `close` waits after releasing the connection so the host
    /// can finish releasing its resources.
    pub close_grace: Duration,

    /// Whether closing the connection aborts a live transaction.
    pub abort_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_millis(100),
            abort_on_close: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the close grace delay.
    #[must_use]
    pub const fn close_grace(mut self, delay: Duration) -> Self {
        self.close_grace = delay;
        self
    }

    /// Sets whether closing aborts a live transaction.
    #[must_use]
    pub const fn abort_on_close(mut self, value: bool) -> Self {
        self.abort_on_close = value;
        self
    }
}
