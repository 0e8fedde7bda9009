//! Client configuration.
//!
//! Plain data with sane defaults; mutated through [`crate::ClientBuilder`]
//! before the engine starts. The fundamental frequency governs both the run
//! loop period and the derived keep-alive interval.

use std::time::Duration;

/// Default application name reported to the broker.
pub const DEFAULT_APP_NAME: &str = "moos-client";

/// Default broker host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default broker port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default run-loop frequency in Hz (one tick every 200 ms).
pub const DEFAULT_FREQUENCY_HZ: f64 = 5.0;

/// Default idle interval before a keep-alive Null message is sent.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(100);

/// Default inbound mailbox bound (cleared entirely on overflow).
pub const DEFAULT_INBOX_CAPACITY: usize = 1000;

/// Default outbound mailbox bound (oldest message dropped on overflow).
pub const DEFAULT_OUTBOX_CAPACITY: usize = 500;

/// Delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(200);

/// Configuration for a [`crate::MoosClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Name this client registers with the broker; stamps outbound `source`.
    pub app_name: String,
    /// Broker hostname or IP address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Reconnect automatically after a connection failure.
    pub auto_reconnect: bool,
    /// Run-loop frequency in Hz, clamped to (0, 100].
    pub fundamental_frequency: f64,
    /// Idle interval before a keep-alive Null message is sent.
    pub keep_alive: Duration,
    /// Inbound mailbox bound.
    pub inbox_capacity: usize,
    /// Outbound mailbox bound.
    pub outbox_capacity: usize,
    /// Overwrite the `source` of Notify messages with `app_name`.
    pub use_name_as_source: bool,
    /// Back-off delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auto_reconnect: true,
            fundamental_frequency: DEFAULT_FREQUENCY_HZ,
            keep_alive: DEFAULT_KEEP_ALIVE,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            use_name_as_source: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ClientConfig {
    /// Set the run-loop frequency, clamping to (0, 100] Hz.
    ///
    /// Also re-derives the keep-alive interval as `1000 / frequency` ms.
    pub fn set_fundamental_frequency(&mut self, hz: f64) {
        self.fundamental_frequency = if hz <= 0.0 {
            1.0
        } else if hz > 100.0 {
            100.0
        } else {
            hz
        };
        self.keep_alive = Duration::from_secs_f64(1.0 / self.fundamental_frequency);
    }

    /// Run-loop tick period: `1 / fundamental_frequency`.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fundamental_frequency)
    }
}
