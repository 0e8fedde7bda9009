//! Client builder and public API.
//!
//! [`ClientBuilder`] configures the connection; [`MoosClient`] is the
//! handle callers use to publish, subscribe and receive. All methods may be
//! called from any thread: the mailboxes, subscription table and publish
//! set live behind one mutex so no caller ever observes them torn, while
//! the connection engine runs on its own background task.
//!
//! # Example
//!
//! ```ignore
//! use moos_client::MoosClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MoosClient::builder("my-app")
//!         .host("localhost")
//!         .port(9000)
//!         .on_message_batch(|batch| {
//!             for msg in &batch {
//!                 println!("{} = {:?}", msg.name, msg.as_str());
//!             }
//!         })
//!         .start();
//!
//!     client.register("DEPLOY", 0.0);
//!     client.notify("RETURN", "false");
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::engine;
use crate::error::{MoosError, Result};
use crate::mailbox::{Inbox, Outbox};
use crate::protocol::{Message, MessageKind, MoosValue, Sequence};
use crate::subscription::{wildcard_payload, SubscriptionTable};
use crate::time::moos_time;

/// Callback receiving each batch of newly delivered messages.
///
/// Invoked on the engine task; long-blocking handlers stall the run loop
/// and with it keep-alives and registration replay.
pub type BatchHandler = Box<dyn FnMut(Vec<Message>) + Send>;

/// Mailboxes and tables guarded by a single lock.
pub(crate) struct MailState {
    pub(crate) outbox: Outbox,
    pub(crate) inbox: Inbox,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) publishing: BTreeSet<String>,
}

/// State shared between the facade and the engine task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) state: Mutex<MailState>,
    pub(crate) handler: Mutex<Option<BatchHandler>>,
    pub(crate) enabled: AtomicBool,
    connected: AtomicBool,
    connected_tx: watch::Sender<bool>,
    next_seq: AtomicI32,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig, handler: Option<BatchHandler>) -> Self {
        let (connected_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(MailState {
                outbox: Outbox::new(config.outbox_capacity),
                inbox: Inbox::new(config.inbox_capacity),
                subscriptions: SubscriptionTable::new(),
                publishing: BTreeSet::new(),
            }),
            handler: Mutex::new(handler),
            enabled: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            connected_tx,
            next_seq: AtomicI32::new(0),
            config,
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MailState> {
        self.state.lock().expect("client state lock poisoned")
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        let _ = self.connected_tx.send(connected);
    }

    pub(crate) fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Fill in `source` and the sequence id before a message leaves the
    /// client. Server requests carry the reserved sentinel instead of the
    /// counter; a caller-supplied source survives only on Notify messages
    /// when `use_name_as_source` is off.
    pub(crate) fn stamp(&self, msg: &mut Message) {
        if self.config.use_name_as_source || msg.kind != MessageKind::Notify {
            msg.source = self.config.app_name.clone();
        }
        msg.seq = if msg.kind == MessageKind::ServerRequest {
            Sequence::ServerRequest
        } else {
            Sequence::Normal(self.next_seq.fetch_add(1, Ordering::Relaxed))
        };
    }

    /// The single enqueue primitive behind every publish/subscribe call.
    pub(crate) fn post(&self, mut msg: Message) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.stamp(&mut msg);
        self.state().outbox.push(msg);
        true
    }
}

/// Fluent builder for a [`MoosClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    handler: Option<BatchHandler>,
}

impl ClientBuilder {
    /// Create a builder for a client identifying itself as `app_name`.
    pub fn new(app_name: &str) -> Self {
        Self {
            config: ClientConfig {
                app_name: app_name.to_string(),
                ..ClientConfig::default()
            },
            handler: None,
        }
    }

    /// Broker hostname or IP address (default `localhost`).
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    /// Broker port (default 9000).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Reconnect automatically after failures (default true).
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Run-loop frequency in Hz, clamped to (0, 100]. Also re-derives the
    /// keep-alive interval.
    pub fn fundamental_frequency(mut self, hz: f64) -> Self {
        self.config.set_fundamental_frequency(hz);
        self
    }

    /// Inbound mailbox bound (default 1000).
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.config.inbox_capacity = capacity;
        self
    }

    /// Outbound mailbox bound (default 500).
    pub fn outbox_capacity(mut self, capacity: usize) -> Self {
        self.config.outbox_capacity = capacity;
        self
    }

    /// Keep a caller-supplied `source` on Notify messages instead of
    /// overwriting it with the application name.
    pub fn use_name_as_source(mut self, enabled: bool) -> Self {
        self.config.use_name_as_source = enabled;
        self
    }

    /// Back-off delay between reconnect attempts.
    pub fn reconnect_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Register the message-batch callback.
    pub fn on_message_batch<F>(mut self, handler: F) -> Self
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Start the client: spawns the connection engine and returns the
    /// handle.
    ///
    /// Must be called within a tokio runtime. Connection failures are not
    /// surfaced here; the engine retries per the auto-reconnect policy and
    /// reports through [`MoosClient::connected_watch`].
    pub fn start(self) -> MoosClient {
        let shared = Arc::new(Shared::new(self.config, self.handler));
        let engine_task = tokio::spawn(engine::run(shared.clone()));
        MoosClient {
            shared,
            _engine: Some(engine_task),
        }
    }
}

/// Handle to a running MOOS client.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct MoosClient {
    shared: Arc<Shared>,
    _engine: Option<JoinHandle<()>>,
}

impl MoosClient {
    /// Create a builder for a client identifying itself as `app_name`.
    pub fn builder(app_name: &str) -> ClientBuilder {
        ClientBuilder::new(app_name)
    }

    /// The application name this client registers with the broker.
    pub fn name(&self) -> &str {
        &self.shared.config.app_name
    }

    /// Whether the engine currently holds a handshaken connection.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Whether the engine is running (not yet disabled).
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Stop the engine. Idempotent; observed within one run-loop tick.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    /// Observe connection-state changes, e.g. to drive a UI indicator.
    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.shared.subscribe_connected()
    }

    /// Replace the message-batch callback.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        *self
            .shared
            .handler
            .lock()
            .expect("handler lock poisoned") = Some(Box::new(handler));
    }

    /// Enqueue a message for transmission.
    ///
    /// Stamps `source` and the sequence id, then queues it with the
    /// drop-oldest overflow policy. Returns false without enqueueing when
    /// disconnected; the caller may retry after reconnection.
    pub fn post(&self, msg: Message) -> bool {
        self.shared.post(msg)
    }

    /// Publish a value under `variable`, stamped with the current MOOS
    /// time.
    pub fn notify(&self, variable: &str, value: impl Into<MoosValue>) -> bool {
        self.notify_at(variable, value, moos_time())
    }

    /// Publish a value with an explicit timestamp.
    pub fn notify_at(&self, variable: &str, value: impl Into<MoosValue>, timestamp: f64) -> bool {
        self.mark_publishing(variable);
        let msg = Message::with_value(MessageKind::Notify, variable, value.into(), timestamp);
        self.shared.post(msg)
    }

    /// Publish a value with extra provenance in `source_aux`.
    pub fn notify_full(
        &self,
        variable: &str,
        value: impl Into<MoosValue>,
        source_aux: &str,
        timestamp: f64,
    ) -> bool {
        self.mark_publishing(variable);
        let mut msg = Message::with_value(MessageKind::Notify, variable, value.into(), timestamp);
        msg.source_aux = source_aux.to_string();
        self.shared.post(msg)
    }

    fn mark_publishing(&self, variable: &str) {
        self.shared
            .state()
            .publishing
            .insert(variable.to_string());
    }

    /// Subscribe to `variable` at the given minimum update interval in
    /// seconds (0 = every change).
    ///
    /// The subscription intent is always recorded so it survives
    /// reconnects; the returned flag only says whether the register
    /// message was sent right now.
    pub fn register(&self, variable: &str, interval: f64) -> bool {
        let msg = Message::with_double(MessageKind::Register, variable, interval, 1.0);
        let sent = self.shared.post(msg);
        self.shared.state().subscriptions.insert(variable, interval);
        sent
    }

    /// Subscribe to every variable matching `var_pattern` published by
    /// applications matching `app_pattern`.
    pub fn register_wildcard(
        &self,
        var_pattern: &str,
        app_pattern: &str,
        interval: f64,
    ) -> Result<bool> {
        validate_patterns(var_pattern, app_pattern)?;
        let payload = wildcard_payload(var_pattern, app_pattern, interval);
        let msg = Message::with_string(
            MessageKind::WildcardRegister,
            &self.shared.config.app_name,
            &payload,
            moos_time(),
        );
        let sent = self.shared.post(msg);
        self.shared
            .state()
            .subscriptions
            .insert_wildcard(var_pattern, app_pattern, interval);
        Ok(sent)
    }

    /// Drop an exact-name subscription.
    ///
    /// The table entry is removed only once the unregister message is
    /// actually sent; an unknown variable is trivially successful.
    pub fn unregister(&self, variable: &str) -> bool {
        if !self.shared.is_connected() {
            return false;
        }
        if !self.shared.state().subscriptions.contains(variable) {
            return true;
        }
        let msg = Message::with_double(MessageKind::Unregister, variable, 0.0, 0.0);
        if self.shared.post(msg) {
            self.shared.state().subscriptions.remove(variable);
            true
        } else {
            false
        }
    }

    /// Drop a wildcard subscription.
    ///
    /// Always attempts the send when connected, whether or not the pattern
    /// pair was ever registered.
    pub fn unregister_wildcard(&self, var_pattern: &str, app_pattern: &str) -> Result<bool> {
        validate_patterns(var_pattern, app_pattern)?;
        if !self.shared.is_connected() {
            return Ok(false);
        }
        let payload = wildcard_payload(var_pattern, app_pattern, 0.0);
        let msg = Message::with_string(
            MessageKind::WildcardUnregister,
            &self.shared.config.app_name,
            &payload,
            moos_time(),
        );
        let sent = self.shared.post(msg);
        if sent {
            self.shared
                .state()
                .subscriptions
                .remove_wildcard(var_pattern, app_pattern);
        }
        Ok(sent)
    }

    /// Whether an exact-name subscription for `variable` is recorded.
    pub fn is_registered_for(&self, variable: &str) -> bool {
        self.shared.state().subscriptions.contains(variable)
    }

    /// Whether `variable` has been published through this client.
    pub fn is_publishing(&self, variable: &str) -> bool {
        self.shared.state().publishing.contains(variable)
    }

    /// Whether the outbound mailbox is empty.
    pub fn outbox_is_empty(&self) -> bool {
        self.shared.state().outbox.is_empty()
    }
}

fn validate_patterns(var_pattern: &str, app_pattern: &str) -> Result<()> {
    if var_pattern.is_empty() {
        return Err(MoosError::InvalidPattern("empty variable pattern"));
    }
    if app_pattern.is_empty() {
        return Err(MoosError::InvalidPattern("empty application pattern"));
    }
    Ok(())
}

/// Find the most recent message for `variable` in a delivered batch.
///
/// Batches arrive newest-first, so the first match is the freshest.
pub fn find_newest<'a>(messages: &'a [Message], variable: &str) -> Option<&'a Message> {
    messages.iter().find(|m| m.name == variable)
}
