//! The connection engine: connect, handshake, run loop, reconnect.
//!
//! One background task owns the socket and drives the whole state machine:
//!
//! ```text
//! Idle → Connecting → Handshaking → Running → Closing → Idle
//!           ▲                                    │
//!           └──────── reconnect back-off ◄───────┘
//! ```
//!
//! Each run-loop tick sends the drained outbox (or a keep-alive when idle),
//! pulls every frame the socket has ready without blocking, and hands the
//! inbox to the message handler. On any failure the socket is closed and,
//! while auto-reconnect is on, the engine loops back to `Connecting` and
//! replays the subscription table after the next successful handshake.
//! Disabling the client is checked once per tick and ends the task
//! (`Stopped`).

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::Instant;

use crate::client::Shared;
use crate::config::ClientConfig;
use crate::error::{MoosError, Result};
use crate::protocol::{Message, MessageKind, Packet};
use crate::subscription::wildcard_payload;
use crate::time::{compute_warp, moos_time, set_time_warp};

/// Protocol identifier sent as the first bytes of every connection.
const PROTOCOL_GREETING: &str = "ELKS CAN'T DANCE 2/8/10";

/// The greeting is zero-padded to this fixed size.
const GREETING_SIZE: usize = 32;

/// How many times to poll for a Welcome before giving up.
const HANDSHAKE_ATTEMPTS: u32 = 50;

/// Pause between handshake polls (50 × 300 ms ≈ 15 s total).
const HANDSHAKE_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Send/receive buffer size requested for the broker socket.
const SOCKET_BUFFER_SIZE: u32 = 4_000_000;

/// Drive the client until it is disabled.
pub(crate) async fn run(shared: Arc<Shared>) {
    while shared.is_enabled() {
        session(&shared).await;

        // Closing: mailboxes do not survive the connection.
        {
            let mut state = shared.state();
            state.outbox.clear();
            state.inbox.clear();
        }
        shared.set_connected(false);

        if !shared.is_enabled() || !shared.config.auto_reconnect {
            break;
        }
        tokio::time::sleep(shared.config.reconnect_delay).await;
    }
    shared.enabled.store(false, std::sync::atomic::Ordering::Release);
    shared.set_connected(false);
    tracing::debug!("engine stopped");
}

/// One connect → handshake → run cycle.
async fn session(shared: &Shared) {
    let mut stream = match connect(&shared.config).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(error = %e, "connect failed");
            return;
        }
    };

    if let Err(e) = handshake(
        &mut stream,
        shared,
        HANDSHAKE_ATTEMPTS,
        HANDSHAKE_POLL_INTERVAL,
    )
    .await
    {
        tracing::warn!(error = %e, "handshake failed");
        return;
    }

    tracing::info!(
        host = %shared.config.host,
        port = shared.config.port,
        name = %shared.config.app_name,
        "connected to broker"
    );
    shared.set_connected(true);
    replay_subscriptions(shared);

    match run_loop(&mut stream, shared).await {
        Ok(()) => tracing::debug!("client disabled, closing connection"),
        Err(e) => tracing::warn!(error = %e, "connection lost"),
    }
}

/// Open a TCP connection to the configured broker.
async fn connect(config: &ClientConfig) -> Result<TcpStream> {
    let connect_err = |source: io::Error| MoosError::Connect {
        host: config.host.clone(),
        port: config.port,
        source,
    };

    let addrs = lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(connect_err)?;

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for addr in addrs {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(connect_err)?;

        // Large buffers, low latency; not every platform honors both.
        let _ = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE);
        let _ = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE);

        match socket.connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(connect_err)?;
                return Ok(stream);
            }
            Err(e) => last_err = e,
        }
    }
    Err(connect_err(last_err))
}

/// Negotiate the protocol with the broker.
///
/// Sends the fixed greeting plus a Data message naming this client, then
/// polls for a Welcome. A Poison reply rejects the handshake; anything
/// else is ignored while waiting.
async fn handshake(
    stream: &mut TcpStream,
    shared: &Shared,
    attempts: u32,
    poll_interval: Duration,
) -> Result<()> {
    tracing::debug!(name = %shared.config.app_name, "handshaking");

    let mut greeting = [0u8; GREETING_SIZE];
    greeting[..PROTOCOL_GREETING.len()].copy_from_slice(PROTOCOL_GREETING.as_bytes());
    stream.write_all(&greeting).await?;

    let hello = Message::with_string(
        MessageKind::Data,
        "",
        &shared.config.app_name,
        moos_time(),
    );
    stream.write_all(&Packet::encode_all(&[hello])).await?;

    let mut packet = Packet::new();
    for _ in 0..attempts {
        tokio::time::sleep(poll_interval).await;
        if !shared.is_enabled() {
            return Err(MoosError::ConnectionClosed);
        }

        for msg in read_available_frames(stream, &mut packet)?.into_iter().flatten() {
            match msg.kind {
                MessageKind::Welcome => {
                    let local = moos_time();
                    if let Some(warp) = compute_warp(msg.timestamp, local) {
                        tracing::info!(warp, "time warp detected");
                        set_time_warp(warp);
                    }
                    tracing::debug!(skew = msg.double_value, "welcome received");
                    return Ok(());
                }
                MessageKind::Poison => {
                    return Err(MoosError::HandshakeRejected(
                        msg.as_str().unwrap_or_default().to_string(),
                    ));
                }
                other => {
                    tracing::debug!(kind = ?other, "ignoring message while waiting for welcome");
                }
            }
        }
    }
    Err(MoosError::HandshakeTimeout)
}

/// Re-send every recorded subscription after a fresh handshake.
fn replay_subscriptions(shared: &Shared) {
    let (exact, wildcards) = {
        let state = shared.state();
        (
            state.subscriptions.exact_entries(),
            state.subscriptions.wildcard_entries(),
        )
    };

    for (variable, interval) in exact {
        let msg = Message::with_double(MessageKind::Register, &variable, interval, 1.0);
        if !shared.post(msg) {
            tracing::warn!(variable = %variable, "failed to replay registration");
        }
    }
    for (var_pattern, app_pattern, interval) in wildcards {
        let payload = wildcard_payload(&var_pattern, &app_pattern, interval);
        let msg = Message::with_string(
            MessageKind::WildcardRegister,
            &shared.config.app_name,
            &payload,
            moos_time(),
        );
        if !shared.post(msg) {
            tracing::warn!(pattern = %var_pattern, "failed to replay wildcard registration");
        }
    }
}

/// The fixed-frequency send/receive loop.
///
/// Returns `Ok(())` when the client is disabled, `Err` on connection
/// failure.
async fn run_loop(stream: &mut TcpStream, shared: &Shared) -> Result<()> {
    let period = shared.config.tick_period();
    let keep_alive = shared.config.keep_alive;
    let mut packet = Packet::new();
    // First idle tick fires a keep-alive straight away.
    let mut last_send: Option<Instant> = None;

    loop {
        tokio::time::sleep(period).await;
        if !shared.is_enabled() {
            return Ok(());
        }

        // Send everything queued as one frame, or keep the connection
        // ticking over when idle.
        let batch = shared.state().outbox.drain();
        if !batch.is_empty() {
            stream.write_all(&Packet::encode_all(&batch)).await?;
            last_send = Some(Instant::now());
        } else if last_send.map_or(true, |t| t.elapsed() > keep_alive) {
            let mut msg = Message::null();
            shared.stamp(&mut msg);
            stream.write_all(&Packet::encode_all(&[msg])).await?;
            last_send = Some(Instant::now());
        }

        // Pull every frame currently available without blocking.
        let frames = read_available_frames(stream, &mut packet)?;
        if !frames.is_empty() {
            let mut state = shared.state();
            for messages in frames {
                state.inbox.push_frame(messages);
            }
        }

        // Swap the inbox out and hand the batch over, newest frame first.
        let batch = {
            let mut state = shared.state();
            if state.inbox.is_empty() {
                Vec::new()
            } else {
                state.inbox.take_all()
            }
        };
        if !batch.is_empty() {
            let mut handler = shared.handler.lock().expect("handler lock poisoned");
            match handler.as_mut() {
                Some(handler) => handler(batch),
                None => {
                    for msg in &batch {
                        tracing::debug!(
                            variable = %msg.name,
                            "no message handler registered, discarding"
                        );
                    }
                }
            }
        }
    }
}

/// Read and decode as many complete frames as the socket has ready.
///
/// Asks for exactly the bytes the current frame still needs, so a read
/// never strays into the next frame. Frames that fail to decode are
/// dropped with a warning; framing-level failures (compression, absurd
/// lengths, EOF) tear the connection down.
fn read_available_frames(
    stream: &TcpStream,
    packet: &mut Packet,
) -> Result<Vec<Vec<Message>>> {
    let mut frames = Vec::new();
    let mut scratch = [0u8; 64 * 1024];

    loop {
        let want = packet.still_needed().min(scratch.len());
        match stream.try_read(&mut scratch[..want]) {
            Ok(0) => return Err(MoosError::ConnectionClosed),
            Ok(n) => {
                packet.feed(&scratch[..n])?;
                if packet.is_complete() {
                    let complete = std::mem::take(packet);
                    match complete.into_messages() {
                        Ok(messages) => frames.push(messages),
                        Err(e) => tracing::warn!(error = %e, "dropping undecodable frame"),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(frames),
            Err(e) => return Err(e.into()),
        }
    }
}
