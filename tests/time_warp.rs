//! Time-warp negotiation during the handshake.
//!
//! Kept in its own test binary: the warp factor is process-wide, so this
//! is the only test process that mutates it.

mod common;

use std::time::Duration;

use moos_client::protocol::{Message, MessageKind};
use moos_client::time::{moos_time, time_warp};
use moos_client::MoosClient;
use tokio::net::TcpListener;
use tokio::time::timeout;

use common::accept_handshake;

#[tokio::test]
async fn test_skewed_welcome_sets_process_warp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = MoosClient::builder("warped")
        .host("127.0.0.1")
        .port(port)
        .fundamental_frequency(50.0)
        .start();
    let mut connected = client.connected_watch();

    assert_eq!(time_warp(), 1.0);

    // A broker clock running 10x fast is far outside the 10 000-unit
    // tolerance.
    let skewed = Message::with_string(MessageKind::Welcome, "", "welcome", moos_time() * 10.0);
    let _peer = accept_handshake(&listener, skewed).await;

    timeout(Duration::from_secs(10), connected.wait_for(|c| *c))
        .await
        .expect("client never connected")
        .unwrap();

    assert_eq!(time_warp(), 10.0);

    client.disable();
}
