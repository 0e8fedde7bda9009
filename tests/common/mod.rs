//! Stub broker helpers shared by the integration tests.
//!
//! The broker side of the protocol is driven inline from the test body:
//! the client engine runs on its own task, so awaiting here lets both
//! sides make progress on the test runtime.

#![allow(dead_code)]

use moos_client::protocol::{Message, MessageKind, Packet};
use moos_client::time::moos_time;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// The 32-byte connection prologue starts with this literal.
pub const GREETING: &str = "ELKS CAN'T DANCE 2/8/10";

/// Read one length-prefixed frame and decode its messages.
pub async fn read_frame(peer: &mut TcpStream) -> Vec<Message> {
    let mut prefix = [0u8; 4];
    peer.read_exact(&mut prefix).await.unwrap();
    let len = i32::from_le_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    peer.read_exact(&mut body).await.unwrap();

    let mut packet = Packet::new();
    packet.feed(&prefix).unwrap();
    packet.feed(&body).unwrap();
    packet.into_messages().unwrap()
}

/// Send one frame containing the given messages.
pub async fn write_frame(peer: &mut TcpStream, messages: &[Message]) {
    peer.write_all(&Packet::encode_all(messages)).await.unwrap();
}

/// Keep reading frames until a message of `kind` shows up.
pub async fn wait_for_kind(peer: &mut TcpStream, kind: MessageKind) -> Message {
    loop {
        for msg in read_frame(peer).await {
            if msg.kind == kind {
                return msg;
            }
        }
    }
}

/// A Welcome message stamped with the current clock (no skew).
pub fn welcome_now() -> Message {
    Message::with_string(MessageKind::Welcome, "", "welcome", moos_time())
}

/// Accept one client connection and complete the handshake on the broker
/// side: read and check the prologue, read the hello frame, answer with
/// `welcome`.
pub async fn accept_handshake(listener: &TcpListener, welcome: Message) -> TcpStream {
    let (mut peer, _) = listener.accept().await.unwrap();

    let mut greeting = [0u8; 32];
    peer.read_exact(&mut greeting).await.unwrap();
    assert!(greeting.starts_with(GREETING.as_bytes()));
    assert!(greeting[GREETING.len()..].iter().all(|&b| b == 0));

    let hello = read_frame(&mut peer).await;
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0].kind, MessageKind::Data);
    assert_eq!(hello[0].name, "");

    write_frame(&mut peer, &[welcome]).await;
    peer
}
