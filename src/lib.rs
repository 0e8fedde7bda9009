//! # moos-client
//!
//! Rust client for the MOOS publish/subscribe middleware protocol.
//!
//! Processes connect to a central broker over TCP, subscribe to named
//! variables (exact or wildcard pattern), publish typed values and receive
//! batched updates asynchronously.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): the message model, its fixed little-endian
//!   binary codec and length-prefixed packet framing.
//! - **Connection engine**: a background task owning the socket, the
//!   handshake and the fixed-frequency send/receive loop, reconnecting
//!   automatically and replaying subscriptions.
//! - **Client facade** ([`MoosClient`]): publish ("notify"), subscribe
//!   ("register", exact or wildcard) and bounded mailboxes in between.
//!
//! ## Example
//!
//! ```ignore
//! use moos_client::MoosClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = MoosClient::builder("simplest-example")
//!         .on_message_batch(|batch| {
//!             for msg in &batch {
//!                 println!("received {} = {:?}", msg.name, msg.as_str());
//!             }
//!         })
//!         .start();
//!
//!     client.register("DEPLOY", 0.0);
//!     client.register("RETURN", 0.0);
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     client.disable();
//! }
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod time;

mod client;
mod engine;
mod mailbox;
mod subscription;

pub use client::{find_newest, BatchHandler, ClientBuilder, MoosClient};
pub use config::ClientConfig;
pub use error::{MoosError, Result};
pub use protocol::{Message, MessageKind, MoosValue, Sequence, ValueKind};
