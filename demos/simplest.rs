//! Simplest possible MOOS client.
//!
//! This example demonstrates:
//! - Creating a client with the builder pattern
//! - Registering for variables (the intent survives reconnects)
//! - Receiving batched updates through the message handler
//!
//! Run against a broker listening on localhost:9000:
//!
//! ```sh
//! cargo run --example simplest
//! ```

use std::time::Duration;

use moos_client::MoosClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let client = MoosClient::builder("simplest-example")
        .host("localhost")
        .port(9000)
        .on_message_batch(|batch| {
            for msg in &batch {
                if msg.is_double() {
                    println!("received {} = {}", msg.name, msg.double_value);
                } else {
                    println!("received {} = {:?}", msg.name, msg.as_str());
                }
            }
        })
        .start();

    client.register("DEPLOY", 0.0);
    client.register("RETURN", 0.0);

    // Listen for 30 seconds, then quit.
    tokio::time::sleep(Duration::from_secs(30)).await;
    client.disable();
}
