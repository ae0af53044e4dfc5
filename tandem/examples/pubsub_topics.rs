//! PUB/SUB topic filtering over TCP.
//!
//! One publisher, two subscribers with different prefixes. Run with
//! `RUST_LOG=tandem=trace` to watch messages being filtered at the publisher.

use std::thread;
use std::time::Duration;
use tandem::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== PUB/SUB Topics Demo ===\n");

    let ctx = Context::with_options(
        SocketOptions::default().with_recv_timeout(Duration::from_millis(500)),
    );

    let publisher = ctx.socket(SocketType::Pub)?;
    let endpoint = publisher.bind("tcp://127.0.0.1:*")?;
    println!("Publisher bound to {endpoint}");

    let weather = ctx.socket(SocketType::Sub)?;
    weather.subscribe("weather.")?;
    weather.connect(&endpoint.to_string())?;

    let sports = ctx.socket(SocketType::Sub)?;
    sports.subscribe("sports.")?;
    sports.connect(&endpoint.to_string())?;

    // Subscriptions reach the publisher asynchronously over TCP.
    while publisher.peer_count() < 2 {
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(100));

    for update in [
        "weather.london rain",
        "sports.tennis 6-4",
        "news.local quiet day",
        "weather.lisbon sun",
    ] {
        publisher.send(update, Flags::NONE)?;
        println!("[PUB] {update}");
    }

    for (name, sub) in [("weather", &weather), ("sports", &sports)] {
        loop {
            match sub.recv(Flags::NONE) {
                Ok(msg) => println!("[SUB {name}] {msg}"),
                Err(SocketError::WouldBlock) => break,
                Err(e) => return Err(e.into()),
            }
        }
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
