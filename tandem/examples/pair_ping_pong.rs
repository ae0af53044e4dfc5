//! PAIR ping-pong over TCP.
//!
//! Run with `RUST_LOG=debug cargo run --example pair_ping_pong` to see the
//! dispatcher and handshake at work.

use std::thread;
use tandem::prelude::*;
use tracing_subscriber::EnvFilter;

const ROUNDS: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== PAIR Ping-Pong Demo ===\n");

    let ctx = Context::new();
    let server = ctx.socket(SocketType::Pair)?;
    let endpoint = server.bind("tcp://127.0.0.1:*")?;
    println!("Server bound to {endpoint}");

    let client = ctx.socket(SocketType::Pair)?;
    client.connect(&endpoint.to_string())?;
    println!("Client connected\n");

    thread::scope(|s| -> tandem::Result<()> {
        s.spawn(|| -> tandem::Result<()> {
            for _ in 0..ROUNDS {
                let ping = server.recv(Flags::NONE)?;
                println!("[Server] {ping}");
                server.send(format!("pong ({} bytes seen)", ping.len()), Flags::NONE)?;
            }
            Ok(())
        });

        for i in 1..=ROUNDS {
            client.send(format!("ping #{i}"), Flags::NONE)?;
            let pong = client.recv(Flags::NONE)?;
            println!("[Client] {pong}");
        }
        Ok(())
    })?;

    println!("\n=== Demo Complete ===");
    Ok(())
}
