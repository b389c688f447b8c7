//! Connect to an RTMP server and print what it tells us
//!
//! Run with: cargo run --example connect -- rtmp://localhost/live
//!
//! Connects, creates a stream, prints notifications and session statistics,
//! then disconnects.

use std::time::Duration;

use rtmp_session::{ClientConfig, Command, Message, MessageHandler, RtmpClient};

struct Printer;

#[async_trait::async_trait]
impl MessageHandler for Printer {
    async fn on_message(&self, message: Message) {
        println!(
            "message: csid={} type={} len={} ts={}",
            message.csid,
            message.message_type,
            message.len(),
            message.timestamp
        );
    }

    async fn on_notification(&self, command: Command) {
        println!(
            "notification: {} {}",
            command.name,
            command.status_code().unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_session=debug".parse()?)
                .add_directive("connect=info".parse()?),
        )
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: connect <rtmp_url>");
        eprintln!("Example: connect rtmp://localhost/live");
        std::process::exit(1);
    });

    println!("Connecting to {}", url);

    let mut config = ClientConfig::new(&url);
    config.chunk_size = Some(4096);
    let mut client = RtmpClient::new(config).with_handler(Printer);

    client.connect().await?;
    println!(
        "Connected (id: {})",
        client.connection_id().unwrap_or_else(|| "-".into())
    );

    match client
        .call_command(Command::new("createStream", 0), Duration::from_secs(5))
        .await
    {
        Ok(reply) => println!("createStream -> {} {:?}", reply.name, reply.arguments),
        Err(e) => eprintln!("createStream failed: {}", e),
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = client.stats();
    println!("\nSession statistics:");
    println!("  Bytes received: {}", stats.bytes_received);
    println!("  Bytes sent: {}", stats.bytes_sent);
    println!("  Messages received: {}", stats.messages_received);
    println!("  Inbound chunk size: {}", stats.in_chunk_size);
    println!("  Window size: {}", stats.in_window_size);

    client.disconnect().await;
    Ok(())
}
