//! rtmp-session: client-side RTMP transport engine
//!
//! This library establishes RTMP sessions and carries messages over them:
//! - Plain (`rtmp://`) and TLS (`rtmps://`) transports
//! - The C0/C1/C2 handshake
//! - Chunk stream framing and reassembly with header compression
//! - Protocol control handling (chunk size, windows, bandwidth, ping)
//! - Concurrent send/receive/route loops with transaction correlation
//!
//! Publishing, playing and interpreting media are left to the application,
//! which receives uninterpreted messages through a [`MessageHandler`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rtmp_session::{ClientConfig, Command, RtmpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RtmpClient::new(ClientConfig::new("rtmp://localhost/live"));
//!     client.connect().await?;
//!
//!     let reply = client
//!         .call_command(Command::new("createStream", 0), Duration::from_secs(5))
//!         .await?;
//!     println!("stream id: {:?}", reply.arguments.first());
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod protocol;
pub mod stats;

// Re-export main types for convenience
pub use amf::{AmfValue, ExternalHandler};
pub use client::{ClientConfig, ClientHandle, MessageHandler, RtmpClient, SessionState};
pub use error::{Error, Result};
pub use protocol::{Amf0CommandCodec, Command, CommandCodec, Message, Response};
pub use stats::SessionStats;
