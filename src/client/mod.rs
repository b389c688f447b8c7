//! RTMP client implementation
//!
//! Session lifecycle, the send/receive/route pipeline and transaction
//! correlation for talking to any RTMP server.

pub mod config;
pub mod handler;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod state;
pub mod transactions;
pub mod transport;

pub use config::{ClientConfig, ParsedUrl, Scheme};
pub use handler::{LoggingHandler, MessageHandler};
pub use session::{ClientHandle, RtmpClient};
pub use state::SessionState;
