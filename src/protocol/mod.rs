//! RTMP wire protocol implementation
//!
//! This module handles the low-level protocol details:
//! - Handshake (C0C1C2/S0S1S2 exchange)
//! - Chunk stream multiplexing and demultiplexing
//! - Protocol control messages
//! - Command model and its codec seam

pub mod chunk;
pub mod command;
pub mod constants;
pub mod control;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder};
pub use command::{Amf0CommandCodec, Command, CommandCodec, Response};
pub use control::{ControlMessage, UserControlEvent};
pub use handshake::Handshake;
pub use message::Message;
