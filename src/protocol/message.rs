//! RTMP message model
//!
//! A [`Message`] is the unit that crosses the outbound and inbound queues:
//! the chunk codec splits it into chunks on the way out and rebuilds it from
//! chunks on the way in.
//!
//! Messages are classified by chunk stream:
//! - Chunk stream 2: protocol control (types 1-6)
//! - Chunk stream 3: commands and their replies (types 17, 20)
//! - Anything else: audio/video/data, passed through uninterpreted
//!
//! Reference: RTMP Specification Section 5.4

use bytes::Bytes;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;
use crate::protocol::control::ControlMessage;

/// A complete RTMP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Chunk stream ID (for multiplexing)
    pub csid: u32,
    /// Message type ID
    pub message_type: u8,
    /// Message timestamp (milliseconds)
    pub timestamp: u32,
    /// Message stream ID
    pub stream_id: u32,
    /// Message payload
    pub payload: Bytes,
    /// Transaction this message expects a reply for (outbound commands only)
    pub transaction_id: Option<u32>,
}

impl Message {
    /// Build a message with zero timestamp and stream id
    pub fn new(csid: u32, message_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            csid,
            message_type,
            timestamp: 0,
            stream_id: 0,
            payload: payload.into(),
            transaction_id: None,
        }
    }

    /// Build an AMF0 command message on the command chunk stream
    pub fn command(payload: impl Into<Bytes>, transaction_id: u32) -> Self {
        Self::new(CSID_COMMAND, MSG_COMMAND_AMF0, payload).with_transaction_id(transaction_id)
    }

    /// Build a protocol control message on chunk stream 2
    pub fn control(control: &ControlMessage) -> Self {
        let (message_type, payload) = control.encode();
        Self::new(CSID_PROTOCOL_CONTROL, message_type, payload)
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: u32) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Payload length as carried in the chunk message header
    ///
    /// Saturates at `u32::MAX`; [`validate`](Self::validate) rejects anything
    /// that long.
    pub fn len(&self) -> u32 {
        u32::try_from(self.payload.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Check that the message can be framed: chunk stream id in
    /// `2..=65599` and payload within the 24-bit length field
    pub fn validate(&self) -> Result<()> {
        if !(CSID_PROTOCOL_CONTROL..=MAX_CSID).contains(&self.csid) {
            return Err(ProtocolError::InvalidChunkStreamId(self.csid).into());
        }
        if self.payload.len() > MAX_MESSAGE_SIZE as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: self.len(),
                max: MAX_MESSAGE_SIZE,
            }
            .into());
        }
        Ok(())
    }

    /// Whether this message travels on the protocol control chunk stream
    pub fn is_protocol_control(&self) -> bool {
        self.csid == CSID_PROTOCOL_CONTROL
    }

    /// Whether this message carries an AMF0/AMF3 command
    pub fn is_command(&self) -> bool {
        matches!(self.message_type, MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3)
    }
}
