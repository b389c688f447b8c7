//! Command messages and the codec seam
//!
//! Commands (`connect`, `_result`, `onStatus`, ...) travel on the command
//! chunk stream as a serialized name, transaction id, command object and
//! trailing arguments. The session never touches the serialization itself;
//! it goes through a [`CommandCodec`].

use bytes::{Buf, Bytes};

use crate::amf::{Amf0Decoder, Amf0Encoder, AmfValue, ExternalHandler, ExternalHandlers};
use crate::error::{AmfError, ProtocolError, Result};
use crate::protocol::constants::{CMD_ERROR, CMD_RESULT, MSG_COMMAND_AMF0, MSG_COMMAND_AMF3};

/// RTMP command (connect, _result, onStatus, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction ID (0 for notifications)
    pub transaction_id: f64,
    /// Command object (often null for responses)
    pub command_object: AmfValue,
    /// Additional arguments
    pub arguments: Vec<AmfValue>,
    /// Message stream ID (from chunk)
    pub stream_id: u32,
}

/// A reply to an outbound command, keyed by its transaction id
pub type Response = Command;

impl Command {
    pub fn new(name: impl Into<String>, transaction_id: u32) -> Self {
        Self {
            name: name.into(),
            transaction_id: transaction_id as f64,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
            stream_id: 0,
        }
    }

    pub fn with_object(mut self, object: AmfValue) -> Self {
        self.command_object = object;
        self
    }

    pub fn with_argument(mut self, argument: AmfValue) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Transaction id as an integer, `None` when absent or not representable
    pub fn transaction(&self) -> Option<u32> {
        let id = self.transaction_id;
        if id.is_finite() && id >= 0.0 && id <= u32::MAX as f64 && id.fract() == 0.0 {
            Some(id as u32)
        } else {
            None
        }
    }

    pub fn is_result(&self) -> bool {
        self.name == CMD_RESULT
    }

    pub fn is_error(&self) -> bool {
        self.name == CMD_ERROR
    }

    /// Info object of a reply: first argument, falling back to the command object
    pub fn info(&self) -> Option<&AmfValue> {
        self.arguments
            .first()
            .filter(|v| !v.is_null_or_undefined())
            .or(Some(&self.command_object).filter(|v| !v.is_null_or_undefined()))
    }

    /// `code` field of the info object
    pub fn status_code(&self) -> Option<&str> {
        self.info()?.get_string("code")
    }
}

/// Serialization collaborator for command payloads
pub trait CommandCodec: Send + Sync {
    /// Serialize a command into a message payload
    fn encode(&self, command: &Command) -> Result<Bytes>;

    /// Deserialize a command payload of the given message type
    fn decode(&self, message_type: u8, payload: Bytes) -> Result<Command>;

    /// Register a handler for an application-defined (typed) object class
    fn register_external_handler(&self, name: &str, handler: ExternalHandler);
}

/// Default AMF0 codec
///
/// Typed objects are resolved through the handlers registered on it.
/// AMF3 command messages (type 17) carry an AMF0 body behind a leading
/// format byte, which is skipped.
#[derive(Debug, Clone, Default)]
pub struct Amf0CommandCodec {
    external: ExternalHandlers,
}

impl Amf0CommandCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn external_handlers(&self) -> &ExternalHandlers {
        &self.external
    }
}

impl CommandCodec for Amf0CommandCodec {
    fn encode(&self, command: &Command) -> Result<Bytes> {
        let mut encoder = Amf0Encoder::new();
        encoder.encode(&AmfValue::String(command.name.clone()));
        encoder.encode(&AmfValue::Number(command.transaction_id));
        encoder.encode(&command.command_object);
        encoder.encode_all(&command.arguments);
        Ok(encoder.finish())
    }

    fn decode(&self, message_type: u8, mut payload: Bytes) -> Result<Command> {
        match message_type {
            MSG_COMMAND_AMF0 => {}
            MSG_COMMAND_AMF3 => {
                if payload.has_remaining() {
                    payload.advance(1);
                }
            }
            other => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "message type {} is not a command",
                    other
                ))
                .into())
            }
        }

        let mut decoder = Amf0Decoder::with_external_handlers(self.external.clone());

        let name = match decoder.decode(&mut payload)? {
            AmfValue::String(s) => s,
            _ => return Err(ProtocolError::InvalidCommand("Expected command name".into()).into()),
        };

        // Some servers omit or mangle the transaction id on notifications
        let transaction_id = match decoder.decode(&mut payload) {
            Ok(AmfValue::Number(n)) => n,
            Ok(_) | Err(AmfError::UnexpectedEof) => 0.0,
            Err(e) => return Err(e.into()),
        };

        let command_object = if payload.has_remaining() {
            decoder.decode(&mut payload)?
        } else {
            AmfValue::Null
        };

        let mut arguments = Vec::new();
        while payload.has_remaining() {
            match decoder.decode(&mut payload) {
                Ok(v) => arguments.push(v),
                Err(AmfError::UnexpectedEof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Command {
            name,
            transaction_id,
            command_object,
            arguments,
            stream_id: 0,
        })
    }

    fn register_external_handler(&self, name: &str, handler: ExternalHandler) {
        self.external.register(name, handler);
    }
}
