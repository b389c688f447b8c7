//! Unified error types for rtmp-session

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all session operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network operations
    Io(io::Error),
    /// TLS setup or negotiation failure
    Tls(String),
    /// Chunk framing violation
    Protocol(ProtocolError),
    /// Command payload encoding/decoding error
    Amf(AmfError),
    /// Handshake failure
    Handshake(HandshakeError),
    /// Connect command answered with `_error` or an unexpected reply
    Rejected(String),
    /// Dial or handshake did not finish in time
    Timeout,
    /// No response arrived for a call before its deadline
    ResponseTimeout { transaction_id: u32 },
    /// Connection was closed
    ConnectionClosed,
    /// Operation requires a live session
    NotConnected,
    /// Connect attempted on a session that was not reset first
    AlreadyConnected,
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Tls(msg) => write!(f, "TLS error: {}", msg),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Rejected(msg) => write!(f, "Connection rejected: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ResponseTimeout { transaction_id } => {
                write!(f, "Response timeout for transaction {}", transaction_id)
            }
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::NotConnected => write!(f, "Session is not connected"),
            Error::AlreadyConnected => write!(f, "Session is already connected"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Handshake(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Whether this error ended a connect attempt before the session came up
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Tls(_) | Error::Handshake(_) | Error::Timeout
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<AmfError> for Error {
    fn from(err: AmfError) -> Self {
        Error::Amf(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

/// Chunk framing errors
///
/// Every variant carrying a `csid` leaves that chunk stream unusable until
/// the session is reset.
#[derive(Debug)]
pub enum ProtocolError {
    /// fmt 1/2/3 chunk on a chunk stream that never carried a full header
    NoPriorHeader { csid: u32 },
    /// A header chunk arrived while a message was still being reassembled
    HeaderMidMessage { csid: u32 },
    /// Reassembled data would exceed the declared message length
    MessageOverflow {
        csid: u32,
        declared: u32,
        received: u32,
    },
    /// Declared length above the sanity limit
    MessageTooLarge { size: u32, max: u32 },
    /// Chunk stream was poisoned by an earlier framing error
    ChannelUnusable(u32),
    /// Chunk stream id outside the encodable range
    InvalidChunkStreamId(u32),
    /// Control message payload too short or malformed
    InvalidControlMessage { message_type: u8 },
    /// Message is missing a field required for the operation
    MissingField(String),
    /// Command payload did not have the expected shape
    InvalidCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::NoPriorHeader { csid } => {
                write!(f, "No prior header recorded for chunk stream {}", csid)
            }
            ProtocolError::HeaderMidMessage { csid } => {
                write!(f, "New message header mid-message on chunk stream {}", csid)
            }
            ProtocolError::MessageOverflow {
                csid,
                declared,
                received,
            } => write!(
                f,
                "Chunk stream {} overflowed declared length {} ({} bytes received)",
                csid, declared, received
            ),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::ChannelUnusable(csid) => {
                write!(f, "Chunk stream {} is unusable until reset", csid)
            }
            ProtocolError::InvalidChunkStreamId(id) => {
                write!(f, "Invalid chunk stream ID: {}", id)
            }
            ProtocolError::InvalidControlMessage { message_type } => {
                write!(f, "Invalid control message of type {}", message_type)
            }
            ProtocolError::MissingField(field) => write!(f, "Missing required field: {}", field),
            ProtocolError::InvalidCommand(cmd) => write!(f, "Invalid command: {}", cmd),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    UnknownMarker(u8),
    UnexpectedEof,
    InvalidUtf8,
    InvalidReference(u16),
    NestingTooDeep,
    InvalidObjectEnd,
    /// A registered external handler refused the typed object
    External {
        class_name: String,
        reason: String,
    },
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::InvalidReference(idx) => write!(f, "Invalid AMF reference: {}", idx),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
            AmfError::External { class_name, reason } => {
                write!(f, "External handler for {} failed: {}", class_name, reason)
            }
        }
    }
}

impl std::error::Error for AmfError {}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    /// S0 carried something other than version 3
    InvalidVersion(u8),
    /// Peer closed the stream mid-exchange
    Truncated,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
            HandshakeError::Truncated => write!(f, "Handshake truncated by peer"),
        }
    }
}

impl std::error::Error for HandshakeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn test_error_display() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error"));

        let err = Error::Protocol(ProtocolError::NoPriorHeader { csid: 3 });
        assert!(err.to_string().contains("Protocol error"));
        assert!(err.to_string().contains("chunk stream 3"));

        let err = Error::Amf(AmfError::UnknownMarker(0xFF));
        assert!(err.to_string().contains("0xff"));

        let err = Error::Handshake(HandshakeError::InvalidVersion(6));
        assert!(err.to_string().contains("Handshake error"));
        assert!(err.to_string().contains("6"));

        let err = Error::ResponseTimeout { transaction_id: 42 };
        assert!(err.to_string().contains("42"));

        let err = Error::Rejected("NetConnection.Connect.Rejected".into());
        assert!(err.to_string().contains("Connection rejected"));

        assert!(Error::NotConnected.to_string().contains("not connected"));
        assert!(Error::AlreadyConnected.to_string().contains("already"));
        assert!(Error::ConnectionClosed.to_string().contains("closed"));
    }

    #[test]
    fn test_error_source() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(StdError::source(&err).is_some());

        let err = Error::Protocol(ProtocolError::ChannelUnusable(5));
        assert!(StdError::source(&err).is_some());

        assert!(StdError::source(&Error::Timeout).is_none());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(Error::Timeout.is_connection_error());
        assert!(Error::Handshake(HandshakeError::Truncated).is_connection_error());
        assert!(!Error::ResponseTimeout { transaction_id: 1 }.is_connection_error());
        assert!(!Error::Amf(AmfError::UnexpectedEof).is_connection_error());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::MessageOverflow {
            csid: 4,
            declared: 100,
            received: 140,
        };
        let text = err.to_string();
        assert!(text.contains("100"));
        assert!(text.contains("140"));

        assert!(ProtocolError::MessageTooLarge { size: 1000, max: 500 }
            .to_string()
            .contains("1000"));
        assert!(ProtocolError::HeaderMidMessage { csid: 9 }
            .to_string()
            .contains("9"));
        assert!(ProtocolError::InvalidControlMessage { message_type: 5 }
            .to_string()
            .contains("5"));
    }

    #[test]
    fn test_amf_error_display() {
        assert!(AmfError::UnexpectedEof.to_string().contains("end of AMF"));
        let err = AmfError::External {
            class_name: "flex.messaging.io.ArrayCollection".into(),
            reason: "bad".into(),
        };
        assert!(err.to_string().contains("ArrayCollection"));
    }
}
