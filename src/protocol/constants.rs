//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default port for `rtmp://` URLs
pub const RTMP_PORT: u16 = 1935;

/// Default port for `rtmps://` URLs
pub const RTMPS_PORT: u16 = 443;

/// Handshake packet size (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Random section of C1: everything after timestamp and zero field
pub const HANDSHAKE_RANDOM_SIZE: usize = HANDSHAKE_SIZE - 8;

/// Default chunk size
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Maximum chunk size allowed
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF;

/// Largest length a message header can declare (24-bit field)
pub const MAX_MESSAGE_SIZE: u32 = 0xFFFFFF;

/// Timestamps >= this value require the extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

/// Largest chunk stream id a 3-byte basic header can carry
pub const MAX_CSID: u32 = 65599;

/// Default window acknowledgement size (2.5 MB)
pub const DEFAULT_WINDOW_SIZE: u32 = 2_500_000;

// ============================================================================
// Chunk Stream IDs (CSID)
// ============================================================================

/// Protocol control messages (Set Chunk Size, Abort, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, _result, onStatus, ...)
pub const CSID_COMMAND: u32 = 3;

// ============================================================================
// Message Type IDs
// ============================================================================

/// Set Chunk Size (1)
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// Abort Message (2)
pub const MSG_ABORT: u8 = 2;

/// Acknowledgement (3)
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;

/// User Control Message (4)
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (5)
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (6)
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message (8)
pub const MSG_AUDIO: u8 = 8;

/// Video Message (9)
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Command Message (17)
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18)
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (20)
pub const MSG_COMMAND_AMF0: u8 = 20;

// ============================================================================
// User Control Event Types
// ============================================================================

pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_STREAM_EOF: u16 = 1;
pub const UC_STREAM_DRY: u16 = 2;
pub const UC_SET_BUFFER_LENGTH: u16 = 3;
pub const UC_STREAM_IS_RECORDED: u16 = 4;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Peer Bandwidth Limit Types
// ============================================================================

pub const BANDWIDTH_LIMIT_HARD: u8 = 0;
pub const BANDWIDTH_LIMIT_SOFT: u8 = 1;
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

// ============================================================================
// Commands and status codes
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";
pub const CMD_ON_STATUS: &str = "onStatus";

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";

// ============================================================================
// Chunk Header Format Types (fmt field)
// ============================================================================

/// Type 0: Full header (11 bytes) - timestamp, length, type, stream ID
pub const CHUNK_FMT_0: u8 = 0;

/// Type 1: No stream ID (7 bytes) - timestamp delta, length, type
pub const CHUNK_FMT_1: u8 = 1;

/// Type 2: Timestamp delta only (3 bytes)
pub const CHUNK_FMT_2: u8 = 2;

/// Type 3: No header (0 bytes) - use previous chunk's values
pub const CHUNK_FMT_3: u8 = 3;
