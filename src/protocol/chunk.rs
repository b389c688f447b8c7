//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a header
//! that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+----------------+-------------------+
//! | Basic Header| Message Header | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)       |
//! +-------------+----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 320-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//!
//! Extended timestamp (4 bytes) follows the message header when the 24-bit
//! field is 0xFFFFFF, and is repeated on every fmt 3 chunk of that message.
//! ```
//!
//! Each direction keeps one channel state per chunk stream id. The decoder
//! never consumes a partial chunk: bytes stay in the caller's buffer until the
//! whole chunk (headers and data) is present.
//!
//! Reference: RTMP Specification Section 5.3

use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;
use crate::protocol::message::Message;

/// Header fields remembered per chunk stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ChunkHeader {
    /// Absolute timestamp of the current message
    timestamp: u32,
    /// Delta applied when a fmt 3 chunk starts a new message
    timestamp_delta: u32,
    /// Declared message length
    length: u32,
    message_type: u8,
    stream_id: u32,
    /// Chunks of this message carry the 4-byte extended timestamp
    extended: bool,
}

/// Inbound per-chunk-stream state
#[derive(Debug, Default)]
struct InboundChannel {
    header: Option<ChunkHeader>,
    /// Reassembly buffer for the message in progress
    buffer: BytesMut,
    /// Bytes still missing from the message in progress
    remaining: u32,
    /// Set after a framing error; cleared only by a new decoder
    unusable: bool,
}

impl InboundChannel {
    fn poison(&mut self, err: ProtocolError) -> crate::Error {
        self.unusable = true;
        self.buffer.clear();
        self.remaining = 0;
        err.into()
    }
}

/// Outbound per-chunk-stream state
#[derive(Debug, Default)]
struct OutboundChannel {
    header: Option<ChunkHeader>,
    /// Stored delta was written by a fmt 1/2 header rather than implied by fmt 0
    delta_sent: bool,
}

/// Result of parsing a single chunk
enum ChunkProgress {
    /// Buffer does not hold a complete chunk yet
    NeedMore,
    /// A chunk was consumed but its message is not complete
    Partial,
    /// A chunk completed a message
    Complete(Message),
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly.
pub struct ChunkDecoder {
    /// Maximum incoming chunk size
    chunk_size: u32,
    /// Per-chunk-stream state
    channels: HashMap<u32, InboundChannel>,
    /// Maximum message size (sanity limit)
    max_message_size: u32,
}

impl ChunkDecoder {
    /// Create a new decoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channels: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Create a decoder that refuses messages declaring more than `max` bytes
    pub fn with_max_message_size(max: u32) -> Self {
        Self {
            max_message_size: max.min(MAX_MESSAGE_SIZE),
            ..Self::new()
        }
    }

    /// Set the chunk size (called when receiving SetChunkSize message)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Number of chunk streams observed so far
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Decode chunks from the buffer until a message completes
    ///
    /// Returns Ok(Some(message)) if a complete message was decoded,
    /// Ok(None) if more data is needed, or Err on protocol error.
    /// Consumed chunks are removed from `buf`; a trailing partial chunk is
    /// left in place.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            match self.decode_chunk(buf)? {
                ChunkProgress::NeedMore => return Ok(None),
                ChunkProgress::Partial => continue,
                ChunkProgress::Complete(message) => return Ok(Some(message)),
            }
        }
    }

    fn decode_chunk(&mut self, buf: &mut BytesMut) -> Result<ChunkProgress> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(v) => v,
            None => return Ok(ChunkProgress::NeedMore),
        };

        let chunk_size = self.chunk_size;
        let max_message_size = self.max_message_size;
        let channel = self.channels.entry(csid).or_default();

        if channel.unusable {
            return Err(ProtocolError::ChannelUnusable(csid).into());
        }

        let prior = match (fmt, channel.header) {
            (CHUNK_FMT_0, prior) => prior.unwrap_or_default(),
            (_, Some(prior)) => prior,
            (_, None) => return Err(channel.poison(ProtocolError::NoPriorHeader { csid })),
        };

        let in_progress = channel.remaining > 0;
        if fmt != CHUNK_FMT_3 && in_progress {
            return Err(channel.poison(ProtocolError::HeaderMidMessage { csid }));
        }

        let msg_header_len = match fmt {
            CHUNK_FMT_0 => 11,
            CHUNK_FMT_1 => 7,
            CHUNK_FMT_2 => 3,
            _ => 0,
        };

        if buf.len() < basic_len + msg_header_len {
            return Ok(ChunkProgress::NeedMore);
        }

        let fields = &buf[basic_len..basic_len + msg_header_len];
        let timestamp_field = if fmt == CHUNK_FMT_3 {
            0
        } else {
            read_u24(&fields[0..3])
        };

        let extended = if fmt == CHUNK_FMT_3 {
            prior.extended
        } else {
            timestamp_field >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let header_len = basic_len + msg_header_len + if extended { 4 } else { 0 };

        if buf.len() < header_len {
            return Ok(ChunkProgress::NeedMore);
        }

        let timestamp_value = if extended && fmt != CHUNK_FMT_3 {
            let at = basic_len + msg_header_len;
            u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
        } else {
            timestamp_field
        };

        let header = match fmt {
            CHUNK_FMT_0 => ChunkHeader {
                timestamp: timestamp_value,
                timestamp_delta: 0,
                length: read_u24(&fields[3..6]),
                message_type: fields[6],
                stream_id: u32::from_le_bytes([fields[7], fields[8], fields[9], fields[10]]),
                extended,
            },
            CHUNK_FMT_1 => ChunkHeader {
                timestamp: prior.timestamp.wrapping_add(timestamp_value),
                timestamp_delta: timestamp_value,
                length: read_u24(&fields[3..6]),
                message_type: fields[6],
                stream_id: prior.stream_id,
                extended,
            },
            CHUNK_FMT_2 => ChunkHeader {
                timestamp: prior.timestamp.wrapping_add(timestamp_value),
                timestamp_delta: timestamp_value,
                extended,
                ..prior
            },
            _ if in_progress => prior,
            _ => ChunkHeader {
                timestamp: prior.timestamp.wrapping_add(prior.timestamp_delta),
                ..prior
            },
        };

        if header.length > max_message_size {
            return Err(channel.poison(ProtocolError::MessageTooLarge {
                size: header.length,
                max: max_message_size,
            }));
        }

        let remaining = if in_progress {
            channel.remaining
        } else {
            header.length
        };
        let data_len = remaining.min(chunk_size) as usize;

        if buf.len() < header_len + data_len {
            return Ok(ChunkProgress::NeedMore);
        }

        // Whole chunk is present: commit
        buf.advance(header_len);
        let data = buf.split_to(data_len);

        if !in_progress {
            channel.buffer = BytesMut::with_capacity(header.length as usize);
        }

        let received = channel.buffer.len() + data.len();
        if received > header.length as usize {
            return Err(channel.poison(ProtocolError::MessageOverflow {
                csid,
                declared: header.length,
                received: received as u32,
            }));
        }

        channel.buffer.put_slice(&data);
        channel.remaining = remaining - data_len as u32;
        channel.header = Some(header);

        if channel.remaining > 0 {
            return Ok(ChunkProgress::Partial);
        }

        let payload = channel.buffer.split().freeze();
        Ok(ChunkProgress::Complete(Message {
            csid,
            message_type: header.message_type,
            timestamp: header.timestamp,
            stream_id: header.stream_id,
            payload,
            transaction_id: None,
        }))
    }

    /// Abort a message on a chunk stream (when receiving Abort message)
    ///
    /// The stored header survives so the next message may still use
    /// compressed headers.
    pub fn abort(&mut self, csid: u32) {
        if let Some(channel) = self.channels.get_mut(&csid) {
            channel.buffer.clear();
            channel.remaining = 0;
        }
    }

    /// Whether a framing error has made `csid` unusable
    pub fn is_unusable(&self, csid: u32) -> bool {
        self.channels.get(&csid).map(|c| c.unusable).unwrap_or(false)
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk stream encoder
///
/// Encodes messages into chunks for transmission.
pub struct ChunkEncoder {
    /// Outgoing chunk size
    chunk_size: u32,
    /// Per-chunk-stream state for compression
    channels: HashMap<u32, OutboundChannel>,
}

impl ChunkEncoder {
    /// Create a new encoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            channels: HashMap::new(),
        }
    }

    /// Set the chunk size (call before encoding to use larger chunks)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks, returning the number of chunks written
    pub fn encode(&mut self, message: &Message, buf: &mut BytesMut) -> Result<usize> {
        message.validate()?;
        let csid = message.csid;

        let chunk_size = self.chunk_size as usize;
        let channel = self.channels.entry(csid).or_default();
        let fmt = select_format(message, channel);

        let header = match (fmt, channel.header) {
            (CHUNK_FMT_3, Some(prior)) => ChunkHeader {
                timestamp: message.timestamp,
                ..prior
            },
            (CHUNK_FMT_1 | CHUNK_FMT_2, Some(prior)) => ChunkHeader {
                timestamp: message.timestamp,
                timestamp_delta: message.timestamp.wrapping_sub(prior.timestamp),
                length: message.len(),
                message_type: message.message_type,
                stream_id: message.stream_id,
                extended: false,
            },
            _ => ChunkHeader {
                timestamp: message.timestamp,
                timestamp_delta: 0,
                length: message.len(),
                message_type: message.message_type,
                stream_id: message.stream_id,
                extended: message.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD,
            },
        };
        channel.header = Some(header);
        match fmt {
            CHUNK_FMT_0 => channel.delta_sent = false,
            CHUNK_FMT_1 | CHUNK_FMT_2 => channel.delta_sent = true,
            _ => {}
        }

        let payload = &message.payload;
        let mut offset = 0;
        let mut chunks = 0;

        loop {
            let first_chunk = chunks == 0;
            let data_len = (payload.len() - offset).min(chunk_size);

            write_basic_header(csid, if first_chunk { fmt } else { CHUNK_FMT_3 }, buf);

            if first_chunk {
                match fmt {
                    CHUNK_FMT_0 => {
                        let field = if header.extended {
                            EXTENDED_TIMESTAMP_THRESHOLD
                        } else {
                            header.timestamp
                        };
                        write_u24(field, buf);
                        write_u24(header.length, buf);
                        buf.put_u8(header.message_type);
                        buf.put_u32_le(header.stream_id); // Stream ID is little-endian!
                    }
                    CHUNK_FMT_1 => {
                        write_u24(header.timestamp_delta, buf);
                        write_u24(header.length, buf);
                        buf.put_u8(header.message_type);
                    }
                    CHUNK_FMT_2 => {
                        write_u24(header.timestamp_delta, buf);
                    }
                    _ => {}
                }
            }

            if header.extended {
                buf.put_u32(header.timestamp);
            }

            buf.put_slice(&payload[offset..offset + data_len]);
            offset += data_len;
            chunks += 1;

            if offset >= payload.len() {
                break;
            }
        }

        Ok(chunks)
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Select the most compact header format the decoder can still follow
fn select_format(message: &Message, channel: &OutboundChannel) -> u8 {
    // First message on this stream must use format 0
    let prior = match channel.header {
        Some(p) => p,
        None => return CHUNK_FMT_0,
    };

    if message.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD
        || message.stream_id != prior.stream_id
        || message.timestamp < prior.timestamp
    {
        return CHUNK_FMT_0;
    }

    let delta = message.timestamp - prior.timestamp;
    if delta >= EXTENDED_TIMESTAMP_THRESHOLD {
        return CHUNK_FMT_0;
    }

    if message.message_type != prior.message_type || message.len() != prior.length {
        return CHUNK_FMT_1;
    }

    // Peers disagree on the delta a fmt 3 implies after fmt 0
    if channel.delta_sent && delta == prior.timestamp_delta {
        return CHUNK_FMT_3;
    }

    CHUNK_FMT_2
}

/// Parse basic header and return (fmt, csid, header_length)
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = (first >> 6) & 0x03;

    match first & 0x3F {
        0 => {
            // 2-byte header: csid = 64 + second byte
            let second = *buf.get(1)?;
            Some((fmt, 64 + second as u32, 2))
        }
        1 => {
            // 3-byte header: csid = 64 + second + third*256
            if buf.len() < 3 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3))
        }
        csid => Some((fmt, csid as u32, 1)),
    }
}

/// Write basic header
fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        buf.put_u8((fmt << 6) | 1);
        let offset = csid - 64;
        buf.put_u8((offset & 0xFF) as u8);
        buf.put_u8(((offset >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
}

/// Write 24-bit big-endian value
fn write_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}
