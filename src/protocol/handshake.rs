//! RTMP handshake implementation (client side)
//!
//! The RTMP handshake consists of three legs:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |                                        |
//!   |<------ S2 (1536 bytes: echo C1) ------|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! This implementation uses the "simple" handshake (no HMAC digest).
//! S2 is supposed to echo C1's timestamp; plenty of servers get that wrong,
//! so a mismatch is only logged.
//!
//! Reference: RTMP Specification Section 5.2

use bytes::{BufMut, Bytes, BytesMut};
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Client half of the handshake
///
/// Holds C1 so S2 can be checked against it.
#[derive(Debug)]
pub struct Handshake {
    c1: [u8; HANDSHAKE_SIZE],
}

impl Handshake {
    /// Create a handshake with a fresh C1
    pub fn new() -> Self {
        Self {
            c1: generate_packet(),
        }
    }

    /// C0 + C1 (1 + 1536 bytes)
    pub fn c0c1(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&self.c1);
        buf.freeze()
    }

    /// Timestamp carried in the first four bytes of C1
    pub fn timestamp(&self) -> u32 {
        read_timestamp(&self.c1)
    }

    /// Check S0; any version but 3 is fatal
    pub fn check_version(&self, s0: u8) -> Result<()> {
        if s0 != RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(s0).into());
        }
        Ok(())
    }

    /// C2 is a byte-exact echo of S1
    pub fn c2(&self, s1: &[u8; HANDSHAKE_SIZE]) -> Bytes {
        Bytes::copy_from_slice(s1)
    }

    /// Whether S2 echoes our C1 timestamp
    pub fn s2_matches(&self, s2: &[u8; HANDSHAKE_SIZE]) -> bool {
        read_timestamp(s2) == self.timestamp()
    }

    /// Run the whole exchange over `stream`
    ///
    /// Any I/O failure aborts the attempt; an S2 that does not echo C1 is
    /// tolerated.
    pub async fn perform<S>(self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(&self.c0c1()).await?;
        stream.flush().await?;
        tracing::trace!(timestamp = self.timestamp(), "Sent C0C1");

        let s0 = read_byte(stream).await?;
        self.check_version(s0)?;

        let s1 = read_packet(stream).await?;
        tracing::trace!(timestamp = read_timestamp(&s1), "Received S0S1");

        stream.write_all(&self.c2(&s1)).await?;
        stream.flush().await?;

        let s2 = read_packet(stream).await?;
        if !self.s2_matches(&s2) {
            tracing::warn!(
                expected = self.timestamp(),
                received = read_timestamp(&s2),
                "S2 does not echo C1 timestamp, continuing"
            );
        }

        tracing::debug!("Handshake complete");
        Ok(())
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_byte<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_exact(stream, &mut byte).await?;
    Ok(byte[0])
}

async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> Result<[u8; HANDSHAKE_SIZE]> {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    read_exact(stream, &mut packet).await?;
    Ok(packet)
}

async fn read_exact<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(HandshakeError::Truncated.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn read_timestamp(packet: &[u8; HANDSHAKE_SIZE]) -> u32 {
    u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]])
}

/// Generate C1
///
/// Format (1536 bytes):
/// - Bytes 0-3: Timestamp (32-bit, big-endian)
/// - Bytes 4-7: Zero (simple handshake)
/// - Bytes 8-1535: Random data
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);

    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    rand::thread_rng().fill_bytes(&mut packet[8..]);

    packet
}
