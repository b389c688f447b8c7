//! Statistics and metrics for RTMP sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cumulative traffic counters for one connection
///
/// Updated by the transport wrapper and the I/O loops, read by anyone.
/// Values are advisory and only ever grow.
#[derive(Debug, Default)]
pub struct ByteCounters {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
}

impl ByteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }
}

/// Session-level statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Total bytes received
    pub bytes_received: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Complete messages reassembled
    pub messages_received: u64,
    /// Messages written to the transport
    pub messages_sent: u64,
    /// Chunk size used to parse inbound chunks
    pub in_chunk_size: u32,
    /// Chunk size used to split outbound messages
    pub out_chunk_size: u32,
    /// Window acknowledgement size announced by the server
    pub in_window_size: u32,
    /// Window acknowledgement size announced to the server
    pub out_window_size: u32,
    /// Peer bandwidth set by the server
    pub peer_bandwidth: u32,
    /// Limit type that accompanied the peer bandwidth
    pub peer_bandwidth_limit: u8,
    /// Sequence number of the last acknowledgement from the server
    pub last_acknowledgement: u32,
    /// Time since the connection was opened
    pub duration: Duration,
}

impl SessionStats {
    /// Average inbound bitrate (bits/sec) over the connection lifetime
    pub fn receive_bitrate(&self) -> u64 {
        bitrate(self.bytes_received, self.duration)
    }

    /// Average outbound bitrate (bits/sec) over the connection lifetime
    pub fn send_bitrate(&self) -> u64 {
        bitrate(self.bytes_sent, self.duration)
    }
}

fn bitrate(bytes: u64, duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    if millis == 0 {
        return 0;
    }
    bytes.saturating_mul(8_000) / millis
}
