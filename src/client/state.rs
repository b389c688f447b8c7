//! Per-connection shared state
//!
//! One [`SessionShared`] is created for every connection attempt and dropped
//! on reset, so nothing leaks from one connection into the next. Values here
//! are advisory snapshots; the loops that own the chunk codec keep the
//! authoritative copies.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_WINDOW_SIZE};
use crate::stats::{ByteCounters, SessionStats};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connecting = 1,
    Handshaking = 2,
    AwaitingConnectResult = 3,
    Connected = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Connecting,
            2 => SessionState::Handshaking,
            3 => SessionState::AwaitingConnectResult,
            4 => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }
}

#[derive(Debug)]
pub struct SessionShared {
    state: AtomicU8,
    counters: Arc<ByteCounters>,
    in_chunk_size: AtomicU32,
    out_chunk_size: AtomicU32,
    in_window_size: AtomicU32,
    out_window_size: AtomicU32,
    peer_bandwidth: AtomicU32,
    peer_bandwidth_limit: AtomicU8,
    last_acknowledgement: AtomicU32,
    connection_id: Mutex<Option<String>>,
    opened_at: Instant,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Disconnected as u8),
            counters: Arc::new(ByteCounters::new()),
            in_chunk_size: AtomicU32::new(DEFAULT_CHUNK_SIZE),
            out_chunk_size: AtomicU32::new(DEFAULT_CHUNK_SIZE),
            in_window_size: AtomicU32::new(DEFAULT_WINDOW_SIZE),
            out_window_size: AtomicU32::new(DEFAULT_WINDOW_SIZE),
            peer_bandwidth: AtomicU32::new(0),
            peer_bandwidth_limit: AtomicU8::new(0),
            last_acknowledgement: AtomicU32::new(0),
            connection_id: Mutex::new(None),
            opened_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Drop to `Disconnected` after a loop failure
    pub fn mark_dead(&self) {
        self.set_state(SessionState::Disconnected);
    }

    pub fn counters(&self) -> &Arc<ByteCounters> {
        &self.counters
    }

    pub fn in_chunk_size(&self) -> u32 {
        self.in_chunk_size.load(Ordering::Relaxed)
    }

    pub fn set_in_chunk_size(&self, size: u32) {
        self.in_chunk_size.store(size, Ordering::Relaxed);
    }

    pub fn out_chunk_size(&self) -> u32 {
        self.out_chunk_size.load(Ordering::Relaxed)
    }

    pub fn set_out_chunk_size(&self, size: u32) {
        self.out_chunk_size.store(size, Ordering::Relaxed);
    }

    pub fn in_window_size(&self) -> u32 {
        self.in_window_size.load(Ordering::Relaxed)
    }

    pub fn set_in_window_size(&self, size: u32) {
        self.in_window_size.store(size, Ordering::Relaxed);
    }

    pub fn set_out_window_size(&self, size: u32) {
        self.out_window_size.store(size, Ordering::Relaxed);
    }

    pub fn set_peer_bandwidth(&self, size: u32, limit_type: u8) {
        self.peer_bandwidth.store(size, Ordering::Relaxed);
        self.peer_bandwidth_limit.store(limit_type, Ordering::Relaxed);
    }

    pub fn set_last_acknowledgement(&self, sequence: u32) {
        self.last_acknowledgement.store(sequence, Ordering::Relaxed);
    }

    pub fn connection_id(&self) -> Option<String> {
        self.connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_connection_id(&self, id: Option<String>) {
        *self
            .connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = id;
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_received: self.counters.bytes_received(),
            bytes_sent: self.counters.bytes_sent(),
            messages_received: self.counters.messages_received(),
            messages_sent: self.counters.messages_sent(),
            in_chunk_size: self.in_chunk_size(),
            out_chunk_size: self.out_chunk_size(),
            in_window_size: self.in_window_size(),
            out_window_size: self.out_window_size.load(Ordering::Relaxed),
            peer_bandwidth: self.peer_bandwidth.load(Ordering::Relaxed),
            peer_bandwidth_limit: self.peer_bandwidth_limit.load(Ordering::Relaxed),
            last_acknowledgement: self.last_acknowledgement.load(Ordering::Relaxed),
            duration: self.opened_at.elapsed(),
        }
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}
