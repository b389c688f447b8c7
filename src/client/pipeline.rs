//! Send and receive loops
//!
//! Each loop exclusively owns one half of the chunk codec: the send loop
//! owns the encoder (outbound channel state), the receive loop owns the
//! decoder (inbound channel state). Both stop on cancellation or when their
//! queue closes; an I/O or framing failure is returned to the caller, which
//! tears the connection down.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder};
use crate::protocol::constants::{MSG_ABORT, MSG_SET_CHUNK_SIZE, MSG_WINDOW_ACK_SIZE};
use crate::protocol::control::ControlMessage;
use crate::protocol::message::Message;

use super::state::SessionShared;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Drain the outbound queue onto the transport
///
/// Messages hit the wire in enqueue order. A set-chunk-size message switches
/// the encoder only after it has been written, so the peer sees the new size
/// before any chunk that uses it.
pub async fn send_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Message>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoder = ChunkEncoder::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        buf.clear();
        let chunks = match encoder.encode(&message, &mut buf) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(csid = message.csid, error = %e, "Dropping unencodable message");
                continue;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = async {
                writer.write_all(&buf).await?;
                writer.flush().await
            } => result?,
        }

        shared.counters().message_sent();
        tracing::trace!(
            csid = message.csid,
            message_type = message.message_type,
            len = message.len(),
            chunks = chunks,
            "Sent message"
        );

        if message.is_protocol_control() {
            apply_outbound_control(&message, &mut encoder, &shared);
        }
    }

    tracing::debug!("Send loop stopped");
    Ok(())
}

fn apply_outbound_control(message: &Message, encoder: &mut ChunkEncoder, shared: &SessionShared) {
    if !matches!(message.message_type, MSG_SET_CHUNK_SIZE | MSG_WINDOW_ACK_SIZE) {
        return;
    }
    match ControlMessage::parse(message.message_type, &message.payload) {
        Ok(ControlMessage::SetChunkSize(size)) => {
            encoder.set_chunk_size(size);
            shared.set_out_chunk_size(encoder.chunk_size());
            tracing::debug!(size = encoder.chunk_size(), "Outbound chunk size changed");
        }
        Ok(ControlMessage::WindowAckSize(size)) => shared.set_out_window_size(size),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Sent malformed control message"),
    }
}

/// Read chunks off the transport and feed complete messages to the router
///
/// Set-chunk-size and abort are applied to the decoder as soon as they are
/// reassembled, before the next chunk is parsed. When `acknowledge` is set,
/// an acknowledgement is queued on `outbound` each time the bytes received
/// since the last one reach the server's window.
pub async fn receive_loop<R>(
    mut reader: R,
    inbound: mpsc::Sender<Message>,
    outbound: mpsc::Sender<Message>,
    shared: Arc<SessionShared>,
    acknowledge: bool,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = ChunkDecoder::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut acknowledged = shared.counters().bytes_received();

    loop {
        while let Some(message) = decoder.decode(&mut buf)? {
            shared.counters().message_received();
            tracing::trace!(
                csid = message.csid,
                message_type = message.message_type,
                len = message.len(),
                "Received message"
            );

            if message.is_protocol_control() {
                apply_inbound_control(&message, &mut decoder);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = inbound.send(message) => {
                    if sent.is_err() {
                        tracing::debug!("Inbound queue closed");
                        return Ok(());
                    }
                }
            }
        }

        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            n = reader.read_buf(&mut buf) => n?,
        };
        if n == 0 {
            tracing::debug!("Connection closed by peer");
            return Err(Error::ConnectionClosed);
        }

        if acknowledge {
            let received = shared.counters().bytes_received();
            let window = u64::from(shared.in_window_size());
            if window > 0 && received.saturating_sub(acknowledged) >= window {
                acknowledged = received;
                let ack = Message::control(&ControlMessage::Acknowledgement {
                    sequence: received as u32,
                });
                tracing::trace!(sequence = received as u32, "Queueing acknowledgement");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    sent = outbound.send(ack) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn apply_inbound_control(message: &Message, decoder: &mut ChunkDecoder) {
    if !matches!(message.message_type, MSG_SET_CHUNK_SIZE | MSG_ABORT) {
        return;
    }
    match ControlMessage::parse(message.message_type, &message.payload) {
        Ok(ControlMessage::SetChunkSize(size)) => decoder.set_chunk_size(size),
        Ok(ControlMessage::Abort { csid }) => decoder.abort(csid),
        Ok(_) => {}
        // The router logs malformed control payloads
        Err(_) => {}
    }
}
