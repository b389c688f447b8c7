//! Protocol control messages (types 1-6)
//!
//! These travel on chunk stream 2 and steer the chunk layer itself:
//! chunk size, aborts, flow-control windows and user control events.
//!
//! Reference: RTMP Specification Sections 5.4 and 6.2

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// Parsed protocol control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit_type: u8 },

    /// Any other type seen on the control chunk stream
    Unknown { message_type: u8, data: Bytes },
}

/// User Control Event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    Unknown { event_type: u16, data: Bytes },
}

impl ControlMessage {
    /// Parse a control message from its type id and payload
    pub fn parse(message_type: u8, payload: &Bytes) -> Result<Self> {
        let mut payload = payload.clone();
        let invalid = || ProtocolError::InvalidControlMessage { message_type };

        match message_type {
            MSG_SET_CHUNK_SIZE => {
                if payload.len() < 4 {
                    return Err(invalid().into());
                }
                // MSB is reserved and must be ignored
                Ok(ControlMessage::SetChunkSize(payload.get_u32() & 0x7FFFFFFF))
            }

            MSG_ABORT => {
                if payload.len() < 4 {
                    return Err(invalid().into());
                }
                Ok(ControlMessage::Abort {
                    csid: payload.get_u32(),
                })
            }

            MSG_ACKNOWLEDGEMENT => {
                if payload.len() < 4 {
                    return Err(invalid().into());
                }
                Ok(ControlMessage::Acknowledgement {
                    sequence: payload.get_u32(),
                })
            }

            MSG_USER_CONTROL => Self::parse_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => {
                if payload.len() < 4 {
                    return Err(invalid().into());
                }
                Ok(ControlMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                if payload.len() < 5 {
                    return Err(invalid().into());
                }
                let size = payload.get_u32();
                let limit_type = payload.get_u8();
                Ok(ControlMessage::SetPeerBandwidth { size, limit_type })
            }

            _ => Ok(ControlMessage::Unknown {
                message_type,
                data: payload,
            }),
        }
    }

    fn parse_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 6 {
            return Err(ProtocolError::InvalidControlMessage {
                message_type: MSG_USER_CONTROL,
            }
            .into());
        }

        let event_type = payload.get_u16();
        let event = match event_type {
            UC_STREAM_BEGIN => UserControlEvent::StreamBegin(payload.get_u32()),
            UC_STREAM_EOF => UserControlEvent::StreamEof(payload.get_u32()),
            UC_STREAM_DRY => UserControlEvent::StreamDry(payload.get_u32()),
            UC_SET_BUFFER_LENGTH => {
                if payload.len() < 8 {
                    return Err(ProtocolError::InvalidControlMessage {
                        message_type: MSG_USER_CONTROL,
                    }
                    .into());
                }
                let stream_id = payload.get_u32();
                let buffer_ms = payload.get_u32();
                UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }
            }
            UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(payload.get_u32()),
            UC_PING_REQUEST => UserControlEvent::PingRequest(payload.get_u32()),
            UC_PING_RESPONSE => UserControlEvent::PingResponse(payload.get_u32()),
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(ControlMessage::UserControl(event))
    }

    /// Encode to (message type, payload)
    pub fn encode(&self) -> (u8, Bytes) {
        match self {
            ControlMessage::SetChunkSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size & 0x7FFFFFFF);
                (MSG_SET_CHUNK_SIZE, buf.freeze())
            }

            ControlMessage::Abort { csid } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*csid);
                (MSG_ABORT, buf.freeze())
            }

            ControlMessage::Acknowledgement { sequence } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*sequence);
                (MSG_ACKNOWLEDGEMENT, buf.freeze())
            }

            ControlMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                (MSG_WINDOW_ACK_SIZE, buf.freeze())
            }

            ControlMessage::SetPeerBandwidth { size, limit_type } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(*limit_type);
                (MSG_SET_PEER_BANDWIDTH, buf.freeze())
            }

            ControlMessage::UserControl(event) => {
                let mut buf = BytesMut::with_capacity(10);
                match event {
                    UserControlEvent::StreamBegin(id) => {
                        buf.put_u16(UC_STREAM_BEGIN);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamEof(id) => {
                        buf.put_u16(UC_STREAM_EOF);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamDry(id) => {
                        buf.put_u16(UC_STREAM_DRY);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::SetBufferLength {
                        stream_id,
                        buffer_ms,
                    } => {
                        buf.put_u16(UC_SET_BUFFER_LENGTH);
                        buf.put_u32(*stream_id);
                        buf.put_u32(*buffer_ms);
                    }
                    UserControlEvent::StreamIsRecorded(id) => {
                        buf.put_u16(UC_STREAM_IS_RECORDED);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::PingRequest(ts) => {
                        buf.put_u16(UC_PING_REQUEST);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::PingResponse(ts) => {
                        buf.put_u16(UC_PING_RESPONSE);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::Unknown { event_type, data } => {
                        buf.put_u16(*event_type);
                        buf.put_slice(data);
                    }
                }
                (MSG_USER_CONTROL, buf.freeze())
            }

            ControlMessage::Unknown { message_type, data } => (*message_type, data.clone()),
        }
    }
}
