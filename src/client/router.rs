//! Inbound message routing
//!
//! The router is the only consumer of the inbound queue and handles messages
//! strictly in the order they were reassembled:
//!
//! - chunk stream 2: protocol control, recorded in session state
//! - chunk stream 3: command replies, stored by transaction id
//! - anything else: handed to the [`MessageHandler`]
//!
//! Nothing a single message contains can stop the router; bad payloads are
//! logged and dropped.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::command::CommandCodec;
use crate::protocol::constants::{CSID_COMMAND, CSID_PROTOCOL_CONTROL, MAX_CHUNK_SIZE};
use crate::protocol::control::{ControlMessage, UserControlEvent};
use crate::protocol::message::Message;

use super::handler::MessageHandler;
use super::state::SessionShared;
use super::transactions::TransactionTable;

pub struct Router {
    shared: Arc<SessionShared>,
    transactions: Arc<TransactionTable>,
    codec: Arc<dyn CommandCodec>,
    handler: Arc<dyn MessageHandler>,
    outbound: mpsc::Sender<Message>,
}

impl Router {
    pub fn new(
        shared: Arc<SessionShared>,
        transactions: Arc<TransactionTable>,
        codec: Arc<dyn CommandCodec>,
        handler: Arc<dyn MessageHandler>,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            shared,
            transactions,
            codec,
            handler,
            outbound,
        }
    }

    /// Route until the inbound queue closes or `cancel` fires
    pub async fn run(self, mut inbound: mpsc::Receiver<Message>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.route(message).await;
        }
        tracing::debug!("Router stopped");
    }

    pub async fn route(&self, message: Message) {
        tracing::trace!(
            csid = message.csid,
            message_type = message.message_type,
            "Routing message"
        );

        match message.csid {
            CSID_PROTOCOL_CONTROL => self.handle_control(message).await,
            CSID_COMMAND => self.handle_command(message).await,
            _ => self.handler.on_message(message).await,
        }
    }

    async fn handle_control(&self, message: Message) {
        let control = match ControlMessage::parse(message.message_type, &message.payload) {
            Ok(control) => control,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed control message");
                return;
            }
        };

        match control {
            // Already applied to the decoder by the receive loop
            ControlMessage::SetChunkSize(size) => {
                tracing::debug!(size = size, "Peer set chunk size");
                self.shared.set_in_chunk_size(size.clamp(1, MAX_CHUNK_SIZE));
            }
            ControlMessage::Abort { csid } => {
                tracing::debug!(csid = csid, "Peer aborted message");
            }
            ControlMessage::Acknowledgement { sequence } => {
                tracing::trace!(sequence = sequence, "Acknowledgement");
                self.shared.set_last_acknowledgement(sequence);
            }
            ControlMessage::WindowAckSize(size) => {
                tracing::debug!(size = size, "Peer set window acknowledgement size");
                self.shared.set_in_window_size(size);
            }
            ControlMessage::SetPeerBandwidth { size, limit_type } => {
                tracing::debug!(size = size, limit_type = limit_type, "Peer set bandwidth");
                self.shared.set_peer_bandwidth(size, limit_type);
            }
            ControlMessage::UserControl(event) => self.handle_user_control(event).await,
            ControlMessage::Unknown { message_type, .. } => {
                tracing::warn!(message_type = message_type, "Unknown control message");
            }
        }
    }

    async fn handle_user_control(&self, event: UserControlEvent) {
        match event {
            UserControlEvent::PingRequest(timestamp) => {
                let pong = Message::control(&ControlMessage::UserControl(
                    UserControlEvent::PingResponse(timestamp),
                ));
                if self.outbound.send(pong).await.is_err() {
                    tracing::debug!("Outbound queue closed, ping not answered");
                }
            }
            other => tracing::debug!(event = ?other, "User control event"),
        }
    }

    async fn handle_command(&self, message: Message) {
        let mut command = match self.codec.decode(message.message_type, message.payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    message_type = message.message_type,
                    error = %e,
                    "Unable to decode command, discarding"
                );
                return;
            }
        };
        command.stream_id = message.stream_id;

        match command.transaction() {
            Some(0) => self.handler.on_notification(command).await,
            Some(id) => {
                tracing::trace!(transaction_id = id, name = %command.name, "Response");
                self.transactions.store(id, command);
            }
            None => {
                tracing::warn!(
                    transaction_id = command.transaction_id,
                    name = %command.name,
                    "Discarding command with unusable transaction id"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfValue;
    use crate::protocol::command::{Amf0CommandCodec, Command};
    use crate::protocol::constants::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<Message>>,
        notifications: Mutex<Vec<Command>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn on_message(&self, message: Message) {
            self.messages.lock().unwrap().push(message);
        }

        async fn on_notification(&self, command: Command) {
            self.notifications.lock().unwrap().push(command);
        }
    }

    struct Fixture {
        router: Router,
        shared: Arc<SessionShared>,
        transactions: Arc<TransactionTable>,
        recorder: Arc<Recorder>,
        outbound: mpsc::Receiver<Message>,
    }

    fn fixture() -> Fixture {
        let shared = Arc::new(SessionShared::new());
        let transactions = Arc::new(TransactionTable::new());
        let recorder = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(8);
        let router = Router::new(
            shared.clone(),
            transactions.clone(),
            Arc::new(Amf0CommandCodec::new()),
            recorder.clone(),
            tx,
        );
        Fixture {
            router,
            shared,
            transactions,
            recorder,
            outbound: rx,
        }
    }

    fn command_message(command: &Command) -> Message {
        let payload = Amf0CommandCodec::new().encode(command).unwrap();
        Message::new(CSID_COMMAND, MSG_COMMAND_AMF0, payload)
    }

    #[tokio::test]
    async fn test_control_messages_update_state() {
        let f = fixture();
        for control in [
            ControlMessage::SetChunkSize(4096),
            ControlMessage::WindowAckSize(5_000_000),
            ControlMessage::SetPeerBandwidth {
                size: 5_000_000,
                limit_type: BANDWIDTH_LIMIT_DYNAMIC,
            },
            ControlMessage::Acknowledgement { sequence: 777 },
        ] {
            f.router.route(Message::control(&control)).await;
        }

        let stats = f.shared.snapshot();
        assert_eq!(stats.in_chunk_size, 4096);
        assert_eq!(stats.in_window_size, 5_000_000);
        assert_eq!(stats.peer_bandwidth, 5_000_000);
        assert_eq!(stats.peer_bandwidth_limit, BANDWIDTH_LIMIT_DYNAMIC);
        assert_eq!(stats.last_acknowledgement, 777);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_control_dropped() {
        let f = fixture();
        let short = Message::new(
            CSID_PROTOCOL_CONTROL,
            MSG_SET_CHUNK_SIZE,
            Bytes::from_static(&[0, 1]),
        );
        f.router.route(short).await;
        let unknown = Message::new(CSID_PROTOCOL_CONTROL, 7, Bytes::from_static(&[1, 2, 3]));
        f.router.route(unknown).await;
        assert_eq!(f.shared.in_chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_ping_request_answered() {
        let mut f = fixture();
        let ping = ControlMessage::UserControl(UserControlEvent::PingRequest(1234));
        f.router.route(Message::control(&ping)).await;

        let pong = f.outbound.recv().await.unwrap();
        assert_eq!(
            ControlMessage::parse(pong.message_type, &pong.payload).unwrap(),
            ControlMessage::UserControl(UserControlEvent::PingResponse(1234))
        );
    }

    #[tokio::test]
    async fn test_reply_stored_by_transaction_id() {
        let f = fixture();
        let reply = Command::new(CMD_RESULT, 7).with_argument(AmfValue::from(1.0));
        f.router.route(command_message(&reply)).await;

        let stored = f.transactions.take(7).unwrap();
        assert_eq!(stored.name, CMD_RESULT);
        assert_eq!(stored.arguments, vec![AmfValue::from(1.0)]);
        assert!(f.transactions.take(7).is_none());
    }

    #[tokio::test]
    async fn test_notification_goes_to_handler() {
        let f = fixture();
        let status = Command::new(CMD_ON_STATUS, 0).with_argument(AmfValue::object([(
            "code",
            AmfValue::from("NetStream.Play.Start"),
        )]));
        f.router
            .route(command_message(&status).with_stream_id(1))
            .await;

        let notifications = f.recorder.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].stream_id, 1);
        assert_eq!(notifications[0].status_code(), Some("NetStream.Play.Start"));
        assert_eq!(f.transactions.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_command_dropped() {
        let f = fixture();
        f.router
            .route(Message::new(CSID_COMMAND, MSG_COMMAND_AMF0, Bytes::from_static(&[0xFF])))
            .await;
        assert_eq!(f.transactions.pending_count(), 0);
        assert!(f.recorder.notifications.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_goes_to_handler_in_order() {
        let f = fixture();
        let (tx, rx) = mpsc::channel(8);
        for i in 0..3u8 {
            tx.send(Message::new(6, MSG_VIDEO, Bytes::from(vec![i])))
                .await
                .unwrap();
        }
        drop(tx);
        let recorder = f.recorder.clone();
        f.router.run(rx, CancellationToken::new()).await;

        let messages = recorder.messages.lock().unwrap();
        let order: Vec<u8> = messages.iter().map(|m| m.payload[0]).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}
