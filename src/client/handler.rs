//! Application hook for traffic the session does not interpret
//!
//! Audio, video and data messages (any chunk stream other than 2 and 3) and
//! server-initiated commands (transaction id 0, such as `onStatus`) are
//! handed to a [`MessageHandler`]. Everything else is consumed internally.

use async_trait::async_trait;

use crate::protocol::command::Command;
use crate::protocol::message::Message;

/// Handler trait for uninterpreted inbound traffic
///
/// Both methods run on the router task; a slow handler delays routing of
/// every later message, including command replies.
///
/// # Example
///
/// ```ignore
/// use rtmp_session::{Message, MessageHandler};
///
/// struct Recorder;
///
/// #[async_trait::async_trait]
/// impl MessageHandler for Recorder {
///     async fn on_message(&self, message: Message) {
///         println!("{} bytes of type {}", message.len(), message.message_type);
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called for every message on a media/data chunk stream
    async fn on_message(&self, _message: Message) {}

    /// Called for commands that are not replies to a transaction
    async fn on_notification(&self, _command: Command) {}
}

/// Default handler: logs and drops
pub struct LoggingHandler;

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn on_message(&self, message: Message) {
        tracing::debug!(
            csid = message.csid,
            message_type = message.message_type,
            len = message.len(),
            "Discarding message on unhandled chunk stream"
        );
    }

    async fn on_notification(&self, command: Command) {
        tracing::debug!(
            name = %command.name,
            code = command.status_code().unwrap_or(""),
            "Notification"
        );
    }
}
