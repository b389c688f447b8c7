//! RTMP client session
//!
//! [`RtmpClient`] owns the lifecycle of one connection at a time:
//!
//! ```text
//! Disconnected -> Connecting -> Handshaking -> AwaitingConnectResult -> Connected
//!       ^                                                                   |
//!       +---------------------- reset / disconnect / failure ---------------+
//! ```
//!
//! Once the handshake completes three tasks run until the session is reset:
//! the receive loop, the send loop and the router. Callers talk to them
//! through the outbound queue and the transaction table, either directly on
//! the client or through a cloned [`ClientHandle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::amf::{AmfValue, ExternalHandler};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::command::{Amf0CommandCodec, Command, CommandCodec, Response};
use crate::protocol::constants::{CMD_CONNECT, MAX_CHUNK_SIZE};
use crate::protocol::control::ControlMessage;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::Message;
use crate::stats::SessionStats;

use super::config::{ClientConfig, ParsedUrl};
use super::handler::{LoggingHandler, MessageHandler};
use super::pipeline;
use super::router::Router;
use super::state::{SessionShared, SessionState};
use super::transactions::TransactionTable;
use super::transport::{self, CountingStream};

/// How long `disconnect` waits for the loops to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Cloneable access to a live connection
///
/// Handles stay bound to the connection they were taken from; after a reset
/// every operation on them fails with [`Error::NotConnected`] or
/// [`Error::ConnectionClosed`].
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::Sender<Message>,
    transactions: Arc<TransactionTable>,
    shared: Arc<SessionShared>,
    codec: Arc<dyn CommandCodec>,
    cancel: CancellationToken,
}

impl ClientHandle {
    /// Queue a message for sending
    ///
    /// Messages the chunk encoder could not frame are refused here rather
    /// than dropped by the send loop.
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::NotConnected);
        }
        message.validate()?;
        self.outbound
            .send(message)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Send a message and wait for the reply to its transaction
    ///
    /// The message must carry a non-zero transaction id. On timeout nothing
    /// is left stored for that id; the message itself may still go out.
    pub async fn call(&self, message: Message, deadline: Duration) -> Result<Response> {
        let id = match message.transaction_id {
            Some(id) if id != 0 => id,
            _ => return Err(ProtocolError::MissingField("transaction_id".into()).into()),
        };

        let waiter = self.transactions.register_waiter(id);
        if let Err(e) = self.send(message).await {
            self.transactions.cancel(id);
            return Err(e);
        }

        tokio::select! {
            response = self.transactions.wait(id, waiter, deadline) => response,
            _ = self.cancel.cancelled() => {
                self.transactions.cancel(id);
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Allocate a transaction id, encode `command` and [`call`](Self::call) it
    pub async fn call_command(&self, mut command: Command, deadline: Duration) -> Result<Response> {
        let id = self.transactions.next_id();
        command.transaction_id = id as f64;
        let payload = self.codec.encode(&command)?;
        let message = Message::command(payload, id).with_stream_id(command.stream_id);
        self.call(message, deadline).await
    }

    pub fn next_transaction_id(&self) -> u32 {
        self.transactions.next_id()
    }

    /// Take a stored reply, if one has arrived
    pub fn get_response(&self, transaction_id: u32) -> Option<Response> {
        self.transactions.take(transaction_id)
    }

    pub fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && self.shared.is_connected()
    }
}

struct Connection {
    handle: ClientHandle,
    tasks: Vec<JoinHandle<()>>,
}

/// RTMP client session
///
/// # Example
///
/// ```ignore
/// let mut client = RtmpClient::new(ClientConfig::new("rtmp://localhost/live"));
/// client.connect().await?;
/// let reply = client
///     .call_command(Command::new("createStream", 0), Duration::from_secs(5))
///     .await?;
/// client.disconnect().await;
/// ```
pub struct RtmpClient {
    config: ClientConfig,
    codec: Arc<dyn CommandCodec>,
    handler: Arc<dyn MessageHandler>,
    shared: Arc<SessionShared>,
    transactions: Arc<TransactionTable>,
    connection: Option<Connection>,
}

impl RtmpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            codec: Arc::new(Amf0CommandCodec::new()),
            handler: Arc::new(LoggingHandler),
            shared: Arc::new(SessionShared::new()),
            transactions: Arc::new(TransactionTable::new()),
            connection: None,
        }
    }

    /// Receive media/data messages and notifications with `handler`
    pub fn with_handler<H: MessageHandler>(mut self, handler: H) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Replace the default AMF0 command codec
    pub fn with_codec<C: CommandCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Dial, handshake and run the `connect` command round trip
    ///
    /// Fails with [`Error::AlreadyConnected`] until the previous connection
    /// has been reset. Any failure leaves the session disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() || self.shared.state() != SessionState::Disconnected {
            return Err(Error::AlreadyConnected);
        }

        let url = self.config.parse_url()?;
        if let Some(size) = self.config.chunk_size {
            if size == 0 || size > MAX_CHUNK_SIZE {
                return Err(Error::Config(format!("Invalid chunk size: {}", size)));
            }
        }
        tracing::debug!(url = %self.config.url, "Connecting");

        match self.establish(&url).await {
            Ok(()) => {
                tracing::debug!(
                    url = %self.config.url,
                    connection_id = self.shared.connection_id().as_deref().unwrap_or(""),
                    "Connected"
                );
                Ok(())
            }
            Err(e) => {
                tracing::debug!(url = %self.config.url, error = %e, "Connect failed");
                self.reset();
                Err(e)
            }
        }
    }

    async fn establish(&mut self, url: &ParsedUrl) -> Result<()> {
        let shared = self.shared.clone();

        shared.set_state(SessionState::Connecting);
        let stream =
            transport::dial(url, self.config.connect_timeout, self.config.tcp_nodelay).await?;
        let mut stream = CountingStream::new(stream, shared.counters().clone());

        shared.set_state(SessionState::Handshaking);
        timeout(
            self.config.connect_timeout,
            Handshake::new().perform(&mut stream),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        let handle = self.start(stream);

        shared.set_state(SessionState::AwaitingConnectResult);
        let reply = handle
            .call_command(self.connect_command(url), self.config.call_timeout)
            .await?;

        if reply.is_error() {
            return Err(Error::Rejected(describe(&reply)));
        }
        if !reply.is_result() {
            return Err(Error::Rejected(format!("unexpected reply {}", reply.name)));
        }
        if handle.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        shared.set_connection_id(connection_id(&reply));
        shared.set_state(SessionState::Connected);

        if let Some(size) = self.config.chunk_size {
            handle
                .send(Message::control(&ControlMessage::SetChunkSize(size)))
                .await?;
        }

        Ok(())
    }

    /// Split the transport and spawn the three loops
    fn start<S>(&mut self, stream: S) -> ClientHandle
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let capacity = self.config.queue_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let receive = {
            let outbound = out_tx.clone();
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            let acknowledge = self.config.acknowledge_window;
            tokio::spawn(async move {
                let result = pipeline::receive_loop(
                    reader,
                    in_tx,
                    outbound,
                    shared.clone(),
                    acknowledge,
                    cancel.clone(),
                )
                .await;
                finish_loop("receive", result, &shared, &cancel);
            })
        };

        let send = {
            let shared = self.shared.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result =
                    pipeline::send_loop(writer, out_rx, shared.clone(), cancel.clone()).await;
                finish_loop("send", result, &shared, &cancel);
            })
        };

        let router = Router::new(
            self.shared.clone(),
            self.transactions.clone(),
            self.codec.clone(),
            self.handler.clone(),
            out_tx.clone(),
        );
        let route = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                router.run(in_rx, cancel.clone()).await;
                cancel.cancel();
            })
        };

        let handle = ClientHandle {
            outbound: out_tx,
            transactions: self.transactions.clone(),
            shared: self.shared.clone(),
            codec: self.codec.clone(),
            cancel,
        };
        self.connection = Some(Connection {
            handle: handle.clone(),
            tasks: vec![receive, send, route],
        });
        handle
    }

    fn connect_command(&self, url: &ParsedUrl) -> Command {
        let mut object = vec![
            ("app", AmfValue::from(url.app.as_str())),
            ("type", AmfValue::from("nonprivate")),
            ("flashVer", AmfValue::from(self.config.flash_ver.as_str())),
            ("tcUrl", AmfValue::from(url.tc_url())),
            ("fpad", AmfValue::Boolean(false)),
            ("capabilities", AmfValue::Number(15.0)),
            ("audioCodecs", AmfValue::Number(3191.0)),
            ("videoCodecs", AmfValue::Number(252.0)),
            ("videoFunction", AmfValue::Number(1.0)),
            ("objectEncoding", AmfValue::Number(0.0)),
        ];
        if let Some(swf_url) = &self.config.swf_url {
            object.push(("swfUrl", AmfValue::from(swf_url.as_str())));
        }
        if let Some(page_url) = &self.config.page_url {
            object.push(("pageUrl", AmfValue::from(page_url.as_str())));
        }

        Command::new(CMD_CONNECT, 0).with_object(AmfValue::object(object))
    }

    /// Tear the connection down immediately
    ///
    /// Cancels the loops, closes both queues and the transport, and drops
    /// every piece of per-connection state. Calling it again is a no-op.
    pub fn reset(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.handle.cancel.cancel();
            for task in connection.tasks {
                task.abort();
            }
        }
        self.transactions.clear();
        self.shared.mark_dead();
        self.shared = Arc::new(SessionShared::new());
        self.transactions = Arc::new(TransactionTable::new());
    }

    /// Stop the loops, wait briefly for them to exit, then reset
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.handle.cancel.cancel();
            for mut task in connection.tasks {
                if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                    task.abort();
                }
            }
            tracing::debug!(url = %self.config.url, "Disconnected");
        }
        self.reset();
    }

    /// Point-in-time snapshot; may be stale by the time it is read
    pub fn is_alive(&self) -> bool {
        match &self.connection {
            Some(connection) => connection.handle.is_alive(),
            None => false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    fn live_handle(&self) -> Result<&ClientHandle> {
        self.connection
            .as_ref()
            .map(|c| &c.handle)
            .ok_or(Error::NotConnected)
    }

    /// Cloneable handle for concurrent callers
    pub fn handle(&self) -> Result<ClientHandle> {
        self.live_handle().cloned()
    }

    pub async fn send(&self, message: Message) -> Result<()> {
        self.live_handle()?.send(message).await
    }

    pub async fn call(&self, message: Message, deadline: Duration) -> Result<Response> {
        self.live_handle()?.call(message, deadline).await
    }

    pub async fn call_command(&self, command: Command, deadline: Duration) -> Result<Response> {
        self.live_handle()?.call_command(command, deadline).await
    }

    pub fn next_transaction_id(&self) -> u32 {
        self.transactions.next_id()
    }

    pub fn get_response(&self, transaction_id: u32) -> Option<Response> {
        self.transactions.take(transaction_id)
    }

    /// Register a resolver for an application-defined typed object class
    pub fn register_external_handler(&self, name: &str, handler: ExternalHandler) {
        self.codec.register_external_handler(name, handler);
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.snapshot()
    }

    /// Identifier the server assigned in its connect reply
    pub fn connection_id(&self) -> Option<String> {
        self.shared.connection_id()
    }
}

impl Drop for RtmpClient {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.handle.cancel.cancel();
        }
    }
}

fn finish_loop(name: &str, result: Result<()>, shared: &SessionShared, cancel: &CancellationToken) {
    match result {
        Ok(()) => {}
        Err(Error::ConnectionClosed) => {
            tracing::debug!(task = name, "Connection closed");
        }
        Err(e) => {
            tracing::error!(task = name, error = %e, "Loop failed, session is no longer alive");
        }
    }
    if !cancel.is_cancelled() {
        shared.mark_dead();
        cancel.cancel();
    }
}

/// Human-readable reason from an `_error` reply
fn describe(reply: &Response) -> String {
    let info = reply.info();
    let code = info.and_then(|i| i.get_string("code"));
    let description = info.and_then(|i| i.get_string("description"));
    match (code, description) {
        (Some(code), Some(description)) => format!("{} ({})", code, description),
        (Some(code), None) => code.to_string(),
        (None, Some(description)) => description.to_string(),
        (None, None) => reply.name.clone(),
    }
}

/// `id` or `clientid` from the connect reply info object
fn connection_id(reply: &Response) -> Option<String> {
    let info = reply.info()?;
    ["id", "clientid"].iter().find_map(|key| match info.get(key)? {
        AmfValue::String(s) => Some(s.clone()),
        AmfValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        AmfValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
