//! End-to-end session tests against an in-process server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rtmp_session::protocol::chunk::{ChunkDecoder, ChunkEncoder};
use rtmp_session::protocol::constants::*;
use rtmp_session::protocol::control::ControlMessage;
use rtmp_session::{
    Amf0CommandCodec, AmfValue, ClientConfig, Command, CommandCodec, Error, Message,
    MessageHandler, RtmpClient, SessionState,
};

/// Minimal server side of one connection
struct FakeServer {
    stream: TcpStream,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    buf: BytesMut,
    codec: Amf0CommandCodec,
}

impl FakeServer {
    async fn accept(listener: &TcpListener) -> Self {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
        stream.read_exact(&mut c0c1).await.unwrap();
        assert_eq!(c0c1[0], RTMP_VERSION);

        let s1: Vec<u8> = (0..HANDSHAKE_SIZE).map(|i| (i % 251) as u8).collect();
        stream.write_all(&[RTMP_VERSION]).await.unwrap();
        stream.write_all(&s1).await.unwrap();
        stream.write_all(&c0c1[1..]).await.unwrap();

        let mut c2 = vec![0u8; HANDSHAKE_SIZE];
        stream.read_exact(&mut c2).await.unwrap();
        assert_eq!(c2, s1, "C2 must echo S1");

        Self {
            stream,
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            buf: BytesMut::new(),
            codec: Amf0CommandCodec::new(),
        }
    }

    /// Next message from the client, honouring its set-chunk-size
    async fn recv(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.decoder.decode(&mut self.buf).unwrap() {
                if message.is_protocol_control() && message.message_type == MSG_SET_CHUNK_SIZE {
                    if let Ok(ControlMessage::SetChunkSize(size)) =
                        ControlMessage::parse(message.message_type, &message.payload)
                    {
                        self.decoder.set_chunk_size(size);
                    }
                }
                return Some(message);
            }
            match self.stream.read_buf(&mut self.buf).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    async fn recv_command(&mut self) -> Command {
        loop {
            let message = self.recv().await.expect("client closed the connection");
            if message.csid == CSID_COMMAND {
                return self
                    .codec
                    .decode(message.message_type, message.payload)
                    .unwrap();
            }
        }
    }

    async fn send(&mut self, message: Message) {
        let mut out = BytesMut::new();
        self.encoder.encode(&message, &mut out).unwrap();
        self.stream.write_all(&out).await.unwrap();
        if let Ok(ControlMessage::SetChunkSize(size)) =
            ControlMessage::parse(message.message_type, &message.payload)
        {
            if message.is_protocol_control() && message.message_type == MSG_SET_CHUNK_SIZE {
                self.encoder.set_chunk_size(size);
            }
        }
    }

    async fn send_command(&mut self, command: &Command) {
        let payload = self.codec.encode(command).unwrap();
        self.send(Message::new(CSID_COMMAND, MSG_COMMAND_AMF0, payload))
            .await;
    }

    /// Answer the connect command the way a typical server does
    async fn accept_connect(&mut self) -> Command {
        let connect = self.recv_command().await;
        assert_eq!(connect.name, CMD_CONNECT);

        self.send(Message::control(&ControlMessage::WindowAckSize(2_500_000)))
            .await;
        self.send(Message::control(&ControlMessage::SetPeerBandwidth {
            size: 2_500_000,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        }))
        .await;
        self.send(Message::control(&ControlMessage::SetChunkSize(4096)))
            .await;

        // Long enough to need several chunks at the default size
        let reply = Command::new(CMD_RESULT, connect.transaction().unwrap())
            .with_object(AmfValue::object([
                ("fmsVer", AmfValue::from("FMS/3,5,7,7009")),
                ("capabilities", AmfValue::from(31.0)),
                ("padding", AmfValue::from("x".repeat(300))),
            ]))
            .with_argument(AmfValue::object([
                ("level", AmfValue::from("status")),
                ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
                ("description", AmfValue::from("Connection succeeded.")),
                ("clientid", AmfValue::from(42.0)),
            ]));
        self.send_command(&reply).await;
        connect
    }
}

#[derive(Clone, Default)]
struct Notifications(Arc<Mutex<Vec<Command>>>);

#[async_trait::async_trait]
impl MessageHandler for Notifications {
    async fn on_notification(&self, command: Command) {
        self.0.lock().unwrap().push(command);
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("rtmp://127.0.0.1:{}/live", port))
}

#[tokio::test]
async fn test_connect_call_and_disconnect() {
    let (listener, url) = listen().await;
    let notifications = Notifications::default();

    let server = tokio::spawn(async move {
        let mut server = FakeServer::accept(&listener).await;
        let connect = server.accept_connect().await;

        let call = server.recv_command().await;
        assert_eq!(call.name, "echo");
        assert_eq!(call.transaction(), Some(2));
        let status = AmfValue::object([("code", AmfValue::from("NetStream.Publish.Start"))]);
        server
            .send_command(&Command::new(CMD_ON_STATUS, 0).with_argument(status))
            .await;
        server
            .send_command(
                &Command::new(CMD_RESULT, call.transaction().unwrap())
                    .with_argument(call.arguments[0].clone()),
            )
            .await;

        // Client disconnect shows up as end of stream
        while server.recv().await.is_some() {}
        connect
    });

    let mut client =
        RtmpClient::new(ClientConfig::new(url.clone())).with_handler(notifications.clone());
    client.connect().await.unwrap();
    assert!(client.is_alive());
    assert_eq!(client.state(), SessionState::Connected);
    assert_eq!(client.connection_id().as_deref(), Some("42"));
    assert!(matches!(client.connect().await, Err(Error::AlreadyConnected)));

    let reply = client
        .call_command(
            Command::new("echo", 0).with_argument(AmfValue::from("hello")),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(reply.is_result());
    assert_eq!(reply.arguments, vec![AmfValue::from("hello")]);

    let stats = client.stats();
    assert_eq!(stats.in_chunk_size, 4096);
    assert_eq!(stats.peer_bandwidth, 2_500_000);
    assert!(stats.bytes_received > HANDSHAKE_SIZE as u64 * 2);
    assert!(stats.bytes_sent > HANDSHAKE_SIZE as u64 * 2);

    client.disconnect().await;
    assert!(!client.is_alive());
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(client.connection_id().is_none());

    let connect = server.await.unwrap();
    assert_eq!(connect.command_object.get_string("app"), Some("live"));
    assert_eq!(connect.command_object.get_string("tcUrl"), Some(url.as_str()));

    let notifications = notifications.0.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].status_code(), Some("NetStream.Publish.Start"));
}

#[tokio::test]
async fn test_connect_rejected() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut server = FakeServer::accept(&listener).await;
        let connect = server.recv_command().await;
        let info = AmfValue::object([
            ("level", AmfValue::from("error")),
            ("code", AmfValue::from("NetConnection.Connect.Rejected")),
        ]);
        let id = connect.transaction().unwrap();
        server
            .send_command(&Command::new(CMD_ERROR, id).with_argument(info))
            .await;
        while server.recv().await.is_some() {}
    });

    let mut client = RtmpClient::new(ClientConfig::new(url));
    let err = client.connect().await.unwrap_err();
    match err {
        Error::Rejected(reason) => assert!(reason.contains("NetConnection.Connect.Rejected")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!client.is_alive());
    assert_eq!(client.state(), SessionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_announced_chunk_size_is_used() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut server = FakeServer::accept(&listener).await;
        server.accept_connect().await;

        let announce = server.recv().await.unwrap();
        assert_eq!(
            ControlMessage::parse(announce.message_type, &announce.payload).unwrap(),
            ControlMessage::SetChunkSize(1024)
        );

        // 900 bytes in a single chunk only decodes if the server switched too
        let media = server.recv().await.unwrap();
        assert_eq!(media.message_type, MSG_VIDEO);
        assert_eq!(media.len(), 900);
        while server.recv().await.is_some() {}
    });

    let mut config = ClientConfig::new(url);
    config.chunk_size = Some(1024);
    let mut client = RtmpClient::new(config);
    client.connect().await.unwrap();

    let handle = client.handle().unwrap();
    handle
        .send(Message::new(6, MSG_VIDEO, vec![0x17u8; 900]).with_stream_id(1))
        .await
        .unwrap();

    // connect, set-chunk-size and the video message
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.stats().messages_sent < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(client.stats().out_chunk_size, 1024);
    client.disconnect().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let url = {
        let (listener, url) = listen().await;
        drop(listener);
        url
    };

    let mut client = RtmpClient::new(ClientConfig::new(url));
    let err = client.connect().await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(client.state(), SessionState::Disconnected);

    let mut client = RtmpClient::new(ClientConfig::new("http://127.0.0.1/live"));
    assert!(matches!(client.connect().await, Err(Error::Config(_))));
}
