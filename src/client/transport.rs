//! Byte-stream transport
//!
//! Dials plain TCP for `rtmp://` and TLS for `rtmps://`, and counts every
//! byte that crosses the stream in either direction.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::stats::ByteCounters;

use super::config::{ParsedUrl, Scheme};

/// Connected stream, plain or TLS
pub enum TransportStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Open a connection for `url`
///
/// `connect_timeout` bounds the TCP dial and, for `rtmps://`, the TLS
/// negotiation.
pub async fn dial(
    url: &ParsedUrl,
    connect_timeout: Duration,
    nodelay: bool,
) -> Result<TransportStream> {
    let addr = url.address();
    tracing::debug!(addr = %addr, scheme = url.scheme.as_str(), "Dialing");

    timeout(connect_timeout, async {
        let socket = TcpStream::connect(&addr).await?;
        if nodelay {
            socket.set_nodelay(true)?;
        }

        match url.scheme {
            Scheme::Plain => Ok(TransportStream::Plain(socket)),
            Scheme::Tls => {
                let tls = tls_connect(&url.host, socket).await?;
                Ok(TransportStream::Tls(Box::new(tls)))
            }
        }
    })
    .await
    .map_err(|_| Error::Timeout)?
}

async fn tls_connect(host: &str, socket: TcpStream) -> Result<TlsStream<TcpStream>> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name {}: {}", host, e)))?;

    TlsConnector::from(Arc::new(config))
        .connect(server_name, socket)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Stream wrapper that adds every byte read or written to `counters`
#[derive(Debug)]
pub struct CountingStream<S> {
    inner: S,
    counters: Arc<ByteCounters>,
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, counters: Arc<ByteCounters>) -> Self {
        Self { inner, counters }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for CountingStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            this.counters.add_received(n);
            tracing::trace!(bytes = n, "read");
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for CountingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            this.counters.add_sent(n);
            tracing::trace!(bytes = n, "write");
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_counting_stream_counts_both_directions() {
        let (client, mut server) = duplex(1024);
        let counters = Arc::new(ByteCounters::new());
        let mut stream = CountingStream::new(client, counters.clone());

        stream.write_all(b"hello").await.unwrap();
        let mut got = [0u8; 5];
        server.read_exact(&mut got).await.unwrap();

        server.write_all(b"rtmp!!!").await.unwrap();
        let mut back = [0u8; 7];
        stream.read_exact(&mut back).await.unwrap();

        assert_eq!(counters.bytes_sent(), 5);
        assert_eq!(counters.bytes_received(), 7);
    }

    #[tokio::test]
    async fn test_dial_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let url = ParsedUrl {
            scheme: Scheme::Plain,
            host: "127.0.0.1".into(),
            port,
            app: "live".into(),
            stream_key: None,
        };
        let stream = dial(&url, Duration::from_secs(5), true).await;
        assert!(matches!(stream, Ok(TransportStream::Plain(_))));
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = ParsedUrl {
            scheme: Scheme::Plain,
            host: "127.0.0.1".into(),
            port,
            app: "live".into(),
            stream_key: None,
        };
        match dial(&url, Duration::from_secs(5), false).await {
            Err(err) => assert!(err.is_connection_error()),
            Ok(_) => panic!("dial to a closed port succeeded"),
        }
    }
}
