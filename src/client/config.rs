//! Client configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::{RTMPS_PORT, RTMP_PORT};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// RTMP URL to connect to (rtmp[s]://host[:port]/app[/stream])
    pub url: String,

    /// Bound on dialing and on the handshake
    pub connect_timeout: Duration,

    /// How long to wait for the `connect` command reply
    pub call_timeout: Duration,

    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,

    /// Flash version string to send
    pub flash_ver: String,

    /// SWF URL to send
    pub swf_url: Option<String>,

    /// Page URL to send
    pub page_url: Option<String>,

    /// Outbound chunk size announced once connected (`None` keeps 128)
    pub chunk_size: Option<u32>,

    /// Capacity of the inbound and outbound message queues
    pub queue_capacity: usize,

    /// Send acknowledgements when the server's window fills up
    pub acknowledge_window: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
            tcp_nodelay: true,
            flash_ver: "LNX 9,0,124,2".to_string(),
            swf_url: None,
            page_url: None,
            chunk_size: None,
            queue_capacity: 64,
            acknowledge_window: true,
        }
    }
}

impl ClientConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Parse URL into components
    pub fn parse_url(&self) -> Result<ParsedUrl> {
        let invalid = |reason: &str| Error::Config(format!("{}: {}", reason, self.url));

        let (scheme, rest) = match self.url.split_once("://") {
            Some(("rtmp", rest)) => (Scheme::Plain, rest),
            Some(("rtmps", rest)) => (Scheme::Tls, rest),
            Some((other, _)) => {
                return Err(Error::Config(format!("Unsupported scheme: {}", other)))
            }
            None => return Err(invalid("missing scheme")),
        };

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            ),
            None => (authority, scheme.default_port()),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let (app, stream_key) = match path.split_once('/') {
            Some((a, s)) if !s.is_empty() => (a.to_string(), Some(s.to_string())),
            Some((a, _)) => (a.to_string(), None),
            None => (path.to_string(), None),
        };

        Ok(ParsedUrl {
            scheme,
            host: host.to_string(),
            port,
            app,
            stream_key,
        })
    }
}

/// Transport selected by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `rtmp://` over plain TCP
    Plain,
    /// `rtmps://` over TLS
    Tls,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Plain => RTMP_PORT,
            Scheme::Tls => RTMPS_PORT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Plain => "rtmp",
            Scheme::Tls => "rtmps",
        }
    }
}

/// Parsed RTMP URL components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: Option<String>,
}

impl ParsedUrl {
    /// `tcUrl` value for the connect command
    pub fn tc_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.app
        )
    }

    /// `host:port` to dial
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
