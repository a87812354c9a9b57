//! Single connection attempts and the classification of their failures.
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, warn};
use text_placeholder::Template;
use tokio::{
    io::{self, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
    time,
};

/// What a single probe found out about a `host:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeOutcome {
    /// The TCP handshake completed.
    Open,
    /// The connection was actively refused: the host is up.
    Closed,
    /// No answer before the timeout.
    Filtered,
    NoRoute,
    PermissionDenied,
    HostDown,
    UnresolvableHost,
    /// Nothing in [`CLASSIFICATION_RULES`] matched the error text.
    Unknown,
    /// UDP payload handed to the network.
    Sent,
    /// UDP socket could not be opened or written.
    SendFailed,
}

impl ProbeOutcome {
    /// Outcomes that prove something is listening at the address.
    pub const fn proves_alive(self) -> bool {
        matches!(self, Self::Open | Self::Closed)
    }

    /// Outcomes after which the host is not worth probing again.
    pub const fn discards_host(self) -> bool {
        matches!(
            self,
            Self::NoRoute | Self::PermissionDenied | Self::HostDown | Self::UnresolvableHost
        )
    }
}

/// Substring rules applied to lower-cased error text. Evaluated top to
/// bottom, first match wins.
pub const CLASSIFICATION_RULES: &[(&str, ProbeOutcome)] = &[
    ("connection refused", ProbeOutcome::Closed),
    ("actively refused", ProbeOutcome::Closed),
    ("timed out", ProbeOutcome::Filtered),
    ("timeout", ProbeOutcome::Filtered),
    ("did not properly respond", ProbeOutcome::Filtered),
    ("no route to host", ProbeOutcome::NoRoute),
    ("host is unreachable", ProbeOutcome::NoRoute),
    ("permission denied", ProbeOutcome::PermissionDenied),
    ("access is denied", ProbeOutcome::PermissionDenied),
    ("host is down", ProbeOutcome::HostDown),
    ("no such host", ProbeOutcome::UnresolvableHost),
    ("network is unreachable", ProbeOutcome::UnresolvableHost),
    ("unreachable network", ProbeOutcome::UnresolvableHost),
    ("name or service not known", ProbeOutcome::UnresolvableHost),
    ("nodename nor servname", ProbeOutcome::UnresolvableHost),
    ("failed to lookup address", ProbeOutcome::UnresolvableHost),
    ("temporary failure in name resolution", ProbeOutcome::UnresolvableHost),
];

/// Maps the text of a connect error onto a [`ProbeOutcome`].
///
/// ```rust
/// # use sprayscan::scanner::probe::{classify, ProbeOutcome};
/// assert_eq!(classify("Connection refused (os error 111)"), ProbeOutcome::Closed);
/// assert_eq!(classify("something new"), ProbeOutcome::Unknown);
/// ```
pub fn classify(error_text: &str) -> ProbeOutcome {
    let error_text = error_text.to_lowercase();
    CLASSIFICATION_RULES
        .iter()
        .find(|(needle, _)| error_text.contains(needle))
        .map_or(ProbeOutcome::Unknown, |&(_, outcome)| outcome)
}

/// Classifies a failed connect, logging errors no rule knows about.
fn outcome_for_error(socket: SocketAddr, error: &io::Error) -> ProbeOutcome {
    let error_text = error.to_string();
    let outcome = classify(&error_text);
    if outcome == ProbeOutcome::Unknown {
        warn!("Unclassified error for {socket} => {error_text}");
    }
    outcome
}

/// Something that can probe one socket address.
///
/// The scanner drives any implementation; [`SocketProber`] is the one that
/// touches the network.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, socket: SocketAddr) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Token in user payloads replaced by the probed port.
pub const PORT_TOKEN: &str = "%port%";

/// Probes with real TCP connects or UDP sends.
#[derive(Debug, Clone)]
pub struct SocketProber {
    udp: bool,
    echo: bool,
    timeout: Duration,
    /// Payload with [`PORT_TOKEN`] rewritten to a `{{port}}` placeholder.
    template: String,
}

impl SocketProber {
    pub fn new(udp: bool, echo: bool, timeout: Duration, payload: impl Into<String>) -> Self {
        Self {
            udp,
            echo,
            timeout,
            template: payload.into().replace(PORT_TOKEN, "{{port}}"),
        }
    }

    /// The payload with `%port%` replaced by `port`.
    pub fn payload_for(&self, port: u16) -> String {
        let port = port.to_string();
        let mut table = HashMap::new();
        table.insert("port", port.as_str());
        Template::new(&self.template).fill_with_hashmap(&table)
    }

    async fn tcp_probe(&self, socket: SocketAddr) -> ProbeOutcome {
        match self.connect(socket).await {
            Ok(mut tcp_stream) => {
                if self.echo {
                    let payload = self.payload_for(socket.port());
                    if let Err(e) = tcp_stream.write_all(payload.as_bytes()).await {
                        debug!("Echo to {socket} failed: {e}");
                    }
                }
                if let Err(e) = tcp_stream.shutdown().await {
                    debug!("Shutdown stream error {e}");
                }
                ProbeOutcome::Open
            }
            Err(e) => outcome_for_error(socket, &e),
        }
    }

    /// Performs the connection to the socket with timeout
    async fn connect(&self, socket: SocketAddr) -> io::Result<TcpStream> {
        time::timeout(self.timeout, TcpStream::connect(socket))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
    }

    async fn udp_probe(&self, socket: SocketAddr) -> ProbeOutcome {
        let payload = self.payload_for(socket.port());
        let sent = time::timeout(self.timeout, async {
            let udp_socket = Self::udp_bind(socket).await?;
            udp_socket.connect(socket).await?;
            udp_socket.send(payload.as_bytes()).await
        })
        .await;

        match sent {
            Ok(Ok(size)) => {
                debug!("Sent {size} bytes to {socket}");
                ProbeOutcome::Sent
            }
            Ok(Err(e)) => {
                debug!("Error: {socket} ({e})");
                ProbeOutcome::SendFailed
            }
            Err(_) => {
                debug!("Error: {socket} (send timed out)");
                ProbeOutcome::SendFailed
            }
        }
    }

    /// Binds to a local UDP socket of the same family as `socket`.
    async fn udp_bind(socket: SocketAddr) -> io::Result<UdpSocket> {
        let local_addr: SocketAddr = match socket {
            SocketAddr::V4(_) => (std::net::Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        UdpSocket::bind(local_addr).await
    }
}

impl Prober for SocketProber {
    async fn probe(&self, socket: SocketAddr) -> ProbeOutcome {
        if self.udp {
            self.udp_probe(socket).await
        } else {
            self.tcp_probe(socket).await
        }
    }
}
