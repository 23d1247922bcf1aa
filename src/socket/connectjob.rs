use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::client::{SocketType, Stream};
use crate::socket::dialer::{DialTarget, Network};
use crate::socket::tls::TlsConfig;
use boring::ssl::SslConnector;
use tokio::net::TcpStream;

/// Manages the connection process: DNS -> TCP (or Unix) -> SSL.
/// Roughly equivalent to net::ConnectJob.
pub struct ConnectJob;

impl ConnectJob {
    /// Open a raw stream to `target`.
    pub async fn dial(target: &DialTarget) -> Result<Stream, NetError> {
        tracing::debug!(dial_target = %target, scheme = %target.scheme, "dialing");

        match target.network {
            Network::Tcp => Self::dial_tcp(&target.address).await,
            Network::Unix => Self::dial_unix(&target.address).await,
        }
    }

    async fn dial_tcp(address: &str) -> Result<Stream, NetError> {
        let (host, port) = split_host_port(address)?;

        // 1. DNS Resolution
        let addrs = tokio::net::lookup_host(address).await.dns_context(host)?;

        // 2. TCP Connect, first address that answers wins
        let mut last_err = NetError::NameNotResolved;
        for addr in addrs {
            match TcpStream::connect(addr).await.connection_context(host, port) {
                Ok(stream) => return Ok(Stream::Tcp(stream)),
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }

    #[cfg(unix)]
    async fn dial_unix(path: &str) -> Result<Stream, NetError> {
        let stream = tokio::net::UnixStream::connect(path).await.socket_path_context(path)?;
        Ok(Stream::Unix(stream))
    }

    #[cfg(not(unix))]
    async fn dial_unix(_path: &str) -> Result<Stream, NetError> {
        Err(NetError::AddressInvalid)
    }

    /// 3. SSL Handshake on an established stream.
    pub async fn handshake(
        connector: &SslConnector,
        host: &str,
        stream: Stream,
    ) -> Result<SocketType, NetError> {
        let mut config = connector.configure().map_err(|_| NetError::SslProtocolError)?;
        if !TlsConfig::should_set_sni(host) {
            config.set_use_server_name_indication(false);
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let tls_stream = tokio_boring::connect(config, host, stream).await.map_err(|e| {
            tracing::debug!(host = %host, error = ?e, "SSL handshake failed");
            NetError::SslProtocolError
        })?;

        Ok(SocketType::Ssl(tls_stream))
    }
}

/// Split `host:port`, tolerating bracketed IPv6 hosts.
fn split_host_port(address: &str) -> Result<(&str, u16), NetError> {
    let (host, port) = address.rsplit_once(':').ok_or(NetError::AddressInvalid)?;
    let port = port.parse::<u16>().map_err(|_| NetError::AddressInvalid)?;
    Ok((host, port))
}
